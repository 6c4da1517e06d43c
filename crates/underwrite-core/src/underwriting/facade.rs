use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::ComputationOutput;
use crate::UnderwritingResult;

use super::inputs::{default_inputs, UnderwritingInputs};
use super::returns::{compute_results, underwrite, UnderwritingResults};
use super::sensitivity::{rank_by_impact, sweep_drivers, SensitivityVariable};

/// Results and ranked sensitivity computed from one set of inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderwritingSnapshot {
    /// `None` when the inputs cannot be underwritten
    pub results: Option<ComputationOutput<UnderwritingResults>>,
    /// Ranked by impact; empty when `results` is `None`
    pub sensitivity: Vec<SensitivityVariable>,
}

/// Stateful entry point holding the current assumption set.
///
/// Every read recomputes from the current inputs. Calculation faults are
/// logged and surface as `None` / an empty list rather than an error.
#[derive(Debug, Clone, Default)]
pub struct Underwriter {
    inputs: UnderwritingInputs,
}

impl Underwriter {
    pub fn new(inputs: UnderwritingInputs) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &UnderwritingInputs {
        &self.inputs
    }

    /// Replace a single input field by its key.
    ///
    /// Unknown keys and values of the wrong type are rejected and the
    /// current inputs are left untouched.
    pub fn update_input(&mut self, key: &str, value: serde_json::Value) -> UnderwritingResult<()> {
        self.inputs = self.inputs.with_field(key, value)?;
        debug!(key, "input updated");
        Ok(())
    }

    pub fn reset_inputs(&mut self) {
        self.inputs = default_inputs();
    }

    pub fn results(&self) -> Option<ComputationOutput<UnderwritingResults>> {
        match underwrite(&self.inputs) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(error = %e, "underwriting failed");
                None
            }
        }
    }

    /// Tornado sensitivity, largest impact first.
    pub fn sensitivity(&self) -> Vec<SensitivityVariable> {
        if let Err(e) = compute_results(&self.inputs, &mut Vec::new()) {
            warn!(error = %e, "underwriting failed; sensitivity skipped");
            return Vec::new();
        }
        self.ranked_sweep()
    }

    pub fn snapshot(&self) -> UnderwritingSnapshot {
        let results = self.results();
        let sensitivity = if results.is_some() {
            self.ranked_sweep()
        } else {
            Vec::new()
        };
        UnderwritingSnapshot {
            results,
            sensitivity,
        }
    }

    fn ranked_sweep(&self) -> Vec<SensitivityVariable> {
        match sweep_drivers(&self.inputs) {
            Ok(mut variables) => {
                rank_by_impact(&mut variables);
                variables
            }
            Err(e) => {
                warn!(error = %e, "sensitivity sweep failed");
                Vec::new()
            }
        }
    }
}
