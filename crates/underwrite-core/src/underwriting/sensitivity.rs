use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::UnderwritingResult;

use super::inputs::{Driver, UnderwritingInputs};
use super::returns::compute_results;

const MAX_SWEPT_LTV: Decimal = dec!(0.95);

/// Levered IRR at the low and high end of one driver's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityVariable {
    /// Input field key, e.g. `exit_cap_rate`
    pub name: String,
    /// Display label, e.g. `Exit Cap Rate`
    pub label: String,
    pub base_value: Decimal,
    pub low_value: Decimal,
    pub high_value: Decimal,
    pub low_irr: Rate,
    pub high_irr: Rate,
    /// Absolute IRR swing between the low and high case
    pub impact: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub base_irr: Rate,
    /// Drivers in tracked order; see [`rank_by_impact`] for tornado order.
    pub variables: Vec<SensitivityVariable>,
}

/// One-at-a-time tornado analysis of the levered IRR.
///
/// Each tracked driver is moved to its low and high value on a fresh copy of
/// `inputs` and the full pipeline re-run. If any scenario fails the whole
/// analysis fails.
pub fn analyze_sensitivity(
    inputs: &UnderwritingInputs,
) -> UnderwritingResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let base_irr = scenario_irr(inputs, Some(&mut warnings))?;
    let variables = sweep_drivers(inputs)?;

    for v in &variables {
        if v.low_value == v.high_value {
            warnings.push(format!(
                "{} range collapsed to a single value at its bound",
                v.label
            ));
        }
    }

    let output = SensitivityOutput {
        base_irr,
        variables,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-at-a-Time Levered IRR Sensitivity (Tornado)",
        inputs,
        warnings,
        elapsed,
        output,
    ))
}

/// Sweep every tracked driver, returning variables in tracked order.
pub fn sweep_drivers(inputs: &UnderwritingInputs) -> UnderwritingResult<Vec<SensitivityVariable>> {
    Driver::TRACKED
        .iter()
        .map(|&driver| sweep_driver(inputs, driver))
        .collect()
}

/// Low and high values swept for `driver` around `base`.
///
/// Floors and the LTV cap never cut across `base`, so `low <= base <= high`.
pub fn driver_range(driver: Driver, base: Decimal) -> (Decimal, Decimal) {
    match driver {
        Driver::PurchasePrice => (base * dec!(0.90), base.saturating_mul(dec!(1.10))),
        Driver::ExitCapRate => ((base - dec!(0.005)).max(Decimal::ZERO), base + dec!(0.005)),
        Driver::RentGrowth | Driver::ExpenseGrowth => (base - dec!(0.01), base + dec!(0.01)),
        Driver::VacancyPercent => ((base - dec!(0.02)).max(Decimal::ZERO), base + dec!(0.02)),
        Driver::InterestRate => ((base - dec!(0.01)).max(Decimal::ZERO), base + dec!(0.01)),
        Driver::LtvPercent => (
            (base - dec!(0.10)).max(Decimal::ZERO).min(base),
            (base + dec!(0.10)).min(MAX_SWEPT_LTV.max(base)),
        ),
    }
}

/// Sort by impact, largest first. Ties keep their current order.
pub fn rank_by_impact(variables: &mut [SensitivityVariable]) {
    variables.sort_by(|a, b| b.impact.cmp(&a.impact));
}

fn sweep_driver(
    inputs: &UnderwritingInputs,
    driver: Driver,
) -> UnderwritingResult<SensitivityVariable> {
    let base_value = driver.value(inputs);
    let (low_value, high_value) = driver_range(driver, base_value);

    let low_irr = scenario_irr(&inputs.with_driver(driver, low_value), None)?;
    let high_irr = scenario_irr(&inputs.with_driver(driver, high_value), None)?;
    let impact = (high_irr - low_irr).abs();

    debug!(
        driver = driver.name(),
        %low_irr,
        %high_irr,
        %impact,
        "sensitivity scenario"
    );

    Ok(SensitivityVariable {
        name: driver.name().to_string(),
        label: driver.label().to_string(),
        base_value,
        low_value,
        high_value,
        low_irr,
        high_irr,
        impact,
    })
}

fn scenario_irr(
    inputs: &UnderwritingInputs,
    warnings: Option<&mut Vec<String>>,
) -> UnderwritingResult<Rate> {
    let mut scratch = Vec::new();
    let sink = warnings.unwrap_or(&mut scratch);
    compute_results(inputs, sink).map(|r| r.returns.levered_irr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::underwriting::inputs::default_inputs;
    use crate::underwriting::returns::underwrite;

    fn variable(name: &str, impact: Decimal) -> SensitivityVariable {
        SensitivityVariable {
            name: name.into(),
            label: name.into(),
            base_value: Decimal::ZERO,
            low_value: Decimal::ZERO,
            high_value: Decimal::ZERO,
            low_irr: Decimal::ZERO,
            high_irr: impact,
            impact,
        }
    }

    #[test]
    fn test_tracked_order_and_labels() {
        let out = analyze_sensitivity(&default_inputs()).unwrap();
        let names: Vec<&str> = out.result.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "purchase_price",
                "exit_cap_rate",
                "rent_growth",
                "vacancy_percent",
                "interest_rate",
                "ltv_percent",
                "expense_growth",
            ]
        );
        let labels: Vec<&str> = out.result.variables.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels[0], "Purchase Price");
        assert_eq!(labels[5], "LTV");
    }

    #[test]
    fn test_base_irr_matches_underwrite() {
        let inputs = default_inputs();
        let out = analyze_sensitivity(&inputs).unwrap();
        let base = underwrite(&inputs).unwrap();
        assert_eq!(out.result.base_irr, base.result.returns.levered_irr);
    }

    #[test]
    fn test_variable_invariants() {
        let out = analyze_sensitivity(&default_inputs()).unwrap();
        for v in &out.result.variables {
            assert!(v.low_value <= v.base_value, "{}", v.name);
            assert!(v.base_value <= v.high_value, "{}", v.name);
            assert_eq!(v.impact, (v.high_irr - v.low_irr).abs());
        }
    }

    #[test]
    fn test_directional_effects() {
        let out = analyze_sensitivity(&default_inputs()).unwrap();
        let get = |name: &str| {
            out.result
                .variables
                .iter()
                .find(|v| v.name == name)
                .unwrap()
                .clone()
        };

        let price = get("purchase_price");
        assert!(price.low_irr > price.high_irr);

        let cap = get("exit_cap_rate");
        assert!(cap.low_irr > cap.high_irr);
        assert_eq!(cap.low_value, dec!(0.050));
        assert_eq!(cap.high_value, dec!(0.060));

        let growth = get("rent_growth");
        assert!(growth.high_irr > growth.low_irr);

        let rate = get("interest_rate");
        assert!(rate.low_irr > rate.high_irr);
    }

    #[test]
    fn test_driver_range_floors_and_clamps() {
        assert_eq!(
            driver_range(Driver::ExitCapRate, dec!(0.003)),
            (Decimal::ZERO, dec!(0.008))
        );
        assert_eq!(
            driver_range(Driver::VacancyPercent, dec!(0.01)),
            (Decimal::ZERO, dec!(0.03))
        );
        assert_eq!(
            driver_range(Driver::InterestRate, dec!(0.005)),
            (Decimal::ZERO, dec!(0.015))
        );
        assert_eq!(
            driver_range(Driver::LtvPercent, dec!(0.90)),
            (dec!(0.80), dec!(0.95))
        );
        assert_eq!(
            driver_range(Driver::LtvPercent, dec!(0.05)),
            (Decimal::ZERO, dec!(0.15))
        );
        // Above the sweep cap the high case stays at base
        assert_eq!(
            driver_range(Driver::LtvPercent, dec!(0.97)),
            (dec!(0.87), dec!(0.97))
        );
        assert_eq!(
            driver_range(Driver::PurchasePrice, dec!(1000000)),
            (dec!(900000), dec!(1100000))
        );
        // Growth rates may go negative
        assert_eq!(
            driver_range(Driver::RentGrowth, dec!(0.005)),
            (dec!(-0.005), dec!(0.015))
        );
    }

    #[test]
    fn test_ltv_above_sweep_cap_is_bracketed() {
        let mut inputs = default_inputs();
        inputs.ltv_percent = dec!(0.97);
        inputs.interest_only_period = 5;
        let out = analyze_sensitivity(&inputs).unwrap();
        let ltv = out
            .result
            .variables
            .iter()
            .find(|v| v.name == "ltv_percent")
            .unwrap();

        assert_eq!(ltv.base_value, dec!(0.97));
        assert!(ltv.low_value <= ltv.base_value);
        assert!(ltv.base_value <= ltv.high_value);
        assert_eq!(ltv.high_value, dec!(0.97));
    }

    #[test]
    fn test_base_inputs_not_mutated() {
        let inputs = default_inputs();
        let before = inputs.clone();
        analyze_sensitivity(&inputs).unwrap();
        assert_eq!(inputs, before);
    }

    #[test]
    fn test_rank_by_impact_descending_and_stable() {
        let mut vars = vec![
            variable("a", dec!(0.01)),
            variable("b", dec!(0.05)),
            variable("c", dec!(0.01)),
            variable("d", dec!(0.03)),
        ];
        rank_by_impact(&mut vars);
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_failed_scenario_fails_sweep() {
        let mut inputs = default_inputs();
        // Low exit cap case floors at zero, which cannot be capitalised
        inputs.exit_cap_rate = dec!(0.004);
        assert!(analyze_sensitivity(&inputs).is_err());
    }
}
