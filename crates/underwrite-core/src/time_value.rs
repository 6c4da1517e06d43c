use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UnderwritingError;
use crate::types::{Money, Rate};
use crate::UnderwritingResult;

const IRR_INITIAL_GUESS: Rate = dec!(0.10);
const IRR_STEP_TOLERANCE: Decimal = dec!(0.0001);
const MAX_IRR_ITERATIONS: u32 = 100;
const DERIVATIVE_FLOOR: Decimal = dec!(0.000000001);
const RATE_FLOOR: Rate = dec!(-0.99);
const RATE_CEILING: Rate = dec!(10.0);

/// Outcome of the Newton-Raphson IRR search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IrrSolution {
    /// Successive iterates moved by less than the step tolerance.
    Converged { rate: Rate, iterations: u32 },
    /// Iteration budget exhausted; `last_rate` is where the search stopped.
    NotConverged { last_rate: Rate, iterations: u32 },
    /// The search cannot produce a meaningful rate (flat NPV curve, no sign
    /// change, overflowing discount factors, or pinned at a rate bound).
    Indeterminate { reason: String },
}

impl IrrSolution {
    pub fn rate(&self) -> Option<Rate> {
        match self {
            IrrSolution::Converged { rate, .. } => Some(*rate),
            _ => None,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, IrrSolution::Converged { .. })
    }

    /// Collapse to a rate, turning anything but convergence into an error.
    pub fn into_result(self, function: &str, cash_flows: &[Money]) -> UnderwritingResult<Rate> {
        match self {
            IrrSolution::Converged { rate, .. } => Ok(rate),
            IrrSolution::NotConverged {
                last_rate,
                iterations,
            } => Err(UnderwritingError::ConvergenceFailure {
                function: function.into(),
                iterations,
                last_delta: npv(last_rate, cash_flows).unwrap_or(Decimal::MAX),
            }),
            IrrSolution::Indeterminate { reason } => Err(UnderwritingError::Indeterminate {
                function: function.into(),
                reason,
            }),
        }
    }
}

/// Net Present Value of a series of cash flows
pub fn npv(rate: Rate, cash_flows: &[Money]) -> UnderwritingResult<Money> {
    if rate <= dec!(-1) {
        return Err(UnderwritingError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    npv_and_derivative(cash_flows, rate)
        .map(|(value, _)| value)
        .ok_or_else(|| UnderwritingError::Indeterminate {
            function: "NPV".into(),
            reason: format!("discount factors overflow at rate {rate}"),
        })
}

/// Internal Rate of Return, failing unless the solver converges.
pub fn irr(cash_flows: &[Money]) -> UnderwritingResult<Rate> {
    let solution = solve_irr(cash_flows);
    if !solution.is_converged() {
        debug!(?solution, periods = cash_flows.len(), "IRR search did not converge");
    }
    solution.into_result("IRR", cash_flows)
}

/// Newton-Raphson IRR search from the standard 10% guess.
pub fn solve_irr(cash_flows: &[Money]) -> IrrSolution {
    solve_irr_from(cash_flows, IRR_INITIAL_GUESS)
}

/// Newton-Raphson IRR search from an explicit guess.
///
/// Converges when successive iterates differ by less than 0.0001, within at
/// most 100 iterations. Iterates are clamped to [-99%, 1000%].
pub fn solve_irr_from(cash_flows: &[Money], guess: Rate) -> IrrSolution {
    if cash_flows.len() < 2 {
        return IrrSolution::Indeterminate {
            reason: "IRR requires at least 2 cash flows".into(),
        };
    }

    let has_inflow = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let has_outflow = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    if !(has_inflow && has_outflow) {
        return IrrSolution::Indeterminate {
            reason: "cash flows never change sign".into(),
        };
    }

    let mut rate = guess;

    for iteration in 1..=MAX_IRR_ITERATIONS {
        let Some((value, slope)) = npv_and_derivative(cash_flows, rate) else {
            return IrrSolution::Indeterminate {
                reason: format!("discount factors overflow at rate {rate}"),
            };
        };

        if slope.abs() < DERIVATIVE_FLOOR {
            return IrrSolution::Indeterminate {
                reason: format!("NPV derivative vanished at rate {rate}"),
            };
        }

        let Some(next) = value
            .checked_div(slope)
            .and_then(|step| rate.checked_sub(step))
        else {
            return IrrSolution::Indeterminate {
                reason: format!("Newton step overflowed at rate {rate}"),
            };
        };
        let next = next.clamp(RATE_FLOOR, RATE_CEILING);

        if (next - rate).abs() < IRR_STEP_TOLERANCE {
            if next == RATE_FLOOR || next == RATE_CEILING {
                return IrrSolution::Indeterminate {
                    reason: format!("search pinned at rate bound {next}"),
                };
            }
            return IrrSolution::Converged {
                rate: next,
                iterations: iteration,
            };
        }

        rate = next;
    }

    IrrSolution::NotConverged {
        last_rate: rate,
        iterations: MAX_IRR_ITERATIONS,
    }
}

/// NPV(r) = sum CF_t / (1+r)^t and its derivative d(NPV)/dr.
///
/// Returns `None` when a discount factor or term overflows the decimal range.
fn npv_and_derivative(cash_flows: &[Money], rate: Rate) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let inverse = Decimal::ONE.checked_div(one_plus_r)?;

    let mut value = Decimal::ZERO;
    let mut slope = Decimal::ZERO;
    let mut discount = Decimal::ONE; // (1+r)^-t

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(inverse)?;
        }
        let present = cf.checked_mul(discount)?;
        value = value.checked_add(present)?;
        if t > 0 {
            // d/dr of CF_t / (1+r)^t = -t * CF_t / (1+r)^(t+1)
            let term = Decimal::from(t as u64)
                .checked_mul(present)?
                .checked_mul(inverse)?;
            slope = slope.checked_sub(term)?;
        }
    }

    Some((value, slope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // NPV at 10%: -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        let result = npv(dec!(0.0), &cfs).unwrap();
        assert_eq!(result, dec!(50));
    }

    #[test]
    fn test_npv_rejects_rate_at_minus_one() {
        assert!(npv(dec!(-1), &[dec!(-100), dec!(110)]).is_err());
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs).unwrap();
        // IRR should be ~9.7%
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_single_period() {
        // Invest 100, receive 110 in 1 year => IRR = 10%
        let cfs = vec![dec!(-100), dec!(110)];
        let rate = irr(&cfs).unwrap();
        assert!((rate - dec!(0.10)).abs() < dec!(0.0001), "got {rate}");
    }

    #[test]
    fn test_irr_root_property() {
        let flows = [
            vec![dec!(-1000), dec!(400), dec!(400), dec!(400)],
            vec![dec!(-1000), dec!(300), dec!(300), dec!(300), dec!(300), dec!(300)],
            vec![dec!(-500), dec!(20), dec!(25), dec!(30), dec!(35), dec!(900)],
            vec![dec!(-100), dec!(0), dec!(0), dec!(300)],
        ];
        for cfs in &flows {
            let solution = solve_irr(cfs);
            let rate = solution.rate().expect("should converge");
            let residual = npv(rate, cfs).unwrap();
            // Scale the tolerance by the initial outlay
            let scale = cfs[0].abs();
            assert!(
                (residual / scale).abs() < dec!(0.000001),
                "NPV at IRR {rate} was {residual} for {cfs:?}"
            );
        }
    }

    #[test]
    fn test_irr_reports_iteration_count() {
        match solve_irr(&[dec!(-1000), dec!(400), dec!(400), dec!(400)]) {
            IrrSolution::Converged { iterations, .. } => {
                assert!(iterations >= 1 && iterations <= MAX_IRR_ITERATIONS);
            }
            other => panic!("Expected convergence, got {other:?}"),
        }
    }

    #[test]
    fn test_irr_requires_sign_change() {
        let solution = solve_irr(&[dec!(100), dec!(100), dec!(100)]);
        assert!(matches!(solution, IrrSolution::Indeterminate { .. }));

        let err = irr(&[dec!(-100), dec!(-10)]).unwrap_err();
        assert!(matches!(err, UnderwritingError::Indeterminate { .. }));
    }

    #[test]
    fn test_irr_requires_two_flows() {
        let solution = solve_irr(&[dec!(-100)]);
        assert!(matches!(solution, IrrSolution::Indeterminate { .. }));
    }

    #[test]
    fn test_irr_flat_derivative_is_indeterminate() {
        // d NPV/dr at 10% = -(2/1.21 - 2.2/1.331) = 0
        let solution = solve_irr(&[dec!(1), dec!(2), dec!(-1.1)]);
        match solution {
            IrrSolution::Indeterminate { reason } => assert!(reason.contains("derivative")),
            other => panic!("Expected indeterminate, got {other:?}"),
        }
    }

    #[test]
    fn test_irr_pinned_at_ceiling_is_indeterminate() {
        // True IRR is 99,900%, far beyond the search ceiling
        let solution = solve_irr(&[dec!(-1), dec!(1000)]);
        match solution {
            IrrSolution::Indeterminate { reason } => assert!(reason.contains("bound")),
            other => panic!("Expected indeterminate, got {other:?}"),
        }
    }

    #[test]
    fn test_into_result_maps_outcomes() {
        let cfs = [dec!(-100), dec!(110)];
        let converged = IrrSolution::Converged {
            rate: dec!(0.1),
            iterations: 3,
        };
        assert_eq!(converged.into_result("IRR", &cfs).unwrap(), dec!(0.1));

        let stalled = IrrSolution::NotConverged {
            last_rate: dec!(0.5),
            iterations: 100,
        };
        match stalled.into_result("IRR", &cfs).unwrap_err() {
            UnderwritingError::ConvergenceFailure {
                iterations,
                last_delta,
                ..
            } => {
                assert_eq!(iterations, 100);
                // -100 + 110/1.5
                assert!((last_delta - dec!(-26.6667)).abs() < dec!(0.001));
            }
            other => panic!("Expected ConvergenceFailure, got {other:?}"),
        }
    }
}
