use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwritingError;
use crate::types::{Money, Rate};
use crate::UnderwritingResult;

use super::inputs::UnderwritingInputs;
use super::pro_forma::YearlyProjection;

/// Reversion at the end of the hold period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitMetrics {
    pub exit_year: u32,
    /// NOI of the final projected year
    pub exit_year_noi: Money,
    /// Exit cap rate after the spread
    pub exit_cap_rate: Rate,
    pub exit_value: Money,
    pub disposition_fee: Money,
    /// Sale price net of the disposition fee (unlevered reversion)
    pub net_sale_value: Money,
    /// Principal repaid at sale
    pub loan_balance: Money,
    /// Principal amortised during the hold
    pub loan_paydown: Money,
    /// Cash to equity at sale
    pub sale_proceeds: Money,
}

/// Direct capitalisation: value = NOI / cap rate.
///
/// The pro forma's yearly property value and the exit value both go through
/// this function so the two can never disagree.
pub fn capitalize(noi: Money, cap_rate: Rate) -> UnderwritingResult<Money> {
    if cap_rate <= Decimal::ZERO {
        return Err(UnderwritingError::InvalidInput {
            field: "exit_cap_rate".into(),
            reason: format!("Effective exit cap rate {cap_rate} must be positive"),
        });
    }
    noi.checked_div(cap_rate)
        .ok_or_else(|| UnderwritingError::overflow("capitalize", "Capitalised value"))
}

/// Value the sale at the end of `final_year`.
pub fn value_exit(
    final_year: &YearlyProjection,
    inputs: &UnderwritingInputs,
    loan_amount: Money,
) -> UnderwritingResult<ExitMetrics> {
    let exit_cap_rate = inputs.effective_exit_cap_rate();
    let exit_value = capitalize(final_year.noi, exit_cap_rate)?;
    let disposition_fee = exit_value * inputs.disposition_fee_percent;
    let net_sale_value = exit_value - disposition_fee;
    let loan_balance = final_year.loan_balance;
    let sale_proceeds = net_sale_value
        .checked_sub(loan_balance)
        .ok_or_else(|| UnderwritingError::overflow("value_exit", "Sale proceeds"))?;

    Ok(ExitMetrics {
        exit_year: final_year.year,
        exit_year_noi: final_year.noi,
        exit_cap_rate,
        exit_value,
        disposition_fee,
        net_sale_value,
        loan_balance,
        loan_paydown: loan_amount - loan_balance,
        sale_proceeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::underwriting::inputs::default_inputs;
    use crate::underwriting::pro_forma::project_cash_flows;
    use rust_decimal_macros::dec;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize(dec!(66000), dec!(0.06)).unwrap(), dec!(1100000));
    }

    #[test]
    fn test_capitalize_rejects_non_positive_cap_rate() {
        assert!(capitalize(dec!(66000), Decimal::ZERO).is_err());
        assert!(capitalize(dec!(66000), dec!(-0.01)).is_err());
    }

    #[test]
    fn test_capitalize_overflow_is_indeterminate() {
        match capitalize(dec!(1067906), dec!(0.0000000000000000000000001)) {
            Err(UnderwritingError::Indeterminate { function, .. }) => {
                assert_eq!(function, "capitalize")
            }
            other => panic!("Expected Indeterminate, got {other:?}"),
        }
    }

    #[test]
    fn test_exit_identity() {
        let inputs = default_inputs();
        let loan_amount = dec!(11250000);
        let years = project_cash_flows(&inputs, loan_amount).unwrap();
        let last = years.last().unwrap();

        let exit = value_exit(last, &inputs, loan_amount).unwrap();
        assert_eq!(exit.exit_year, 5);
        assert_eq!(exit.exit_value, last.property_value);
        assert_eq!(exit.disposition_fee, exit.exit_value * dec!(0.02));
        let rebuilt = exit.sale_proceeds + exit.loan_balance + exit.disposition_fee;
        assert!((rebuilt - exit.exit_value).abs() < dec!(0.000001));
        assert_eq!(exit.loan_paydown, loan_amount - exit.loan_balance);
        assert!(exit.loan_paydown > Decimal::ZERO);
    }

    #[test]
    fn test_cap_rate_spread_lowers_value() {
        let mut inputs = default_inputs();
        let years = project_cash_flows(&inputs, dec!(11250000)).unwrap();
        let base = value_exit(years.last().unwrap(), &inputs, dec!(11250000)).unwrap();

        inputs.cap_rate_spread = dec!(0.005);
        let years = project_cash_flows(&inputs, dec!(11250000)).unwrap();
        let wider = value_exit(years.last().unwrap(), &inputs, dec!(11250000)).unwrap();

        assert_eq!(wider.exit_cap_rate, dec!(0.060));
        assert!(wider.exit_value < base.exit_value);
    }
}
