use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::UnderwritingError;
use crate::types::Money;
use crate::UnderwritingResult;

use super::debt::LoanTerms;
use super::exit::capitalize;
use super::inputs::UnderwritingInputs;

/// One year of the pro forma.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyProjection {
    pub year: u32,
    /// In-place rent roll, annualised
    pub gross_potential_rent: Money,
    /// Market rent minus in-place rent, annualised. Informational: GPR is
    /// already stated at in-place rents.
    pub loss_to_lease: Money,
    pub other_income: Money,
    pub gross_income: Money,
    pub vacancy: Money,
    pub concessions: Money,
    pub bad_debt: Money,
    pub effective_gross_income: Money,
    pub management_fee: Money,
    /// Line items plus management fee
    pub operating_expenses: Money,
    pub capital_reserve: Money,
    pub noi: Money,
    pub debt_service: Money,
    pub cash_flow: Money,
    pub cumulative_cash_flow: Money,
    /// NOI capitalised at the effective exit cap rate
    pub property_value: Money,
    pub loan_balance: Money,
    pub equity: Money,
}

/// Revenue through NOI for one year.
struct OperatingStatement {
    gross_potential_rent: Money,
    loss_to_lease: Money,
    other_income: Money,
    gross_income: Money,
    vacancy: Money,
    concessions: Money,
    bad_debt: Money,
    effective_gross_income: Money,
    management_fee: Money,
    operating_expenses: Money,
    noi: Money,
}

/// Build the year-by-year pro forma over the hold period.
///
/// Rents, market rents and other income compound at `rent_growth` from the
/// in-place figures; expense line items compound at `expense_growth`. The
/// management fee is re-derived from each year's EGI. The capital reserve is
/// held flat at its per-unit amount.
///
/// Any line that grows past the decimal range is an `Indeterminate` error.
pub fn project_cash_flows(
    inputs: &UnderwritingInputs,
    loan_amount: Money,
) -> UnderwritingResult<Vec<YearlyProjection>> {
    let overflow = |quantity: &str| UnderwritingError::overflow("project_cash_flows", quantity);

    let terms = LoanTerms::from_inputs(inputs, loan_amount);
    let units = Decimal::from(inputs.units);
    let cap_rate = inputs.effective_exit_cap_rate();
    let expense_items = inputs
        .expense_items_per_unit()
        .checked_mul(units)
        .ok_or_else(|| overflow("Operating expenses"))?;
    let capital_reserve = inputs
        .capital_reserve_per_unit
        .checked_mul(units)
        .ok_or_else(|| overflow("Capital reserve"))?;

    let mut projections = Vec::with_capacity(inputs.hold_period as usize);
    let mut rent_factor = Decimal::ONE;
    let mut expense_factor = Decimal::ONE;
    let mut cumulative_cash_flow = Decimal::ZERO;

    for year in 1..=inputs.hold_period {
        if year > 1 {
            rent_factor = rent_factor
                .checked_mul(Decimal::ONE + inputs.rent_growth)
                .ok_or_else(|| overflow("Rent growth factor"))?;
            expense_factor = expense_factor
                .checked_mul(Decimal::ONE + inputs.expense_growth)
                .ok_or_else(|| overflow("Expense growth factor"))?;
        }

        let ops = operating_statement(
            inputs,
            units,
            rent_factor,
            expense_items,
            expense_factor,
            capital_reserve,
        )
        .ok_or_else(|| overflow(&format!("Year {year} operating statement")))?;

        // --- Debt and value ---
        let debt_service = terms.annual_debt_service(year);
        let cash_flow = ops
            .noi
            .checked_sub(debt_service)
            .ok_or_else(|| overflow("Cash flow"))?;
        cumulative_cash_flow = cumulative_cash_flow
            .checked_add(cash_flow)
            .ok_or_else(|| overflow("Cumulative cash flow"))?;

        let property_value = capitalize(ops.noi, cap_rate)?;
        let loan_balance = terms.balance_after_year(year);
        let equity = property_value
            .checked_sub(loan_balance)
            .ok_or_else(|| overflow("Equity"))?;

        projections.push(YearlyProjection {
            year,
            gross_potential_rent: ops.gross_potential_rent,
            loss_to_lease: ops.loss_to_lease,
            other_income: ops.other_income,
            gross_income: ops.gross_income,
            vacancy: ops.vacancy,
            concessions: ops.concessions,
            bad_debt: ops.bad_debt,
            effective_gross_income: ops.effective_gross_income,
            management_fee: ops.management_fee,
            operating_expenses: ops.operating_expenses,
            capital_reserve,
            noi: ops.noi,
            debt_service,
            cash_flow,
            cumulative_cash_flow,
            property_value,
            loan_balance,
            equity,
        });
    }

    Ok(projections)
}

/// `None` when any line leaves the decimal range.
fn operating_statement(
    inputs: &UnderwritingInputs,
    units: Decimal,
    rent_factor: Decimal,
    expense_items: Money,
    expense_factor: Decimal,
    capital_reserve: Money,
) -> Option<OperatingStatement> {
    let annual_units = units.checked_mul(dec!(12))?;

    // --- Revenue ---
    let rent = inputs.current_rent_per_unit.checked_mul(rent_factor)?;
    let market_rent = inputs.market_rent_per_unit.checked_mul(rent_factor)?;
    let gross_potential_rent = rent.checked_mul(annual_units)?;
    let loss_to_lease = market_rent.checked_sub(rent)?.checked_mul(annual_units)?;
    let other_income = inputs
        .other_income_per_unit
        .checked_mul(units)?
        .checked_mul(rent_factor)?;
    let gross_income = gross_potential_rent.checked_add(other_income)?;

    let vacancy = gross_income * inputs.vacancy_percent;
    let concessions = gross_income * inputs.concessions_percent;
    let bad_debt = gross_income * inputs.bad_debt_percent;
    let effective_gross_income = gross_income - vacancy - concessions - bad_debt;

    // --- Expenses ---
    let management_fee = effective_gross_income * inputs.management_percent;
    let operating_expenses = expense_items
        .checked_mul(expense_factor)?
        .checked_add(management_fee)?;
    let noi = effective_gross_income
        .checked_sub(operating_expenses)?
        .checked_sub(capital_reserve)?;

    Some(OperatingStatement {
        gross_potential_rent,
        loss_to_lease,
        other_income,
        gross_income,
        vacancy,
        concessions,
        bad_debt,
        effective_gross_income,
        management_fee,
        operating_expenses,
        noi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::underwriting::inputs::default_inputs;

    fn default_projection() -> Vec<YearlyProjection> {
        project_cash_flows(&default_inputs(), dec!(11250000)).unwrap()
    }

    #[test]
    fn test_year_one_income_statement() {
        let years = default_projection();
        assert_eq!(years.len(), 5);
        let y1 = &years[0];

        // 1450 * 12 * 100
        assert_eq!(y1.gross_potential_rent, dec!(1740000));
        // (1550 - 1450) * 12 * 100
        assert_eq!(y1.loss_to_lease, dec!(120000));
        assert_eq!(y1.other_income, dec!(120000));
        assert_eq!(y1.gross_income, dec!(1860000));
        assert_eq!(y1.vacancy, dec!(93000));
        assert_eq!(y1.concessions, dec!(18600));
        assert_eq!(y1.bad_debt, dec!(18600));
        assert_eq!(y1.effective_gross_income, dec!(1729800));
        // 3% of EGI
        assert_eq!(y1.management_fee, dec!(51894));
        // 5800 * 100 + 51894
        assert_eq!(y1.operating_expenses, dec!(631894));
        assert_eq!(y1.capital_reserve, dec!(30000));
        assert_eq!(y1.noi, dec!(1067906));
        // Interest-only: 11.25M * 6.5%
        assert_eq!(y1.debt_service, dec!(731250));
        assert_eq!(y1.cash_flow, dec!(336656));
        assert_eq!(y1.loan_balance, dec!(11250000));
    }

    #[test]
    fn test_year_two_growth() {
        let years = default_projection();
        let y2 = &years[1];

        // 1740000 * 1.03
        assert_eq!(y2.gross_potential_rent, dec!(1792200));
        // Other income grows with rent
        assert_eq!(y2.other_income, dec!(123600));
        assert_eq!(y2.effective_gross_income, dec!(1781694));
        // 580000 * 1.03 + 0.03 * 1781694
        assert_eq!(y2.operating_expenses, dec!(650850.82));
        // Reserve held flat
        assert_eq!(y2.capital_reserve, dec!(30000));
        assert_eq!(y2.noi, dec!(1100843.18));
    }

    #[test]
    fn test_row_identities() {
        for y in default_projection() {
            assert_eq!(
                y.effective_gross_income,
                y.gross_income - y.vacancy - y.concessions - y.bad_debt
            );
            assert_eq!(y.noi, y.effective_gross_income - y.operating_expenses - y.capital_reserve);
            assert_eq!(y.cash_flow, y.noi - y.debt_service);
            assert_eq!(y.equity, y.property_value - y.loan_balance);
            assert_eq!(y.property_value, y.noi / dec!(0.055));
        }
    }

    #[test]
    fn test_cumulative_cash_flow_identity() {
        let years = default_projection();
        let mut running = Decimal::ZERO;
        for y in &years {
            running += y.cash_flow;
            assert_eq!(y.cumulative_cash_flow, running);
        }
    }

    #[test]
    fn test_debt_service_steps_up_after_interest_only() {
        let years = default_projection();
        assert_eq!(years[0].debt_service, years[1].debt_service);
        assert!(years[2].debt_service > years[1].debt_service);
        assert_eq!(years[2].debt_service, years[4].debt_service);
        assert_eq!(years[1].loan_balance, dec!(11250000));
        assert!(years[2].loan_balance < years[1].loan_balance);
    }

    #[test]
    fn test_zero_units_yields_zero_income() {
        let mut inputs = default_inputs();
        inputs.units = 0;
        let years = project_cash_flows(&inputs, dec!(11250000)).unwrap();
        assert_eq!(years[0].gross_income, Decimal::ZERO);
        assert_eq!(years[0].noi, Decimal::ZERO);
        assert_eq!(years[0].cash_flow, dec!(-731250));
    }

    #[test]
    fn test_runaway_rent_growth_is_indeterminate() {
        let mut inputs = default_inputs();
        inputs.hold_period = 60;
        inputs.rent_growth = dec!(5);
        match project_cash_flows(&inputs, dec!(11250000)) {
            Err(UnderwritingError::Indeterminate { .. }) => {}
            other => panic!("Expected Indeterminate, got {other:?}"),
        }
    }

    #[test]
    fn test_non_positive_cap_rate_error() {
        let mut inputs = default_inputs();
        inputs.exit_cap_rate = Decimal::ZERO;
        assert!(project_cash_flows(&inputs, dec!(11250000)).is_err());
    }
}
