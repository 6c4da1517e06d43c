use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::UnderwritingError;
use crate::time_value::solve_irr;
use crate::types::{ratio_or_zero, with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::UnderwritingResult;

use super::debt;
use super::exit::{value_exit, ExitMetrics};
use super::inputs::{validate_inputs, UnderwritingInputs};
use super::pro_forma::{project_cash_flows, YearlyProjection};

const MIN_DSCR: Decimal = dec!(1.20);
const MAX_LTV: Decimal = dec!(0.80);

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Sources and uses at closing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionMetrics {
    pub price_per_unit: Money,
    pub price_per_sf: Money,
    pub down_payment: Money,
    pub loan_amount: Money,
    pub ltv: Rate,
    pub closing_costs: Money,
    pub acquisition_fee: Money,
    pub origination_fee: Money,
    pub due_diligence_costs: Money,
    pub immediate_capex: Money,
    pub total_equity_required: Money,
    /// Year-1 NOI over purchase price
    pub going_in_cap_rate: Rate,
}

/// First projected year plus the year-1 ratios lenders and investors quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Year1Snapshot {
    #[serde(flatten)]
    pub projection: YearlyProjection,
    pub cash_on_cash_return: Rate,
    pub dscr: Decimal,
    pub yield_on_cost: Rate,
    /// Share of gross income needed to cover operating expenses and debt service
    pub cash_break_even_occupancy: Rate,
    pub monthly_debt_service: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMetrics {
    pub levered_irr: Rate,
    pub unlevered_irr: Rate,
    pub equity_multiple: Multiple,
    pub average_annual_return: Rate,
    pub total_profit: Money,
    /// Sum of levered inflows after the initial equity
    pub total_distributions: Money,
    /// Year 0 equity outflow followed by yearly cash flow, sale proceeds in the final year
    pub levered_cash_flows: Vec<Money>,
    /// Year 0 all-cash basis followed by yearly NOI, net sale value in the final year
    pub unlevered_cash_flows: Vec<Money>,
}

/// Full underwriting of a multifamily acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderwritingResults {
    pub acquisition: AcquisitionMetrics,
    pub year1: Year1Snapshot,
    pub cash_flow_projection: Vec<YearlyProjection>,
    pub returns: ReturnMetrics,
    pub exit: ExitMetrics,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Underwrite an acquisition: sources and uses, pro forma, exit and returns.
///
/// Any input that fails validation, and any IRR that does not converge, is
/// returned as an error rather than a partial result.
pub fn underwrite(
    inputs: &UnderwritingInputs,
) -> UnderwritingResult<ComputationOutput<UnderwritingResults>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let results = compute_results(inputs, &mut warnings)?;

    debug!(
        levered_irr = %results.returns.levered_irr,
        equity_multiple = %results.returns.equity_multiple,
        warnings = warnings.len(),
        "underwriting complete"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Multifamily Acquisition Underwriting (Levered DCF, Direct-Cap Exit)",
        inputs,
        warnings,
        elapsed,
        results,
    ))
}

/// Run the pipeline without the output envelope.
pub fn compute_results(
    inputs: &UnderwritingInputs,
    warnings: &mut Vec<String>,
) -> UnderwritingResult<UnderwritingResults> {
    validate_inputs(inputs, warnings)?;

    let basis = acquisition_basis(inputs)?;
    let loan_amount = basis.loan_amount;

    let projections = project_cash_flows(inputs, loan_amount)?;
    let (first, last) = match (projections.first(), projections.last()) {
        (Some(first), Some(last)) => (first.clone(), last.clone()),
        _ => {
            return Err(UnderwritingError::InsufficientData(
                "Pro forma produced no projection years".into(),
            ))
        }
    };

    let acquisition = AcquisitionMetrics {
        going_in_cap_rate: ratio_or_zero(first.noi, inputs.purchase_price),
        ..basis
    };
    let exit = value_exit(&last, inputs, loan_amount)?;
    let year1 = year_one_snapshot(first, inputs, &acquisition)?;
    let returns = compute_returns(&projections, &acquisition, &exit, inputs)?;

    push_result_warnings(&acquisition, &year1, &exit, warnings);

    Ok(UnderwritingResults {
        acquisition,
        year1,
        cash_flow_projection: projections,
        returns,
        exit,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Sources and uses before the pro forma is known (going-in cap left at zero).
fn acquisition_basis(inputs: &UnderwritingInputs) -> UnderwritingResult<AcquisitionMetrics> {
    let price = inputs.purchase_price;
    let loan_amount = price * inputs.ltv_percent;
    let down_payment = price - loan_amount;
    let closing_costs = price * inputs.closing_cost_percent;
    let acquisition_fee = price * inputs.acquisition_fee_percent;
    let origination_fee = loan_amount * inputs.origination_fee_percent;

    let total_equity_required = [
        closing_costs,
        acquisition_fee,
        inputs.due_diligence_costs,
        inputs.immediate_capex,
        origination_fee,
    ]
    .into_iter()
    .try_fold(down_payment, Decimal::checked_add)
    .ok_or_else(|| UnderwritingError::overflow("acquisition_basis", "Total equity required"))?;

    Ok(AcquisitionMetrics {
        price_per_unit: ratio_or_zero(price, Decimal::from(inputs.units)),
        price_per_sf: ratio_or_zero(price, inputs.square_footage),
        down_payment,
        loan_amount,
        ltv: debt::ltv(loan_amount, price),
        closing_costs,
        acquisition_fee,
        origination_fee,
        due_diligence_costs: inputs.due_diligence_costs,
        immediate_capex: inputs.immediate_capex,
        total_equity_required,
        going_in_cap_rate: Decimal::ZERO,
    })
}

/// All-cash cost basis: price, closing costs and immediate capex.
fn all_cash_basis(
    inputs: &UnderwritingInputs,
    acquisition: &AcquisitionMetrics,
) -> UnderwritingResult<Money> {
    inputs
        .purchase_price
        .checked_add(acquisition.closing_costs)
        .and_then(|sum| sum.checked_add(acquisition.immediate_capex))
        .ok_or_else(|| UnderwritingError::overflow("all_cash_basis", "All-cash basis"))
}

fn year_one_snapshot(
    projection: YearlyProjection,
    inputs: &UnderwritingInputs,
    acquisition: &AcquisitionMetrics,
) -> UnderwritingResult<Year1Snapshot> {
    let cash_on_cash_return =
        ratio_or_zero(projection.cash_flow, acquisition.total_equity_required);
    let dscr = debt::dscr(projection.noi, projection.debt_service);
    let yield_on_cost = ratio_or_zero(projection.noi, all_cash_basis(inputs, acquisition)?);
    let break_even_outlays = projection
        .operating_expenses
        .checked_add(projection.debt_service)
        .ok_or_else(|| UnderwritingError::overflow("year_one_snapshot", "Break-even outlays"))?;
    let cash_break_even_occupancy = ratio_or_zero(break_even_outlays, projection.gross_income);
    let monthly_debt_service = projection.debt_service / dec!(12);

    Ok(Year1Snapshot {
        projection,
        cash_on_cash_return,
        dscr,
        yield_on_cost,
        cash_break_even_occupancy,
        monthly_debt_service,
    })
}

fn compute_returns(
    projections: &[YearlyProjection],
    acquisition: &AcquisitionMetrics,
    exit: &ExitMetrics,
    inputs: &UnderwritingInputs,
) -> UnderwritingResult<ReturnMetrics> {
    let overflow = |quantity: &str| UnderwritingError::overflow("compute_returns", quantity);
    let equity = acquisition.total_equity_required;
    let hold = projections.len();

    let mut levered_cash_flows = Vec::with_capacity(hold + 1);
    let mut unlevered_cash_flows = Vec::with_capacity(hold + 1);
    levered_cash_flows.push(-equity);
    unlevered_cash_flows.push(-all_cash_basis(inputs, acquisition)?);

    for (i, year) in projections.iter().enumerate() {
        let is_exit_year = i + 1 == hold;
        if is_exit_year {
            let levered = year
                .cash_flow
                .checked_add(exit.sale_proceeds)
                .ok_or_else(|| overflow("Exit-year levered cash flow"))?;
            let unlevered = year
                .noi
                .checked_add(exit.net_sale_value)
                .ok_or_else(|| overflow("Exit-year unlevered cash flow"))?;
            levered_cash_flows.push(levered);
            unlevered_cash_flows.push(unlevered);
        } else {
            levered_cash_flows.push(year.cash_flow);
            unlevered_cash_flows.push(year.noi);
        }
    }

    let levered_irr = solve_irr(&levered_cash_flows).into_result("levered_irr", &levered_cash_flows)?;
    let unlevered_irr =
        solve_irr(&unlevered_cash_flows).into_result("unlevered_irr", &unlevered_cash_flows)?;

    let total_distributions = levered_cash_flows
        .iter()
        .skip(1)
        .try_fold(Decimal::ZERO, |sum, flow| sum.checked_add(*flow))
        .ok_or_else(|| overflow("Total distributions"))?;
    let total_profit = total_distributions
        .checked_sub(equity)
        .ok_or_else(|| overflow("Total profit"))?;
    let equity_multiple = ratio_or_zero(total_distributions, equity);
    let equity_years = equity
        .checked_mul(Decimal::from(hold as u64))
        .ok_or_else(|| overflow("Equity-years"))?;
    let average_annual_return = ratio_or_zero(total_profit, equity_years);

    Ok(ReturnMetrics {
        levered_irr,
        unlevered_irr,
        equity_multiple,
        average_annual_return,
        total_profit,
        total_distributions,
        levered_cash_flows,
        unlevered_cash_flows,
    })
}

fn push_result_warnings(
    acquisition: &AcquisitionMetrics,
    year1: &Year1Snapshot,
    exit: &ExitMetrics,
    warnings: &mut Vec<String>,
) {
    let debt_service = year1.projection.debt_service;
    if debt_service > Decimal::ZERO && year1.dscr < MIN_DSCR {
        warnings.push(format!(
            "Year-1 DSCR of {:.2}x is below the {MIN_DSCR}x lender minimum",
            year1.dscr
        ));
    }

    if acquisition.ltv > MAX_LTV {
        warnings.push(format!(
            "LTV of {:.1}% exceeds 80%, above typical agency and bank limits",
            acquisition.ltv * dec!(100)
        ));
    }

    if exit.exit_cap_rate < acquisition.going_in_cap_rate {
        warnings.push(format!(
            "Exit cap rate {:.2}% is below the going-in cap rate {:.2}%; returns assume cap rate compression",
            exit.exit_cap_rate * dec!(100),
            acquisition.going_in_cap_rate * dec!(100)
        ));
    }

    if year1.projection.cash_flow < Decimal::ZERO {
        warnings.push(format!(
            "Year-1 cash flow is negative ({:.0}); equity must fund the shortfall",
            year1.projection.cash_flow
        ));
    }

    if exit.exit_value < Decimal::ZERO {
        warnings.push("Exit-year NOI is negative, producing a negative exit value".into());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
