use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::UnderwritingError;
use crate::types::{ratio_or_zero, with_metadata, ComputationOutput, Money, Rate};
use crate::UnderwritingResult;

use super::inputs::UnderwritingInputs;

/// Longest loan term, hold period or table length accepted, in years.
pub const MAX_TERM_YEARS: u32 = 100;

// ---------------------------------------------------------------------------
// Payment and balance math
// ---------------------------------------------------------------------------

/// Monthly payment on a fixed-rate loan.
///
/// Standard annuity `P * r(1+r)^n / ((1+r)^n - 1)` with `r = annual_rate / 12`
/// and `n = amortization_years * 12`. Zero amortisation years means an
/// interest-only loan; a zero rate amortises straight-line.
pub fn monthly_payment(loan_amount: Money, annual_rate: Rate, amortization_years: u32) -> Money {
    if amortization_years == 0 {
        return interest_only_payment(loan_amount, annual_rate);
    }
    amortizing_payment(loan_amount, annual_rate, amortization_years.saturating_mul(12))
}

/// Monthly interest on an unamortised balance.
pub fn interest_only_payment(loan_amount: Money, annual_rate: Rate) -> Money {
    loan_amount * annual_rate / dec!(12)
}

/// Level monthly payment that retires `loan_amount` over `total_months`.
pub fn amortizing_payment(loan_amount: Money, annual_rate: Rate, total_months: u32) -> Money {
    if total_months == 0 {
        return interest_only_payment(loan_amount, annual_rate);
    }

    let monthly_rate = annual_rate / dec!(12);
    if monthly_rate.is_zero() {
        return loan_amount / Decimal::from(total_months);
    }

    let Some(compound) = (Decimal::ONE + monthly_rate).checked_powu(total_months as u64) else {
        // Payment tends to pure interest as (1+r)^n grows without bound
        return interest_only_payment(loan_amount, annual_rate);
    };
    let denominator = compound - Decimal::ONE;
    if denominator.is_zero() {
        return loan_amount / Decimal::from(total_months);
    }

    loan_amount
        .checked_mul(monthly_rate)
        .and_then(|interest| interest.checked_mul(compound))
        .and_then(|grown| grown.checked_div(denominator))
        .unwrap_or_else(|| interest_only_payment(loan_amount, annual_rate))
}

/// Outstanding principal after `months_elapsed` payments.
///
/// The balance stays at par through the interest-only window, then follows
/// the amortising balance on the remaining `amortization_years * 12 -
/// interest_only_months` schedule. Never negative.
pub fn loan_balance(
    loan_amount: Money,
    annual_rate: Rate,
    amortization_years: u32,
    months_elapsed: u32,
    interest_only_months: u32,
) -> Money {
    if amortization_years == 0 || months_elapsed <= interest_only_months {
        return loan_amount;
    }

    let schedule_months = amortization_years
        .saturating_mul(12)
        .saturating_sub(interest_only_months);
    if schedule_months == 0 {
        return loan_amount;
    }

    let paid_months = months_elapsed - interest_only_months;
    if paid_months >= schedule_months {
        return Decimal::ZERO;
    }

    let monthly_rate = annual_rate / dec!(12);
    if monthly_rate.is_zero() {
        let repaid = loan_amount * Decimal::from(paid_months) / Decimal::from(schedule_months);
        return (loan_amount - repaid).max(Decimal::ZERO);
    }

    let Some(compound) = (Decimal::ONE + monthly_rate).checked_powu(paid_months as u64) else {
        return loan_amount;
    };
    let payment = amortizing_payment(loan_amount, annual_rate, schedule_months);
    let grown = loan_amount.checked_mul(compound);
    let repaid = payment
        .checked_mul(compound - Decimal::ONE)
        .and_then(|paid| paid.checked_div(monthly_rate));
    match (grown, repaid) {
        (Some(grown), Some(repaid)) => (grown - repaid).max(Decimal::ZERO),
        _ => loan_amount,
    }
}

/// Debt service coverage ratio. Zero when there is no debt service.
pub fn dscr(noi: Money, annual_debt_service: Money) -> Decimal {
    ratio_or_zero(noi, annual_debt_service)
}

/// Loan-to-value. Zero when the property value is zero.
pub fn ltv(loan_amount: Money, property_value: Money) -> Decimal {
    ratio_or_zero(loan_amount, property_value)
}

// ---------------------------------------------------------------------------
// Loan terms
// ---------------------------------------------------------------------------

/// Acquisition loan terms in the shape the pro forma consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub loan_amount: Money,
    pub annual_rate: Rate,
    pub amortization_years: u32,
    pub interest_only_years: u32,
}

impl LoanTerms {
    pub fn from_inputs(inputs: &UnderwritingInputs, loan_amount: Money) -> Self {
        Self {
            loan_amount,
            annual_rate: inputs.interest_rate,
            amortization_years: inputs.amortization_period,
            interest_only_years: inputs.interest_only_period,
        }
    }

    fn interest_only_months(&self) -> u32 {
        self.interest_only_years.saturating_mul(12)
    }

    /// Months the loan amortises over once interest-only ends (0 for a
    /// loan that never amortises).
    fn amortizing_months(&self) -> u32 {
        if self.amortization_years == 0 {
            return 0;
        }
        self.amortization_years
            .saturating_mul(12)
            .saturating_sub(self.interest_only_months())
    }

    pub fn interest_only_payment(&self) -> Money {
        interest_only_payment(self.loan_amount, self.annual_rate)
    }

    /// Level payment from the first amortising month onward.
    pub fn amortizing_payment(&self) -> Money {
        amortizing_payment(self.loan_amount, self.annual_rate, self.amortizing_months())
    }

    /// Monthly payment in force during `year` (1-based).
    pub fn monthly_payment_in_year(&self, year: u32) -> Money {
        if year <= self.interest_only_years || self.amortizing_months() == 0 {
            self.interest_only_payment()
        } else {
            self.amortizing_payment()
        }
    }

    pub fn annual_debt_service(&self, year: u32) -> Money {
        if self.balance_after_year(year.saturating_sub(1)).is_zero() {
            return Decimal::ZERO;
        }
        self.monthly_payment_in_year(year).saturating_mul(dec!(12))
    }

    /// Principal outstanding at the end of `year` (year 0 = closing).
    pub fn balance_after_year(&self, year: u32) -> Money {
        loan_balance(
            self.loan_amount,
            self.annual_rate,
            self.amortization_years,
            year.saturating_mul(12),
            self.interest_only_months(),
        )
    }

    /// Year-by-year amortisation table.
    pub fn schedule(&self, years: u32) -> Vec<DebtPeriod> {
        (1..=years)
            .map(|year| {
                let opening_balance = self.balance_after_year(year - 1);
                let closing_balance = self.balance_after_year(year);
                let debt_service = self.annual_debt_service(year);
                let principal = opening_balance - closing_balance;
                DebtPeriod {
                    year,
                    opening_balance,
                    interest: debt_service - principal,
                    principal,
                    debt_service,
                    closing_balance,
                }
            })
            .collect()
    }
}

/// Annual debt service in `year` for the acquisition loan described by
/// `inputs`.
pub fn annual_debt_service(inputs: &UnderwritingInputs, loan_amount: Money, year: u32) -> Money {
    LoanTerms::from_inputs(inputs, loan_amount).annual_debt_service(year)
}

/// Amortisation table for the acquisition loan over `years`.
pub fn amortization_schedule(
    inputs: &UnderwritingInputs,
    loan_amount: Money,
    years: u32,
) -> Vec<DebtPeriod> {
    LoanTerms::from_inputs(inputs, loan_amount).schedule(years)
}

// ---------------------------------------------------------------------------
// Standalone loan analysis
// ---------------------------------------------------------------------------

/// A single year in the amortisation table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub year: u32,
    pub opening_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub debt_service: Money,
    pub closing_balance: Money,
}

/// Input for a standalone loan analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAnalysisInput {
    pub loan_amount: Money,
    pub interest_rate: Rate,
    pub amortization_years: u32,
    pub interest_only_years: u32,
    /// Number of years to tabulate
    pub years: u32,
}

/// Payment summary and amortisation table for one loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAnalysisOutput {
    pub interest_only_monthly_payment: Money,
    pub amortizing_monthly_payment: Money,
    pub periods: Vec<DebtPeriod>,
    pub total_interest_paid: Money,
    pub total_principal_paid: Money,
    pub ending_balance: Money,
}

/// Tabulate payments and balances for a fixed-rate loan.
pub fn analyze_loan(
    input: &LoanAnalysisInput,
) -> UnderwritingResult<ComputationOutput<LoanAnalysisOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.loan_amount < Decimal::ZERO {
        return Err(UnderwritingError::InvalidInput {
            field: "loan_amount".into(),
            reason: "Loan amount cannot be negative".into(),
        });
    }
    if input.interest_rate < Decimal::ZERO || input.interest_rate >= Decimal::ONE {
        return Err(UnderwritingError::InvalidInput {
            field: "interest_rate".into(),
            reason: "Interest rate must be between 0 and 1 (exclusive upper)".into(),
        });
    }
    if input.years == 0 {
        return Err(UnderwritingError::InvalidInput {
            field: "years".into(),
            reason: "At least one year must be tabulated".into(),
        });
    }
    for (field, value) in [
        ("years", input.years),
        ("amortization_years", input.amortization_years),
        ("interest_only_years", input.interest_only_years),
    ] {
        if value > MAX_TERM_YEARS {
            return Err(UnderwritingError::InvalidInput {
                field: field.into(),
                reason: format!("Cannot exceed {MAX_TERM_YEARS} years"),
            });
        }
    }

    let terms = LoanTerms {
        loan_amount: input.loan_amount,
        annual_rate: input.interest_rate,
        amortization_years: input.amortization_years,
        interest_only_years: input.interest_only_years,
    };

    if input.amortization_years == 0 {
        warnings.push("Zero amortisation: loan is interest-only for its full life".into());
    } else if input.interest_only_years >= input.amortization_years {
        warnings.push(format!(
            "Interest-only period of {} years is not shorter than the {}-year amortisation; the loan never amortises",
            input.interest_only_years, input.amortization_years
        ));
    }

    let periods = terms.schedule(input.years);
    let total_interest_paid = periods
        .iter()
        .try_fold(Decimal::ZERO, |sum, p| sum.checked_add(p.interest))
        .ok_or_else(|| UnderwritingError::overflow("analyze_loan", "Total interest"))?;
    let total_principal_paid = periods
        .iter()
        .try_fold(Decimal::ZERO, |sum, p| sum.checked_add(p.principal))
        .ok_or_else(|| UnderwritingError::overflow("analyze_loan", "Total principal"))?;
    let ending_balance = terms.balance_after_year(input.years);

    let output = LoanAnalysisOutput {
        interest_only_monthly_payment: terms.interest_only_payment(),
        amortizing_monthly_payment: terms.amortizing_payment(),
        periods,
        total_interest_paid,
        total_principal_paid,
        ending_balance,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fixed-Rate Loan Amortisation",
        input,
        warnings,
        elapsed,
        output,
    ))
}
