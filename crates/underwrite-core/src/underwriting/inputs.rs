use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::UnderwritingError;
use crate::types::{Money, Rate};
use crate::UnderwritingResult;

use super::debt::MAX_TERM_YEARS;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Asset quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyClass {
    A,
    B,
    C,
    D,
}

/// Lender programme for the acquisition loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanType {
    /// Fannie Mae / Freddie Mac multifamily
    Agency,
    /// Balance-sheet bank loan
    Bank,
    /// Conduit / securitised loan
    Cmbs,
    /// Short-term transitional debt
    Bridge,
}

/// Prepayment penalty structure. Recorded for reporting; sale proceeds do not
/// deduct a penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepaymentPenalty {
    None,
    StepDown,
    YieldMaintenance,
    Defeasance,
}

/// Complete assumption set for one underwriting run.
///
/// Percentages are fractional (0.05 = 5%). Rent fields are monthly dollars per
/// unit; every other `*_per_unit` field is annual dollars per unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnderwritingInputs {
    // --- Property ---
    pub units: u32,
    pub square_footage: Decimal,
    pub year_built: u32,
    pub property_class: PropertyClass,

    // --- Acquisition ---
    pub purchase_price: Money,
    /// Closing costs as a fraction of purchase price
    pub closing_cost_percent: Rate,
    /// Sponsor acquisition fee as a fraction of purchase price
    pub acquisition_fee_percent: Rate,
    pub due_diligence_costs: Money,
    /// Capital expenditure funded at closing
    pub immediate_capex: Money,

    // --- Financing ---
    pub loan_type: LoanType,
    pub ltv_percent: Rate,
    /// Annual nominal interest rate
    pub interest_rate: Rate,
    /// Amortisation in years; 0 means an interest-only loan
    pub amortization_period: u32,
    /// Interest-only years at the start of the loan
    pub interest_only_period: u32,
    /// Origination fee as a fraction of loan amount
    pub origination_fee_percent: Rate,
    pub prepayment_penalty: PrepaymentPenalty,

    // --- Revenue ---
    /// In-place rent, monthly per unit
    pub current_rent_per_unit: Money,
    /// Market rent, monthly per unit
    pub market_rent_per_unit: Money,
    pub rent_growth: Rate,
    /// Parking, laundry, RUBS etc. Annual per unit
    pub other_income_per_unit: Money,
    pub vacancy_percent: Rate,
    pub concessions_percent: Rate,
    pub bad_debt_percent: Rate,

    // --- Operating expenses (annual per unit) ---
    pub real_estate_taxes_per_unit: Money,
    pub insurance_per_unit: Money,
    pub utilities_per_unit: Money,
    pub repairs_maintenance_per_unit: Money,
    pub payroll_per_unit: Money,
    pub general_admin_per_unit: Money,
    pub marketing_per_unit: Money,
    pub contract_services_per_unit: Money,
    pub capital_reserve_per_unit: Money,
    /// Management fee as a fraction of effective gross income
    pub management_percent: Rate,
    pub expense_growth: Rate,

    // --- Exit ---
    pub hold_period: u32,
    pub exit_cap_rate: Rate,
    /// Added to the exit cap rate (positive = cap rate expansion)
    pub cap_rate_spread: Rate,
    pub disposition_fee_percent: Rate,
}

/// The input drivers the sensitivity sweep perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    PurchasePrice,
    ExitCapRate,
    RentGrowth,
    VacancyPercent,
    InterestRate,
    LtvPercent,
    ExpenseGrowth,
}

impl Driver {
    /// Tracked drivers in reporting order.
    pub const TRACKED: [Driver; 7] = [
        Driver::PurchasePrice,
        Driver::ExitCapRate,
        Driver::RentGrowth,
        Driver::VacancyPercent,
        Driver::InterestRate,
        Driver::LtvPercent,
        Driver::ExpenseGrowth,
    ];

    /// Input field key.
    pub fn name(&self) -> &'static str {
        match self {
            Driver::PurchasePrice => "purchase_price",
            Driver::ExitCapRate => "exit_cap_rate",
            Driver::RentGrowth => "rent_growth",
            Driver::VacancyPercent => "vacancy_percent",
            Driver::InterestRate => "interest_rate",
            Driver::LtvPercent => "ltv_percent",
            Driver::ExpenseGrowth => "expense_growth",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Driver::PurchasePrice => "Purchase Price",
            Driver::ExitCapRate => "Exit Cap Rate",
            Driver::RentGrowth => "Rent Growth",
            Driver::VacancyPercent => "Vacancy",
            Driver::InterestRate => "Interest Rate",
            Driver::LtvPercent => "LTV",
            Driver::ExpenseGrowth => "Expense Growth",
        }
    }

    pub fn value(&self, inputs: &UnderwritingInputs) -> Decimal {
        match self {
            Driver::PurchasePrice => inputs.purchase_price,
            Driver::ExitCapRate => inputs.exit_cap_rate,
            Driver::RentGrowth => inputs.rent_growth,
            Driver::VacancyPercent => inputs.vacancy_percent,
            Driver::InterestRate => inputs.interest_rate,
            Driver::LtvPercent => inputs.ltv_percent,
            Driver::ExpenseGrowth => inputs.expense_growth,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults and overrides
// ---------------------------------------------------------------------------

/// A fresh default assumption set: a 100-unit, $15M Class B acquisition with
/// 75% agency leverage and a five-year hold.
pub fn default_inputs() -> UnderwritingInputs {
    UnderwritingInputs {
        units: 100,
        square_footage: dec!(85000),
        year_built: 1998,
        property_class: PropertyClass::B,

        purchase_price: dec!(15000000),
        closing_cost_percent: dec!(0.02),
        acquisition_fee_percent: dec!(0.01),
        due_diligence_costs: dec!(50000),
        immediate_capex: dec!(500000),

        loan_type: LoanType::Agency,
        ltv_percent: dec!(0.75),
        interest_rate: dec!(0.065),
        amortization_period: 30,
        interest_only_period: 2,
        origination_fee_percent: dec!(0.01),
        prepayment_penalty: PrepaymentPenalty::StepDown,

        current_rent_per_unit: dec!(1450),
        market_rent_per_unit: dec!(1550),
        rent_growth: dec!(0.03),
        other_income_per_unit: dec!(1200),
        vacancy_percent: dec!(0.05),
        concessions_percent: dec!(0.01),
        bad_debt_percent: dec!(0.01),

        real_estate_taxes_per_unit: dec!(1800),
        insurance_per_unit: dec!(450),
        utilities_per_unit: dec!(900),
        repairs_maintenance_per_unit: dec!(750),
        payroll_per_unit: dec!(1100),
        general_admin_per_unit: dec!(300),
        marketing_per_unit: dec!(150),
        contract_services_per_unit: dec!(350),
        capital_reserve_per_unit: dec!(300),
        management_percent: dec!(0.03),
        expense_growth: dec!(0.03),

        hold_period: 5,
        exit_cap_rate: dec!(0.055),
        cap_rate_spread: dec!(0),
        disposition_fee_percent: dec!(0.02),
    }
}

impl Default for UnderwritingInputs {
    fn default() -> Self {
        default_inputs()
    }
}

impl UnderwritingInputs {
    /// Copy of these inputs with one sensitivity driver replaced.
    pub fn with_driver(&self, driver: Driver, value: Decimal) -> Self {
        let mut next = self.clone();
        match driver {
            Driver::PurchasePrice => next.purchase_price = value,
            Driver::ExitCapRate => next.exit_cap_rate = value,
            Driver::RentGrowth => next.rent_growth = value,
            Driver::VacancyPercent => next.vacancy_percent = value,
            Driver::InterestRate => next.interest_rate = value,
            Driver::LtvPercent => next.ltv_percent = value,
            Driver::ExpenseGrowth => next.expense_growth = value,
        }
        next
    }

    /// Copy of these inputs with a single field replaced by key.
    ///
    /// The replacement goes through the serde representation, so it accepts
    /// the same JSON a full input file would. Unknown keys and values that do
    /// not deserialise into the field's type are rejected.
    pub fn with_field(&self, key: &str, value: serde_json::Value) -> UnderwritingResult<Self> {
        let mut json = serde_json::to_value(self)?;
        let slot = json
            .as_object_mut()
            .and_then(|map| map.get_mut(key))
            .ok_or_else(|| UnderwritingError::InvalidInput {
                field: key.into(),
                reason: "Unknown underwriting input".into(),
            })?;
        *slot = value;

        serde_json::from_value(json).map_err(|e| UnderwritingError::InvalidInput {
            field: key.into(),
            reason: e.to_string(),
        })
    }

    /// Total operating-expense line items per unit (excludes management and
    /// capital reserve).
    pub fn expense_items_per_unit(&self) -> Money {
        [
            self.real_estate_taxes_per_unit,
            self.insurance_per_unit,
            self.utilities_per_unit,
            self.repairs_maintenance_per_unit,
            self.payroll_per_unit,
            self.general_admin_per_unit,
            self.marketing_per_unit,
            self.contract_services_per_unit,
        ]
        .into_iter()
        .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Exit cap rate after the spread.
    pub fn effective_exit_cap_rate(&self) -> Rate {
        self.exit_cap_rate.saturating_add(self.cap_rate_spread)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_inputs(
    input: &UnderwritingInputs,
    warnings: &mut Vec<String>,
) -> UnderwritingResult<()> {
    if input.hold_period < 1 {
        return Err(UnderwritingError::InvalidInput {
            field: "hold_period".into(),
            reason: "Hold period must be at least 1 year".into(),
        });
    }

    for (field, years) in [
        ("hold_period", input.hold_period),
        ("amortization_period", input.amortization_period),
        ("interest_only_period", input.interest_only_period),
    ] {
        if years > MAX_TERM_YEARS {
            return Err(UnderwritingError::InvalidInput {
                field: field.into(),
                reason: format!("Cannot exceed {MAX_TERM_YEARS} years"),
            });
        }
    }

    if input.purchase_price <= Decimal::ZERO {
        return Err(UnderwritingError::InvalidInput {
            field: "purchase_price".into(),
            reason: "Purchase price must be positive".into(),
        });
    }

    if input.ltv_percent < Decimal::ZERO || input.ltv_percent >= Decimal::ONE {
        return Err(UnderwritingError::InvalidInput {
            field: "ltv_percent".into(),
            reason: "LTV must be between 0 and 1 (exclusive upper)".into(),
        });
    }

    if input.interest_rate < Decimal::ZERO || input.interest_rate >= Decimal::ONE {
        return Err(UnderwritingError::InvalidInput {
            field: "interest_rate".into(),
            reason: "Interest rate must be between 0 and 1 (exclusive upper)".into(),
        });
    }

    let fractions = [
        ("closing_cost_percent", input.closing_cost_percent),
        ("acquisition_fee_percent", input.acquisition_fee_percent),
        ("origination_fee_percent", input.origination_fee_percent),
        ("vacancy_percent", input.vacancy_percent),
        ("concessions_percent", input.concessions_percent),
        ("bad_debt_percent", input.bad_debt_percent),
        ("management_percent", input.management_percent),
        ("disposition_fee_percent", input.disposition_fee_percent),
    ];
    for (field, value) in fractions {
        if value < Decimal::ZERO || value >= Decimal::ONE {
            return Err(UnderwritingError::InvalidInput {
                field: field.into(),
                reason: "Must be between 0 and 1 (exclusive upper)".into(),
            });
        }
    }

    let income_losses = input.vacancy_percent + input.concessions_percent + input.bad_debt_percent;
    if income_losses >= Decimal::ONE {
        return Err(UnderwritingError::FinancialImpossibility(format!(
            "Vacancy, concessions and bad debt total {income_losses}, leaving no collected income"
        )));
    }

    let amounts = [
        ("square_footage", input.square_footage),
        ("due_diligence_costs", input.due_diligence_costs),
        ("immediate_capex", input.immediate_capex),
        ("current_rent_per_unit", input.current_rent_per_unit),
        ("market_rent_per_unit", input.market_rent_per_unit),
        ("other_income_per_unit", input.other_income_per_unit),
        ("real_estate_taxes_per_unit", input.real_estate_taxes_per_unit),
        ("insurance_per_unit", input.insurance_per_unit),
        ("utilities_per_unit", input.utilities_per_unit),
        ("repairs_maintenance_per_unit", input.repairs_maintenance_per_unit),
        ("payroll_per_unit", input.payroll_per_unit),
        ("general_admin_per_unit", input.general_admin_per_unit),
        ("marketing_per_unit", input.marketing_per_unit),
        ("contract_services_per_unit", input.contract_services_per_unit),
        ("capital_reserve_per_unit", input.capital_reserve_per_unit),
    ];
    for (field, value) in amounts {
        if value < Decimal::ZERO {
            return Err(UnderwritingError::InvalidInput {
                field: field.into(),
                reason: "Cannot be negative".into(),
            });
        }
    }

    for (field, value) in [
        ("rent_growth", input.rent_growth),
        ("expense_growth", input.expense_growth),
    ] {
        if value <= dec!(-1) {
            return Err(UnderwritingError::InvalidInput {
                field: field.into(),
                reason: "Growth rate must be greater than -100%".into(),
            });
        }
    }

    if input.effective_exit_cap_rate() <= Decimal::ZERO {
        return Err(UnderwritingError::InvalidInput {
            field: "exit_cap_rate".into(),
            reason: "Exit cap rate plus spread must be positive".into(),
        });
    }

    // --- Warnings for unusual assumptions ---
    if input.vacancy_percent > dec!(0.15) {
        warnings.push(format!(
            "Vacancy of {:.1}% exceeds 15%, above typical market norms",
            input.vacancy_percent * dec!(100)
        ));
    }

    if input.amortization_period > 0 && input.interest_only_period >= input.hold_period {
        warnings.push(format!(
            "Interest-only period of {} years covers the entire {}-year hold; no principal is repaid",
            input.interest_only_period, input.hold_period
        ));
    }

    match input.prepayment_penalty {
        PrepaymentPenalty::YieldMaintenance | PrepaymentPenalty::Defeasance => {
            warnings.push(format!(
                "{:?} prepayment cost is not deducted from sale proceeds",
                input.prepayment_penalty
            ));
        }
        PrepaymentPenalty::None | PrepaymentPenalty::StepDown => {}
    }

    Ok(())
}
