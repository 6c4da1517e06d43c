use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use underwrite_core::underwriting::debt::{self, LoanAnalysisInput};

use crate::input;

/// Arguments for a standalone loan amortisation table
#[derive(Args)]
pub struct LoanArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Principal at closing
    #[arg(long)]
    pub loan_amount: Option<Decimal>,

    /// Annual interest rate as a decimal (0.065 = 6.5%)
    #[arg(long)]
    pub interest_rate: Option<Decimal>,

    /// Amortisation period in years (0 = interest-only for the full term)
    #[arg(long, default_value_t = 30)]
    pub amortization_years: u32,

    /// Initial interest-only years
    #[arg(long, default_value_t = 0)]
    pub interest_only_years: u32,

    /// Years to tabulate
    #[arg(long, default_value_t = 10)]
    pub years: u32,
}

pub fn run_loan(args: LoanArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let loan_input: LoanAnalysisInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        let loan_amount = args
            .loan_amount
            .ok_or("--loan-amount is required (or provide --input)")?;
        let interest_rate = args
            .interest_rate
            .ok_or("--interest-rate is required (or provide --input)")?;

        LoanAnalysisInput {
            loan_amount,
            interest_rate,
            amortization_years: args.amortization_years,
            interest_only_years: args.interest_only_years,
            years: args.years,
        }
    };

    let result = debt::analyze_loan(&loan_input)?;
    Ok(serde_json::to_value(result)?)
}
