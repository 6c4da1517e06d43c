mod commands;
mod input;
mod output;
mod telemetry;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::loan::LoanArgs;
use commands::underwriting::{SensitivityArgs, UnderwriteArgs};

/// Multifamily acquisition underwriting
#[derive(Parser)]
#[command(
    name = "uw",
    version,
    about = "Multifamily acquisition underwriting",
    long_about = "Underwrite multifamily acquisitions with decimal precision: \
                  sources and uses, a year-by-year pro forma, debt service, \
                  direct-cap exit, levered and unlevered IRR, and a tornado \
                  sensitivity of levered IRR to the key assumptions."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "underwrite_core=debug")
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Underwrite an acquisition (returns, pro forma, exit)
    Underwrite(UnderwriteArgs),
    /// Tornado sensitivity of levered IRR to the tracked drivers
    Sensitivity(SensitivityArgs),
    /// Print the default assumption set (a starting inputs file)
    Defaults,
    /// Amortisation table for a fixed-rate loan
    Loan(LoanArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init(&cli.log_level) {
        eprintln!("{}: {}", "error".red().bold(), e);
        process::exit(2);
    }

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Underwrite(args) => commands::underwriting::run_underwrite(args),
        Commands::Sensitivity(args) => commands::underwriting::run_sensitivity(args),
        Commands::Defaults => commands::underwriting::run_defaults(),
        Commands::Loan(args) => commands::loan::run_loan(args),
        Commands::Version => {
            println!("uw {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
