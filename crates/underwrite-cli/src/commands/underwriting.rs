use clap::Args;
use serde_json::Value;
use tracing::debug;

use underwrite_core::underwriting::{
    analyze_sensitivity, default_inputs, rank_by_impact, underwrite, Underwriter,
    UnderwritingInputs,
};

use crate::input;

/// Where the assumption set comes from, plus per-field overrides.
#[derive(Args)]
pub struct InputArgs {
    /// Path to a JSON or YAML inputs file
    #[arg(long)]
    pub input: Option<String>,

    /// Start from the built-in default assumptions
    #[arg(long, conflicts_with = "input")]
    pub defaults: bool,

    /// Override one input field, e.g. --set exit_cap_rate=0.06 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Arguments for a full underwriting run
#[derive(Args)]
pub struct UnderwriteArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
}

/// Arguments for the tornado sensitivity sweep
#[derive(Args)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Sort variables by impact, largest first
    #[arg(long)]
    pub ranked: bool,
}

pub fn run_underwrite(args: UnderwriteArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let uw = load_underwriter(&args.inputs)?;
    let result = underwrite(uw.inputs())?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let uw = load_underwriter(&args.inputs)?;
    let mut result = analyze_sensitivity(uw.inputs())?;
    if args.ranked {
        rank_by_impact(&mut result.result.variables);
    }
    Ok(serde_json::to_value(result)?)
}

pub fn run_defaults() -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::to_value(default_inputs())?)
}

fn load_underwriter(args: &InputArgs) -> Result<Underwriter, Box<dyn std::error::Error>> {
    let inputs: UnderwritingInputs = if args.defaults {
        default_inputs()
    } else if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json|file.yaml>, --defaults or stdin required".into());
    };

    let mut uw = Underwriter::new(inputs);
    for raw in &args.overrides {
        let (key, value) = parse_override(raw)?;
        debug!(key, %value, "applying override");
        uw.update_input(key, value)?;
    }
    Ok(uw)
}

/// Split `key=value`. The value is read as JSON when it parses (numbers,
/// booleans, quoted strings) and as a bare string otherwise (enum names).
fn parse_override(raw: &str) -> Result<(&str, Value), Box<dyn std::error::Error>> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Override must be KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Override '{raw}' has an empty key").into());
    }
    let value = value.trim();
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn defaults_with(overrides: &[&str]) -> InputArgs {
        InputArgs {
            input: None,
            defaults: true,
            overrides: overrides.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_override_values() {
        assert_eq!(parse_override("units=120").unwrap(), ("units", json!(120)));
        assert_eq!(
            parse_override("loan_type=Bank").unwrap(),
            ("loan_type", json!("Bank"))
        );
        assert_eq!(
            parse_override(" exit_cap_rate = \"0.06\" ").unwrap(),
            ("exit_cap_rate", json!("0.06"))
        );
        assert!(parse_override("no-equals-sign").is_err());
        assert!(parse_override("=5").is_err());
    }

    #[test]
    fn test_overrides_apply_through_facade() {
        let uw = load_underwriter(&defaults_with(&["units=120", "loan_type=Bank"])).unwrap();
        assert_eq!(uw.inputs().units, 120);
        assert_eq!(
            uw.inputs().loan_type,
            underwrite_core::underwriting::inputs::LoanType::Bank
        );
    }

    #[test]
    fn test_unknown_override_rejected() {
        assert!(load_underwriter(&defaults_with(&["bogus=1"])).is_err());
    }

    #[test]
    fn test_underwrite_defaults() {
        let value = run_underwrite(UnderwriteArgs {
            inputs: defaults_with(&[]),
        })
        .unwrap();
        let loan: Decimal = value["result"]["acquisition"]["loan_amount"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(loan, Decimal::from(11_250_000));
    }

    #[test]
    fn test_ranked_sensitivity() {
        let value = run_sensitivity(SensitivityArgs {
            inputs: defaults_with(&[]),
            ranked: true,
        })
        .unwrap();
        let variables = value["result"]["variables"].as_array().unwrap();
        assert_eq!(variables.len(), 7);
    }
}
