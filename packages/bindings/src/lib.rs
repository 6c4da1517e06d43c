use napi::Result as NapiResult;
use napi_derive::napi;

use underwrite_core::underwriting::{self, debt, UnderwritingInputs};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse_inputs(input_json: &str) -> NapiResult<UnderwritingInputs> {
    serde_json::from_str(input_json).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Underwriting
// ---------------------------------------------------------------------------

#[napi]
pub fn underwrite(input_json: String) -> NapiResult<String> {
    let input = parse_inputs(&input_json)?;
    let output = underwriting::underwrite(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn sensitivity_analysis(input_json: String) -> NapiResult<String> {
    let input = parse_inputs(&input_json)?;
    let output = underwriting::analyze_sensitivity(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Results and ranked sensitivity in one call. A calculation fault comes back
/// as `"results": null` with an empty sensitivity list, not as an exception.
#[napi]
pub fn evaluate(input_json: String) -> NapiResult<String> {
    let input = parse_inputs(&input_json)?;
    let snapshot = underwriting::Underwriter::new(input).snapshot();
    serde_json::to_string(&snapshot).map_err(to_napi_error)
}

#[napi]
pub fn default_inputs() -> NapiResult<String> {
    serde_json::to_string(&underwriting::default_inputs()).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Debt
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_loan(input_json: String) -> NapiResult<String> {
    let input: debt::LoanAnalysisInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = debt::analyze_loan(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
