use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnderwritingError {
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Financial impossibility: {0}")]
    FinancialImpossibility(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Indeterminate result: {function} - {reason}")]
    Indeterminate { function: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl UnderwritingError {
    /// A decimal operation in `function` left the representable range.
    pub fn overflow(function: &str, quantity: &str) -> Self {
        UnderwritingError::Indeterminate {
            function: function.into(),
            reason: format!("{quantity} exceeds the decimal range"),
        }
    }
}

impl From<serde_json::Error> for UnderwritingError {
    fn from(e: serde_json::Error) -> Self {
        UnderwritingError::SerializationError(e.to_string())
    }
}
