pub mod debt;
pub mod exit;
pub mod inputs;
pub mod pro_forma;
pub mod returns;

#[cfg(feature = "sensitivity")]
pub mod facade;
#[cfg(feature = "sensitivity")]
pub mod sensitivity;

pub use inputs::{default_inputs, Driver, UnderwritingInputs};
pub use returns::{underwrite, UnderwritingResults};

#[cfg(feature = "sensitivity")]
pub use facade::{Underwriter, UnderwritingSnapshot};
#[cfg(feature = "sensitivity")]
pub use sensitivity::{analyze_sensitivity, rank_by_impact, SensitivityVariable};
