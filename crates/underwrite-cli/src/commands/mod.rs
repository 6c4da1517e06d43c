pub mod loan;
pub mod underwriting;
