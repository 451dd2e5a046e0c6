use crate::enums::CalculationStatus;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: CalculationStatus,
        to: CalculationStatus,
    },

    #[error("Calculation is held by another attempt (lease {0})")]
    LeaseMismatch(String),
}
