use core_types::CoreError;
use database::DbError;
use thiserror::Error;

/// Infrastructure failures of an execution attempt.
///
/// Business failures (no data, calculator errors) are not errors here: they
/// end the calculation in `Failed` and are reported as an `ExecutionOutcome`.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Storage error: {0}")]
    Store(#[from] DbError),

    #[error("Invalid calculation state: {0}")]
    State(#[from] CoreError),
}

impl ExecutorError {
    /// True when a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ExecutorError::Store(e) => e.is_transient(),
            ExecutorError::State(_) => false,
        }
    }
}
