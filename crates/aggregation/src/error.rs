use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Invalid {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("Failed to read snapshots: {0}")]
    Source(#[from] DbError),
}

impl AggregationError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        AggregationError::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}
