use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Zero price change or a zero quantity midpoint.
    #[error("Elasticity undefined: {0}")]
    UndefinedElasticity(String),

    #[error(
        "Insufficient price variation: {actual:.2}% (minimum required: {minimum}%). \
         Price range {from:.4} to {to:.4} is too narrow for meaningful elasticity calculation."
    )]
    InsufficientVariation {
        actual: Decimal,
        minimum: Decimal,
        from: Decimal,
        to: Decimal,
    },

    #[error("Elasticity coefficient |{value:.2}| exceeds the accepted ceiling of |{ceiling}|")]
    UnreasonableElasticity { value: Decimal, ceiling: Decimal },

    #[error("Need at least {required} data points for regression, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("All {0} must be positive for log transformation")]
    NonPositiveValue(&'static str),

    #[error("Insufficient price variation for regression: standard deviation {std_dev:.6} is below {minimum}")]
    InsufficientVariance { std_dev: Decimal, minimum: Decimal },

    #[error("Error in calculation: {0}")]
    Calculation(String),
}
