use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The estimator used for a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationMethod {
    /// Arc elasticity between the first and last observation.
    Midpoint,
    /// OLS on log-transformed prices and quantities.
    Regression,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::Midpoint => "MIDPOINT",
            CalculationMethod::Regression => "REGRESSION",
        }
    }
}

impl FromStr for CalculationMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MIDPOINT" => Ok(CalculationMethod::Midpoint),
            "REGRESSION" => Ok(CalculationMethod::Regression),
            other => Err(CoreError::InvalidInput(
                "method".to_string(),
                format!("'{}' is not one of midpoint, regression", other.to_ascii_lowercase()),
            )),
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle state of a calculation record.
///
/// `Pending -> Processing -> Completed | Failed`. Nothing skips `Processing`
/// and nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CalculationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationStatus::Pending => "PENDING",
            CalculationStatus::Processing => "PROCESSING",
            CalculationStatus::Completed => "COMPLETED",
            CalculationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CalculationStatus::Completed | CalculationStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: CalculationStatus) -> bool {
        matches!(
            (self, next),
            (CalculationStatus::Pending, CalculationStatus::Processing)
                | (CalculationStatus::Processing, CalculationStatus::Completed)
                | (CalculationStatus::Processing, CalculationStatus::Failed)
        )
    }
}

impl FromStr for CalculationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(CalculationStatus::Pending),
            "PROCESSING" => Ok(CalculationStatus::Processing),
            "COMPLETED" => Ok(CalculationStatus::Completed),
            "FAILED" => Ok(CalculationStatus::Failed),
            other => Err(CoreError::InvalidInput("status".to_string(), other.to_string())),
        }
    }
}

impl fmt::Display for CalculationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical label for the magnitude of an elasticity coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Elastic,
    Inelastic,
    Unitary,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Elastic => "ELASTIC",
            Classification::Inelastic => "INELASTIC",
            Classification::Unitary => "UNITARY",
        }
    }
}

impl FromStr for Classification {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ELASTIC" => Ok(Classification::Elastic),
            "INELASTIC" => Ok(Classification::Inelastic),
            "UNITARY" => Ok(Classification::Unitary),
            other => Err(CoreError::InvalidInput("classification".to_string(), other.to_string())),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregation window a client asked for. Only used for request validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowSize {
    Hourly,
    Daily,
    Weekly,
}

impl WindowSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowSize::Hourly => "HOURLY",
            WindowSize::Daily => "DAILY",
            WindowSize::Weekly => "WEEKLY",
        }
    }
}

impl FromStr for WindowSize {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HOURLY" => Ok(WindowSize::Hourly),
            "DAILY" => Ok(WindowSize::Daily),
            "WEEKLY" => Ok(WindowSize::Weekly),
            other => Err(CoreError::InvalidInput(
                "window_size".to_string(),
                format!("'{}' is not one of hourly, daily, weekly", other.to_ascii_lowercase()),
            )),
        }
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
