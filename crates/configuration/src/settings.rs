use crate::error::ConfigError;
use core_types::RequestLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section has defaults matching the reference deployment, so an empty
/// `config.toml` (or none at all) yields a working configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub classification: ClassificationBands,
    pub midpoint: MidpointParams,
    pub regression: RegressionParams,
    pub requests: RequestLimits,
    pub worker: WorkerSettings,
    pub logging: LoggingSettings,
}

/// Input data filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Minimum `data_quality_score` for an observation to reach a calculator.
    /// 0.95 keeps external exchange data and excludes the 0.80 P2P scrapes.
    pub quality_threshold: f64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { quality_threshold: 0.95 }
    }
}

/// Dead-zone around 1.0 used to label an elasticity coefficient.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassificationBands {
    /// `|E|` strictly above this is elastic.
    pub elastic_above: Decimal,
    /// `|E|` strictly below this is inelastic. Anything in between is unitary.
    pub inelastic_below: Decimal,
}

impl Default for ClassificationBands {
    fn default() -> Self {
        Self {
            elastic_above: dec!(1.05),
            inelastic_below: dec!(0.95),
        }
    }
}

/// Parameters for the arc (midpoint) estimator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MidpointParams {
    pub min_data_points: usize,
    /// Minimum absolute price change, in percent of the price midpoint.
    pub min_price_variation_pct: Decimal,
    /// `|E|` above this completes but is flagged as unreliable.
    pub max_reasonable_elasticity: Decimal,
    /// When set, `|E|` above this is rejected outright instead of flagged.
    pub reject_elasticity_above: Option<Decimal>,
}

impl Default for MidpointParams {
    fn default() -> Self {
        Self {
            min_data_points: 2,
            min_price_variation_pct: dec!(0.5),
            max_reasonable_elasticity: dec!(10),
            reject_elasticity_above: None,
        }
    }
}

/// Parameters for the log-log regression estimator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegressionParams {
    pub min_data_points: usize,
    /// Population standard deviation of prices below which the series is degenerate.
    pub min_price_std_dev: Decimal,
    pub confidence_level: f64,
    pub significance_level: f64,
    /// `|corr(ln p, ln q)|` above this counts as an adequate linear fit.
    pub linearity_threshold: f64,
}

impl Default for RegressionParams {
    fn default() -> Self {
        Self {
            min_data_points: 10,
            min_price_std_dev: dec!(0.01),
            confidence_level: 0.95,
            significance_level: 0.05,
            linearity_threshold: 0.7,
        }
    }
}

/// Background execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Submit calculations to the worker pool instead of running them inline.
    pub async_enabled: bool,
    pub concurrency: usize,
    pub queue_capacity: usize,
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_factor: f64,
    pub backoff_max_secs: u64,
    pub attempt_timeout_secs: u64,
    /// How often the `worker` command polls for pending calculations.
    pub poll_interval_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            async_enabled: false,
            concurrency: 4,
            queue_capacity: 256,
            max_retries: 3,
            backoff_base_secs: 60,
            backoff_factor: 2.0,
            backoff_max_secs: 3600,
            attempt_timeout_secs: 300,
            poll_interval_secs: 5,
        }
    }
}

impl WorkerSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "elasticity.log".to_string(),
        }
    }
}

impl Settings {
    /// Checks cross-field rules that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.data.quality_threshold) {
            return Err(ConfigError::ValidationError(
                "data.quality_threshold must be between 0 and 1".to_string(),
            ));
        }

        let bands = &self.classification;
        if bands.inelastic_below <= Decimal::ZERO
            || bands.inelastic_below > Decimal::ONE
            || bands.elastic_above < Decimal::ONE
        {
            return Err(ConfigError::ValidationError(
                "classification bands must satisfy 0 < inelastic_below <= 1 <= elastic_above".to_string(),
            ));
        }

        if self.midpoint.min_data_points < 2 {
            return Err(ConfigError::ValidationError(
                "midpoint.min_data_points must be at least 2".to_string(),
            ));
        }
        if self.midpoint.min_price_variation_pct < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "midpoint.min_price_variation_pct cannot be negative".to_string(),
            ));
        }
        if let Some(reject) = self.midpoint.reject_elasticity_above {
            if reject < self.midpoint.max_reasonable_elasticity {
                return Err(ConfigError::ValidationError(
                    "midpoint.reject_elasticity_above must not be below max_reasonable_elasticity".to_string(),
                ));
            }
        }

        // Two points leave zero degrees of freedom for the t-distribution.
        if self.regression.min_data_points < 3 {
            return Err(ConfigError::ValidationError(
                "regression.min_data_points must be at least 3".to_string(),
            ));
        }
        if !(self.regression.confidence_level > 0.0 && self.regression.confidence_level < 1.0) {
            return Err(ConfigError::ValidationError(
                "regression.confidence_level must be in (0, 1)".to_string(),
            ));
        }
        if !(self.regression.significance_level > 0.0 && self.regression.significance_level < 1.0) {
            return Err(ConfigError::ValidationError(
                "regression.significance_level must be in (0, 1)".to_string(),
            ));
        }

        if self.worker.concurrency == 0 || self.worker.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "worker.concurrency and worker.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.worker.backoff_factor < 1.0 {
            return Err(ConfigError::ValidationError(
                "worker.backoff_factor must be at least 1.0".to_string(),
            ));
        }
        if self.worker.attempt_timeout_secs == 0 || self.worker.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "worker.attempt_timeout_secs and worker.poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        self.requests
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("requests: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_policy() {
        let settings = Settings::default();
        assert_eq!(settings.data.quality_threshold, 0.95);
        assert_eq!(settings.classification.elastic_above, dec!(1.05));
        assert_eq!(settings.classification.inelastic_below, dec!(0.95));
        assert_eq!(settings.midpoint.min_price_variation_pct, dec!(0.5));
        assert_eq!(settings.midpoint.max_reasonable_elasticity, dec!(10));
        assert_eq!(settings.midpoint.reject_elasticity_above, None);
        assert_eq!(settings.regression.min_data_points, 10);
        assert_eq!(settings.worker.max_retries, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_bands() {
        let mut settings = Settings::default();
        settings.classification.elastic_above = dec!(0.9);
        assert!(matches!(settings.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_reject_ceiling_below_flag_ceiling() {
        let mut settings = Settings::default();
        settings.midpoint.reject_elasticity_above = Some(dec!(5));
        assert!(settings.validate().is_err());

        settings.midpoint.reject_elasticity_above = Some(dec!(20));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_worker_intervals() {
        let mut settings = Settings::default();
        settings.worker.poll_interval_secs = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::ValidationError(_))));

        let mut settings = Settings::default();
        settings.worker.attempt_timeout_secs = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_unusable_request_limits() {
        let mut settings = Settings::default();
        settings.requests.max_period_days = -5;
        assert!(matches!(settings.validate(), Err(ConfigError::ValidationError(m)) if m.contains("max_period_days")));

        let mut settings = Settings::default();
        settings.requests.min_period_daily_days = i64::MAX;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut settings = Settings::default();
        settings.data.quality_threshold = 1.5;
        assert!(settings.validate().is_err());
    }
}
