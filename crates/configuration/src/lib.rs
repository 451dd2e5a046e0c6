//! # Elasticity Configuration Crate
//!
//! Strongly-typed settings for the elasticity engine, loaded from an optional
//! `config.toml` and overridden by `ELASTICITY__SECTION__KEY` environment
//! variables. Decimal thresholds are written as strings in TOML so they keep
//! their exact value.
//!
//! Also owns tracing initialisation so every binary logs the same way.

use crate::error::ConfigError;
use std::path::Path;

pub mod error;
pub mod logging;
pub mod settings;

pub use logging::init_tracing;
pub use settings::{
    ClassificationBands, DataSettings, LoggingSettings, MidpointParams, RegressionParams, Settings,
    WorkerSettings,
};

/// Prefix for environment overrides, e.g. `ELASTICITY__WORKER__CONCURRENCY=8`.
pub const ENV_PREFIX: &str = "ELASTICITY";

/// Loads settings from `config.toml` in the working directory, if present.
pub fn load_config() -> Result<Settings, ConfigError> {
    build(config::File::with_name("config").required(false))
}

/// Loads settings from an explicit file, which must exist.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    build(config::File::from(path).required(true))
}

fn build<S>(file: S) -> Result<Settings, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;

    Ok(settings)
}

/// Command-line override for the configuration file location.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file. Defaults to `./config.toml` when present.
    #[arg(long, short = 'c', global = true, env = "ELASTICITY_CONFIG")]
    pub config: Option<std::path::PathBuf>,
}

#[cfg(feature = "clap")]
impl ConfigArgs {
    pub fn load(&self) -> Result<Settings, ConfigError> {
        match &self.config {
            Some(path) => load_config_from(path),
            None => load_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[midpoint]
min_price_variation_pct = "1.25"
reject_elasticity_above = "50"

[worker]
concurrency = 2
"#
        )
        .unwrap();

        let settings = load_config_from(&path).unwrap();
        assert_eq!(settings.midpoint.min_price_variation_pct, dec!(1.25));
        assert_eq!(settings.midpoint.reject_elasticity_above, Some(dec!(50)));
        assert_eq!(settings.worker.concurrency, 2);
        // Untouched sections keep their defaults.
        assert_eq!(settings.regression.min_data_points, 10);
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[worker]\nconcurrency = 0\n").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_poll_interval_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poll.toml");
        std::fs::write(&path, "[worker]\npoll_interval_secs = 0\n").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = Path::new("/definitely/not/here/config.toml");
        assert!(matches!(load_config_from(path), Err(ConfigError::LoadError(_))));
    }
}
