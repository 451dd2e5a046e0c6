use crate::calculation::Calculation;
use crate::enums::{CalculationMethod, WindowSize};
use crate::error::CoreError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Converts any timezone-aware instant to UTC.
pub fn normalize_to_utc<Tz: TimeZone>(dt: &DateTime<Tz>) -> DateTime<Utc> {
    dt.with_timezone(&Utc)
}

/// Parses a client-supplied timestamp.
///
/// Accepts RFC 3339 with any offset, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC)
/// or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(normalize_to_utc(&dt));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(CoreError::InvalidInput(
        field.to_string(),
        format!("'{}' is not an ISO 8601 date or timestamp", raw),
    ))
}

/// Period limits enforced before a calculation record is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    pub max_period_days: i64,
    pub min_period_hourly_hours: i64,
    pub min_period_daily_days: i64,
    pub min_period_weekly_days: i64,
    pub min_period_regression_days: i64,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_period_days: 90,
            min_period_hourly_hours: 24,
            min_period_daily_days: 7,
            min_period_weekly_days: 21,
            min_period_regression_days: 14,
        }
    }
}

/// Longest period any limit may describe: ten years.
const MAX_LIMIT_DAYS: i64 = 3650;

impl RequestLimits {
    /// Rejects limits that are negative, inconsistent or too large to express as a duration.
    pub fn validate(&self) -> Result<(), CoreError> {
        let in_days = [
            ("max_period_days", self.max_period_days),
            ("min_period_daily_days", self.min_period_daily_days),
            ("min_period_weekly_days", self.min_period_weekly_days),
            ("min_period_regression_days", self.min_period_regression_days),
            ("min_period_hourly_hours", self.min_period_hourly_hours / 24),
        ];
        for (field, days) in in_days {
            if !(0..=MAX_LIMIT_DAYS).contains(&days) {
                return Err(CoreError::InvalidInput(
                    field.to_string(),
                    format!("must be between 0 and {} days", MAX_LIMIT_DAYS),
                ));
            }
        }
        if self.min_period_hourly_hours < 0 {
            return Err(CoreError::InvalidInput(
                "min_period_hourly_hours".to_string(),
                "cannot be negative".to_string(),
            ));
        }
        if self.max_period_days == 0 {
            return Err(CoreError::InvalidInput(
                "max_period_days".to_string(),
                "must be at least 1 day".to_string(),
            ));
        }
        Ok(())
    }

    fn min_period(&self, window: WindowSize) -> Duration {
        match window {
            WindowSize::Hourly => Duration::hours(self.min_period_hourly_hours),
            WindowSize::Daily => Duration::days(self.min_period_daily_days),
            WindowSize::Weekly => Duration::days(self.min_period_weekly_days),
        }
    }
}

/// A validated request to run one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub method: CalculationMethod,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub window_size: WindowSize,
    pub client_ip: Option<String>,
}

impl CalculationRequest {
    /// Builds a request from raw strings, as they arrive from a CLI or HTTP layer.
    pub fn parse(method: &str, start_date: &str, end_date: &str, window_size: &str) -> Result<Self, CoreError> {
        Ok(Self {
            method: method.parse()?,
            start_date: parse_timestamp("start_date", start_date)?,
            end_date: parse_timestamp("end_date", end_date)?,
            window_size: window_size.parse()?,
            client_ip: None,
        })
    }

    /// Cross-field validation. Nothing is persisted for a request that fails here.
    pub fn validate(&self, now: DateTime<Utc>, limits: &RequestLimits) -> Result<(), CoreError> {
        limits.validate()?;
        if self.end_date <= self.start_date {
            return Err(CoreError::InvalidInput(
                "end_date".to_string(),
                "End date must be after start date".to_string(),
            ));
        }
        if self.start_date > now {
            return Err(CoreError::InvalidInput(
                "start_date".to_string(),
                "Start date cannot be in the future".to_string(),
            ));
        }

        let period = self.end_date - self.start_date;
        if period > Duration::days(limits.max_period_days) {
            return Err(CoreError::InvalidInput(
                "period".to_string(),
                format!("Analysis period cannot exceed {} days", limits.max_period_days),
            ));
        }

        let min_period = limits.min_period(self.window_size);
        if period < min_period {
            let requirement = if min_period < Duration::days(1) {
                format!("{} hours", min_period.num_hours())
            } else {
                format!("{} days", min_period.num_days())
            };
            return Err(CoreError::InvalidInput(
                "period".to_string(),
                format!(
                    "For {} window, need at least {}",
                    self.window_size.as_str().to_ascii_lowercase(),
                    requirement
                ),
            ));
        }

        if self.method == CalculationMethod::Regression
            && period < Duration::days(limits.min_period_regression_days)
        {
            return Err(CoreError::InvalidInput(
                "method".to_string(),
                format!(
                    "Regression method requires at least {} days of data",
                    limits.min_period_regression_days
                ),
            ));
        }

        Ok(())
    }

    /// Validates the request and turns it into a fresh `Pending` record.
    pub fn into_calculation(self, now: DateTime<Utc>, limits: &RequestLimits) -> Result<Calculation, CoreError> {
        self.validate(now, limits)?;
        Ok(Calculation::new_pending(
            self.method,
            self.start_date,
            self.end_date,
            self.window_size,
            self.client_ip,
            now,
        ))
    }
}
