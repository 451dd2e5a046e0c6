use crate::error::AggregationError;
use chrono::{DateTime, Duration, Utc};
use core_types::{PRIMARY_QUALITY_THRESHOLD, SourceTier};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The window of snapshots to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    Last24Hours,
    #[default]
    Last7Days,
    Last30Days,
    Last90Days,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeRange {
    pub fn custom(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AggregationError> {
        if end < start {
            return Err(AggregationError::invalid("time_range", "end must not be before start"));
        }
        Ok(TimeRange::Custom { start, end })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::Last24Hours => "24h",
            TimeRange::Last7Days => "7d",
            TimeRange::Last30Days => "30d",
            TimeRange::Last90Days => "90d",
            TimeRange::Custom { .. } => "custom",
        }
    }

    /// Concrete `[start, end]` bounds; presets end at `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let lookback = match self {
            TimeRange::Custom { start, end } => return (*start, *end),
            TimeRange::Last24Hours => Duration::hours(24),
            TimeRange::Last7Days => Duration::days(7),
            TimeRange::Last30Days => Duration::days(30),
            TimeRange::Last90Days => Duration::days(90),
        };
        (now - lookback, now)
    }
}

impl FromStr for TimeRange {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "24h" => Ok(TimeRange::Last24Hours),
            "7d" => Ok(TimeRange::Last7Days),
            "30d" => Ok(TimeRange::Last30Days),
            "90d" => Ok(TimeRange::Last90Days),
            other => Err(AggregationError::invalid(
                "time_range",
                format!("'{}', must be one of 24h, 7d, 30d, 90d", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            other => Err(AggregationError::invalid(
                "granularity",
                format!("'{}', must be one of hourly, daily, weekly", other),
            )),
        }
    }
}

/// Which snapshots to include, by source tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    /// External OHLC data (`ohlc`).
    Primary,
    /// Historical P2P scrapes (`p2p`).
    Secondary,
    #[default]
    All,
}

impl SourceFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFilter::Primary => "primary",
            SourceFilter::Secondary => "secondary",
            SourceFilter::All => "all",
        }
    }

    pub fn matches(&self, quality_score: f64) -> bool {
        match self {
            SourceFilter::Primary => quality_score >= PRIMARY_QUALITY_THRESHOLD,
            SourceFilter::Secondary => SourceTier::of(quality_score) == Some(SourceTier::Secondary),
            SourceFilter::All => true,
        }
    }
}

impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFilter {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "ohlc" => Ok(SourceFilter::Primary),
            "secondary" | "p2p" => Ok(SourceFilter::Secondary),
            "all" => Ok(SourceFilter::All),
            other => Err(AggregationError::invalid(
                "source",
                format!("'{}', must be one of primary (ohlc), secondary (p2p), all", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregationQuery {
    pub range: TimeRange,
    pub granularity: Granularity,
    pub source: SourceFilter,
}

impl AggregationQuery {
    /// Builds a query from raw request strings. Explicit bounds win over a preset.
    pub fn parse(
        time_range: Option<&str>,
        bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
        granularity: &str,
        source: &str,
    ) -> Result<Self, AggregationError> {
        let range = match (bounds, time_range) {
            (Some((start, end)), _) => TimeRange::custom(start, end)?,
            (None, Some(preset)) => preset.parse()?,
            (None, None) => TimeRange::default(),
        };
        Ok(Self {
            range,
            granularity: granularity.parse()?,
            source: source.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_aliases_and_case() {
        assert_eq!("OHLC".parse::<SourceFilter>().unwrap(), SourceFilter::Primary);
        assert_eq!("p2p".parse::<SourceFilter>().unwrap(), SourceFilter::Secondary);
        assert_eq!("All".parse::<SourceFilter>().unwrap(), SourceFilter::All);
        assert_eq!("Weekly".parse::<Granularity>().unwrap(), Granularity::Weekly);
        assert_eq!("30D".parse::<TimeRange>().unwrap(), TimeRange::Last30Days);
    }

    #[test]
    fn test_unknown_values_are_invalid_parameters() {
        assert!(matches!(
            "monthly".parse::<Granularity>(),
            Err(AggregationError::InvalidParameter { name: "granularity", .. })
        ));
        assert!(matches!(
            "binance".parse::<SourceFilter>(),
            Err(AggregationError::InvalidParameter { name: "source", .. })
        ));
        assert!(matches!(
            "1y".parse::<TimeRange>(),
            Err(AggregationError::InvalidParameter { name: "time_range", .. })
        ));
    }

    #[test]
    fn test_query_defaults_and_custom_bounds() {
        let query = AggregationQuery::parse(None, None, "daily", "all").unwrap();
        assert_eq!(query.range, TimeRange::Last7Days);

        let now = Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap();
        assert_eq!(query.range.resolve(now), (now - Duration::days(7), now));

        let start = Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap();
        let custom = AggregationQuery::parse(Some("24h"), Some((start, now)), "hourly", "ohlc").unwrap();
        assert_eq!(custom.range.label(), "custom");
        assert_eq!(custom.range.resolve(now), (start, now));

        assert!(AggregationQuery::parse(None, Some((now, start)), "daily", "all").is_err());
    }

    #[test]
    fn test_source_filter_matches_tiers() {
        assert!(SourceFilter::Primary.matches(0.95));
        assert!(!SourceFilter::Primary.matches(0.8));
        assert!(SourceFilter::Secondary.matches(0.8));
        assert!(!SourceFilter::Secondary.matches(0.9));
        assert!(SourceFilter::All.matches(0.1));
    }
}
