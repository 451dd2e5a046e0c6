use crate::bucket::{AggregatedPoint, Provenance, aggregate_points};
use crate::error::AggregationError;
use crate::query::{AggregationQuery, Granularity, SourceFilter};
use chrono::{DateTime, Utc};
use core_types::MarketSnapshot;
use database::SnapshotSource;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    /// `24h`, `7d`, `30d`, `90d` or `custom`.
    pub time_range: &'static str,
    pub granularity: Granularity,
    pub source: SourceFilter,
    pub coverage_start: Option<DateTime<Utc>>,
    pub coverage_end: Option<DateTime<Utc>>,
    pub span_days: f64,
    pub data_source: Provenance,
    pub total_records: usize,
    pub aggregated_points: usize,
    pub points: Vec<AggregatedPoint>,
}

/// Buckets raw snapshots into a display series. Read-only and stateless.
#[derive(Clone)]
pub struct AggregationService {
    source: Arc<dyn SnapshotSource>,
}

impl AggregationService {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self { source }
    }

    pub async fn aggregate(&self, query: &AggregationQuery) -> Result<AggregationResult, AggregationError> {
        self.aggregate_at(query, Utc::now()).await
    }

    /// Like [`aggregate`](Self::aggregate) with an explicit clock for preset ranges.
    pub async fn aggregate_at(
        &self,
        query: &AggregationQuery,
        now: DateTime<Utc>,
    ) -> Result<AggregationResult, AggregationError> {
        let (start, end) = query.range.resolve(now);
        let snapshots: Vec<MarketSnapshot> = self
            .source
            .fetch_snapshots(start, end)
            .await?
            .into_iter()
            .filter(|s| query.source.matches(s.data_quality_score))
            .collect();

        debug!(
            %start, %end,
            granularity = query.granularity.as_str(),
            source = query.source.as_str(),
            records = snapshots.len(),
            "Aggregating snapshots"
        );

        Ok(summarize(query, &snapshots))
    }
}

/// Builds the result for snapshots that already passed the range and source filters.
pub fn summarize(query: &AggregationQuery, snapshots: &[MarketSnapshot]) -> AggregationResult {
    let points = aggregate_points(query.granularity, snapshots);
    let coverage_start = points.first().map(|p| p.timestamp);
    let coverage_end = points.last().map(|p| p.timestamp);
    let span_days = match (coverage_start, coverage_end) {
        (Some(first), Some(last)) => ((last - first).num_seconds() as f64 / 86_400.0 * 100.0).round() / 100.0,
        _ => 0.0,
    };

    AggregationResult {
        time_range: query.range.label(),
        granularity: query.granularity,
        source: query.source,
        coverage_start,
        coverage_end,
        span_days,
        data_source: Provenance::of(snapshots),
        total_records: snapshots.len(),
        aggregated_points: points.len(),
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeRange;
    use chrono::{Duration, TimeZone};
    use database::MemoryRepository;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(ts: DateTime<Utc>, score: f64) -> MarketSnapshot {
        MarketSnapshot {
            timestamp: ts,
            average_sell_price: dec!(9.95),
            average_buy_price: None,
            total_volume: Some(dec!(50000)),
            spread_percentage: Some(Decimal::ZERO),
            num_active_traders: 10,
            data_quality_score: score,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap()
    }

    fn service() -> AggregationService {
        let mut snapshots = Vec::new();
        for day in 0..10 {
            let ts = now() - Duration::days(day) - Duration::hours(1);
            snapshots.push(snapshot(ts, 0.95));
            snapshots.push(snapshot(ts - Duration::hours(2), 0.8));
        }
        AggregationService::new(Arc::new(MemoryRepository::with_snapshots(snapshots)))
    }

    #[tokio::test]
    async fn test_preset_range_and_source_filter() {
        let query = AggregationQuery {
            range: TimeRange::Last7Days,
            granularity: Granularity::Daily,
            source: SourceFilter::Primary,
        };
        let result = service().aggregate_at(&query, now()).await.unwrap();

        assert_eq!(result.time_range, "7d");
        assert_eq!(result.data_source, Provenance::SingleSource(core_types::SourceTier::Primary));
        assert_eq!(result.total_records, 7);
        assert_eq!(result.aggregated_points, result.points.len());
        assert!(result.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(result.span_days, 6.0);
    }

    #[tokio::test]
    async fn test_all_sources_are_mixed() {
        let query = AggregationQuery {
            range: TimeRange::Last90Days,
            granularity: Granularity::Hourly,
            source: SourceFilter::All,
        };
        let result = service().aggregate_at(&query, now()).await.unwrap();
        assert_eq!(result.data_source, Provenance::Mixed);
        assert_eq!(result.total_records, 20);
        assert_eq!(result.aggregated_points, 20);
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical() {
        let service = service();
        let query = AggregationQuery::default();
        let first = service.aggregate_at(&query, now()).await.unwrap();
        let second = service.aggregate_at(&query, now()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let start = now() - Duration::days(400);
        let query = AggregationQuery {
            range: TimeRange::custom(start, start + Duration::days(1)).unwrap(),
            granularity: Granularity::Weekly,
            source: SourceFilter::All,
        };
        let result = service().aggregate_at(&query, now()).await.unwrap();
        assert_eq!(result.time_range, "custom");
        assert_eq!(result.total_records, 0);
        assert!(result.points.is_empty());
        assert_eq!(result.coverage_start, None);
        assert_eq!(result.span_days, 0.0);
        assert_eq!(result.data_source, Provenance::Unknown);
    }

    #[test]
    fn test_result_serializes_provenance_as_label() {
        let query = AggregationQuery::default();
        let result = summarize(&query, &[snapshot(now(), 0.8)]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["data_source"], "single-source(secondary)");
        assert_eq!(json["granularity"], "daily");
        assert_eq!(json["points"][0]["record_count"], 1);
    }
}
