use crate::query::Granularity;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use core_types::{MarketSnapshot, SourceTier};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One point of an aggregated price series. Values are for display only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    /// Start of the bucket (the snapshot's own timestamp for hourly data).
    pub timestamp: DateTime<Utc>,
    pub average_buy_price: Option<f64>,
    pub average_sell_price: f64,
    /// Mean offer level. `None` when no snapshot in the bucket had volume.
    pub quantity: Option<f64>,
    /// Raw sum of offer levels, weekly buckets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_sum: Option<f64>,
    pub spread_percentage: Option<f64>,
    pub record_count: usize,
    pub has_volume_data: bool,
}

/// Which source tiers a set of snapshots came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Mixed,
    SingleSource(SourceTier),
    Unknown,
}

impl Provenance {
    pub fn of(snapshots: &[MarketSnapshot]) -> Self {
        let mut primary = false;
        let mut secondary = false;
        for snapshot in snapshots {
            match snapshot.tier() {
                Some(SourceTier::Primary) => primary = true,
                Some(SourceTier::Secondary) => secondary = true,
                None => {}
            }
            if primary && secondary {
                return Provenance::Mixed;
            }
        }
        match (primary, secondary) {
            (true, false) => Provenance::SingleSource(SourceTier::Primary),
            (false, true) => Provenance::SingleSource(SourceTier::Secondary),
            _ => Provenance::Unknown,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Mixed => f.write_str("mixed"),
            Provenance::SingleSource(tier) => write!(f, "single-source({})", tier.as_str()),
            Provenance::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn display(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Start of the bucket `timestamp` falls into: 00:00 UTC of its day, or of
/// the Monday of its ISO week.
pub fn bucket_start(granularity: Granularity, timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let date = timestamp.date_naive();
    match granularity {
        Granularity::Hourly => timestamp,
        Granularity::Daily => date.and_time(NaiveTime::MIN).and_utc(),
        Granularity::Weekly => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            monday.and_time(NaiveTime::MIN).and_utc()
        }
    }
}

/// Running sums for one bucket. Missing optional values are left out of their mean.
#[derive(Debug, Default)]
struct Bucket {
    records: usize,
    sell: (Decimal, usize),
    buy: (Decimal, usize),
    volume: (Decimal, usize),
    spread: (Decimal, usize),
}

impl Bucket {
    fn add(&mut self, snapshot: &MarketSnapshot) {
        fn push(acc: &mut (Decimal, usize), value: Option<Decimal>) {
            if let Some(value) = value {
                acc.0 += value;
                acc.1 += 1;
            }
        }

        self.records += 1;
        push(&mut self.sell, Some(snapshot.average_sell_price));
        push(&mut self.buy, snapshot.average_buy_price);
        push(&mut self.volume, snapshot.total_volume);
        push(&mut self.spread, snapshot.spread_percentage);
    }

    fn mean((sum, n): (Decimal, usize)) -> Option<f64> {
        (n > 0).then(|| display(sum / Decimal::from(n)))
    }

    fn into_point(self, timestamp: DateTime<Utc>, granularity: Granularity) -> AggregatedPoint {
        let has_volume_data = self.volume.1 > 0;
        let volume_sum = match granularity {
            Granularity::Weekly if has_volume_data => Some(display(self.volume.0)),
            _ => None,
        };
        AggregatedPoint {
            timestamp,
            average_buy_price: Self::mean(self.buy),
            average_sell_price: Self::mean(self.sell).unwrap_or_default(),
            quantity: Self::mean(self.volume),
            volume_sum,
            spread_percentage: Self::mean(self.spread),
            record_count: self.records,
            has_volume_data,
        }
    }
}

/// Groups snapshots into points, ascending by timestamp. Buckets without
/// snapshots produce no point.
pub fn aggregate_points(granularity: Granularity, snapshots: &[MarketSnapshot]) -> Vec<AggregatedPoint> {
    if granularity == Granularity::Hourly {
        let mut points: Vec<AggregatedPoint> = snapshots
            .iter()
            .map(|s| {
                let mut bucket = Bucket::default();
                bucket.add(s);
                bucket.into_point(s.timestamp, granularity)
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        return points;
    }

    let mut buckets: BTreeMap<DateTime<Utc>, Bucket> = BTreeMap::new();
    for snapshot in snapshots {
        buckets
            .entry(bucket_start(granularity, snapshot.timestamp))
            .or_default()
            .add(snapshot);
    }

    buckets
        .into_iter()
        .map(|(timestamp, bucket)| bucket.into_point(timestamp, granularity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn snapshot(ts: DateTime<Utc>, sell: Decimal, volume: Option<Decimal>, score: f64) -> MarketSnapshot {
        MarketSnapshot {
            timestamp: ts,
            average_sell_price: sell,
            average_buy_price: Some(sell - dec!(0.05)),
            total_volume: volume,
            spread_percentage: Some(dec!(0.5)),
            num_active_traders: 25,
            data_quality_score: score,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_aggregation_of_daily_series_reproduces_it() {
        let series: Vec<MarketSnapshot> = (1..=5)
            .map(|d| snapshot(at(d, 0), dec!(9.90) + Decimal::from(d) * dec!(0.01), Some(dec!(1000)), 0.95))
            .collect();

        let points = aggregate_points(Granularity::Daily, &series);
        assert_eq!(points.len(), series.len());
        for (point, original) in points.iter().zip(&series) {
            assert_eq!(point.timestamp, original.timestamp);
            assert_eq!(point.average_sell_price, display(original.average_sell_price));
            assert_eq!(point.quantity, Some(1000.0));
            assert_eq!(point.record_count, 1);
        }
    }

    #[test]
    fn test_missing_day_yields_no_point() {
        let series = vec![
            snapshot(at(1, 10), dec!(9.9), Some(dec!(100)), 0.95),
            snapshot(at(2, 10), dec!(9.9), Some(dec!(100)), 0.95),
            snapshot(at(4, 10), dec!(9.9), Some(dec!(100)), 0.95),
        ];
        let points = aggregate_points(Granularity::Daily, &series);
        let days: Vec<u32> = points.iter().map(|p| p.timestamp.day()).collect();
        assert_eq!(days, vec![1, 2, 4]);
        assert_eq!(points[0].timestamp, at(1, 0));
    }

    #[test]
    fn test_daily_volume_is_a_mean_not_a_sum() {
        let series = vec![
            snapshot(at(3, 8), dec!(9.90), Some(dec!(100)), 0.8),
            snapshot(at(3, 20), dec!(10.00), Some(dec!(300)), 0.8),
        ];
        let points = aggregate_points(Granularity::Daily, &series);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].quantity, Some(200.0));
        assert!((points[0].average_sell_price - 9.95).abs() < 1e-9);
        assert_eq!(points[0].volume_sum, None);
        assert_eq!(points[0].record_count, 2);
    }

    #[test]
    fn test_weekly_buckets_start_on_monday_and_carry_volume_sum() {
        // 2025-11-05 is a Wednesday and 2025-11-09 a Sunday of the same ISO week.
        let series = vec![
            snapshot(at(5, 12), dec!(9.90), Some(dec!(100)), 0.95),
            snapshot(at(9, 23), dec!(9.96), Some(dec!(300)), 0.95),
            snapshot(at(10, 1), dec!(10.00), None, 0.95),
        ];
        let points = aggregate_points(Granularity::Weekly, &series);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, at(3, 0));
        assert_eq!(points[0].quantity, Some(200.0));
        assert_eq!(points[0].volume_sum, Some(400.0));
        assert!(points[0].has_volume_data);

        assert_eq!(points[1].timestamp, at(10, 0));
        assert_eq!(points[1].quantity, None);
        assert_eq!(points[1].volume_sum, None);
        assert!(!points[1].has_volume_data);
    }

    #[test]
    fn test_hourly_is_passthrough() {
        let series = vec![
            snapshot(at(3, 9), dec!(9.90), None, 0.95),
            snapshot(at(3, 10), dec!(9.91), Some(dec!(5)), 0.95),
        ];
        let points = aggregate_points(Granularity::Hourly, &series);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, at(3, 9));
        assert!(points.iter().all(|p| p.record_count == 1));
        assert!(!points[0].has_volume_data);
    }

    #[test]
    fn test_provenance() {
        let primary = snapshot(at(1, 0), dec!(9.9), None, 0.97);
        let secondary = snapshot(at(1, 1), dec!(9.9), None, 0.8);
        let unknown = snapshot(at(1, 2), dec!(9.9), None, 0.5);

        assert_eq!(Provenance::of(&[primary.clone(), secondary.clone()]), Provenance::Mixed);
        assert_eq!(
            Provenance::of(&[primary.clone(), unknown.clone()]).to_string(),
            "single-source(primary)"
        );
        assert_eq!(Provenance::of(&[secondary]).to_string(), "single-source(secondary)");
        assert_eq!(Provenance::of(&[unknown]), Provenance::Unknown);
        assert_eq!(Provenance::of(&[]), Provenance::Unknown);
    }
}
