use crate::error::DbError;
use crate::store::{CalculationStore, ClaimOutcome, ObservationSource, SnapshotSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Calculation, CalculationField, CalculationStatus, MarketSnapshot, Observation};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local storage used by tests and the `--memory-demo` mode.
///
/// Implements the same contracts as the PostgreSQL repository; the claim is
/// atomic because it runs under the write lock.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    snapshots: RwLock<Vec<MarketSnapshot>>,
    calculations: RwLock<HashMap<Uuid, Calculation>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(snapshots: Vec<MarketSnapshot>) -> Self {
        let mut snapshots = snapshots;
        snapshots.sort_by_key(|s| s.timestamp);
        Self {
            snapshots: RwLock::new(snapshots),
            calculations: RwLock::default(),
        }
    }

    pub async fn insert_snapshots(&self, new: impl IntoIterator<Item = MarketSnapshot>) {
        let mut snapshots = self.snapshots.write().await;
        snapshots.extend(new);
        snapshots.sort_by_key(|s| s.timestamp);
    }

    pub async fn calculation_count(&self) -> usize {
        self.calculations.read().await.len()
    }
}

#[async_trait]
impl ObservationSource for MemoryRepository {
    async fn fetch_observations(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_quality: f64,
    ) -> Result<Vec<Observation>, DbError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end && s.data_quality_score >= min_quality)
            .map(MarketSnapshot::to_observation)
            .collect())
    }
}

#[async_trait]
impl SnapshotSource for MemoryRepository {
    async fn fetch_snapshots(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<MarketSnapshot>, DbError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CalculationStore for MemoryRepository {
    async fn insert(&self, calculation: &Calculation) -> Result<(), DbError> {
        self.calculations
            .write()
            .await
            .insert(calculation.id, calculation.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Calculation>, DbError> {
        Ok(self.calculations.read().await.get(&id).cloned())
    }

    async fn save(&self, calculation: &Calculation, fields: &[CalculationField]) -> Result<(), DbError> {
        let mut calculations = self.calculations.write().await;
        let stored = calculations.get_mut(&calculation.id).ok_or(DbError::NotFound)?;
        stored.apply_fields(calculation, fields);
        Ok(())
    }

    async fn claim(&self, id: Uuid, lease: Uuid, at: DateTime<Utc>) -> Result<ClaimOutcome, DbError> {
        let mut calculations = self.calculations.write().await;
        let Some(stored) = calculations.get_mut(&id) else {
            return Ok(ClaimOutcome::NotFound);
        };

        let mut working = stored.clone();
        match working.begin_processing(lease, at) {
            Ok(()) => {
                stored.apply_fields(&working, CalculationField::CLAIM);
                Ok(ClaimOutcome::Claimed(working))
            }
            Err(_) => Ok(ClaimOutcome::Busy(stored.status)),
        }
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Calculation>, DbError> {
        let calculations = self.calculations.read().await;
        let mut pending: Vec<Calculation> = calculations
            .values()
            .filter(|c| c.status == CalculationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.created_at);
        pending.truncate(limit);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::{CalculationMethod, WindowSize};
    use rust_decimal_macros::dec;

    fn snapshot(hour: u32, score: f64) -> MarketSnapshot {
        MarketSnapshot {
            timestamp: Utc.with_ymd_and_hms(2025, 11, 3, hour, 0, 0).unwrap(),
            average_sell_price: dec!(9.95),
            average_buy_price: Some(dec!(9.90)),
            total_volume: Some(dec!(120000)),
            spread_percentage: Some(dec!(0.5)),
            num_active_traders: 40,
            data_quality_score: score,
        }
    }

    fn pending() -> Calculation {
        let now = Utc.with_ymd_and_hms(2025, 11, 20, 0, 0, 0).unwrap();
        Calculation::new_pending(
            CalculationMethod::Midpoint,
            now - Duration::days(10),
            now,
            WindowSize::Daily,
            None,
            now,
        )
    }

    #[tokio::test]
    async fn test_observations_are_filtered_and_ordered() {
        let repo = MemoryRepository::with_snapshots(vec![snapshot(5, 0.95), snapshot(1, 0.8), snapshot(3, 1.0)]);
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 11, 3, 23, 0, 0).unwrap();

        let observations = repo.fetch_observations(start, end, 0.95).await.unwrap();
        assert_eq!(observations.len(), 2);
        assert!(observations[0].timestamp < observations[1].timestamp);

        let all = repo.fetch_snapshots(start, end).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_claim_is_a_compare_and_set() {
        let repo = MemoryRepository::new();
        let calc = pending();
        repo.insert(&calc).await.unwrap();

        let owner = Uuid::new_v4();
        let claimed = repo.claim(calc.id, owner, Utc::now()).await.unwrap();
        assert!(matches!(claimed, ClaimOutcome::Claimed(ref c) if c.lease_id == Some(owner)));

        let other = repo.claim(calc.id, Uuid::new_v4(), Utc::now()).await.unwrap();
        assert_eq!(other, ClaimOutcome::Busy(CalculationStatus::Processing));

        let resumed = repo.claim(calc.id, owner, Utc::now()).await.unwrap();
        assert!(matches!(resumed, ClaimOutcome::Claimed(_)));

        let missing = repo.claim(Uuid::new_v4(), owner, Utc::now()).await.unwrap();
        assert_eq!(missing, ClaimOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_save_is_partial() {
        let repo = MemoryRepository::new();
        let calc = pending();
        repo.insert(&calc).await.unwrap();

        let mut working = calc.clone();
        working.begin_processing(Uuid::new_v4(), Utc::now()).unwrap();
        working.error_message = Some("scratch".to_string());
        repo.save(&working, &[CalculationField::Status]).await.unwrap();

        let stored = repo.load(calc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CalculationStatus::Processing);
        assert_eq!(stored.error_message, None);
        assert_eq!(stored.lease_id, None);

        let ghost = pending();
        assert!(matches!(repo.save(&ghost, CalculationField::FAILURE).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_pending_oldest_first() {
        let repo = MemoryRepository::new();
        let mut older = pending();
        older.created_at -= Duration::hours(1);
        let newer = pending();
        repo.insert(&newer).await.unwrap();
        repo.insert(&older).await.unwrap();

        let listed = repo.list_pending(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);

        repo.claim(older.id, Uuid::new_v4(), Utc::now()).await.unwrap();
        let listed = repo.list_pending(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, newer.id);
    }
}
