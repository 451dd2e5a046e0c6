//! Storage-agnostic interfaces the services depend on.

use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Calculation, CalculationField, CalculationStatus, MarketSnapshot, Observation};
use uuid::Uuid;

/// Read-only access to price/quantity observations for the calculators.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Observations in `[start, end]` with `quality_score >= min_quality`, oldest first.
    async fn fetch_observations(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_quality: f64,
    ) -> Result<Vec<Observation>, DbError>;
}

/// Read-only access to raw snapshots of every source tier.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Snapshots in `[start, end]`, oldest first.
    async fn fetch_snapshots(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<MarketSnapshot>, DbError>;
}

/// Result of trying to take the `Processing` lease on a calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The record is now (or was already) `Processing` under the caller's lease.
    Claimed(Calculation),
    NotFound,
    /// Held by another lease or already terminal.
    Busy(CalculationStatus),
}

#[async_trait]
pub trait CalculationStore: Send + Sync {
    async fn insert(&self, calculation: &Calculation) -> Result<(), DbError>;

    async fn load(&self, id: Uuid) -> Result<Option<Calculation>, DbError>;

    /// Writes only `fields` (and always `updated_at`). Fails with
    /// `DbError::NotFound` when the record does not exist.
    async fn save(&self, calculation: &Calculation, fields: &[CalculationField]) -> Result<(), DbError>;

    /// Atomically moves a `Pending` record to `Processing` under `lease`, or
    /// resumes a `Processing` record that `lease` already holds.
    async fn claim(&self, id: Uuid, lease: Uuid, at: DateTime<Utc>) -> Result<ClaimOutcome, DbError>;

    /// Oldest `Pending` records first.
    async fn list_pending(&self, limit: usize) -> Result<Vec<Calculation>, DbError>;
}
