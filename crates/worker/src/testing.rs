//! Shared fixtures for the worker tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::Settings;
use core_types::{Calculation, CalculationMethod, MarketSnapshot, Observation, WindowSize};
use database::{CalculationStore, DbError, MemoryRepository, ObservationSource};
use executor::CalculationExecutor;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap() + Duration::days(n)
}

pub fn inverse_series(points: i64) -> Vec<MarketSnapshot> {
    (0..points)
        .map(|i| MarketSnapshot {
            timestamp: day(i),
            average_sell_price: dec!(9.50) + Decimal::from(i) * dec!(0.05),
            average_buy_price: None,
            total_volume: Some(dec!(50000) - Decimal::from(i) * dec!(1500)),
            spread_percentage: None,
            num_active_traders: 0,
            data_quality_score: 0.97,
        })
        .collect()
}

/// One pending midpoint calculation over the fixture's snapshots.
pub struct Fixture {
    pub repo: Arc<MemoryRepository>,
    pub id: Uuid,
    pub settings: Settings,
}

impl Fixture {
    pub async fn new(snapshots: Vec<MarketSnapshot>) -> Self {
        let repo = Arc::new(MemoryRepository::with_snapshots(snapshots));
        let calculation = Calculation::new_pending(
            CalculationMethod::Midpoint,
            day(-1),
            day(30),
            WindowSize::Daily,
            None,
            day(31),
        );
        repo.insert(&calculation).await.unwrap();

        let mut settings = Settings::default();
        settings.worker.concurrency = 2;
        Self {
            repo,
            id: calculation.id,
            settings,
        }
    }

    pub fn executor(&self) -> CalculationExecutor {
        CalculationExecutor::new(self.repo.clone(), self.repo.clone(), &self.settings)
    }

    pub fn executor_with(&self, source: Arc<dyn ObservationSource>) -> CalculationExecutor {
        CalculationExecutor::new(source, self.repo.clone(), &self.settings)
    }

    pub async fn stored(&self) -> Calculation {
        self.repo.load(self.id).await.unwrap().unwrap()
    }
}

/// Fails or stalls the first `failures` fetches, then reads from the repository.
pub struct FlakySource {
    inner: Arc<MemoryRepository>,
    failures: AtomicU32,
    stall: Option<std::time::Duration>,
    pub calls: AtomicU32,
}

impl FlakySource {
    pub fn failing(inner: Arc<MemoryRepository>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            stall: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn stalling(inner: Arc<MemoryRepository>, failures: u32, stall: std::time::Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::failing(inner, failures)
        }
    }
}

#[async_trait]
impl ObservationSource for FlakySource {
    async fn fetch_observations(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_quality: f64,
    ) -> Result<Vec<Observation>, DbError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            return Err(DbError::Unavailable("connection reset".to_string()));
        }
        self.inner.fetch_observations(start, end, min_quality).await
    }
}
