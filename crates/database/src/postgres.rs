use crate::error::DbError;
use crate::store::{CalculationStore, ClaimOutcome, ObservationSource, SnapshotSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Calculation, CalculationField, CalculationStatus, Classification, MarketSnapshot, Observation};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

const CALCULATION_COLUMNS: &str = r#"
    id, client_ip, method, start_date, end_date, window_size, status, lease_id,
    elasticity_coefficient, classification, confidence_interval_lower, confidence_interval_upper,
    r_squared, standard_error, data_points_used, is_reliable, reliability_note,
    average_data_quality, metadata, error_message, created_at, updated_at, completed_at
"#;

/// PostgreSQL implementation of every storage trait.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Creates a new `PgRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stores one collector snapshot.
    pub async fn save_snapshot(&self, snapshot: &MarketSnapshot) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO market_snapshots
                (timestamp, average_sell_price, average_buy_price, total_volume,
                 spread_percentage, num_active_traders, data_quality_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.average_sell_price)
        .bind(snapshot.average_buy_price)
        .bind(snapshot.total_volume)
        .bind(snapshot.spread_percentage)
        .bind(snapshot.num_active_traders)
        .bind(snapshot.data_quality_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn snapshot_from_row(row: &PgRow) -> Result<MarketSnapshot, DbError> {
    Ok(MarketSnapshot {
        timestamp: row.try_get("timestamp")?,
        average_sell_price: row.try_get("average_sell_price")?,
        average_buy_price: row.try_get("average_buy_price")?,
        total_volume: row.try_get("total_volume")?,
        spread_percentage: row.try_get("spread_percentage")?,
        num_active_traders: row.try_get("num_active_traders")?,
        data_quality_score: row.try_get("data_quality_score")?,
    })
}

fn calculation_from_row(row: &PgRow) -> Result<Calculation, DbError> {
    let method: String = row.try_get("method")?;
    let window_size: String = row.try_get("window_size")?;
    let status: String = row.try_get("status")?;
    let classification: Option<String> = row.try_get("classification")?;
    let data_points_used: i32 = row.try_get("data_points_used")?;

    Ok(Calculation {
        id: row.try_get("id")?,
        client_ip: row.try_get("client_ip")?,
        method: method.parse()?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        window_size: window_size.parse()?,
        status: status.parse()?,
        lease_id: row.try_get("lease_id")?,
        elasticity_coefficient: row.try_get("elasticity_coefficient")?,
        classification: classification.map(|c| c.parse::<Classification>()).transpose()?,
        confidence_interval_lower: row.try_get("confidence_interval_lower")?,
        confidence_interval_upper: row.try_get("confidence_interval_upper")?,
        r_squared: row.try_get("r_squared")?,
        standard_error: row.try_get("standard_error")?,
        data_points_used: u32::try_from(data_points_used).unwrap_or(0),
        is_reliable: row.try_get("is_reliable")?,
        reliability_note: row.try_get("reliability_note")?,
        average_data_quality: row.try_get("average_data_quality")?,
        metadata: row.try_get("metadata")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Appends `, column = $n` for one field of a partial update.
fn push_field(builder: &mut QueryBuilder<'_, Postgres>, calculation: &Calculation, field: CalculationField) {
    match field {
        CalculationField::Status => {
            builder.push(", status = ").push_bind(calculation.status.as_str());
        }
        CalculationField::LeaseId => {
            builder.push(", lease_id = ").push_bind(calculation.lease_id);
        }
        CalculationField::ElasticityCoefficient => {
            builder
                .push(", elasticity_coefficient = ")
                .push_bind(calculation.elasticity_coefficient);
        }
        CalculationField::Classification => {
            builder
                .push(", classification = ")
                .push_bind(calculation.classification.map(|c| c.as_str()));
        }
        CalculationField::ConfidenceInterval => {
            builder
                .push(", confidence_interval_lower = ")
                .push_bind(calculation.confidence_interval_lower)
                .push(", confidence_interval_upper = ")
                .push_bind(calculation.confidence_interval_upper);
        }
        CalculationField::RSquared => {
            builder.push(", r_squared = ").push_bind(calculation.r_squared);
        }
        CalculationField::StandardError => {
            builder.push(", standard_error = ").push_bind(calculation.standard_error);
        }
        CalculationField::DataPointsUsed => {
            builder
                .push(", data_points_used = ")
                .push_bind(i32::try_from(calculation.data_points_used).unwrap_or(i32::MAX));
        }
        CalculationField::IsReliable => {
            builder.push(", is_reliable = ").push_bind(calculation.is_reliable);
        }
        CalculationField::ReliabilityNote => {
            builder
                .push(", reliability_note = ")
                .push_bind(calculation.reliability_note.clone());
        }
        CalculationField::AverageDataQuality => {
            builder
                .push(", average_data_quality = ")
                .push_bind(calculation.average_data_quality);
        }
        CalculationField::Metadata => {
            builder.push(", metadata = ").push_bind(calculation.metadata.clone());
        }
        CalculationField::ErrorMessage => {
            builder
                .push(", error_message = ")
                .push_bind(calculation.error_message.clone());
        }
        CalculationField::CompletedAt => {
            builder.push(", completed_at = ").push_bind(calculation.completed_at);
        }
    }
}

#[async_trait]
impl ObservationSource for PgRepository {
    async fn fetch_observations(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_quality: f64,
    ) -> Result<Vec<Observation>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, average_sell_price, total_volume, data_quality_score
            FROM market_snapshots
            WHERE timestamp >= $1 AND timestamp <= $2 AND data_quality_score >= $3
            ORDER BY timestamp ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(min_quality)
        .fetch_all(&self.pool)
        .await?;

        let observations = rows
            .iter()
            .map(|row| {
                let quantity: Option<Decimal> = row.try_get("total_volume")?;
                Ok(Observation {
                    timestamp: row.try_get("timestamp")?,
                    price: row.try_get("average_sell_price")?,
                    quantity: quantity.unwrap_or(Decimal::ZERO),
                    quality_score: row.try_get("data_quality_score")?,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        debug!(%start, %end, min_quality, rows = observations.len(), "Fetched observations");
        Ok(observations)
    }
}

#[async_trait]
impl SnapshotSource for PgRepository {
    async fn fetch_snapshots(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<MarketSnapshot>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, average_sell_price, average_buy_price, total_volume,
                   spread_percentage, num_active_traders, data_quality_score
            FROM market_snapshots
            WHERE timestamp >= $1 AND timestamp <= $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }
}

#[async_trait]
impl CalculationStore for PgRepository {
    async fn insert(&self, calculation: &Calculation) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO elasticity_calculations
                (id, client_ip, method, start_date, end_date, window_size, status, lease_id,
                 data_points_used, is_reliable, average_data_quality, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(calculation.id)
        .bind(&calculation.client_ip)
        .bind(calculation.method.as_str())
        .bind(calculation.start_date)
        .bind(calculation.end_date)
        .bind(calculation.window_size.as_str())
        .bind(calculation.status.as_str())
        .bind(calculation.lease_id)
        .bind(i32::try_from(calculation.data_points_used).unwrap_or(i32::MAX))
        .bind(calculation.is_reliable)
        .bind(calculation.average_data_quality)
        .bind(&calculation.metadata)
        .bind(calculation.created_at)
        .bind(calculation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Calculation>, DbError> {
        let query = format!("SELECT {} FROM elasticity_calculations WHERE id = $1", CALCULATION_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(calculation_from_row).transpose()
    }

    async fn save(&self, calculation: &Calculation, fields: &[CalculationField]) -> Result<(), DbError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE elasticity_calculations SET updated_at = ");
        builder.push_bind(calculation.updated_at);
        for field in fields {
            push_field(&mut builder, calculation, *field);
        }
        builder.push(" WHERE id = ").push_bind(calculation.id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn claim(&self, id: Uuid, lease: Uuid, at: DateTime<Utc>) -> Result<ClaimOutcome, DbError> {
        let query = format!(
            r#"
            UPDATE elasticity_calculations
            SET status = 'PROCESSING', lease_id = $2, updated_at = $3
            WHERE id = $1
              AND (status = 'PENDING' OR (status = 'PROCESSING' AND lease_id = $2))
            RETURNING {}
            "#,
            CALCULATION_COLUMNS
        );
        let claimed = sqlx::query(&query)
            .bind(id)
            .bind(lease)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(calculation_from_row(&row)?));
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM elasticity_calculations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match status {
            None => Ok(ClaimOutcome::NotFound),
            Some(status) => Ok(ClaimOutcome::Busy(status.parse::<CalculationStatus>()?)),
        }
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Calculation>, DbError> {
        let query = format!(
            "SELECT {} FROM elasticity_calculations WHERE status = 'PENDING' ORDER BY created_at ASC LIMIT $1",
            CALCULATION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(calculation_from_row).collect()
    }
}
