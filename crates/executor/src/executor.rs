use crate::attempt::{Attempt, ExecutionMode, ExecutionOutcome};
use crate::calculator::{Calculator, Estimate};
use crate::error::ExecutorError;
use analytics::{MidpointElasticityCalculator, RegressionElasticityCalculator};
use chrono::Utc;
use configuration::Settings;
use core_types::{Calculation, CalculationField, CalculationMethod, CalculationOutput, Observation, round_for_storage};
use database::{CalculationStore, ClaimOutcome, ObservationSource};
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stored with every result. `quantity` is the USDT on offer in open ads.
pub const VOLUME_DISCLAIMER: &str = "Note: 'quantity' is derived from P2P total_volume (advertised offers), \
    not actual traded volume. This is a proxy for market activity, not pure demand. \
    High elasticity values may reflect liquidity fluctuations rather than true price responsiveness.";

/// Drives one calculation from `Pending` to `Completed` or `Failed`.
///
/// The same logic serves inline requests and background workers; only the
/// [`Attempt`] differs.
#[derive(Clone)]
pub struct CalculationExecutor {
    observations: Arc<dyn ObservationSource>,
    store: Arc<dyn CalculationStore>,
    quality_threshold: f64,
    midpoint: MidpointElasticityCalculator,
    regression: RegressionElasticityCalculator,
    midpoint_min_points: usize,
}

impl CalculationExecutor {
    pub fn new(observations: Arc<dyn ObservationSource>, store: Arc<dyn CalculationStore>, settings: &Settings) -> Self {
        Self {
            observations,
            store,
            quality_threshold: settings.data.quality_threshold,
            midpoint: MidpointElasticityCalculator::new(settings.midpoint.clone(), settings.classification.clone()),
            regression: RegressionElasticityCalculator::new(
                settings.regression.clone(),
                settings.classification.clone(),
            ),
            midpoint_min_points: settings.midpoint.min_data_points.max(2),
        }
    }

    pub fn store(&self) -> &Arc<dyn CalculationStore> {
        &self.store
    }

    fn calculator(&self, method: CalculationMethod) -> Calculator<'_> {
        match method {
            CalculationMethod::Midpoint => Calculator::Midpoint(&self.midpoint),
            CalculationMethod::Regression => Calculator::Regression(&self.regression),
        }
    }

    fn min_data_points(&self, method: CalculationMethod) -> usize {
        match method {
            CalculationMethod::Midpoint => self.midpoint_min_points,
            CalculationMethod::Regression => self.regression.min_data_points(),
        }
    }

    /// Runs a calculation inline as a single, final attempt.
    pub async fn execute(&self, id: Uuid) -> Result<ExecutionOutcome, ExecutorError> {
        self.execute_attempt(id, &Attempt::once(ExecutionMode::Sync)).await
    }

    /// Runs one attempt under `attempt.lease`.
    ///
    /// Business failures end the calculation in `Failed` and return `Ok`.
    /// Infrastructure errors are returned. If the attempt is final or the error
    /// is not transient the record is failed first (best effort); otherwise it
    /// stays `Processing` under the lease so the next attempt can resume it.
    pub async fn execute_attempt(&self, id: Uuid, attempt: &Attempt) -> Result<ExecutionOutcome, ExecutorError> {
        let result = self.run_attempt(id, attempt).await;

        if let Err(e) = &result {
            error!(
                calculation_id = %id,
                attempt = attempt.number,
                max_attempts = attempt.max_attempts,
                transient = e.is_transient(),
                error = %e,
                "Calculation attempt failed"
            );
            if attempt.is_final() || !e.is_transient() {
                if let Err(save_err) = self.abandon(id, attempt.lease, &format!("Calculation error: {}", e)).await {
                    error!(calculation_id = %id, error = %save_err, "Failed to save error state");
                }
            }
        }
        result
    }

    /// Fails a calculation that `lease` holds or that is still `Pending`.
    ///
    /// Returns `false` when the record is missing, terminal or held by another
    /// lease, in which case nothing is written.
    pub async fn abandon(&self, id: Uuid, lease: Uuid, message: &str) -> Result<bool, ExecutorError> {
        let mut calculation = match self.store.claim(id, lease, Utc::now()).await? {
            ClaimOutcome::Claimed(calculation) => calculation,
            ClaimOutcome::NotFound | ClaimOutcome::Busy(_) => return Ok(false),
        };
        self.fail(&mut calculation, message).await?;
        Ok(true)
    }

    async fn run_attempt(&self, id: Uuid, attempt: &Attempt) -> Result<ExecutionOutcome, ExecutorError> {
        let mut calculation = match self.store.claim(id, attempt.lease, Utc::now()).await? {
            ClaimOutcome::Claimed(calculation) => calculation,
            ClaimOutcome::NotFound => {
                warn!(calculation_id = %id, "Calculation not found");
                return Ok(ExecutionOutcome::NotFound);
            }
            ClaimOutcome::Busy(status) => {
                info!(calculation_id = %id, status = %status, "Calculation not claimable, skipping");
                return Ok(ExecutionOutcome::Skipped(status));
            }
        };

        info!(
            calculation_id = %id,
            method = %calculation.method,
            start_date = %calculation.start_date,
            end_date = %calculation.end_date,
            attempt = attempt.number,
            execution_mode = %attempt.mode,
            "Starting calculation"
        );

        let start = calculation.start_date;
        let end = calculation.end_date;
        debug!(calculation_id = %id, %start, %end, "Query range (UTC)");

        let observations = self
            .observations
            .fetch_observations(start, end, self.quality_threshold)
            .await?;
        let found = observations.len();
        info!(
            calculation_id = %id,
            quality_threshold = self.quality_threshold,
            snapshot_count = found,
            "Query executed: {} to {}",
            start.date_naive(),
            end.date_naive()
        );

        let method = calculation.method;
        let required = self.min_data_points(method);
        if found == 0 {
            let message = format!(
                "No high-quality data available for the period {} to {}. \
                 Only observations with quality >= {} are used for calculations. \
                 Check that imported data covers this date range.",
                start.date_naive(),
                end.date_naive(),
                self.quality_threshold
            );
            return self.fail(&mut calculation, &message).await;
        }
        if found < required {
            let message = format!(
                "Insufficient high-quality data points for the period {} to {}: found {}, \
                 but {} method requires at least {} observations with quality >= {}. \
                 Try expanding the date range or using a different method.",
                start.date_naive(),
                end.date_naive(),
                found,
                method,
                required,
                self.quality_threshold
            );
            return self.fail(&mut calculation, &message).await;
        }

        let (prices, quantities): (Vec<Decimal>, Vec<Decimal>) =
            observations.iter().map(|o| (o.price, o.quantity)).unzip();

        let estimate = match self.calculator(method).run(&prices, &quantities) {
            Ok(estimate) => estimate,
            Err(e) => return self.fail(&mut calculation, &e.to_string()).await,
        };

        if !estimate.is_reliable {
            warn!(
                calculation_id = %id,
                elasticity = %estimate.elasticity,
                note = estimate.reliability_note.as_deref().unwrap_or_default(),
                "Result flagged as unreliable"
            );
        }

        let elasticity = round_for_storage(estimate.elasticity);
        let classification = estimate.classification;
        let output = self.build_output(&calculation, &observations, estimate, attempt.mode);
        calculation.record_results(output, Utc::now())?;
        self.store.save(&calculation, CalculationField::RESULTS).await?;

        calculation.mark_completed(Utc::now())?;
        self.store.save(&calculation, CalculationField::COMPLETION).await?;

        info!(
            calculation_id = %id,
            method = %method,
            %elasticity,
            classification = %classification,
            data_points = calculation.data_points_used,
            "Completed calculation"
        );
        Ok(ExecutionOutcome::Completed { elasticity, classification })
    }

    fn build_output(
        &self,
        calculation: &Calculation,
        observations: &[Observation],
        estimate: Estimate,
        mode: ExecutionMode,
    ) -> CalculationOutput {
        let qualities = observations.iter().map(|o| o.quality_score);
        let average_quality = qualities.clone().sum::<f64>() / observations.len().max(1) as f64;
        let min_quality = qualities.fold(f64::INFINITY, f64::min);

        let mut metadata = Map::new();
        metadata.insert("method_details".to_string(), estimate.method_details);
        metadata.insert(
            "data_quality".to_string(),
            json!({
                "avg_quality": average_quality,
                "min_quality": min_quality,
                "quality_threshold": self.quality_threshold,
            }),
        );
        metadata.insert(
            "query_info".to_string(),
            json!({
                "start_date_utc": calculation.start_date.to_rfc3339(),
                "end_date_utc": calculation.end_date.to_rfc3339(),
                "snapshots_found": observations.len(),
            }),
        );
        let (extra_key, extra) = estimate.extra;
        metadata.insert(extra_key.to_string(), extra);
        metadata.insert("volume_disclaimer".to_string(), json!(VOLUME_DISCLAIMER));
        metadata.insert("execution_mode".to_string(), json!(mode.as_str()));

        CalculationOutput {
            elasticity_coefficient: estimate.elasticity,
            classification: estimate.classification,
            confidence_interval: estimate.confidence_interval,
            r_squared: estimate.r_squared,
            standard_error: estimate.standard_error,
            data_points_used: u32::try_from(observations.len()).unwrap_or(u32::MAX),
            is_reliable: estimate.is_reliable,
            reliability_note: estimate.reliability_note,
            average_data_quality: average_quality,
            metadata: JsonValue::Object(metadata),
        }
    }

    async fn fail(&self, calculation: &mut Calculation, message: &str) -> Result<ExecutionOutcome, ExecutorError> {
        calculation.mark_failed(message, Utc::now())?;
        self.store.save(calculation, CalculationField::FAILURE).await?;
        warn!(calculation_id = %calculation.id, error_message = message, "Calculation FAILED");
        Ok(ExecutionOutcome::Failed {
            error: message.to_string(),
        })
    }
}
