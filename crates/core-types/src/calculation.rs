use crate::enums::{CalculationMethod, CalculationStatus, Classification, WindowSize};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Number of decimal places every persisted coefficient and statistic carries.
pub const STORAGE_SCALE: u32 = 4;

/// Rounds a value to the persisted scale, half away from zero.
pub fn round_for_storage(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(STORAGE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// The persisted record of one elasticity calculation.
///
/// Created `Pending` at the request boundary and mutated only through the
/// state-machine methods below, which the executor drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub id: Uuid,
    pub client_ip: Option<String>,

    // Inputs
    pub method: CalculationMethod,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub window_size: WindowSize,

    pub status: CalculationStatus,
    /// The attempt currently holding (or that last held) the `Processing` state.
    pub lease_id: Option<Uuid>,

    // Results, only populated on completion
    pub elasticity_coefficient: Option<Decimal>,
    pub classification: Option<Classification>,
    pub confidence_interval_lower: Option<Decimal>,
    pub confidence_interval_upper: Option<Decimal>,
    pub r_squared: Option<Decimal>,
    pub standard_error: Option<Decimal>,
    pub data_points_used: u32,
    pub is_reliable: bool,
    pub reliability_note: Option<String>,
    pub average_data_quality: f64,
    pub metadata: JsonValue,

    // Failure info
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A column of the calculation record, used for partial updates.
///
/// `updated_at` is not listed: every save touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculationField {
    Status,
    LeaseId,
    ElasticityCoefficient,
    Classification,
    ConfidenceInterval,
    RSquared,
    StandardError,
    DataPointsUsed,
    IsReliable,
    ReliabilityNote,
    AverageDataQuality,
    Metadata,
    ErrorMessage,
    CompletedAt,
}

impl CalculationField {
    /// Fields written by the `Pending -> Processing` claim.
    pub const CLAIM: &'static [CalculationField] = &[CalculationField::Status, CalculationField::LeaseId];

    /// Fields written when results are recorded.
    pub const RESULTS: &'static [CalculationField] = &[
        CalculationField::ElasticityCoefficient,
        CalculationField::Classification,
        CalculationField::ConfidenceInterval,
        CalculationField::RSquared,
        CalculationField::StandardError,
        CalculationField::DataPointsUsed,
        CalculationField::IsReliable,
        CalculationField::ReliabilityNote,
        CalculationField::AverageDataQuality,
        CalculationField::Metadata,
    ];

    /// Fields written by `mark_completed`.
    pub const COMPLETION: &'static [CalculationField] =
        &[CalculationField::Status, CalculationField::CompletedAt];

    /// Fields written by `mark_failed`.
    pub const FAILURE: &'static [CalculationField] = &[
        CalculationField::Status,
        CalculationField::ErrorMessage,
        CalculationField::CompletedAt,
    ];
}

/// Everything a successful calculation writes onto the record.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationOutput {
    pub elasticity_coefficient: Decimal,
    pub classification: Classification,
    pub confidence_interval: Option<(Decimal, Decimal)>,
    pub r_squared: Option<Decimal>,
    pub standard_error: Option<Decimal>,
    pub data_points_used: u32,
    pub is_reliable: bool,
    pub reliability_note: Option<String>,
    pub average_data_quality: f64,
    pub metadata: JsonValue,
}

impl Calculation {
    /// Creates a new `Pending` record. Validation happens in `CalculationRequest`.
    pub fn new_pending(
        method: CalculationMethod,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        window_size: WindowSize,
        client_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_ip,
            method,
            start_date,
            end_date,
            window_size,
            status: CalculationStatus::Pending,
            lease_id: None,
            elasticity_coefficient: None,
            classification: None,
            confidence_interval_lower: None,
            confidence_interval_upper: None,
            r_squared: None,
            standard_error: None,
            data_points_used: 0,
            is_reliable: true,
            reliability_note: None,
            average_data_quality: 1.0,
            metadata: JsonValue::Object(Default::default()),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == CalculationStatus::Completed
    }

    pub fn has_error(&self) -> bool {
        self.status == CalculationStatus::Failed
    }

    pub fn elasticity_magnitude(&self) -> Option<Decimal> {
        self.elasticity_coefficient.map(|e| e.abs())
    }

    fn transition(&mut self, next: CalculationStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Claims the record for an attempt.
    ///
    /// A `Pending` record is claimed outright. A `Processing` record can only be
    /// resumed by the attempt whose lease already holds it.
    pub fn begin_processing(&mut self, lease: Uuid, now: DateTime<Utc>) -> Result<(), CoreError> {
        match self.status {
            CalculationStatus::Processing if self.lease_id == Some(lease) => {
                self.updated_at = now;
                Ok(())
            }
            CalculationStatus::Processing => Err(CoreError::LeaseMismatch(
                self.lease_id.map(|l| l.to_string()).unwrap_or_else(|| "none".to_string()),
            )),
            _ => {
                self.transition(CalculationStatus::Processing, now)?;
                self.lease_id = Some(lease);
                Ok(())
            }
        }
    }

    /// Writes the results of a successful run. All decimals are rounded to the
    /// persisted scale here, once.
    pub fn record_results(&mut self, output: CalculationOutput, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.status != CalculationStatus::Processing {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: CalculationStatus::Completed,
            });
        }
        self.elasticity_coefficient = Some(round_for_storage(output.elasticity_coefficient));
        self.classification = Some(output.classification);
        self.confidence_interval_lower = output.confidence_interval.map(|(lo, _)| round_for_storage(lo));
        self.confidence_interval_upper = output.confidence_interval.map(|(_, hi)| round_for_storage(hi));
        self.r_squared = output.r_squared.map(round_for_storage);
        self.standard_error = output.standard_error.map(round_for_storage);
        self.data_points_used = output.data_points_used;
        self.is_reliable = output.is_reliable;
        self.reliability_note = output.reliability_note;
        self.average_data_quality = output.average_data_quality;
        self.metadata = output.metadata;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(CalculationStatus::Completed, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(CalculationStatus::Failed, now)?;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Copies the listed fields (plus `updated_at`) from `other` onto `self`.
    ///
    /// Storage adapters without column-level updates use this to honour a
    /// partial save.
    pub fn apply_fields(&mut self, other: &Calculation, fields: &[CalculationField]) {
        for field in fields {
            match field {
                CalculationField::Status => self.status = other.status,
                CalculationField::LeaseId => self.lease_id = other.lease_id,
                CalculationField::ElasticityCoefficient => {
                    self.elasticity_coefficient = other.elasticity_coefficient
                }
                CalculationField::Classification => self.classification = other.classification,
                CalculationField::ConfidenceInterval => {
                    self.confidence_interval_lower = other.confidence_interval_lower;
                    self.confidence_interval_upper = other.confidence_interval_upper;
                }
                CalculationField::RSquared => self.r_squared = other.r_squared,
                CalculationField::StandardError => self.standard_error = other.standard_error,
                CalculationField::DataPointsUsed => self.data_points_used = other.data_points_used,
                CalculationField::IsReliable => self.is_reliable = other.is_reliable,
                CalculationField::ReliabilityNote => self.reliability_note = other.reliability_note.clone(),
                CalculationField::AverageDataQuality => {
                    self.average_data_quality = other.average_data_quality
                }
                CalculationField::Metadata => self.metadata = other.metadata.clone(),
                CalculationField::ErrorMessage => self.error_message = other.error_message.clone(),
                CalculationField::CompletedAt => self.completed_at = other.completed_at,
            }
        }
        self.updated_at = other.updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn pending() -> Calculation {
        let now = Utc.with_ymd_and_hms(2025, 11, 20, 9, 0, 0).unwrap();
        Calculation::new_pending(
            CalculationMethod::Midpoint,
            Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 18, 23, 59, 59).unwrap(),
            WindowSize::Daily,
            None,
            now,
        )
    }

    fn output(coefficient: Decimal) -> CalculationOutput {
        CalculationOutput {
            elasticity_coefficient: coefficient,
            classification: Classification::Inelastic,
            confidence_interval: None,
            r_squared: None,
            standard_error: None,
            data_points_used: 2,
            is_reliable: true,
            reliability_note: None,
            average_data_quality: 0.97,
            metadata: json!({}),
        }
    }

    #[test]
    fn test_happy_path_goes_through_processing() {
        let mut calc = pending();
        let lease = Uuid::new_v4();
        let now = Utc::now();

        calc.begin_processing(lease, now).unwrap();
        assert_eq!(calc.status, CalculationStatus::Processing);
        assert_eq!(calc.lease_id, Some(lease));

        calc.record_results(output(dec!(-0.87341)), now).unwrap();
        calc.mark_completed(now).unwrap();
        assert!(calc.is_complete());
        assert_eq!(calc.completed_at, Some(now));
        assert_eq!(calc.elasticity_coefficient, Some(dec!(-0.8734)));
    }

    #[test]
    fn test_cannot_complete_or_fail_without_processing() {
        let mut calc = pending();
        assert!(calc.mark_completed(Utc::now()).is_err());
        assert!(calc.mark_failed("boom", Utc::now()).is_err());
        assert!(calc.record_results(output(dec!(1)), Utc::now()).is_err());
        assert_eq!(calc.status, CalculationStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_never_reentered() {
        let mut calc = pending();
        let lease = Uuid::new_v4();
        calc.begin_processing(lease, Utc::now()).unwrap();
        calc.mark_failed("no data", Utc::now()).unwrap();

        assert!(calc.begin_processing(lease, Utc::now()).is_err());
        assert!(calc.mark_completed(Utc::now()).is_err());
        assert_eq!(calc.error_message.as_deref(), Some("no data"));
    }

    #[test]
    fn test_processing_record_is_only_resumable_by_its_lease() {
        let mut calc = pending();
        let owner = Uuid::new_v4();
        calc.begin_processing(owner, Utc::now()).unwrap();

        let intruder = Uuid::new_v4();
        assert!(matches!(calc.begin_processing(intruder, Utc::now()), Err(CoreError::LeaseMismatch(_))));
        assert!(calc.begin_processing(owner, Utc::now()).is_ok());
    }

    #[test]
    fn test_storage_rounding_is_half_away_from_zero() {
        assert_eq!(round_for_storage(dec!(-0.87345)), dec!(-0.8735));
        assert_eq!(round_for_storage(dec!(0.12344)), dec!(0.1234));
        assert_eq!(round_for_storage(dec!(-0.8734)), dec!(-0.8734));
    }

    #[test]
    fn test_coefficient_survives_json_round_trip_exactly() {
        let mut calc = pending();
        calc.begin_processing(Uuid::new_v4(), Utc::now()).unwrap();
        calc.record_results(output(dec!(-0.8734)), Utc::now()).unwrap();

        let encoded = serde_json::to_string(&calc).unwrap();
        let decoded: Calculation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.elasticity_coefficient, Some(dec!(-0.8734)));
        assert_eq!(decoded.elasticity_coefficient.unwrap().to_string(), "-0.8734");
    }

    #[test]
    fn test_apply_fields_only_copies_listed_columns() {
        let mut stored = pending();
        let mut working = stored.clone();
        working.begin_processing(Uuid::new_v4(), Utc::now()).unwrap();
        working.error_message = Some("not saved".to_string());

        stored.apply_fields(&working, CalculationField::CLAIM);
        assert_eq!(stored.status, CalculationStatus::Processing);
        assert_eq!(stored.lease_id, working.lease_id);
        assert_eq!(stored.error_message, None);
        assert_eq!(stored.updated_at, working.updated_at);
    }
}
