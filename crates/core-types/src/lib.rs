//! # Elasticity Core Types
//!
//! Layer 0 of the workspace: the plain data structures every other crate speaks.
//! Nothing in here performs I/O. The only behaviour that lives here is the
//! `Calculation` state machine and request validation, because both are rules
//! about the data itself rather than about any particular service.

pub mod calculation;
pub mod enums;
pub mod error;
pub mod market;
pub mod request;

// Re-export the core types to provide a clean public API.
pub use calculation::{Calculation, CalculationField, CalculationOutput, STORAGE_SCALE, round_for_storage};
pub use enums::{CalculationMethod, CalculationStatus, Classification, WindowSize};
pub use error::CoreError;
pub use market::{MarketSnapshot, Observation, PRIMARY_QUALITY_THRESHOLD, SECONDARY_QUALITY_SCORE, SourceTier};
pub use request::{CalculationRequest, RequestLimits, normalize_to_utc, parse_timestamp};
