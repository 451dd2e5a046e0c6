//! # Elasticity Executor Crate
//!
//! This crate runs a persisted `Calculation` through its lifecycle: claim it,
//! read the eligible observations, hand them to the estimator its method
//! names, and write the outcome back.
//!
//! ## Architectural Principles
//!
//! - **Storage Agnostic:** The executor talks to `ObservationSource` and
//!   `CalculationStore` trait objects, so the PostgreSQL and in-memory adapters
//!   are interchangeable.
//! - **Always Terminal:** A calculation whose final attempt ends, for whatever
//!   reason, is left `Completed` or `Failed` with a message, never in
//!   `Pending` or `Processing`.
//! - **Lease Based Claims:** Each attempt carries a lease. A record held by
//!   another lease is skipped; a retry with the same lease resumes it.
//!
//! ## Public API
//!
//! - `CalculationExecutor`: the state machine driver.
//! - `Attempt` / `ExecutionMode`: who is running the calculation and how.
//! - `ExecutionOutcome`: what an attempt did to the record.
//! - `Calculator`: the closed set of estimators.
//! - `ExecutorError`: infrastructure failures, classified transient or not.

pub mod attempt;
pub mod calculator;
pub mod error;
pub mod executor;

pub use attempt::{Attempt, ExecutionMode, ExecutionOutcome};
pub use calculator::{Calculator, Estimate};
pub use error::ExecutorError;
pub use executor::{CalculationExecutor, VOLUME_DISCLAIMER};
