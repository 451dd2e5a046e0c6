//! # Elasticity Database Crate
//!
//! The storage boundary of the elasticity engine: market snapshots in, calculation
//! records in and out.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** Services depend on the traits in [`store`], never on
//!   `sqlx` types. Persistence technology stays behind them.
//! - **Two Implementations:** `PgRepository` for production (runtime-checked
//!   queries against a pooled `PgPool`) and `MemoryRepository` for tests and
//!   single-process runs. Both honour the same claim and partial-update contracts.
//! - **Asynchronous & Pooled:** All operations are asynchronous.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool setup and embedded schema migrations.
//! - `ObservationSource`, `SnapshotSource`, `CalculationStore`: the storage traits.
//! - `ClaimOutcome`: result of taking the `Processing` lease on a calculation.
//! - `DbError`: storage failures, with `is_transient()` for retry decisions.

pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryRepository;
pub use postgres::PgRepository;
pub use store::{CalculationStore, ClaimOutcome, ObservationSource, SnapshotSource};
