//! # Elasticity Worker Crate
//!
//! Runs calculations either inline or in the background, with the retry and
//! timeout rules that make background execution safe.
//!
//! ## Architectural Principles
//!
//! - **One Executor, Two Modes:** Sync and async execution call the same
//!   `CalculationExecutor`; only the attempt metadata differs.
//! - **At-Least-Once:** Queued work is retried with exponential backoff, but
//!   only for transient infrastructure errors and attempt timeouts. A business
//!   failure is final on the first attempt.
//! - **Graceful Degradation:** When the queue cannot take a job, dispatch
//!   falls back to running it inline.
//!
//! ## Public API
//!
//! - `Dispatcher`: worker pool plus the sync/async `dispatch` entry point.
//! - `Poller`: submits `Pending` calculations found in the store.
//! - `run_task` / `TaskOutcome` / `TaskReport`: the retry loop for one calculation.
//! - `RetryPolicy` / `Backoff`: the retry schedule.
//! - `DispatchError` / `AttemptError`: the specific error types of this crate.

pub mod dispatcher;
pub mod error;
pub mod poller;
pub mod retry;
pub mod task;

#[cfg(test)]
mod testing;

pub use dispatcher::{DispatchMode, Dispatched, Dispatcher, JobHandle};
pub use error::{AttemptError, DispatchError};
pub use poller::Poller;
pub use retry::{Backoff, RetryPolicy};
pub use task::{TaskOutcome, TaskReport, run_task};
