//! # Elasticity Aggregation Crate
//!
//! Turns irregular market snapshots into hourly, daily or weekly series for
//! charts. Independent of the elasticity pipeline and never writes anything.
//!
//! Daily and weekly buckets are keyed by their UTC start (midnight, or Monday
//! midnight for ISO weeks). Offer levels are averaged, never summed, because
//! `total_volume` is a stock of open ads rather than traded volume. Empty
//! buckets are omitted rather than filled.

pub mod bucket;
pub mod error;
pub mod query;
pub mod service;

pub use bucket::{AggregatedPoint, Provenance, aggregate_points, bucket_start};
pub use error::AggregationError;
pub use query::{AggregationQuery, Granularity, SourceFilter, TimeRange};
pub use service::{AggregationResult, AggregationService, summarize};
