//! # Elasticity Analytics Crate
//!
//! The price elasticity estimators for the USDT/BOB market.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** A pure logic crate. It has no knowledge of storage or
//!   scheduling and depends only on `core-types` and `configuration`.
//! - **Decimal First:** Every ratio and log-space sum is computed with
//!   `rust_decimal`. `f64` is used only where a probability distribution is
//!   evaluated, and converted back through checked helpers so a NaN can never
//!   reach a result.
//! - **Stateless Calculation:** Calculators hold their parameters and nothing
//!   else, so one instance can be shared across tasks.
//!
//! ## Public API
//!
//! - `MidpointElasticityCalculator`: arc elasticity between two endpoints.
//! - `RegressionElasticityCalculator`: OLS on `ln(q) = a + b * ln(p)`.
//! - `shapiro_wilk`: residual normality test used by regression diagnostics.
//! - `classify`: maps `|E|` onto elastic, inelastic or unitary.
//! - `AnalyticsError`: the distinct failure causes of both estimators.

pub mod classification;
pub mod error;
pub mod midpoint;
pub mod normality;
pub mod numeric;
pub mod regression;

pub use classification::classify;
pub use error::AnalyticsError;
pub use midpoint::{Endpoints, MidpointElasticityCalculator, MidpointResult, PricePoint, SeriesSummary};
pub use normality::{ShapiroWilk, shapiro_wilk};
pub use regression::{Diagnostics, RegressionElasticityCalculator, RegressionResult};
