use crate::classification::classify;
use crate::error::AnalyticsError;
use crate::normality::{self, ShapiroWilk};
use crate::numeric::{checked_div, checked_mul_add, from_f64, ln_all, mean, population_std_dev, to_f64};
use configuration::{ClassificationBands, RegressionParams};
use core_types::Classification;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, info};

/// Outcome of a log-log OLS fit where the slope is the elasticity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    pub elasticity: Decimal,
    pub abs_value: Decimal,
    pub classification: Classification,
    pub intercept: Decimal,
    pub r_value: Decimal,
    pub r_squared: Decimal,
    pub standard_error: Decimal,
    pub p_value: f64,
    pub confidence_interval: (Decimal, Decimal),
    pub confidence_level: f64,
    pub is_significant: bool,
    pub n_observations: usize,
    pub degrees_freedom: usize,
    /// No ceiling applies to regression estimates.
    pub is_reliable: bool,
}

/// Advisory checks on the fitted model. Never gates a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub linearity_correlation: f64,
    pub linearity_adequate: bool,
    pub residuals_mean: f64,
    pub residuals_std: f64,
    pub normality_statistic: Option<f64>,
    pub normality_p_value: Option<f64>,
}

/// Sums of squares and the fitted line, all in log space.
struct Fit {
    slope: Decimal,
    intercept: Decimal,
    r: Decimal,
    sxx: Decimal,
    syy: Decimal,
    log_prices: Vec<Decimal>,
    log_quantities: Vec<Decimal>,
}

impl Fit {
    fn new(prices: &[Decimal], quantities: &[Decimal]) -> Result<Self, AnalyticsError> {
        let log_prices = ln_all(prices, "prices")?;
        let log_quantities = ln_all(quantities, "quantities")?;

        let mx = mean(&log_prices, "log price")?;
        let my = mean(&log_quantities, "log quantity")?;

        let mut sxx = Decimal::ZERO;
        let mut syy = Decimal::ZERO;
        let mut sxy = Decimal::ZERO;
        for (x, y) in log_prices.iter().zip(&log_quantities) {
            let dx = *x - mx;
            let dy = *y - my;
            sxx = checked_mul_add(sxx, dx, dx, "Sxx")?;
            syy = checked_mul_add(syy, dy, dy, "Syy")?;
            sxy = checked_mul_add(sxy, dx, dy, "Sxy")?;
        }

        if sxx.is_zero() {
            return Err(AnalyticsError::InsufficientVariance {
                std_dev: Decimal::ZERO,
                minimum: Decimal::ZERO,
            });
        }

        let slope = checked_div(sxy, sxx, "slope")?;
        let intercept = my - slope * mx;

        // A constant quantity series carries no correlation.
        let r = if syy.is_zero() {
            Decimal::ZERO
        } else {
            let denominator = sxx
                .checked_mul(syy)
                .and_then(|product| product.sqrt())
                .ok_or_else(|| AnalyticsError::Calculation("sqrt of Sxx*Syy failed".to_string()))?;
            checked_div(sxy, denominator, "correlation")?.clamp(Decimal::NEGATIVE_ONE, Decimal::ONE)
        };

        Ok(Self {
            slope,
            intercept,
            r,
            sxx,
            syy,
            log_prices,
            log_quantities,
        })
    }

    fn residuals(&self) -> Vec<Decimal> {
        self.log_prices
            .iter()
            .zip(&self.log_quantities)
            .map(|(x, y)| *y - (self.intercept + self.slope * *x))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegressionElasticityCalculator {
    params: RegressionParams,
    bands: ClassificationBands,
}

impl RegressionElasticityCalculator {
    pub fn new(params: RegressionParams, bands: ClassificationBands) -> Self {
        Self { params, bands }
    }

    pub fn min_data_points(&self) -> usize {
        self.params.min_data_points
    }

    /// Fits `ln(q) = a + b * ln(p)` and reports `b` with its inference statistics.
    pub fn calculate(&self, prices: &[Decimal], quantities: &[Decimal]) -> Result<RegressionResult, AnalyticsError> {
        self.validate_inputs(prices, quantities)?;

        let n = prices.len();
        let df = n - 2;
        let fit = Fit::new(prices, quantities)?;

        let r_squared = fit.r * fit.r;
        let unexplained = (Decimal::ONE - r_squared).max(Decimal::ZERO);
        let slope_variance = checked_div(unexplained * fit.syy, fit.sxx * Decimal::from(df), "slope variance")?;
        let standard_error = slope_variance
            .sqrt()
            .ok_or_else(|| AnalyticsError::Calculation("negative slope variance".to_string()))?;

        let t_dist = StudentsT::new(0.0, 1.0, df as f64)
            .map_err(|e| AnalyticsError::Calculation(format!("Student-t with {} df: {}", df, e)))?;

        let r = to_f64(fit.r)?;
        let p_value = if r.abs() >= 1.0 {
            0.0
        } else {
            let t = r * (df as f64 / ((1.0 - r) * (1.0 + r))).sqrt();
            (2.0 * t_dist.sf(t.abs())).min(1.0)
        };

        let level = self.params.confidence_level;
        let t_critical = from_f64(t_dist.inverse_cdf((1.0 + level) / 2.0), "critical t value")?;
        let margin = t_critical * standard_error;

        let elasticity = fit.slope;
        let abs_value = elasticity.abs();
        let classification = classify(abs_value, &self.bands);
        let is_significant = p_value < self.params.significance_level;

        info!(
            elasticity = %elasticity.round_dp(4),
            r_squared = %r_squared.round_dp(4),
            p_value,
            n_observations = n,
            "Regression elasticity calculated"
        );

        Ok(RegressionResult {
            elasticity,
            abs_value,
            classification,
            intercept: fit.intercept,
            r_value: fit.r,
            r_squared,
            standard_error,
            p_value,
            confidence_interval: (elasticity - margin, elasticity + margin),
            confidence_level: level,
            is_significant,
            n_observations: n,
            degrees_freedom: df,
            is_reliable: true,
        })
    }

    /// Same as [`calculate`](Self::calculate) for `(price, quantity)` pairs.
    pub fn calculate_with_time_series(&self, pairs: &[(Decimal, Decimal)]) -> Result<RegressionResult, AnalyticsError> {
        if pairs.len() < self.params.min_data_points {
            return Err(AnalyticsError::InsufficientData {
                required: self.params.min_data_points,
                actual: pairs.len(),
            });
        }
        let (prices, quantities): (Vec<Decimal>, Vec<Decimal>) = pairs.iter().copied().unzip();
        self.calculate(&prices, &quantities)
    }

    /// Linearity, residual spread and residual normality of the log-log fit.
    pub fn validate_assumptions(&self, prices: &[Decimal], quantities: &[Decimal]) -> Result<Diagnostics, AnalyticsError> {
        if prices.len() != quantities.len() {
            return Err(AnalyticsError::InvalidInput(
                "Prices and quantities must have same length".to_string(),
            ));
        }
        if prices.len() < 2 {
            return Err(AnalyticsError::InsufficientData {
                required: 2,
                actual: prices.len(),
            });
        }

        let fit = Fit::new(prices, quantities)?;
        let residuals = fit.residuals();
        let residuals_f64 = residuals.iter().map(|r| to_f64(*r)).collect::<Result<Vec<_>, _>>()?;

        let correlation = to_f64(fit.r)?;
        let residuals_mean = to_f64(mean(&residuals, "residual")?)?;
        let residuals_std = to_f64(population_std_dev(&residuals, "residual")?)?;

        let normality = normality::shapiro_wilk(&residuals_f64);
        if normality.is_none() {
            debug!(n = residuals_f64.len(), "Normality test skipped for residuals");
        }

        Ok(Diagnostics {
            linearity_correlation: correlation,
            linearity_adequate: correlation.abs() > self.params.linearity_threshold,
            residuals_mean,
            residuals_std,
            normality_statistic: normality.map(|s: ShapiroWilk| s.statistic),
            normality_p_value: normality.map(|s| s.p_value),
        })
    }

    fn validate_inputs(&self, prices: &[Decimal], quantities: &[Decimal]) -> Result<(), AnalyticsError> {
        if prices.len() != quantities.len() {
            return Err(AnalyticsError::InvalidInput(
                "Prices and quantities must have same length".to_string(),
            ));
        }

        let required = self.params.min_data_points.max(3);
        if prices.len() < required {
            return Err(AnalyticsError::InsufficientData {
                required,
                actual: prices.len(),
            });
        }

        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(AnalyticsError::NonPositiveValue("prices"));
        }
        if quantities.iter().any(|q| *q <= Decimal::ZERO) {
            return Err(AnalyticsError::NonPositiveValue("quantities"));
        }

        let std_dev = population_std_dev(prices, "price")?;
        if std_dev < self.params.min_price_std_dev {
            return Err(AnalyticsError::InsufficientVariance {
                std_dev,
                minimum: self.params.min_price_std_dev,
            });
        }

        Ok(())
    }
}
