use crate::classification::classify;
use crate::error::AnalyticsError;
use crate::numeric::{HUNDRED, checked_div, checked_midpoint};
use configuration::{ClassificationBands, MidpointParams};
use core_types::Classification;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of one arc-elasticity calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MidpointResult {
    pub elasticity: Decimal,
    pub abs_value: Decimal,
    pub classification: Classification,
    /// Signed, relative to the midpoint.
    pub percentage_change_quantity: Decimal,
    /// Signed, relative to the midpoint.
    pub percentage_change_price: Decimal,
    pub quantity_change: Decimal,
    pub price_change: Decimal,
    pub is_reliable: bool,
    pub reliability_note: Option<String>,
    pub endpoints: Endpoints,
    /// Present only when computed from a series.
    pub series: Option<SeriesSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoints {
    pub price_initial: Decimal,
    pub price_final: Decimal,
    pub quantity_initial: Decimal,
    pub quantity_final: Decimal,
    pub price_midpoint: Decimal,
    pub quantity_midpoint: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub data_points_used: usize,
    pub initial_point: PricePoint,
    pub final_point: PricePoint,
}

/// Arc elasticity between two price/quantity points:
/// `E = ((Q2 - Q1) / Qmid) / ((P2 - P1) / Pmid)`.
#[derive(Debug, Clone, Default)]
pub struct MidpointElasticityCalculator {
    params: MidpointParams,
    bands: ClassificationBands,
}

impl MidpointElasticityCalculator {
    pub fn new(params: MidpointParams, bands: ClassificationBands) -> Self {
        Self { params, bands }
    }

    pub fn calculate(
        &self,
        quantity_initial: Decimal,
        quantity_final: Decimal,
        price_initial: Decimal,
        price_final: Decimal,
    ) -> Result<MidpointResult, AnalyticsError> {
        if price_initial <= Decimal::ZERO || price_final <= Decimal::ZERO {
            return Err(AnalyticsError::InvalidInput("Prices must be positive".to_string()));
        }
        if quantity_initial < Decimal::ZERO || quantity_final < Decimal::ZERO {
            return Err(AnalyticsError::InvalidInput("Quantities must be non-negative".to_string()));
        }

        let price_change = price_final - price_initial;
        if price_change.is_zero() {
            return Err(AnalyticsError::UndefinedElasticity(
                "Price change cannot be zero".to_string(),
            ));
        }

        let quantity_midpoint = checked_midpoint(quantity_initial, quantity_final, "quantity midpoint")?;
        let price_midpoint = checked_midpoint(price_initial, price_final, "price midpoint")?;
        let quantity_change = quantity_final - quantity_initial;

        let price_ratio = checked_div(price_change, price_midpoint, "price change ratio")?;
        let abs_pct_price = price_ratio.abs() * HUNDRED;

        debug!(
            %price_initial, %price_final, %price_change,
            pct_change_price = %abs_pct_price.round_dp(2),
            %quantity_initial, %quantity_final, %quantity_change,
            "Midpoint elasticity inputs"
        );

        if abs_pct_price < self.params.min_price_variation_pct {
            return Err(AnalyticsError::InsufficientVariation {
                actual: abs_pct_price,
                minimum: self.params.min_price_variation_pct,
                from: price_initial,
                to: price_final,
            });
        }

        if quantity_midpoint.is_zero() {
            return Err(AnalyticsError::UndefinedElasticity(
                "Quantity midpoint is zero".to_string(),
            ));
        }

        let quantity_ratio = checked_div(quantity_change, quantity_midpoint, "quantity change ratio")?;
        let elasticity = checked_div(quantity_ratio, price_ratio, "elasticity")?;
        let abs_value = elasticity.abs();
        let classification = classify(abs_value, &self.bands);

        if let Some(ceiling) = self.params.reject_elasticity_above {
            if abs_value > ceiling {
                return Err(AnalyticsError::UnreasonableElasticity {
                    value: abs_value,
                    ceiling,
                });
            }
        }

        let max = self.params.max_reasonable_elasticity;
        let is_reliable = abs_value <= max;
        let reliability_note = if is_reliable {
            None
        } else {
            let note = format!(
                "Elasticity coefficient |{:.2}| exceeds reasonable range (|{}|). \
                 This may indicate: (1) price variation too small ({:.2}%), \
                 (2) volume changes driven by factors other than price, \
                 (3) insufficient data quality. Interpret with caution.",
                abs_value, max, abs_pct_price
            );
            warn!(elasticity = %elasticity.round_dp(4), "Unreliable midpoint elasticity");
            Some(note)
        };

        info!(
            elasticity = %elasticity.round_dp(4),
            classification = classification.as_str(),
            is_reliable,
            "Midpoint elasticity calculated"
        );

        Ok(MidpointResult {
            elasticity,
            abs_value,
            classification,
            percentage_change_quantity: quantity_ratio * HUNDRED,
            percentage_change_price: price_ratio * HUNDRED,
            quantity_change,
            price_change,
            is_reliable,
            reliability_note,
            endpoints: Endpoints {
                price_initial,
                price_final,
                quantity_initial,
                quantity_final,
                price_midpoint,
                quantity_midpoint,
            },
            series: None,
        })
    }

    /// Uses only the first and last observation of the series.
    pub fn calculate_from_series(
        &self,
        prices: &[Decimal],
        quantities: &[Decimal],
    ) -> Result<MidpointResult, AnalyticsError> {
        if prices.len() != quantities.len() {
            return Err(AnalyticsError::InvalidInput(
                "Prices and quantities must have same length".to_string(),
            ));
        }
        let required = self.params.min_data_points.max(2);
        if prices.len() < required {
            return Err(AnalyticsError::InvalidInput(format!(
                "Need at least {} data points for elasticity calculation, got {}",
                required,
                prices.len()
            )));
        }

        let last = prices.len() - 1;
        let initial_point = PricePoint {
            price: prices[0],
            quantity: quantities[0],
        };
        let final_point = PricePoint {
            price: prices[last],
            quantity: quantities[last],
        };

        let mut result = self.calculate(
            initial_point.quantity,
            final_point.quantity,
            initial_point.price,
            final_point.price,
        )?;
        result.series = Some(SeriesSummary {
            data_points_used: prices.len(),
            initial_point,
            final_point,
        });

        Ok(result)
    }
}
