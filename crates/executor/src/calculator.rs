use analytics::{AnalyticsError, MidpointElasticityCalculator, RegressionElasticityCalculator};
use core_types::{CalculationMethod, Classification};
use rust_decimal::Decimal;
use serde_json::{Value as JsonValue, json};
use tracing::warn;

/// The estimator chosen for a calculation, selected once from its method.
#[derive(Debug, Clone, Copy)]
pub enum Calculator<'a> {
    Midpoint(&'a MidpointElasticityCalculator),
    Regression(&'a RegressionElasticityCalculator),
}

/// Method-independent view of an estimator's result.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub elasticity: Decimal,
    pub classification: Classification,
    pub confidence_interval: Option<(Decimal, Decimal)>,
    pub r_squared: Option<Decimal>,
    pub standard_error: Option<Decimal>,
    pub is_reliable: bool,
    pub reliability_note: Option<String>,
    /// The full estimator result.
    pub method_details: JsonValue,
    /// `price_quantity_changes` for midpoint, `diagnostics` for regression.
    pub extra: (&'static str, JsonValue),
}

impl Calculator<'_> {
    pub fn method(&self) -> CalculationMethod {
        match self {
            Calculator::Midpoint(_) => CalculationMethod::Midpoint,
            Calculator::Regression(_) => CalculationMethod::Regression,
        }
    }

    pub fn run(&self, prices: &[Decimal], quantities: &[Decimal]) -> Result<Estimate, AnalyticsError> {
        match self {
            Calculator::Midpoint(calc) => {
                let result = calc.calculate_from_series(prices, quantities)?;
                let changes = json!({
                    "percentage_change_price": result.percentage_change_price,
                    "percentage_change_quantity": result.percentage_change_quantity,
                    "price_change": result.price_change,
                    "quantity_change": result.quantity_change,
                });
                Ok(Estimate {
                    elasticity: result.elasticity,
                    classification: result.classification,
                    confidence_interval: None,
                    r_squared: None,
                    standard_error: None,
                    is_reliable: result.is_reliable,
                    reliability_note: result.reliability_note.clone(),
                    method_details: to_json(&result),
                    extra: ("price_quantity_changes", changes),
                })
            }
            Calculator::Regression(calc) => {
                let result = calc.calculate(prices, quantities)?;
                let diagnostics = match calc.validate_assumptions(prices, quantities) {
                    Ok(d) => to_json(&d),
                    Err(e) => {
                        warn!(error = %e, "Regression diagnostics unavailable");
                        JsonValue::Null
                    }
                };
                Ok(Estimate {
                    elasticity: result.elasticity,
                    classification: result.classification,
                    confidence_interval: Some(result.confidence_interval),
                    r_squared: Some(result.r_squared),
                    standard_error: Some(result.standard_error),
                    is_reliable: result.is_reliable,
                    reliability_note: None,
                    method_details: to_json(&result),
                    extra: ("diagnostics", diagnostics),
                })
            }
        }
    }
}

// Result types hold only decimals, numbers and strings, so this cannot fail in
// practice; a failure is logged and leaves the detail out.
fn to_json<T: serde::Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Could not serialize estimator details");
        JsonValue::Null
    })
}
