//! Decimal helpers shared by the estimators.

use crate::error::AnalyticsError;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

pub(crate) const HUNDRED: Decimal = Decimal::ONE_HUNDRED;
pub(crate) const TWO: Decimal = Decimal::TWO;

fn overflow(what: &str) -> AnalyticsError {
    AnalyticsError::Calculation(format!("arithmetic overflow computing {}", what))
}

/// Arithmetic mean; an empty series is invalid input.
pub fn mean(values: &[Decimal], what: &str) -> Result<Decimal, AnalyticsError> {
    if values.is_empty() {
        return Err(AnalyticsError::InvalidInput(format!("empty {} series", what)));
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| overflow(what))?;
    checked_div(sum, Decimal::from(values.len()), what)
}

/// Population standard deviation (divides by `n`).
pub fn population_std_dev(values: &[Decimal], what: &str) -> Result<Decimal, AnalyticsError> {
    let mean = mean(values, what)?;
    let squares = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| {
            let deviation = v.checked_sub(mean)?;
            acc.checked_add(deviation.checked_mul(deviation)?)
        })
        .ok_or_else(|| overflow(what))?;
    let variance = checked_div(squares, Decimal::from(values.len()), what)?;
    variance
        .sqrt()
        .ok_or_else(|| AnalyticsError::Calculation(format!("square root of the {} variance failed", what)))
}

/// `acc + a * b`, or an error naming `what` on overflow.
pub(crate) fn checked_mul_add(acc: Decimal, a: Decimal, b: Decimal, what: &str) -> Result<Decimal, AnalyticsError> {
    a.checked_mul(b)
        .and_then(|product| acc.checked_add(product))
        .ok_or_else(|| overflow(what))
}

/// `(a + b) / 2` without overflowing near `Decimal::MAX`.
pub(crate) fn checked_midpoint(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, AnalyticsError> {
    a.checked_add(b).map(|sum| sum / TWO).ok_or_else(|| overflow(what))
}

/// Natural logarithm of every value; `series` names the input in the error.
pub fn ln_all(values: &[Decimal], series: &'static str) -> Result<Vec<Decimal>, AnalyticsError> {
    values
        .iter()
        .map(|v| {
            if *v <= Decimal::ZERO {
                return Err(AnalyticsError::NonPositiveValue(series));
            }
            v.checked_ln()
                .ok_or_else(|| AnalyticsError::Calculation(format!("ln({}) is not representable", v)))
        })
        .collect()
}

pub fn to_f64(value: Decimal) -> Result<f64, AnalyticsError> {
    value
        .to_f64()
        .ok_or_else(|| AnalyticsError::Calculation(format!("{} cannot be represented as f64", value)))
}

/// Converts back to decimal, turning NaN and infinities into an error.
pub fn from_f64(value: f64, what: &str) -> Result<Decimal, AnalyticsError> {
    Decimal::from_f64(value)
        .ok_or_else(|| AnalyticsError::Calculation(format!("{} is not finite ({})", what, value)))
}

pub(crate) fn checked_div(numerator: Decimal, denominator: Decimal, what: &str) -> Result<Decimal, AnalyticsError> {
    numerator
        .checked_div(denominator)
        .ok_or_else(|| AnalyticsError::Calculation(format!("division by zero or overflow computing {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_population_std_dev() {
        let values = [dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        assert_eq!(mean(&values), Some(dec!(5)));
        let std_dev = population_std_dev(&values, "values").unwrap();
        assert!((std_dev - dec!(2)).abs() < dec!(0.0000001));
        assert!(matches!(mean(&[], "prices"), Err(AnalyticsError::InvalidInput(_))));
    }

    #[test]
    fn test_overflow_is_an_error_not_a_panic() {
        let huge: Vec<Decimal> = (1..=10).map(|i| Decimal::from(i) * dec!(1000000000000000)).collect();
        assert!(mean(&huge, "prices").is_ok());
        assert!(matches!(population_std_dev(&huge, "prices"), Err(AnalyticsError::Calculation(_))));

        assert!(matches!(mean(&[Decimal::MAX, Decimal::MAX], "prices"), Err(AnalyticsError::Calculation(_))));
        assert!(checked_midpoint(Decimal::MAX, Decimal::ONE, "price midpoint").is_err());
        assert_eq!(checked_midpoint(dec!(100), dec!(110), "price midpoint").unwrap(), dec!(105));
        assert!(checked_mul_add(Decimal::ZERO, Decimal::MAX, dec!(2), "sxx").is_err());
    }

    #[test]
    fn test_ln_rejects_non_positive() {
        let result = ln_all(&[dec!(1), dec!(0)], "quantities");
        assert_eq!(result, Err(AnalyticsError::NonPositiveValue("quantities")));

        let logs = ln_all(&[dec!(1)], "prices").unwrap();
        assert!(logs[0].abs() < dec!(0.0000001));
    }

    #[test]
    fn test_from_f64_rejects_nan() {
        assert!(from_f64(f64::NAN, "t").is_err());
        assert!(from_f64(f64::INFINITY, "t").is_err());
        assert_eq!(from_f64(0.5, "t").unwrap(), dec!(0.5));
    }
}
