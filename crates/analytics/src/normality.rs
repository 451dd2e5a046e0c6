//! Shapiro-Wilk normality test using Royston's (1995) approximation.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

pub const MIN_SAMPLE: usize = 3;
pub const MAX_SAMPLE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapiroWilk {
    pub statistic: f64,
    pub p_value: f64,
}

/// Runs the test on `sample`.
///
/// Returns `None` outside `3..=5000` observations, for non-finite input, or
/// when the sample has no spread.
pub fn shapiro_wilk(sample: &[f64]) -> Option<ShapiroWilk> {
    let n = sample.len();
    if !(MIN_SAMPLE..=MAX_SAMPLE).contains(&n) || sample.iter().any(|x| !x.is_finite()) {
        return None;
    }

    let mut x = sample.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));

    let mean = x.iter().sum::<f64>() / n as f64;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    let range = x[n - 1] - x[0];
    if range <= f64::EPSILON * mean.abs().max(1.0) || ss <= 0.0 {
        return None;
    }

    let standard = Normal::new(0.0, 1.0).ok()?;
    let a = coefficients(n, &standard)?;

    let numerator: f64 = a.iter().zip(&x).map(|(ai, xi)| ai * xi).sum();
    let w = (numerator * numerator / ss).clamp(0.0, 1.0);

    Some(ShapiroWilk {
        statistic: w,
        p_value: p_value(w, n, &standard).clamp(0.0, 1.0),
    })
}

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Antisymmetric weights for the ordered sample.
fn coefficients(n: usize, standard: &Normal) -> Option<Vec<f64>> {
    if n == 3 {
        let h = 0.5_f64.sqrt();
        return Some(vec![-h, 0.0, h]);
    }

    let nf = n as f64;
    let m: Vec<f64> = (1..=n)
        .map(|i| standard.inverse_cdf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let mm: f64 = m.iter().map(|v| v * v).sum();
    let root_mm = mm.sqrt();
    let u = 1.0 / nf.sqrt();

    let a_n = m[n - 1] / root_mm
        + poly(&[0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056], u);

    let mut a = vec![0.0; n];
    let (phi, tail) = if n > 5 {
        let a_n1 = m[n - 2] / root_mm
            + poly(&[0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633], u);
        let phi = (mm - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
            / (1.0 - 2.0 * a_n.powi(2) - 2.0 * a_n1.powi(2));
        a[n - 2] = a_n1;
        a[1] = -a_n1;
        (phi, 2)
    } else {
        let phi = (mm - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * a_n.powi(2));
        (phi, 1)
    };
    if !(phi > 0.0) {
        return None;
    }

    a[n - 1] = a_n;
    a[0] = -a_n;
    let root_phi = phi.sqrt();
    for i in tail..n - tail {
        a[i] = m[i] / root_phi;
    }

    Some(a)
}

fn p_value(w: f64, n: usize, standard: &Normal) -> f64 {
    if w >= 1.0 {
        return 1.0;
    }

    if n == 3 {
        let exact = 6.0 / PI * (w.sqrt().asin() - 0.75_f64.sqrt().asin());
        return exact.max(0.0);
    }

    let nf = n as f64;
    let log_one_minus_w = (1.0 - w).ln();

    let z = if n <= 11 {
        let gamma = poly(&[-2.273, 0.459], nf);
        if log_one_minus_w >= gamma {
            return 0.0;
        }
        let y = -(gamma - log_one_minus_w).ln();
        let mu = poly(&[0.5440, -0.39978, 0.025054, -0.0006714], nf);
        let sigma = poly(&[1.3822, -0.77857, 0.062767, -0.0020322], nf).exp();
        (y - mu) / sigma
    } else {
        let ln_n = nf.ln();
        let mu = poly(&[-1.5861, -0.31082, -0.083751, 0.0038915], ln_n);
        let sigma = poly(&[-0.4803, -0.082676, 0.0030302], ln_n).exp();
        (log_one_minus_w - mu) / sigma
    };

    standard.sf(z)
}
