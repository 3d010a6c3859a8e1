//! Pearson correlation block metrics.

use super::trait_::BlockMetric;

/// Samples whose variance is below this are considered flat.
const FLAT_VARIANCE: f64 = 1e-12;

fn pearson(fixed: &[f64], moving: &[f64]) -> Option<f64> {
    let n = fixed.len();
    if n < 2 || n != moving.len() {
        return None;
    }
    let inv_n = 1.0 / n as f64;
    let mean_f = fixed.iter().sum::<f64>() * inv_n;
    let mean_m = moving.iter().sum::<f64>() * inv_n;

    let (mut cov, mut var_f, mut var_m) = (0.0, 0.0, 0.0);
    for (f, m) in fixed.iter().zip(moving) {
        let df = f - mean_f;
        let dm = m - mean_m;
        cov += df * dm;
        var_f += df * df;
        var_m += dm * dm;
    }
    if var_f * inv_n < FLAT_VARIANCE || var_m * inv_n < FLAT_VARIANCE {
        return None;
    }
    Some((cov / (var_f * var_m).sqrt()).clamp(-1.0, 1.0))
}

/// Zero-normalized cross correlation. Range `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Correlation;

impl BlockMetric for Correlation {
    fn evaluate(&self, fixed: &[f64], moving: &[f64]) -> Option<f64> {
        pearson(fixed, moving)
    }

    /// Anti-correlated matches carry no weight.
    fn confidence(&self, score: f64) -> f64 {
        score.clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "Correlation"
    }
}

/// Squared correlation; insensitive to contrast inversion. Range `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredCorrelation;

impl BlockMetric for SquaredCorrelation {
    fn evaluate(&self, fixed: &[f64], moving: &[f64]) -> Option<f64> {
        pearson(fixed, moving).map(|r| r * r)
    }

    fn confidence(&self, score: f64) -> f64 {
        score.clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "SquaredCorrelation"
    }
}
