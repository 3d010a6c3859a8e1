//! Mean squares block metric.

use super::trait_::BlockMetric;

/// Negated mean squared intensity difference.
///
/// Score = -(1/N) * sum((F - M)^2); identical blocks score 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquares;

impl BlockMetric for MeanSquares {
    fn evaluate(&self, fixed: &[f64], moving: &[f64]) -> Option<f64> {
        if fixed.is_empty() || fixed.len() != moving.len() {
            return None;
        }
        let sum: f64 = fixed.iter().zip(moving).map(|(f, m)| (f - m) * (f - m)).sum();
        Some(-sum / fixed.len() as f64)
    }

    fn name(&self) -> &'static str {
        "MeanSquares"
    }
}
