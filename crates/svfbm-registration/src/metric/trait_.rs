//! Metric trait for block similarity.

use crate::config::MetricKind;
use super::{Correlation, MeanSquares, SquaredCorrelation};

/// Similarity between the samples of a reference block and the matching
/// floating samples.
///
/// Scores follow "higher is better" for every metric so that optimizers
/// always maximize.
pub trait BlockMetric: Send + Sync {
    /// Score paired samples, or `None` when the score is undefined (too few
    /// samples, flat content).
    fn evaluate(&self, fixed: &[f64], moving: &[f64]) -> Option<f64>;

    /// Weight in `[0, 1]` given to a block matched with this score.
    fn confidence(&self, _score: f64) -> f64 {
        1.0
    }

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}

/// Build the metric selected in the configuration.
pub fn create_metric(kind: MetricKind) -> Box<dyn BlockMetric> {
    match kind {
        MetricKind::MeanSquares => Box::new(MeanSquares),
        MetricKind::Correlation => Box::new(Correlation::default()),
        MetricKind::SquaredCorrelation => Box::new(SquaredCorrelation::default()),
    }
}
