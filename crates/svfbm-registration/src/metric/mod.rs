//! Block similarity metrics.

pub mod trait_;
pub mod mse;
pub mod correlation;

pub use trait_::{create_metric, BlockMetric};
pub use mse::MeanSquares;
pub use correlation::{Correlation, SquaredCorrelation};
