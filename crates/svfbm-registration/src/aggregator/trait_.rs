//! Aggregator trait.

use svfbm_core::image::ImageGeometry;
use svfbm_core::transform::HostVectorField;
use crate::config::{AggregatorKind, RegistrationConfig};
use crate::error::Result;
use crate::matcher::BlockEstimate;
use super::{KernelAggregator, MEstimationAggregator};

/// Turns block estimates into a dense velocity field.
///
/// Each estimate contributes the velocity of its generator `log(T)` at the
/// voxel being fitted. Voxels no block reaches get a zero velocity.
pub trait Aggregator: Send + Sync {
    /// Fit a velocity field on `geometry`.
    ///
    /// # Arguments
    /// * `estimates` - Block transforms with centers, confidences and dam flags
    /// * `geometry` - Output grid
    fn fit(&self, estimates: &[BlockEstimate], geometry: &ImageGeometry<3>) -> Result<HostVectorField>;

    fn name(&self) -> &'static str;
}

/// Build the aggregator selected in the configuration for a level with the
/// given mean voxel spacing.
pub fn create_aggregator(config: &RegistrationConfig, mean_spacing: f64) -> Box<dyn Aggregator> {
    let sigma = config.extrapolation_sigma * mean_spacing;
    match config.aggregator {
        AggregatorKind::Baloo => Box::new(KernelAggregator::new(sigma)),
        AggregatorKind::MEstimation => Box::new(
            MEstimationAggregator::new(sigma, sigma * config.neighborhood_approximation)
                .with_outlier_sigma(config.outlier_sigma)
                .with_convergence_threshold(config.m_estimate_convergence_threshold),
        ),
    }
}
