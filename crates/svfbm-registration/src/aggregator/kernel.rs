//! Single-pass Gaussian fusion ("Baloo").

use rayon::prelude::*;
use tracing::debug;
use svfbm_core::image::ImageGeometry;
use svfbm_core::transform::HostVectorField;
use crate::error::Result;
use crate::matcher::BlockEstimate;
use super::neighborhood::{voxel_center, Neighborhood};
use super::trait_::Aggregator;

/// Normalized Gaussian blend of block velocities, truncated at `3 * sigma`.
///
/// `v(x) = Σ c_b g(x - x_b) v_b(x) / Σ c_b g(x - x_b)` with confidence `c_b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelAggregator {
    /// Physical sigma.
    pub sigma: f64,
}

impl KernelAggregator {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    pub fn cutoff(&self) -> f64 {
        3.0 * self.sigma
    }
}

impl Aggregator for KernelAggregator {
    fn fit(&self, estimates: &[BlockEstimate], geometry: &ImageGeometry<3>) -> Result<HostVectorField> {
        let hood = Neighborhood::new(estimates);
        if hood.is_empty() {
            return Ok(HostVectorField::zeros(*geometry));
        }
        let inv_two_sigma_sq = 1.0 / (2.0 * self.sigma * self.sigma);
        let cutoff = self.cutoff();

        let vectors: Vec<[f64; 3]> = (0..geometry.num_voxels())
            .into_par_iter()
            .map(|i| {
                let x = voxel_center(geometry, i);
                let mut sum = [0.0; 3];
                let mut weight_sum = 0.0;
                for c in hood.contributors(&x, cutoff) {
                    let w = hood.confidence(c.index) * (-c.distance_sq * inv_two_sigma_sq).exp();
                    let v = hood.velocity(c.index, &x);
                    for a in 0..3 {
                        sum[a] += w * v[a];
                    }
                    weight_sum += w;
                }
                if weight_sum > 0.0 {
                    sum.map(|s| s / weight_sum)
                } else {
                    [0.0; 3]
                }
            })
            .collect();

        debug!(blocks = hood.len(), sigma = self.sigma, "kernel aggregation done");
        Ok(HostVectorField::from_vectors(*geometry, &vectors)?)
    }

    fn name(&self) -> &'static str {
        "Baloo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svfbm_core::spatial::Point3;
    use svfbm_core::transform::{LocalTransform, LocalTransformKind};
    use crate::optimizer::StopCondition;

    fn estimate(center: [f64; 3], t: [f64; 3], is_dam: bool) -> BlockEstimate {
        let center = Point3::new(center);
        BlockEstimate {
            center,
            transform: LocalTransform::from_parameters(LocalTransformKind::Translation, center, &t),
            score: 1.0,
            confidence: 1.0,
            is_dam,
            stop: StopCondition::GridExhausted,
        }
    }

    #[test]
    fn test_single_block_spreads_within_cutoff() {
        let geometry = ImageGeometry::with_size([20, 4, 4]).unwrap();
        let field = KernelAggregator::new(2.0)
            .fit(&[estimate([2.0, 2.0, 2.0], [1.0, 0.5, 0.0], false)], &geometry)
            .unwrap();
        let at = |x: usize| field.get((2 * 4 + 2) * 20 + x);
        assert_eq!(at(2), [1.0, 0.5, 0.0]);
        assert!((at(7)[0] - 1.0).abs() < 1e-6);
        assert_eq!(at(9), [0.0; 3]);
    }

    #[test]
    fn test_no_estimates_give_zero_field() {
        let geometry = ImageGeometry::with_size([4, 4, 4]).unwrap();
        let field = KernelAggregator::new(1.0).fit(&[], &geometry).unwrap();
        assert_eq!(field.max_norm(), 0.0);
    }

    #[test]
    fn test_dam_blocks_influence_across() {
        let geometry = ImageGeometry::with_size([21, 1, 1]).unwrap();
        let estimates = [
            estimate([4.0, 0.0, 0.0], [1.0, 0.0, 0.0], false),
            estimate([10.0, 0.0, 0.0], [0.0, 0.0, 0.0], true),
            estimate([16.0, 0.0, 0.0], [-1.0, 0.0, 0.0], false),
        ];
        let field = KernelAggregator::new(4.0).fit(&estimates, &geometry).unwrap();
        // Left of the dam only the left block and the dam contribute.
        for x in 0..10 {
            assert!(field.get(x)[0] >= 0.0, "x = {}", x);
        }
        for x in 11..21 {
            assert!(field.get(x)[0] <= 0.0, "x = {}", x);
        }
        assert_eq!(field.get(10)[0], 0.0);
    }

    #[test]
    fn test_confidence_weights() {
        let geometry = ImageGeometry::with_size([3, 1, 1]).unwrap();
        let mut strong = estimate([1.0, 0.0, 0.0], [2.0, 0.0, 0.0], false);
        strong.confidence = 0.75;
        let mut weak = estimate([1.0, 0.0, 0.0], [-2.0, 0.0, 0.0], false);
        weak.confidence = 0.25;
        let field = KernelAggregator::new(1.0).fit(&[strong, weak], &geometry).unwrap();
        assert!((field.get(1)[0] - 1.0).abs() < 1e-6);
    }
}
