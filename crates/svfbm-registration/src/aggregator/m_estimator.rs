//! Robust iteratively reweighted fusion.

use std::sync::atomic::{AtomicUsize, Ordering};
use rayon::prelude::*;
use tracing::debug;
use svfbm_core::image::ImageGeometry;
use svfbm_core::transform::HostVectorField;
use crate::error::Result;
use crate::matcher::BlockEstimate;
use super::neighborhood::{voxel_center, Neighborhood};
use super::trait_::Aggregator;

/// Reweighting rounds per voxel.
pub const MAX_REWEIGHTING_ITERATIONS: usize = 100;

/// Per-voxel M-estimate of the block velocities.
///
/// Weights are a Gaussian of the center distance (truncated at the distance
/// boundary) times the block confidence times a Tukey biweight of the
/// residual. The Tukey cutoff is `outlier_sigma` weighted standard deviations
/// of the residuals. Reweighting stops when the estimate moves less than the
/// convergence threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MEstimationAggregator {
    pub sigma: f64,
    pub distance_boundary: f64,
    pub outlier_sigma: f64,
    pub convergence_threshold: f64,
    pub max_iterations: usize,
}

impl MEstimationAggregator {
    pub fn new(sigma: f64, distance_boundary: f64) -> Self {
        Self {
            sigma,
            distance_boundary,
            outlier_sigma: 3.0,
            convergence_threshold: 0.01,
            max_iterations: MAX_REWEIGHTING_ITERATIONS,
        }
    }

    pub fn with_outlier_sigma(mut self, outlier_sigma: f64) -> Self {
        self.outlier_sigma = outlier_sigma;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Robust estimate from velocities and their spatial weights.
    ///
    /// Returns the estimate and whether reweighting converged.
    fn estimate(&self, velocities: &[[f64; 3]], weights: &[f64]) -> ([f64; 3], bool) {
        let base_sum: f64 = weights.iter().sum();
        if base_sum <= 0.0 {
            return ([0.0; 3], true);
        }
        let mut estimate = weighted_mean(velocities, weights, base_sum);

        for _ in 0..self.max_iterations {
            let residuals: Vec<f64> = velocities.iter().map(|v| distance(v, &estimate)).collect();
            let variance = residuals.iter().zip(weights).map(|(r, w)| w * r * r).sum::<f64>() / base_sum;
            let cutoff = self.outlier_sigma * variance.sqrt();
            if cutoff <= f64::EPSILON {
                return (estimate, true);
            }

            let robust: Vec<f64> = residuals
                .iter()
                .zip(weights)
                .map(|(r, w)| w * tukey(r / cutoff))
                .collect();
            let robust_sum: f64 = robust.iter().sum();
            if robust_sum <= 0.0 {
                return (estimate, true);
            }
            let next = weighted_mean(velocities, &robust, robust_sum);
            let change = distance(&next, &estimate);
            estimate = next;
            if change < self.convergence_threshold {
                return (estimate, true);
            }
        }
        (estimate, false)
    }
}

fn tukey(u: f64) -> f64 {
    if u.abs() >= 1.0 {
        0.0
    } else {
        let t = 1.0 - u * u;
        t * t
    }
}

fn weighted_mean(velocities: &[[f64; 3]], weights: &[f64], weight_sum: f64) -> [f64; 3] {
    let mut mean = [0.0; 3];
    for (v, w) in velocities.iter().zip(weights) {
        for a in 0..3 {
            mean[a] += w * v[a];
        }
    }
    mean.map(|m| m / weight_sum)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

impl Aggregator for MEstimationAggregator {
    fn fit(&self, estimates: &[BlockEstimate], geometry: &ImageGeometry<3>) -> Result<HostVectorField> {
        let hood = Neighborhood::new(estimates);
        if hood.is_empty() {
            return Ok(HostVectorField::zeros(*geometry));
        }
        let inv_two_sigma_sq = 1.0 / (2.0 * self.sigma * self.sigma);
        let unconverged = AtomicUsize::new(0);

        let vectors: Vec<[f64; 3]> = (0..geometry.num_voxels())
            .into_par_iter()
            .map(|i| {
                let x = voxel_center(geometry, i);
                let contributors = hood.contributors(&x, self.distance_boundary);
                if contributors.is_empty() {
                    return [0.0; 3];
                }
                let velocities: Vec<[f64; 3]> = contributors.iter().map(|c| hood.velocity(c.index, &x)).collect();
                let weights: Vec<f64> = contributors
                    .iter()
                    .map(|c| hood.confidence(c.index) * (-c.distance_sq * inv_two_sigma_sq).exp())
                    .collect();
                let (v, converged) = self.estimate(&velocities, &weights);
                if !converged {
                    unconverged.fetch_add(1, Ordering::Relaxed);
                }
                v
            })
            .collect();

        let unconverged = unconverged.into_inner();
        if unconverged > 0 {
            debug!(voxels = unconverged, "M-estimation did not converge everywhere");
        }
        debug!(blocks = hood.len(), sigma = self.sigma, "M-estimation aggregation done");
        Ok(HostVectorField::from_vectors(*geometry, &vectors)?)
    }

    fn name(&self) -> &'static str {
        "MEstimation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svfbm_core::spatial::Point3;
    use svfbm_core::transform::{LocalTransform, LocalTransformKind};
    use crate::optimizer::StopCondition;
    use super::super::KernelAggregator;

    fn estimate(center: [f64; 3], t: [f64; 3]) -> BlockEstimate {
        let center = Point3::new(center);
        BlockEstimate {
            center,
            transform: LocalTransform::from_parameters(LocalTransformKind::Translation, center, &t),
            score: 1.0,
            confidence: 1.0,
            is_dam: false,
            stop: StopCondition::GridExhausted,
        }
    }

    #[test]
    fn test_tukey() {
        assert_eq!(tukey(0.0), 1.0);
        assert_eq!(tukey(1.0), 0.0);
        assert_eq!(tukey(-2.0), 0.0);
        assert!((tukey(0.5) - 0.5625).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_outlier_block() {
        let geometry = ImageGeometry::with_size([5, 5, 5]).unwrap();
        let mut estimates: Vec<BlockEstimate> = (0..20)
            .map(|k| estimate([2.0 + 0.05 * k as f64, 2.0, 2.0], [1.0, 0.0, 0.0]))
            .collect();
        estimates.push(estimate([2.0, 2.0, 2.0], [30.0, 0.0, 0.0]));
        let center = (2 * 5 + 2) * 5 + 2;

        let robust = MEstimationAggregator::new(3.0, 7.5)
            .with_convergence_threshold(1e-6)
            .fit(&estimates, &geometry)
            .unwrap();
        assert!((robust.get(center)[0] - 1.0).abs() < 1e-3, "{:?}", robust.get(center));

        let plain = KernelAggregator::new(3.0).fit(&estimates, &geometry).unwrap();
        assert!(plain.get(center)[0] > 2.0);
    }

    #[test]
    fn test_consistent_blocks_reproduce_translation() {
        let geometry = ImageGeometry::with_size([6, 6, 6]).unwrap();
        let estimates = [estimate([1.0, 1.0, 1.0], [0.5, -0.5, 2.0]), estimate([4.0, 4.0, 4.0], [0.5, -0.5, 2.0])];
        let field = MEstimationAggregator::new(2.0, 5.0).fit(&estimates, &geometry).unwrap();
        let v = field.get(0);
        for (a, e) in v.iter().zip([0.5, -0.5, 2.0]) {
            assert!((a - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dam_blocks_influence_across() {
        let geometry = ImageGeometry::with_size([21, 1, 1]).unwrap();
        let mut dam = estimate([10.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
        dam.is_dam = true;
        let estimates = [
            estimate([4.0, 0.0, 0.0], [1.0, 0.0, 0.0]),
            dam,
            estimate([16.0, 0.0, 0.0], [-1.0, 0.0, 0.0]),
        ];
        let field = MEstimationAggregator::new(4.0, 10.0).fit(&estimates, &geometry).unwrap();
        for x in 0..10 {
            assert!(field.get(x)[0] >= 0.0, "x = {}", x);
        }
        for x in 11..21 {
            assert!(field.get(x)[0] <= 0.0, "x = {}", x);
        }
        assert_eq!(field.get(10)[0], 0.0);
    }

    #[test]
    fn test_outside_boundary_is_zero() {
        let geometry = ImageGeometry::with_size([12, 1, 1]).unwrap();
        let field = MEstimationAggregator::new(1.0, 2.5)
            .fit(&[estimate([0.0, 0.0, 0.0], [1.0, 0.0, 0.0])], &geometry)
            .unwrap();
        assert_eq!(field.get(2)[0], 1.0);
        assert_eq!(field.get(3), [0.0; 3]);
    }
}
