//! Spatial lookup of block estimates around a voxel.

use kd_tree::{KdPoint, KdTree};
use nalgebra::Matrix4;
use tracing::debug;
use svfbm_core::image::ImageGeometry;
use svfbm_core::spatial::Point3;
use svfbm_core::transform::generator_velocity;
use crate::matcher::BlockEstimate;

#[derive(Debug, Clone, Copy)]
struct Site {
    position: [f64; 3],
    index: usize,
}

impl KdPoint for Site {
    type Scalar = f64;
    type Dim = typenum::U3;
    fn at(&self, k: usize) -> f64 {
        self.position[k]
    }
}

/// A block reaching a voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contributor {
    pub index: usize,
    pub distance_sq: f64,
}

/// Block generators indexed by center position.
///
/// Lookups apply the dam rule: a non-dam block reaches a voxel only if its
/// center is no farther than the nearest dam center; dam blocks always reach.
pub struct Neighborhood {
    sites: KdTree<Site>,
    dams: Option<KdTree<Site>>,
    generators: Vec<Matrix4<f64>>,
    confidences: Vec<f64>,
    is_dam: Vec<bool>,
}

impl Neighborhood {
    /// Index the estimates; estimates without a real logarithm are dropped.
    pub fn new(estimates: &[BlockEstimate]) -> Self {
        let mut sites = Vec::with_capacity(estimates.len());
        let mut dams = Vec::new();
        let mut generators = Vec::with_capacity(estimates.len());
        let mut confidences = Vec::with_capacity(estimates.len());
        let mut is_dam = Vec::with_capacity(estimates.len());

        for estimate in estimates {
            let Some(generator) = estimate.transform.log() else {
                continue;
            };
            let site = Site {
                position: estimate.center.to_array(),
                index: generators.len(),
            };
            sites.push(site);
            if estimate.is_dam {
                dams.push(site);
            }
            generators.push(generator);
            confidences.push(estimate.confidence);
            is_dam.push(estimate.is_dam);
        }

        let dropped = estimates.len() - generators.len();
        if dropped > 0 {
            debug!(dropped, "estimates without a real logarithm dropped");
        }
        Self {
            sites: KdTree::build_by_ordered_float(sites),
            dams: if dams.is_empty() { None } else { Some(KdTree::build_by_ordered_float(dams)) },
            generators,
            confidences,
            is_dam,
        }
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn confidence(&self, index: usize) -> f64 {
        self.confidences[index]
    }

    pub fn is_dam(&self, index: usize) -> bool {
        self.is_dam[index]
    }

    /// Velocity of block `index` at a physical point.
    pub fn velocity(&self, index: usize, point: &Point3) -> [f64; 3] {
        generator_velocity(&self.generators[index], point)
    }

    /// Blocks within `radius` of `point` that pass the dam rule.
    pub fn contributors(&self, point: &Point3, radius: f64) -> Vec<Contributor> {
        let query = Site {
            position: point.to_array(),
            index: usize::MAX,
        };
        let dam_limit_sq = self
            .dams
            .as_ref()
            .and_then(|tree| tree.nearest(&query))
            .map(|hit| hit.squared_distance);

        self.sites
            .within_radius(&query, radius)
            .into_iter()
            .filter_map(|site| {
                let distance_sq = squared_distance(&site.position, &query.position);
                let allowed = self.is_dam[site.index] || dam_limit_sq.map_or(true, |limit| distance_sq <= limit);
                allowed.then_some(Contributor {
                    index: site.index,
                    distance_sq,
                })
            })
            .collect()
    }
}

/// Physical position of the voxel at a linear index, x fastest.
pub fn voxel_center(geometry: &ImageGeometry<3>, linear: usize) -> Point3 {
    let [nx, ny, _] = geometry.size();
    let x = linear % nx;
    let y = (linear / nx) % ny;
    let z = linear / (nx * ny);
    geometry.index_to_physical(&Point3::new([x as f64, y as f64, z as f64]))
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn test_radius_query() {
        let hood = Neighborhood::new(&[
            estimate([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], false),
            estimate([5.0, 0.0, 0.0], [2.0, 0.0, 0.0], false),
        ]);
        let near = hood.contributors(&Point3::new([1.0, 0.0, 0.0]), 2.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].index, 0);
        assert_eq!(near[0].distance_sq, 1.0);
        assert_eq!(hood.velocity(1, &Point3::new([9.0, 9.0, 9.0])), [2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_dam_blocks_shadow_farther_blocks() {
        // Dam at x = 5 between a block at x = 0 and a block at x = 10.
        let hood = Neighborhood::new(&[
            estimate([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], false),
            estimate([5.0, 0.0, 0.0], [0.0, 0.0, 0.0], true),
            estimate([10.0, 0.0, 0.0], [-1.0, 0.0, 0.0], false),
        ]);
        let at = |x: f64| {
            let mut indices: Vec<usize> = hood
                .contributors(&Point3::new([x, 0.0, 0.0]), 100.0)
                .iter()
                .map(|c| c.index)
                .collect();
            indices.sort_unstable();
            indices
        };
        assert_eq!(at(1.0), vec![0, 1]);
        assert_eq!(at(9.0), vec![1, 2]);
        assert_eq!(at(5.0), vec![1]);
    }
}
