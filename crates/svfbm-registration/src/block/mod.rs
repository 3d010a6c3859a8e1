//! Blocks: small index-space boxes of a volume used as matching units.

pub mod sampler;

pub use sampler::{block_variance, BlockSampler, SampledBlocks};

use svfbm_core::image::ImageGeometry;
use svfbm_core::spatial::Point3;

/// An index-space box `[origin, origin + size)` plus its intensity variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub origin: [usize; 3],
    pub size: [usize; 3],
    pub variance: f64,
}

impl Block {
    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Continuous index of the block center.
    pub fn center_index(&self) -> [f64; 3] {
        let mut c = [0.0; 3];
        for a in 0..3 {
            c[a] = self.origin[a] as f64 + 0.5 * (self.size[a] as f64 - 1.0);
        }
        c
    }

    pub fn center(&self, geometry: &ImageGeometry<3>) -> Point3 {
        geometry.index_to_physical(&Point3::new(self.center_index()))
    }

    /// Voxel indices in scan order, x fastest.
    pub fn voxels(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [ox, oy, oz] = self.origin;
        let [sx, sy, sz] = self.size;
        (oz..oz + sz).flat_map(move |z| (oy..oy + sy).flat_map(move |y| (ox..ox + sx).map(move |x| [x, y, z])))
    }

    /// Physical positions of the block voxels, in scan order.
    pub fn physical_points(&self, geometry: &ImageGeometry<3>) -> Vec<Point3> {
        self.voxels()
            .map(|[x, y, z]| geometry.index_to_physical(&Point3::new([x as f64, y as f64, z as f64])))
            .collect()
    }
}
