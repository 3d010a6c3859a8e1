//! Block tiling, variance selection and dam detection.

use kd_tree::{KdPoint, KdTree};
use rayon::prelude::*;
use tracing::debug;
use svfbm_core::image::VolumeBuffer;
use super::Block;

/// Retained blocks in scan order and their dam flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledBlocks {
    pub blocks: Vec<Block>,
    pub dams: Vec<bool>,
    /// Tiles generated before selection.
    pub tiles: usize,
}

impl SampledBlocks {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn dam_count(&self) -> usize {
        self.dams.iter().filter(|&&d| d).count()
    }
}

/// Tiles a volume and keeps the most textured tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSampler {
    pub block_size: usize,
    pub block_spacing: usize,
    pub variance_threshold: f64,
    pub percentage_kept: f64,
    /// In voxels.
    pub dam_distance: f64,
    pub compute_dam: bool,
}

/// A rejected tile center, for nearest-neighbor queries.
#[derive(Debug, Clone, Copy)]
struct TileCenter([f64; 3]);

impl KdPoint for TileCenter {
    type Scalar = f64;
    type Dim = typenum::U3;
    fn at(&self, k: usize) -> f64 {
        self.0[k]
    }
}

impl BlockSampler {
    pub fn new(block_size: usize, block_spacing: usize, variance_threshold: f64, percentage_kept: f64) -> Self {
        Self {
            block_size,
            block_spacing,
            variance_threshold,
            percentage_kept,
            dam_distance: 0.0,
            compute_dam: false,
        }
    }

    pub fn with_dam(mut self, dam_distance: f64) -> Self {
        self.compute_dam = true;
        self.dam_distance = dam_distance;
        self
    }

    /// Tile origins along an axis of length `n`; a short axis yields one
    /// clipped tile.
    fn axis_tiles(&self, n: usize) -> Vec<(usize, usize)> {
        if n <= self.block_size {
            return vec![(0, n)];
        }
        let stride = self.block_spacing.max(1);
        (0..)
            .map(|i| i * stride)
            .take_while(|&o| o + self.block_size <= n)
            .map(|o| (o, self.block_size))
            .collect()
    }

    /// Every tile in scan order, variance not yet computed.
    pub fn tiles(&self, size: [usize; 3]) -> Vec<Block> {
        let xs = self.axis_tiles(size[0]);
        let ys = self.axis_tiles(size[1]);
        let zs = self.axis_tiles(size[2]);
        let mut tiles = Vec::with_capacity(xs.len() * ys.len() * zs.len());
        for &(oz, sz) in &zs {
            for &(oy, sy) in &ys {
                for &(ox, sx) in &xs {
                    tiles.push(Block {
                        origin: [ox, oy, oz],
                        size: [sx, sy, sz],
                        variance: 0.0,
                    });
                }
            }
        }
        tiles
    }

    pub fn sample(&self, volume: &VolumeBuffer) -> SampledBlocks {
        let size = volume.geometry().size();
        let mut tiles = self.tiles(size);
        tiles.par_iter_mut().for_each(|tile| tile.variance = block_variance(volume, tile));
        let total = tiles.len();

        let (mut kept, rejected): (Vec<(usize, Block)>, Vec<(usize, Block)>) = tiles
            .into_iter()
            .enumerate()
            .partition(|(_, tile)| tile.variance >= self.variance_threshold);

        // Stable: equal variances keep scan order.
        kept.sort_by(|a, b| b.1.variance.partial_cmp(&a.1.variance).unwrap_or(std::cmp::Ordering::Equal));
        let keep = (self.percentage_kept * kept.len() as f64).ceil() as usize;
        kept.truncate(keep.min(kept.len()));
        kept.sort_by_key(|(scan, _)| *scan);

        let blocks: Vec<Block> = kept.into_iter().map(|(_, b)| b).collect();
        let dams = if self.compute_dam {
            self.dam_flags(&blocks, &rejected, size)
        } else {
            vec![false; blocks.len()]
        };

        debug!(
            tiles = total,
            kept = blocks.len(),
            rejected = rejected.len(),
            dams = dams.iter().filter(|&&d| d).count(),
            "blocks sampled"
        );
        SampledBlocks { blocks, dams, tiles: total }
    }

    fn dam_flags(&self, blocks: &[Block], rejected: &[(usize, Block)], size: [usize; 3]) -> Vec<bool> {
        let rejected_tree = if rejected.is_empty() {
            None
        } else {
            let centers = rejected.iter().map(|(_, b)| TileCenter(b.center_index())).collect();
            Some(KdTree::build_by_ordered_float(centers))
        };
        let limit_sq = self.dam_distance * self.dam_distance;

        blocks
            .par_iter()
            .map(|block| {
                let c = block.center_index();
                // Axes covered by a single tile have no meaningful boundary.
                let near_boundary = (0..3)
                    .filter(|&a| size[a] > self.block_size)
                    .any(|a| c[a].min(size[a] as f64 - 1.0 - c[a]) <= self.dam_distance);
                if near_boundary {
                    return true;
                }
                rejected_tree
                    .as_ref()
                    .and_then(|tree| tree.nearest(&TileCenter(c)))
                    .map_or(false, |hit| hit.squared_distance <= limit_sq)
            })
            .collect()
    }
}

/// Population variance of the voxels of a tile.
pub fn block_variance(volume: &VolumeBuffer, block: &Block) -> f64 {
    let n = block.num_voxels();
    if n == 0 {
        return 0.0;
    }
    let (sum, sum_sq) = block.voxels().fold((0.0f64, 0.0f64), |(s, ss), [x, y, z]| {
        let v = volume.value(x, y, z) as f64;
        (s + v, ss + v * v)
    });
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}
