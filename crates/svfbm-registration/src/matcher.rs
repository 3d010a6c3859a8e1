//! Block correspondence search.
//!
//! Every retained block is matched independently: the optimizer searches the
//! local transform `T` maximizing the metric between the block samples and
//! the other image read at the transformed positions.

use rayon::prelude::*;
use tracing::debug;
use svfbm_core::image::VolumeBuffer;
use svfbm_core::spatial::Point3;
use svfbm_core::transform::{LocalTransform, LocalTransformKind};
use crate::block::{Block, SampledBlocks};
use crate::cancel::CancellationToken;
use crate::config::RegistrationConfig;
use crate::metric::{create_metric, BlockMetric};
use crate::optimizer::{create_optimizer, BlockOptimizer, SearchSpace, StopCondition};

/// How block samples are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Fixed voxels at `p` against moving samples at `T(p)`.
    Asymmetric,
    /// Fixed samples at `T⁻¹(p)` against moving samples at `T(p)`.
    Kissing,
}

/// The local transform found for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEstimate {
    /// Physical block center.
    pub center: Point3,
    pub transform: LocalTransform,
    pub score: f64,
    /// Aggregation weight in `[0, 1]`.
    pub confidence: f64,
    pub is_dam: bool,
    pub stop: StopCondition,
}

/// Matches blocks with one metric, optimizer and transform family.
pub struct BlockMatcher {
    metric: Box<dyn BlockMetric>,
    optimizer: Box<dyn BlockOptimizer>,
    kind: LocalTransformKind,
    space: SearchSpace,
}

impl BlockMatcher {
    pub fn new(
        metric: Box<dyn BlockMetric>,
        optimizer: Box<dyn BlockOptimizer>,
        kind: LocalTransformKind,
        space: SearchSpace,
    ) -> Self {
        Self {
            metric,
            optimizer,
            kind,
            space,
        }
    }

    /// Matcher for a pyramid level with the given mean voxel spacing.
    pub fn from_config(config: &RegistrationConfig, mean_spacing: f64) -> Self {
        Self::new(
            create_metric(config.metric),
            create_optimizer(config.optimizer),
            config.transform,
            SearchSpace::from_config(config, config.transform, mean_spacing),
        )
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Match every block in parallel.
    ///
    /// Blocks that cannot be scored are dropped. Once `token` is cancelled,
    /// blocks not yet started are skipped and the estimates already computed
    /// are returned.
    ///
    /// # Arguments
    /// * `blocks` - Blocks on the grid of `fixed`
    /// * `fixed` - Image the blocks are read from
    /// * `moving` - Image searched for correspondences, on the same grid
    pub fn match_blocks(
        &self,
        blocks: &SampledBlocks,
        fixed: &VolumeBuffer,
        moving: &VolumeBuffer,
        mode: MatchMode,
        token: &CancellationToken,
    ) -> Vec<BlockEstimate> {
        let estimates: Vec<BlockEstimate> = blocks
            .blocks
            .par_iter()
            .zip(blocks.dams.par_iter())
            .filter_map(|(block, &is_dam)| {
                if token.is_cancelled() {
                    return None;
                }
                self.match_block(block, is_dam, fixed, moving, mode)
            })
            .collect();

        let converged = estimates
            .iter()
            .filter(|e| matches!(e.stop, StopCondition::Converged { .. }))
            .count();
        debug!(
            blocks = blocks.len(),
            matched = estimates.len(),
            converged,
            metric = self.metric.name(),
            optimizer = self.optimizer.name(),
            "blocks matched"
        );
        estimates
    }

    fn match_block(
        &self,
        block: &Block,
        is_dam: bool,
        fixed: &VolumeBuffer,
        moving: &VolumeBuffer,
        mode: MatchMode,
    ) -> Option<BlockEstimate> {
        let geometry = fixed.geometry();
        let center = block.center(geometry);
        let points = block.physical_points(geometry);
        let fixed_voxels: Vec<f64> = match mode {
            MatchMode::Asymmetric => block
                .voxels()
                .map(|[x, y, z]| fixed.value(x, y, z) as f64)
                .collect(),
            MatchMode::Kissing => Vec::new(),
        };

        let objective = |params: &[f64]| -> Option<f64> {
            let transform = LocalTransform::from_parameters(self.kind, center, params);
            let inverse = match mode {
                MatchMode::Asymmetric => None,
                MatchMode::Kissing => Some(transform.inverse()?),
            };

            let mut f = Vec::with_capacity(points.len());
            let mut m = Vec::with_capacity(points.len());
            for (i, p) in points.iter().enumerate() {
                let fixed_value = match &inverse {
                    None => Some(fixed_voxels[i]),
                    Some(inv) => fixed.sample_physical(&inv.apply(p)),
                };
                if let (Some(a), Some(b)) = (fixed_value, moving.sample_physical(&transform.apply(p))) {
                    f.push(a);
                    m.push(b);
                }
            }
            // Invalid once more than half of the samples fall outside.
            if 2 * f.len() < points.len() {
                return None;
            }
            self.metric.evaluate(&f, &m)
        };

        let result = self.optimizer.optimize(&objective, &self.space)?;
        Some(BlockEstimate {
            center,
            transform: LocalTransform::from_parameters(self.kind, center, &result.parameters),
            score: result.score,
            confidence: self.metric.confidence(result.score),
            is_dam,
            stop: result.stop,
        })
    }
}
