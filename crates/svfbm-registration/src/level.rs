//! Block-matching iterations on one pyramid level.
//!
//! The velocity field lives on the reference grid of the level. Every
//! iteration warps the images with the current field, matches blocks,
//! aggregates the block transforms into an update `u`, composes
//! `v <- v + u + ½[v, u]` and smooths `v`.

use burn::tensor::backend::Backend;
use tracing::{debug, info, warn};
use svfbm_core::filter::ResampleImageFilter;
use svfbm_core::image::{Image, ImageGeometry, VolumeBuffer};
use svfbm_core::interpolation::LinearInterpolator;
use svfbm_core::transform::{IdentityTransform, StationaryVelocityField, VectorField};
use crate::aggregator::{create_aggregator, Aggregator};
use crate::block::{BlockSampler, SampledBlocks};
use crate::cancel::CancellationToken;
use crate::config::{RegistrationConfig, SymmetryKind};
use crate::error::Result;
use crate::matcher::{BlockEstimate, BlockMatcher, MatchMode};
use crate::progress::ProgressSink;
use crate::validation::validate_field;

/// Result of one level.
#[derive(Debug, Clone)]
pub struct LevelOutcome<B: Backend> {
    pub velocity: StationaryVelocityField<B>,
    /// Iterations whose update was kept.
    pub iterations: usize,
    /// The last update fell below the minimal transform error.
    pub converged: bool,
    /// The run was aborted during this level.
    pub aborted: bool,
}

/// One kept iteration.
struct Step<B: Backend> {
    velocity: StationaryVelocityField<B>,
    update_norm: f64,
    matched: usize,
}

/// Strategies and parameters for one pyramid level.
pub struct LevelRegistration<'a> {
    level: usize,
    symmetry: SymmetryKind,
    max_iterations: usize,
    minimal_transform_error: f64,
    elastic_sigma: f64,
    sampler: BlockSampler,
    matcher: BlockMatcher,
    aggregator: Box<dyn Aggregator>,
    token: &'a CancellationToken,
    progress: &'a ProgressSink,
}

impl<'a> LevelRegistration<'a> {
    /// Scale the configuration to a level with the given mean voxel spacing.
    pub fn new(
        config: &RegistrationConfig,
        level: usize,
        mean_spacing: f64,
        token: &'a CancellationToken,
        progress: &'a ProgressSink,
    ) -> Self {
        let mut sampler = BlockSampler::new(
            config.block_size,
            config.block_spacing,
            config.variance_threshold(),
            config.percentage_kept,
        );
        if config.use_transformation_dam {
            sampler = sampler.with_dam(config.dam_distance * config.extrapolation_sigma);
        }

        Self {
            level,
            symmetry: config.symmetry,
            max_iterations: config.max_iterations,
            minimal_transform_error: config.minimal_transform_error,
            elastic_sigma: config.elastic_sigma * mean_spacing,
            sampler,
            matcher: BlockMatcher::from_config(config, mean_spacing),
            aggregator: create_aggregator(config, mean_spacing),
            token,
            progress,
        }
    }

    /// Refine `velocity` (on the grid of `reference`) against this level.
    pub fn run<B: Backend>(
        &self,
        reference: &Image<B, 3>,
        floating: &Image<B, 3>,
        velocity: StationaryVelocityField<B>,
    ) -> Result<LevelOutcome<B>> {
        let geometry = *reference.geometry();
        let reference_buffer = VolumeBuffer::from_image(reference)?;

        // Blocks are fixed for the level except in kissing mode, which samples
        // the half-way average every iteration.
        let forward_blocks = match self.symmetry {
            SymmetryKind::Kissing => SampledBlocks::default(),
            _ => self.sampler.sample(&reference_buffer),
        };
        let backward = match self.symmetry {
            SymmetryKind::Symmetric => {
                let floating_on_reference =
                    ResampleImageFilter::new(geometry, IdentityTransform, LinearInterpolator::new()).apply(floating)?;
                let buffer = VolumeBuffer::from_image(&floating_on_reference)?;
                let blocks = self.sampler.sample(&buffer);
                Some((buffer, blocks))
            }
            _ => None,
        };

        let blocks_available = match self.symmetry {
            SymmetryKind::Kissing => true,
            SymmetryKind::Asymmetric => !forward_blocks.is_empty(),
            SymmetryKind::Symmetric => {
                !forward_blocks.is_empty() || backward.as_ref().map_or(false, |(_, b)| !b.is_empty())
            }
        };
        if !blocks_available {
            warn!(level = self.level, "no block passed the variance threshold, level skipped");
            self.progress.skip(self.max_iterations);
            return Ok(LevelOutcome {
                velocity,
                iterations: 0,
                converged: false,
                aborted: false,
            });
        }
        info!(
            level = self.level,
            blocks = forward_blocks.len(),
            dams = forward_blocks.dam_count(),
            symmetry = ?self.symmetry,
            "level blocks sampled"
        );

        let mut velocity = velocity;
        let mut iterations = 0;
        let mut converged = false;
        for iteration in 1..=self.max_iterations {
            let step = match (self.symmetry, &backward) {
                (SymmetryKind::Symmetric, Some((floating_buffer, backward_blocks))) => self.symmetric_step(
                    (&reference_buffer, &forward_blocks),
                    (floating_buffer, backward_blocks),
                    reference,
                    floating,
                    &velocity,
                )?,
                (SymmetryKind::Kissing, _) => self.kissing_step(reference, floating, &velocity)?,
                _ => self.asymmetric_step(&reference_buffer, floating, &velocity, &forward_blocks)?,
            };
            // Aborted mid-iteration: the partial update is discarded.
            let Some(step) = step else {
                info!(level = self.level, iteration, "level aborted");
                return Ok(LevelOutcome {
                    velocity,
                    iterations,
                    converged: false,
                    aborted: true,
                });
            };

            velocity = step.velocity.smooth(self.elastic_sigma);
            validate_field(velocity.velocity(), "velocity field")?;
            iterations = iteration;
            self.progress
                .iteration_done(self.level, iteration, step.update_norm, step.matched);
            info!(
                level = self.level,
                iteration,
                update_norm = step.update_norm,
                matched = step.matched,
                "block-matching iteration done"
            );

            if step.update_norm < self.minimal_transform_error {
                converged = true;
                self.progress.skip(self.max_iterations - iteration);
                debug!(level = self.level, iteration, "level converged");
                break;
            }
        }

        Ok(LevelOutcome {
            velocity,
            iterations,
            converged,
            aborted: false,
        })
    }

    /// Reference blocks against `F ∘ exp(v)`.
    fn asymmetric_step<B: Backend>(
        &self,
        reference: &VolumeBuffer,
        floating: &Image<B, 3>,
        velocity: &StationaryVelocityField<B>,
        blocks: &SampledBlocks,
    ) -> Result<Option<Step<B>>> {
        let geometry = *reference.geometry();
        let moving = VolumeBuffer::from_image(&warp(floating, velocity, &geometry)?)?;
        let estimates = self
            .matcher
            .match_blocks(blocks, reference, &moving, MatchMode::Asymmetric, self.token);
        if self.token.is_cancelled() {
            return Ok(None);
        }
        let update = self.aggregate(&estimates, &geometry, velocity)?;
        Ok(Some(Step {
            update_norm: update.max_norm(),
            velocity: velocity.compose_update(&update)?,
            matched: estimates.len(),
        }))
    }

    /// Forward `R` against `F ∘ exp(v)` and backward `F` against
    /// `R ∘ exp(-v)`; the new field is `½ (BCH(v, u_f) - BCH(-v, u_b))`.
    fn symmetric_step<B: Backend>(
        &self,
        forward: (&VolumeBuffer, &SampledBlocks),
        backward: (&VolumeBuffer, &SampledBlocks),
        reference: &Image<B, 3>,
        floating: &Image<B, 3>,
        velocity: &StationaryVelocityField<B>,
    ) -> Result<Option<Step<B>>> {
        let geometry = *reference.geometry();
        let inverse = velocity.scale(-1.0);

        let forward_moving = VolumeBuffer::from_image(&warp(floating, velocity, &geometry)?)?;
        let forward_estimates =
            self.matcher
                .match_blocks(forward.1, forward.0, &forward_moving, MatchMode::Asymmetric, self.token);
        if self.token.is_cancelled() {
            return Ok(None);
        }
        let backward_moving = VolumeBuffer::from_image(&warp(reference, &inverse, &geometry)?)?;
        let backward_estimates =
            self.matcher
                .match_blocks(backward.1, backward.0, &backward_moving, MatchMode::Asymmetric, self.token);
        if self.token.is_cancelled() {
            return Ok(None);
        }

        let forward_update = self.aggregate(&forward_estimates, &geometry, velocity)?;
        let backward_update = self.aggregate(&backward_estimates, &geometry, velocity)?;
        let forward_field = velocity.compose_update(&forward_update)?;
        let backward_field = inverse.compose_update(&backward_update)?;
        let next = forward_field.velocity().sub(backward_field.velocity())?.scale(0.5);

        Ok(Some(Step {
            update_norm: forward_update.sub(&backward_update)?.scale(0.5).max_norm(),
            velocity: StationaryVelocityField::new(next),
            matched: forward_estimates.len() + backward_estimates.len(),
        }))
    }

    /// `R ∘ exp(-v)` against `F ∘ exp(v)` with blocks on their average; `v`
    /// is half of the full transformation.
    fn kissing_step<B: Backend>(
        &self,
        reference: &Image<B, 3>,
        floating: &Image<B, 3>,
        velocity: &StationaryVelocityField<B>,
    ) -> Result<Option<Step<B>>> {
        let geometry = *reference.geometry();
        let reference_half = VolumeBuffer::from_image(&warp(reference, &velocity.scale(-1.0), &geometry)?)?;
        let floating_half = VolumeBuffer::from_image(&warp(floating, velocity, &geometry)?)?;
        let blocks = self.sampler.sample(&reference_half.average(&floating_half)?);
        debug!(level = self.level, blocks = blocks.len(), "half-way blocks sampled");

        let estimates = self
            .matcher
            .match_blocks(&blocks, &reference_half, &floating_half, MatchMode::Kissing, self.token);
        if self.token.is_cancelled() {
            return Ok(None);
        }
        let update = self.aggregate(&estimates, &geometry, velocity)?;
        Ok(Some(Step {
            update_norm: update.max_norm(),
            velocity: velocity.compose_update(&update)?,
            matched: estimates.len(),
        }))
    }

    fn aggregate<B: Backend>(
        &self,
        estimates: &[BlockEstimate],
        geometry: &ImageGeometry<3>,
        like: &StationaryVelocityField<B>,
    ) -> Result<VectorField<B>> {
        let host = self.aggregator.fit(estimates, geometry)?;
        Ok(VectorField::from_host(&host, &like.velocity().device()))
    }
}

/// Resample `image` onto `geometry` through `exp(velocity)`.
pub fn warp<B: Backend>(
    image: &Image<B, 3>,
    velocity: &StationaryVelocityField<B>,
    geometry: &ImageGeometry<3>,
) -> Result<Image<B, 3>> {
    let filter = ResampleImageFilter::new(*geometry, velocity.exponential(), LinearInterpolator::new());
    Ok(filter.apply(image)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::config::MetricKind;
    use crate::optimizer::SearchSpace;

    type B = NdArray<f32>;

    fn blob(size: [usize; 3], shift: f64) -> Image<B, 3> {
        let geometry = ImageGeometry::with_size(size).unwrap();
        let mut values = Vec::with_capacity(geometry.num_voxels());
        for z in 0..size[2] {
            for y in 0..size[1] {
                for x in 0..size[0] {
                    let xs = x as f64 - shift;
                    let v = 60.0 * (0.6 * xs).sin() * (0.5 * y as f64).cos() + 30.0 * (0.4 * z as f64).sin();
                    values.push(v as f32);
                }
            }
        }
        Image::from_vec(values, geometry, &Default::default()).unwrap()
    }

    fn config(symmetry: SymmetryKind) -> RegistrationConfig {
        RegistrationConfig::new()
            .with_symmetry(symmetry)
            .with_metric(MetricKind::MeanSquares)
            .with_stdev_threshold(1.0)
            .with_use_transformation_dam(false)
            .with_max_iterations(3)
    }

    #[test]
    fn test_identical_images_stop_after_one_iteration() {
        for symmetry in [SymmetryKind::Asymmetric, SymmetryKind::Symmetric, SymmetryKind::Kissing] {
            let image = blob([12, 12, 12], 0.0);
            let token = CancellationToken::new();
            let progress = ProgressSink::silent(3);
            let level = LevelRegistration::new(&config(symmetry), 0, 1.0, &token, &progress);
            let start = StationaryVelocityField::zeros(*image.geometry(), &Default::default());
            let outcome = level.run(&image, &image, start).unwrap();
            assert_eq!(outcome.iterations, 1, "{:?}", symmetry);
            assert!(outcome.converged);
            assert!(outcome.velocity.velocity().max_norm() < 1e-6);
            assert_eq!(progress.completed(), 3);
        }
    }

    #[test]
    fn test_translation_is_recovered() {
        let reference = blob([16, 16, 16], 0.0);
        let floating = blob([16, 16, 16], 1.0);
        let token = CancellationToken::new();
        let progress = ProgressSink::silent(5);
        let config = config(SymmetryKind::Asymmetric).with_max_iterations(5).with_elastic_sigma(1.0);
        let level = LevelRegistration::new(&config, 0, 1.0, &token, &progress);
        let start = StationaryVelocityField::zeros(*reference.geometry(), &Default::default());
        let outcome = level.run(&reference, &floating, start).unwrap();

        let host = outcome.velocity.velocity().to_host().unwrap();
        let center = (8 * 16 + 8) * 16 + 8;
        let v = host.get(center);
        assert!((v[0] - 1.0).abs() < 0.25, "{:?}", v);
        assert!(v[1].abs() < 0.25 && v[2].abs() < 0.25, "{:?}", v);
    }

    #[test]
    fn test_abort_keeps_incoming_field() {
        let image = blob([10, 10, 10], 0.0);
        let token = CancellationToken::new();
        token.cancel();
        let progress = ProgressSink::silent(3);
        let level = LevelRegistration::new(&config(SymmetryKind::Asymmetric), 0, 1.0, &token, &progress);
        let start = StationaryVelocityField::zeros(*image.geometry(), &Default::default());
        let outcome = level.run(&image, &blob([10, 10, 10], 1.0), start).unwrap();
        assert!(outcome.aborted);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.velocity.velocity().max_norm(), 0.0);
        assert_eq!(progress.completed(), 0);
    }

    #[test]
    fn test_level_scaling() {
        let config = RegistrationConfig::new();
        let token = CancellationToken::new();
        let progress = ProgressSink::silent(1);
        let level = LevelRegistration::new(&config, 0, 2.0, &token, &progress);
        assert_eq!(level.elastic_sigma, 6.0);
        assert_eq!(level.sampler.dam_distance, 7.5);
        assert_eq!(level.matcher.space(), &SearchSpace::from_config(&config, config.transform, 2.0));
    }
}
