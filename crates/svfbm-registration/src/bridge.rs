//! Pyramidal dense SVF block-matching registration.
//!
//! [`PyramidalSvfRegistration`] builds reference and floating pyramids, runs
//! the block-matching iterations of every processed level from coarse to
//! fine while carrying the velocity field between levels, then exponentiates
//! the final field and resamples the floating image onto the reference grid.
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use svfbm_registration::{PyramidalSvfRegistration, RegistrationConfig, TracingProgressObserver};
//!
//! let registration = PyramidalSvfRegistration::new(RegistrationConfig::new())?
//!     .with_observer(Arc::new(TracingProgressObserver::default()));
//! let outcome = registration.run(&reference, &floating)?;
//! ```

use std::sync::Arc;
use burn::tensor::backend::Backend;
use rayon::ThreadPoolBuilder;
use tracing::{error, info, warn};
use svfbm_core::filter::{MultiResolutionPyramid, ResampleImageFilter};
use svfbm_core::image::Image;
use svfbm_core::interpolation::LinearInterpolator;
use svfbm_core::transform::{DisplacementFieldTransform, StationaryVelocityField};
use crate::cancel::CancellationToken;
use crate::config::{RegistrationConfig, SymmetryKind};
use crate::error::{RegistrationError, Result};
use crate::level::LevelRegistration;
use crate::progress::{ProgressObserver, ProgressSink};
use crate::validation::{validate_field, validate_volume_pair};

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Every processed level ran to completion.
    Done,
    /// An abort was requested; the result holds the levels finished so far.
    Aborted,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome<B: Backend> {
    /// Floating image resampled onto the reference grid, zero outside.
    pub warped: Image<B, 3>,
    /// Stationary velocity field on the reference grid.
    pub velocity: StationaryVelocityField<B>,
    /// `exp(velocity)`, mapping reference points into the floating image.
    pub transform: DisplacementFieldTransform<B>,
    pub state: RegistrationState,
    /// Levels that produced a field.
    pub levels_processed: usize,
}

/// Multi-resolution block-matching registration with a dense SVF.
pub struct PyramidalSvfRegistration {
    config: RegistrationConfig,
    observers: Vec<Arc<dyn ProgressObserver>>,
    token: CancellationToken,
}

impl PyramidalSvfRegistration {
    /// Create a registration; the configuration is validated here.
    pub fn new(config: RegistrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observers: Vec::new(),
            token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    /// Token that aborts this registration when cancelled, usable from
    /// another thread or an observer. It is cleared when a run ends.
    pub fn abort_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request an abort. Blocks already being matched finish; the run stops
    /// after the current level. A request made before `run` aborts that run.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Register `floating` onto `reference`.
    ///
    /// Configuration and input errors are returned before any work starts.
    /// A failure inside a level fails the run and is reported to the
    /// observers. An abort returns `Ok` with [`RegistrationState::Aborted`].
    pub fn run<B: Backend>(&self, reference: &Image<B, 3>, floating: &Image<B, 3>) -> Result<RegistrationOutcome<B>> {
        let planned = self.config.processed_levels().len() * self.config.max_iterations;
        let progress = ProgressSink::new(self.observers.clone(), planned);

        let result = ThreadPoolBuilder::new()
            .num_threads(self.config.number_of_threads)
            .build()
            .map_err(|e| RegistrationError::thread_pool(e.to_string()))
            .and_then(|pool| pool.install(|| self.execute(reference, floating, &progress)));
        self.token.reset();

        match result {
            Ok(outcome) => {
                progress.complete(outcome.state);
                Ok(outcome)
            }
            Err(e) => {
                error!("Registration failed: {}", e);
                progress.error(&e.to_string());
                Err(e)
            }
        }
    }

    fn execute<B: Backend>(
        &self,
        reference: &Image<B, 3>,
        floating: &Image<B, 3>,
        progress: &ProgressSink,
    ) -> Result<RegistrationOutcome<B>> {
        validate_volume_pair(reference, floating)?;
        let device = reference.data().device();
        let levels = self.config.number_of_pyramid_levels;
        let processed = self.config.processed_levels();

        let reference_pyramid = MultiResolutionPyramid::new(reference, levels)?;
        let floating_pyramid = MultiResolutionPyramid::new(floating, levels)?;
        progress.start();
        info!(
            levels,
            processed = processed.len(),
            symmetry = ?self.config.symmetry,
            transform = ?self.config.transform,
            "Registration started"
        );

        let mut velocity: Option<StationaryVelocityField<B>> = None;
        let mut state = RegistrationState::Done;
        let mut levels_processed = 0;
        for level in processed.clone() {
            if self.token.is_cancelled() {
                state = RegistrationState::Aborted;
                break;
            }
            let (Some(reference_level), Some(floating_level)) =
                (reference_pyramid.level(level), floating_pyramid.level(level))
            else {
                warn!(level, "pyramid level missing, skipped");
                progress.skip(self.config.max_iterations);
                continue;
            };
            let geometry = *reference_level.geometry();
            progress.level_start(level, processed.len(), geometry.size());

            let start = match velocity.take() {
                Some(v) => v.resample_onto(&geometry),
                None => StationaryVelocityField::zeros(geometry, &device),
            };
            let outcome = LevelRegistration::new(&self.config, level, geometry.mean_spacing(), &self.token, progress)
                .run(reference_level, floating_level, start)?;
            info!(
                level,
                iterations = outcome.iterations,
                converged = outcome.converged,
                max_velocity = outcome.velocity.velocity().max_norm(),
                "level finished"
            );
            velocity = Some(outcome.velocity);
            levels_processed += 1;
            if outcome.aborted {
                state = RegistrationState::Aborted;
                break;
            }
        }

        // Skipped finest levels leave the field on a coarser grid.
        let geometry = *reference.geometry();
        let mut velocity = match velocity {
            Some(v) => v.resample_onto(&geometry),
            None => StationaryVelocityField::zeros(geometry, &device),
        };
        if self.config.symmetry == SymmetryKind::Kissing {
            velocity = velocity.scale(2.0);
        }
        validate_field(velocity.velocity(), "final velocity field")?;

        let transform = velocity.exponential();
        let warped = ResampleImageFilter::new(geometry, transform.clone(), LinearInterpolator::new())
            .with_default_pixel_value(0.0)
            .apply(floating)?;
        info!(?state, levels_processed, "Registration finished");

        Ok(RegistrationOutcome {
            warped,
            velocity,
            transform,
            state,
            levels_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use svfbm_core::image::ImageGeometry;
    use crate::progress::HistoryObserver;

    type B = NdArray<f32>;

    fn volume(size: [usize; 3]) -> Image<B, 3> {
        let geometry = ImageGeometry::with_size(size).unwrap();
        let mut values = Vec::new();
        for z in 0..size[2] {
            for y in 0..size[1] {
                for x in 0..size[0] {
                    values.push((40.0 * ((0.7 * x as f64).sin() + (0.5 * y as f64).cos() + (0.3 * z as f64).sin())) as f32);
                }
            }
        }
        Image::from_vec(values, geometry, &Default::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RegistrationConfig::new().with_number_of_pyramid_levels(0);
        assert!(matches!(
            PyramidalSvfRegistration::new(config),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_abort_before_run() {
        let history = Arc::new(HistoryObserver::new());
        let registration = PyramidalSvfRegistration::new(RegistrationConfig::new().with_number_of_pyramid_levels(2))
            .unwrap()
            .with_observer(history.clone());
        registration.abort_handle().cancel();

        let image = volume([12, 12, 12]);
        let outcome = registration.run(&image, &image).unwrap();
        assert_eq!(outcome.state, RegistrationState::Aborted);
        assert_eq!(outcome.levels_processed, 0);
        assert_eq!(outcome.velocity.velocity().max_norm(), 0.0);
        assert_eq!(outcome.warped.shape(), image.shape());
        assert_eq!(history.outcome(), Some(RegistrationState::Aborted));
    }

    #[test]
    fn test_abort_does_not_outlive_the_run() {
        let config = RegistrationConfig::new()
            .with_number_of_pyramid_levels(2)
            .with_max_iterations(2);
        let registration = PyramidalSvfRegistration::new(config).unwrap();
        let image = volume([12, 12, 12]);

        registration.abort();
        let first = registration.run(&image, &image).unwrap();
        assert_eq!(first.state, RegistrationState::Aborted);
        assert_eq!(first.levels_processed, 0);

        let second = registration.run(&image, &image).unwrap();
        assert_eq!(second.state, RegistrationState::Done);
        assert_eq!(second.levels_processed, 2);
        assert!(!registration.abort_handle().is_cancelled());
    }

    #[test]
    fn test_non_overlapping_inputs_fail_and_notify() {
        let history = Arc::new(HistoryObserver::new());
        let registration = PyramidalSvfRegistration::new(RegistrationConfig::new())
            .unwrap()
            .with_observer(history.clone());
        let reference = volume([8, 8, 8]);
        let geometry = ImageGeometry::new(
            [8, 8, 8],
            svfbm_core::spatial::Point::new([100.0, 0.0, 0.0]),
            svfbm_core::spatial::Spacing::uniform(1.0),
            svfbm_core::spatial::Direction::identity(),
        )
        .unwrap();
        let floating = Image::<B, 3>::from_vec(vec![1.0; 512], geometry, &Default::default()).unwrap();

        let result = registration.run(&reference, &floating);
        assert!(matches!(result, Err(RegistrationError::ImageValidation(_))));
        assert_eq!(history.errors().len(), 1);
        assert!(history.outcome().is_none());
    }
}
