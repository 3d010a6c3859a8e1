//! Run configuration.
//!
//! [`RegistrationConfig`] is a burn `Config`: every field has a default, it
//! can be built with the generated `with_*` setters and saved to or loaded
//! from JSON.

use burn::config::Config;
use serde::{Deserialize, Serialize};
use svfbm_core::transform::LocalTransformKind;
use crate::error::RegistrationError;

/// How the two images take part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymmetryKind {
    /// Blocks on the reference, matched in the warped floating image.
    Asymmetric,
    /// Forward and backward matching averaged into one field.
    Symmetric,
    /// Both images warped half-way and matched against each other.
    Kissing,
}

/// Block similarity measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    MeanSquares,
    Correlation,
    SquaredCorrelation,
}

/// Per-block search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Translation grid over the search radius.
    Exhaustive,
    /// Derivative-free bounded pattern search.
    Bobyqa,
}

/// Sparse-to-dense field fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatorKind {
    /// Robust iteratively reweighted Gaussian fusion.
    MEstimation,
    /// Single-pass normalized Gaussian fusion.
    Baloo,
}

/// Parameters of a pyramidal dense SVF block-matching run.
#[derive(Config, Debug, PartialEq)]
pub struct RegistrationConfig {
    #[config(default = "SymmetryKind::Asymmetric")]
    pub symmetry: SymmetryKind,
    #[config(default = "LocalTransformKind::Translation")]
    pub transform: LocalTransformKind,
    #[config(default = "MetricKind::SquaredCorrelation")]
    pub metric: MetricKind,
    #[config(default = "OptimizerKind::Bobyqa")]
    pub optimizer: OptimizerKind,
    #[config(default = "AggregatorKind::Baloo")]
    pub aggregator: AggregatorKind,

    /// Block edge length in voxels.
    #[config(default = "5")]
    pub block_size: usize,
    /// Stride between block origins in voxels.
    #[config(default = "2")]
    pub block_spacing: usize,
    /// Blocks whose intensity standard deviation is below this are ignored.
    #[config(default = "5.0")]
    pub stdev_threshold: f64,
    /// Fraction of the highest-variance blocks kept, in (0, 1].
    #[config(default = "0.8")]
    pub percentage_kept: f64,

    /// Block-matching iterations per pyramid level.
    #[config(default = "10")]
    pub max_iterations: usize,
    /// A level stops once the largest update vector is shorter than this.
    #[config(default = "0.01")]
    pub minimal_transform_error: f64,
    #[config(default = "100")]
    pub optimizer_max_iterations: usize,

    /// Translation search radius in voxels.
    #[config(default = "2.0")]
    pub search_radius: f64,
    /// Rotation search radius in degrees.
    #[config(default = "5.0")]
    pub search_angle_radius: f64,
    /// Skew search radius in degrees.
    #[config(default = "5.0")]
    pub search_skew_radius: f64,
    /// Log-scale search radius.
    #[config(default = "0.1")]
    pub search_scale_radius: f64,
    /// Pattern search stops below this step, relative to the search radii.
    #[config(default = "0.001")]
    pub final_radius: f64,
    /// Exhaustive grid step in voxels.
    #[config(default = "1.0")]
    pub step_size: f64,
    /// Translation bound in voxels.
    #[config(default = "50.0")]
    pub translate_upper_bound: f64,
    /// Rotation bound in degrees.
    #[config(default = "180.0")]
    pub angle_upper_bound: f64,
    /// Skew bound in degrees.
    #[config(default = "45.0")]
    pub skew_upper_bound: f64,
    /// Scale bound, as a ratio.
    #[config(default = "3.0")]
    pub scale_upper_bound: f64,

    /// Spatial sigma of the aggregation, in mean voxel spacings.
    #[config(default = "3.0")]
    pub extrapolation_sigma: f64,
    /// Sigma of the field regularization, in mean voxel spacings.
    #[config(default = "3.0")]
    pub elastic_sigma: f64,
    /// Residuals beyond this many standard deviations get zero weight.
    #[config(default = "3.0")]
    pub outlier_sigma: f64,
    #[config(default = "0.01")]
    pub m_estimate_convergence_threshold: f64,
    /// Aggregation neighborhood radius, in extrapolation sigmas.
    #[config(default = "2.5")]
    pub neighborhood_approximation: f64,

    #[config(default = "true")]
    pub use_transformation_dam: bool,
    /// Dam distance, in extrapolation sigmas.
    #[config(default = "2.5")]
    pub dam_distance: f64,

    #[config(default = "3")]
    pub number_of_pyramid_levels: usize,
    /// Number of finest levels left out.
    #[config(default = "0")]
    pub last_pyramid_level: usize,
    /// Worker threads; 0 uses every core.
    #[config(default = "0")]
    pub number_of_threads: usize,
}

impl RegistrationConfig {
    /// Reject parameter combinations that cannot produce a run.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.number_of_pyramid_levels == 0 {
            return Err(RegistrationError::invalid_configuration("at least one pyramid level is required"));
        }
        if self.last_pyramid_level >= self.number_of_pyramid_levels {
            return Err(RegistrationError::invalid_configuration(format!(
                "last_pyramid_level ({}) must be below number_of_pyramid_levels ({})",
                self.last_pyramid_level, self.number_of_pyramid_levels
            )));
        }
        if self.block_size == 0 || self.block_spacing == 0 {
            return Err(RegistrationError::invalid_configuration("block size and block spacing must be positive"));
        }
        if !(self.percentage_kept > 0.0 && self.percentage_kept <= 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "percentage_kept must be in (0, 1], got {}",
                self.percentage_kept
            )));
        }
        if self.max_iterations == 0 || self.optimizer_max_iterations == 0 {
            return Err(RegistrationError::invalid_configuration("iteration caps must be positive"));
        }

        let positive = [
            ("search_radius", self.search_radius),
            ("search_angle_radius", self.search_angle_radius),
            ("search_skew_radius", self.search_skew_radius),
            ("search_scale_radius", self.search_scale_radius),
            ("final_radius", self.final_radius),
            ("step_size", self.step_size),
            ("translate_upper_bound", self.translate_upper_bound),
            ("angle_upper_bound", self.angle_upper_bound),
            ("skew_upper_bound", self.skew_upper_bound),
            ("extrapolation_sigma", self.extrapolation_sigma),
            ("outlier_sigma", self.outlier_sigma),
            ("neighborhood_approximation", self.neighborhood_approximation),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(self.scale_upper_bound > 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "scale_upper_bound must exceed 1, got {}",
                self.scale_upper_bound
            )));
        }

        let non_negative = [
            ("stdev_threshold", self.stdev_threshold),
            ("minimal_transform_error", self.minimal_transform_error),
            ("elastic_sigma", self.elastic_sigma),
            ("m_estimate_convergence_threshold", self.m_estimate_convergence_threshold),
            ("dam_distance", self.dam_distance),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Pyramid levels that are processed, coarsest first.
    pub fn processed_levels(&self) -> std::ops::Range<usize> {
        0..self.number_of_pyramid_levels.saturating_sub(self.last_pyramid_level)
    }

    /// Variance threshold used by the block sampler.
    pub fn variance_threshold(&self) -> f64 {
        self.stdev_threshold * self.stdev_threshold
    }
}
