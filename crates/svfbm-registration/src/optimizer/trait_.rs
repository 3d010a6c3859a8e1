//! Optimizer trait and search-space description.

use std::fmt;
use svfbm_core::transform::LocalTransformKind;
use crate::config::{OptimizerKind, RegistrationConfig};
use super::{ExhaustiveOptimizer, PatternSearchOptimizer};

/// Block objective: higher is better, `None` when undefined.
pub type Objective<'a> = dyn Fn(&[f64]) -> Option<f64> + 'a;

/// Per-parameter radii and bounds, in the units of
/// [`LocalTransform::from_parameters`](svfbm_core::transform::LocalTransform::from_parameters).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    /// Initial search extent of each parameter.
    pub radii: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Grid step of the exhaustive translation search, physical units.
    pub step_size: f64,
    /// Pattern search stops once its normalized step is below this.
    pub final_radius: f64,
    /// Cap on objective evaluations.
    pub max_evaluations: usize,
}

impl SearchSpace {
    /// Derive the search space of a level.
    ///
    /// # Arguments
    /// * `config` - Run configuration (radii and bounds in voxels and degrees)
    /// * `kind` - Local transform family being searched
    /// * `mean_spacing` - Mean voxel spacing of the level
    pub fn from_config(config: &RegistrationConfig, kind: LocalTransformKind, mean_spacing: f64) -> Self {
        let translation_radius = config.search_radius * mean_spacing;
        let translation_bound = config.translate_upper_bound * mean_spacing;
        let angle_radius = config.search_angle_radius.to_radians();
        let angle_bound = config.angle_upper_bound.to_radians();
        let skew_radius = config.search_skew_radius.to_radians();
        let skew_bound = config.skew_upper_bound.to_radians();
        let scale_bound = config.scale_upper_bound.ln();

        let per_group = [
            (translation_radius, translation_bound),
            (angle_radius, angle_bound),
            (config.search_scale_radius, scale_bound),
            (skew_radius, skew_bound),
        ];
        let count = kind.parameter_count();
        let mut radii = Vec::with_capacity(count);
        let mut lower = Vec::with_capacity(count);
        let mut upper = Vec::with_capacity(count);
        for i in 0..count {
            let (radius, bound) = per_group[i / 3];
            radii.push(radius.min(bound));
            lower.push(-bound);
            upper.push(bound);
        }

        Self {
            radii,
            lower,
            upper,
            step_size: config.step_size * mean_spacing,
            final_radius: config.final_radius,
            max_evaluations: config.optimizer_max_iterations,
        }
    }

    pub fn dimension(&self) -> usize {
        self.radii.len()
    }

    /// Clamp a parameter vector into the bounds.
    pub fn clamp(&self, params: &mut [f64]) {
        for (i, p) in params.iter_mut().enumerate() {
            *p = p.clamp(self.lower[i], self.upper[i]);
        }
    }
}

/// Why a block search ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCondition {
    /// The normalized step fell below the final radius.
    Converged { step: f64 },
    /// The evaluation cap was hit.
    MaxEvaluations,
    /// Every grid candidate was visited.
    GridExhausted,
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged { step } => write!(f, "converged (step {:.2e} below final radius)", step),
            Self::MaxEvaluations => write!(f, "maximum number of evaluations reached"),
            Self::GridExhausted => write!(f, "search grid exhausted"),
        }
    }
}

/// Best parameters found for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub parameters: Vec<f64>,
    pub score: f64,
    pub evaluations: usize,
    pub stop: StopCondition,
}

/// Maximizes a block objective.
pub trait BlockOptimizer: Send + Sync {
    /// Search the space for the best-scoring parameters.
    ///
    /// Returns `None` when no candidate could be scored.
    fn optimize(&self, objective: &Objective<'_>, space: &SearchSpace) -> Option<OptimizationResult>;

    fn name(&self) -> &'static str;
}

/// Build the optimizer selected in the configuration.
pub fn create_optimizer(kind: OptimizerKind) -> Box<dyn BlockOptimizer> {
    match kind {
        OptimizerKind::Exhaustive => Box::new(ExhaustiveOptimizer),
        OptimizerKind::Bobyqa => Box::new(PatternSearchOptimizer::default()),
    }
}
