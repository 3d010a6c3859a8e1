//! Exhaustive translation search.

use super::trait_::{BlockOptimizer, Objective, OptimizationResult, SearchSpace, StopCondition};

/// Visits every translation on a regular grid spanning the search radius.
///
/// Only the three translation parameters are searched; rotation, scale and
/// skew stay at zero. The grid is centered on zero translation, which is
/// always a candidate. Equal scores resolve to the shortest translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveOptimizer;

impl ExhaustiveOptimizer {
    fn axis_offsets(radius: f64, lower: f64, upper: f64, step: f64) -> Vec<f64> {
        let steps = if step > 0.0 { (radius / step).floor() as i64 } else { 0 };
        (-steps..=steps)
            .map(|k| k as f64 * step)
            .filter(|&t| t >= lower && t <= upper)
            .collect()
    }
}

impl BlockOptimizer for ExhaustiveOptimizer {
    fn optimize(&self, objective: &Objective<'_>, space: &SearchSpace) -> Option<OptimizationResult> {
        let dimension = space.dimension();
        let searched = dimension.min(3);
        let axes: Vec<Vec<f64>> = (0..3)
            .map(|a| {
                if a < searched {
                    Self::axis_offsets(space.radii[a], space.lower[a], space.upper[a], space.step_size)
                } else {
                    vec![0.0]
                }
            })
            .collect();

        let mut params = vec![0.0; dimension];
        let mut best: Option<(Vec<f64>, f64, f64)> = None;
        let mut evaluations = 0;
        for &tz in &axes[2] {
            for &ty in &axes[1] {
                for &tx in &axes[0] {
                    for (a, t) in [tx, ty, tz].into_iter().enumerate().take(searched) {
                        params[a] = t;
                    }
                    evaluations += 1;
                    if let Some(score) = objective(&params) {
                        let length = tx * tx + ty * ty + tz * tz;
                        let better = best
                            .as_ref()
                            .map_or(true, |(_, s, l)| score > *s || (score == *s && length < *l));
                        if better {
                            best = Some((params.clone(), score, length));
                        }
                    }
                }
            }
        }

        best.map(|(parameters, score, _)| OptimizationResult {
            parameters,
            score,
            evaluations,
            stop: StopCondition::GridExhausted,
        })
    }

    fn name(&self) -> &'static str {
        "Exhaustive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(radius: f64, step: f64) -> SearchSpace {
        SearchSpace {
            radii: vec![radius; 3],
            lower: vec![-10.0; 3],
            upper: vec![10.0; 3],
            step_size: step,
            final_radius: 1e-3,
            max_evaluations: 100,
        }
    }

    #[test]
    fn test_finds_grid_optimum() {
        let target = [1.0, -2.0, 0.0];
        let objective = |p: &[f64]| Some(-p.iter().zip(&target).map(|(a, b)| (a - b).powi(2)).sum::<f64>());
        let result = ExhaustiveOptimizer.optimize(&objective, &space(2.0, 1.0)).unwrap();
        assert_eq!(result.parameters, vec![1.0, -2.0, 0.0]);
        assert_eq!(result.evaluations, 125);
        assert_eq!(result.stop, StopCondition::GridExhausted);
    }

    #[test]
    fn test_invalid_everywhere() {
        let objective = |_: &[f64]| -> Option<f64> { None };
        assert!(ExhaustiveOptimizer.optimize(&objective, &space(1.0, 1.0)).is_none());
    }

    #[test]
    fn test_extra_parameters_stay_zero() {
        let mut s = space(1.0, 1.0);
        s.radii.extend([0.1; 3]);
        s.lower.extend([-1.0; 3]);
        s.upper.extend([1.0; 3]);
        let objective = |p: &[f64]| Some(p[0] + p[3]);
        let result = ExhaustiveOptimizer.optimize(&objective, &s).unwrap();
        assert_eq!(result.parameters, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ties_resolve_to_shortest_translation() {
        // Flat in y and z: every (ty, tz) scores the same.
        let objective = |p: &[f64]| Some(-(p[0] - 1.0).powi(2));
        let result = ExhaustiveOptimizer.optimize(&objective, &space(2.0, 1.0)).unwrap();
        assert_eq!(result.parameters, vec![1.0, 0.0, 0.0]);

        let constant = |_: &[f64]| Some(0.0);
        let result = ExhaustiveOptimizer.optimize(&constant, &space(2.0, 1.0)).unwrap();
        assert_eq!(result.parameters, vec![0.0, 0.0, 0.0]);
    }
}
