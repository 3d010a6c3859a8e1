//! Bounded derivative-free pattern search.
//!
//! A compass search in coordinates normalized by the per-parameter search
//! radii: every round polls `±step` along each axis, moves to the best
//! improving poll, and halves the step when no poll improves. Parameters are
//! kept inside the bounds. The search starts at the identity transform.

use super::trait_::{BlockOptimizer, Objective, OptimizationResult, SearchSpace, StopCondition};

#[derive(Debug, Clone, Copy)]
pub struct PatternSearchOptimizer {
    /// Initial normalized step.
    pub initial_step: f64,
    /// Step reduction on an unsuccessful round.
    pub contraction: f64,
}

impl Default for PatternSearchOptimizer {
    fn default() -> Self {
        Self {
            initial_step: 0.5,
            contraction: 0.5,
        }
    }
}

impl BlockOptimizer for PatternSearchOptimizer {
    fn optimize(&self, objective: &Objective<'_>, space: &SearchSpace) -> Option<OptimizationResult> {
        let dimension = space.dimension();
        let mut current = vec![0.0; dimension];
        space.clamp(&mut current);
        let mut best_score = objective(&current);
        let mut evaluations = 1usize;
        let mut step = self.initial_step;
        let mut candidate = current.clone();

        let stop = loop {
            if step < space.final_radius {
                break StopCondition::Converged { step };
            }
            if evaluations >= space.max_evaluations {
                break StopCondition::MaxEvaluations;
            }

            let mut round_best: Option<(usize, f64, f64)> = None;
            'poll: for axis in 0..dimension {
                for sign in [1.0, -1.0] {
                    if evaluations >= space.max_evaluations {
                        break 'poll;
                    }
                    let moved = (current[axis] + sign * step * space.radii[axis])
                        .clamp(space.lower[axis], space.upper[axis]);
                    if moved == current[axis] {
                        continue;
                    }
                    candidate.copy_from_slice(&current);
                    candidate[axis] = moved;
                    evaluations += 1;
                    let Some(score) = objective(&candidate) else {
                        continue;
                    };
                    let improves_round = round_best.map_or(true, |(_, _, s)| score > s);
                    let improves_best = best_score.map_or(true, |b| score > b);
                    if improves_round && improves_best {
                        round_best = Some((axis, moved, score));
                    }
                }
            }

            match round_best {
                Some((axis, value, score)) => {
                    current[axis] = value;
                    best_score = Some(score);
                }
                None => step *= self.contraction,
            }
        };

        best_score.map(|score| OptimizationResult {
            parameters: current,
            score,
            evaluations,
            stop,
        })
    }

    fn name(&self) -> &'static str {
        "PatternSearch"
    }
}
