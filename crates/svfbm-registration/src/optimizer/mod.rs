//! Per-block search strategies.
//!
//! An optimizer maximizes a block objective over the parameters of a local
//! transform. Objectives return `None` for candidates that cannot be scored;
//! those candidates never win.

pub mod trait_;
pub mod exhaustive;
pub mod pattern_search;

pub use trait_::{create_optimizer, BlockOptimizer, Objective, OptimizationResult, SearchSpace, StopCondition};
pub use exhaustive::ExhaustiveOptimizer;
pub use pattern_search::PatternSearchOptimizer;
