//! Pyramidal dense stationary velocity field registration by block matching.

pub mod error;
pub mod config;
pub mod cancel;
pub mod progress;
pub mod validation;
pub mod block;
pub mod metric;
pub mod optimizer;
pub mod matcher;
pub mod aggregator;
pub mod level;
pub mod bridge;

pub use error::{RegistrationError, Result};
pub use config::{AggregatorKind, MetricKind, OptimizerKind, RegistrationConfig, SymmetryKind};
pub use cancel::CancellationToken;
pub use progress::{HistoryObserver, ProgressBarObserver, ProgressInfo, ProgressObserver, TracingProgressObserver};
pub use bridge::{PyramidalSvfRegistration, RegistrationOutcome, RegistrationState};
pub use svfbm_core::transform::LocalTransformKind;
