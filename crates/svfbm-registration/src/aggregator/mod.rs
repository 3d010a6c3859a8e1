//! Sparse-to-dense fusion of block estimates into a velocity field.

pub mod trait_;
pub mod neighborhood;
pub mod kernel;
pub mod m_estimator;

pub use trait_::{create_aggregator, Aggregator};
pub use neighborhood::{voxel_center, Contributor, Neighborhood};
pub use kernel::KernelAggregator;
pub use m_estimator::MEstimationAggregator;
