//! Spatial transforms.
//!
//! Dense transforms are built from [`VectorField`]s: a
//! [`StationaryVelocityField`] exponentiates into a
//! [`DisplacementFieldTransform`]. [`LocalTransform`] covers the small
//! per-block parametric models and [`lie`] their logarithm.

pub mod trait_;
pub mod identity;
pub mod vector_field;
pub mod displacement_field;
pub mod svf;
pub mod local;
pub mod lie;

pub use trait_::Transform;
pub use identity::IdentityTransform;
pub use vector_field::{HostVectorField, VectorField};
pub use displacement_field::DisplacementFieldTransform;
pub use svf::StationaryVelocityField;
pub use local::{generator_velocity, LocalTransform, LocalTransformKind};
