//! Core image, geometry and dense-transform primitives for svfbm.
//!
//! Volumes are burn tensors stored `[Z, Y, X]` with an [`ImageGeometry`]
//! placing them in physical space. Transforms, filters and interpolators
//! operate on batches of physical points.

pub mod error;
pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;

pub use error::{CoreError, Result};
pub use image::{Image, ImageGeometry, VolumeBuffer};
pub use spatial::{Direction, Point, Spacing, Vector};
