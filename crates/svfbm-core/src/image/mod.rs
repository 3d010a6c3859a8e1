//! Volumes with physical metadata.
//!
//! [`Image`] keeps voxel data as a burn tensor in `[Z, Y, X]` layout, while
//! [`ImageGeometry`] carries the index-to-physical mapping with sizes ordered
//! `(x, y, z)`. [`VolumeBuffer`] is a host copy used by the random-access
//! block stages.

pub mod geometry;
pub mod image;
pub mod buffer;
pub mod grid;

pub use geometry::ImageGeometry;
pub use image::Image;
pub use buffer::VolumeBuffer;
pub use grid::generate_grid;
