//! Spatial primitives used to place voxels in physical space.
//!
//! All types are thin wrappers around nalgebra so that geometry code can use
//! the full nalgebra API through `.0` while the rest of svfbm speaks in
//! domain names (origin, spacing, direction).

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::Direction;

pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Vector2 = Vector<2>;
pub type Vector3 = Vector<3>;
pub type Spacing2 = Spacing<2>;
pub type Spacing3 = Spacing<3>;
pub type Direction2 = Direction<2>;
pub type Direction3 = Direction<3>;
