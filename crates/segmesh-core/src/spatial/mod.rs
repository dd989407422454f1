//! Spatial types for volume geometry.
//!
//! Points, vectors, spacing and direction matrices that describe how voxel
//! indices map into scanner (world) space. All of them wrap nalgebra types.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::{AxisCode, Direction};

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;
