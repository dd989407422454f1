//! Sampling volumes at continuous indices.

pub mod trait_;
pub mod linear;
pub mod nearest;

pub use trait_::{Interpolator, InterpolationMode};
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
