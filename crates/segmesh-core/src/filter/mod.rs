//! Volume preprocessing filters.

pub mod normalize;
pub mod orientation;
pub mod resample;

pub use normalize::NonZeroNormalizer;
pub use orientation::{OrientationFilter, OrientationPlan};
pub use resample::{ResampleFilter, SingularGeometry};
