pub mod filter;
pub mod image;
pub mod interpolation;
pub mod spatial;

pub use image::{Image, ImageMetadata, VolumeStack};
pub use spatial::{Direction, Point, Spacing, Vector};
