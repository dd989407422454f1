//! Volume types.
//!
//! `Image` is a single scalar volume with world-space metadata; `VolumeStack`
//! is a channel-first stack of co-registered volumes sharing one geometry.

pub mod image;
pub mod metadata;
pub mod stack;

pub use image::Image;
pub use metadata::ImageMetadata;
pub use stack::{StackError, VolumeStack};
