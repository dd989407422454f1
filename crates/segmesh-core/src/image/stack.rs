//! Channel-first stacks of co-registered volumes.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

use super::{Image, ImageMetadata};

/// Reasons a set of volumes cannot be stacked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StackError {
    #[error("cannot stack an empty set of volumes")]
    Empty,

    #[error("volume {index} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: [usize; 3],
        actual: [usize; 3],
    },
}

/// A `[C, Z, Y, X]` tensor of volumes sharing one geometry.
#[derive(Debug, Clone)]
pub struct VolumeStack<B: Backend> {
    data: Tensor<B, 4>,
    metadata: ImageMetadata<3>,
}

impl<B: Backend> VolumeStack<B> {
    pub fn new(data: Tensor<B, 4>, metadata: ImageMetadata<3>) -> Self {
        Self { data, metadata }
    }

    /// Stack volumes along a new leading channel axis, in the given order.
    ///
    /// All volumes must have the same shape. The geometry of the first volume
    /// is used for the stack.
    pub fn from_channels(images: Vec<Image<B, 3>>) -> Result<Self, StackError> {
        let first = images.first().ok_or(StackError::Empty)?;
        let expected = first.shape();
        let metadata = *first.metadata();

        for (index, image) in images.iter().enumerate().skip(1) {
            let actual = image.shape();
            if actual != expected {
                return Err(StackError::ShapeMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }

        let channels: Vec<Tensor<B, 3>> = images.into_iter().map(Image::into_data).collect();
        Ok(Self {
            data: Tensor::stack(channels, 0),
            metadata,
        })
    }

    /// The `[C, Z, Y, X]` voxel tensor.
    pub fn data(&self) -> &Tensor<B, 4> {
        &self.data
    }

    /// Consume the stack, keeping only the voxel tensor.
    pub fn into_data(self) -> Tensor<B, 4> {
        self.data
    }

    /// Geometry shared by every channel.
    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    /// Number of channels, the leading tensor dimension.
    pub fn num_channels(&self) -> usize {
        self.data.dims()[0]
    }

    /// Spatial tensor shape `[Z, Y, X]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let [_, z, y, x] = self.data.dims();
        [z, y, x]
    }

    /// One channel as a standalone volume with the stack's geometry.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`num_channels`](Self::num_channels).
    pub fn channel(&self, index: usize) -> Image<B, 3> {
        let [c, z, y, x] = self.data.dims();
        assert!(index < c, "channel {index} out of range for {c} channels");
        let data = self.data.clone().slice([index..index + 1, 0..z, 0..y, 0..x]).reshape([z, y, x]);
        Image::from_metadata(data, self.metadata)
    }

    /// Split back into per-channel volumes.
    pub fn into_channels(self) -> Vec<Image<B, 3>> {
        (0..self.num_channels()).map(|i| self.channel(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, Point, Spacing};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn volume(shape: [usize; 3], value: f32) -> Image<Backend, 3> {
        let device = Default::default();
        Image::new(
            Tensor::<Backend, 3>::ones(shape, &device) * value,
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        )
    }

    #[test]
    fn test_stack_preserves_channel_order() {
        let stack = VolumeStack::from_channels(vec![
            volume([2, 3, 4], 1.0),
            volume([2, 3, 4], 2.0),
            volume([2, 3, 4], 3.0),
        ])
        .unwrap();

        assert_eq!(stack.num_channels(), 3);
        assert_eq!(stack.spatial_shape(), [2, 3, 4]);
        let second = stack.channel(1).into_data().into_data();
        assert!(second.as_slice::<f32>().unwrap().iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_stack_rejects_mismatched_shapes() {
        let err = VolumeStack::from_channels(vec![volume([2, 3, 4], 1.0), volume([2, 3, 5], 1.0)]).unwrap_err();
        assert_eq!(
            err,
            StackError::ShapeMismatch {
                index: 1,
                expected: [2, 3, 4],
                actual: [2, 3, 5]
            }
        );
    }

    #[test]
    fn test_stack_rejects_empty() {
        let err = VolumeStack::<Backend>::from_channels(Vec::new()).unwrap_err();
        assert_eq!(err, StackError::Empty);
    }

    #[test]
    fn test_accessors_share_geometry() {
        let stack = VolumeStack::from_channels(vec![volume([2, 3, 4], 1.0), volume([2, 3, 4], 2.0)]).unwrap();
        assert_eq!(stack.num_channels(), 2);
        assert_eq!(stack.spatial_shape(), [2, 3, 4]);
        assert_eq!(stack.data().dims(), [2, 2, 3, 4]);
        assert_eq!(stack.channel(1).metadata(), stack.metadata());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_channel_out_of_range_panics() {
        let stack = VolumeStack::from_channels(vec![volume([2, 2, 2], 1.0)]).unwrap();
        stack.channel(1);
    }
}
