//! Scalar volume with world-space metadata.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::ImageMetadata;
use crate::spatial::{Direction, Point, Spacing};

/// A scalar volume.
///
/// Voxels are stored in a tensor whose dimensions are the index axes in
/// reverse order (`[Z, Y, X]` for 3D), while continuous indices and points
/// are written `(x, y, z)`.
///
/// # Examples
/// ```rust
/// use segmesh_core::Image;
/// use segmesh_core::spatial::{Direction3, Point3, Spacing3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// let device = Default::default();
/// let data = Tensor::<NdArray<f32>, 3>::zeros([4, 5, 6], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(1.0), Direction3::identity());
/// assert_eq!(image.size(), [6, 5, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    metadata: ImageMetadata<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    pub fn new(data: Tensor<B, D>, origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            data,
            metadata: ImageMetadata::new(origin, spacing, direction),
        }
    }

    pub fn from_metadata(data: Tensor<B, D>, metadata: ImageMetadata<D>) -> Self {
        Self { data, metadata }
    }

    /// Voxel tensor, index axes reversed.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    /// Origin, spacing and direction together.
    pub fn metadata(&self) -> &ImageMetadata<D> {
        &self.metadata
    }

    pub fn origin(&self) -> &Point<D> {
        self.metadata.origin()
    }

    pub fn spacing(&self) -> &Spacing<D> {
        self.metadata.spacing()
    }

    pub fn direction(&self) -> &Direction<D> {
        self.metadata.direction()
    }

    /// Tensor shape (`[Z, Y, X]` for 3D).
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Number of voxels along each index axis (`[nx, ny, nz]` for 3D).
    pub fn size(&self) -> [usize; D] {
        let shape = self.shape();
        let mut size = [0; D];
        for i in 0..D {
            size[i] = shape[D - 1 - i];
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn image(origin: [f64; 3], spacing: [f64; 3]) -> Image<Backend, 3> {
        let device = Default::default();
        Image::new(
            Tensor::<Backend, 3>::zeros([4, 5, 6], &device),
            Point::new(origin),
            Spacing::new(spacing),
            Direction::identity(),
        )
    }

    #[test]
    fn test_shape_and_size() {
        let img = image([0.0; 3], [1.0; 3]);
        assert_eq!(img.shape(), [4, 5, 6]);
        assert_eq!(img.size(), [6, 5, 4]);
    }
}
