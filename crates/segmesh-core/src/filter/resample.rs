//! Resampling onto a new voxel grid.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use nalgebra::{Matrix3, Vector3 as NaVector3};
use thiserror::Error;

use crate::image::{Image, ImageMetadata, VolumeStack};
use crate::interpolation::Interpolator;
use crate::spatial::Spacing;

/// The input grid cannot be mapped back from world space.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("direction {direction:?} scaled by spacing {spacing:?} is not invertible")]
pub struct SingularGeometry {
    /// Row-major direction matrix
    pub direction: [[f64; 3]; 3],
    pub spacing: [f64; 3],
}

/// Default number of output voxels sampled per pass.
const DEFAULT_CHUNK_VOXELS: usize = 1 << 21;

/// Resamples volumes to a new spacing, keeping origin and direction.
///
/// The output grid covers the same field of view: each index axis gets
/// `round(n * s_in / s_out)` voxels (at least one). Output voxels are mapped
/// back to continuous input indices through world space and sampled with the
/// interpolator. Sampling is done in z-slabs of at most `chunk_voxels`
/// voxels so the index grid never materialises for the whole volume.
#[derive(Debug, Clone)]
pub struct ResampleFilter<I> {
    spacing: Spacing<3>,
    interpolator: I,
    chunk_voxels: usize,
}

impl<I> ResampleFilter<I> {
    pub fn new(spacing: Spacing<3>, interpolator: I) -> Self {
        Self {
            spacing,
            interpolator,
            chunk_voxels: DEFAULT_CHUNK_VOXELS,
        }
    }

    /// Same output spacing on every axis.
    pub fn isotropic(spacing: f64, interpolator: I) -> Self {
        Self::new(Spacing::uniform(spacing), interpolator)
    }

    pub fn with_chunk_voxels(mut self, chunk_voxels: usize) -> Self {
        self.chunk_voxels = chunk_voxels.max(1);
        self
    }

    pub fn spacing(&self) -> &Spacing<3> {
        &self.spacing
    }

    /// Output voxel counts per index axis `(x, y, z)`.
    pub fn output_size(&self, input_size: [usize; 3], input_spacing: &Spacing<3>) -> [usize; 3] {
        let mut size = [1; 3];
        for i in 0..3 {
            let extent = input_size[i] as f64 * input_spacing[i];
            size[i] = ((extent / self.spacing[i]).round() as usize).max(1);
        }
        size
    }

    /// Affine mapping output indices to input indices: `in = A * out + b`.
    fn index_mapping(
        &self,
        input: &ImageMetadata<3>,
        output: &ImageMetadata<3>,
    ) -> Result<(Matrix3<f64>, NaVector3<f64>), SingularGeometry> {
        let in_scale = Matrix3::from_diagonal(&input.spacing().0);
        let out_scale = Matrix3::from_diagonal(&output.spacing().0);
        let in_dir = input.direction().inner();
        let out_dir = output.direction().inner();

        let to_input = (in_dir * in_scale).try_inverse().ok_or_else(|| SingularGeometry {
            direction: std::array::from_fn(|r| std::array::from_fn(|c| in_dir[(r, c)])),
            spacing: input.spacing().to_array(),
        })?;

        let a = to_input * out_dir * out_scale;
        let b = to_input * (output.origin().0.coords - input.origin().0.coords);
        Ok((a, b))
    }
}

impl<I> ResampleFilter<I> {
    /// Resample every channel of a stack.
    ///
    /// # Errors
    ///
    /// [`SingularGeometry`] if the input direction scaled by the input
    /// spacing has no inverse, as for collinear direction columns or a zero
    /// spacing.
    pub fn apply<B: Backend>(&self, input: &VolumeStack<B>) -> Result<VolumeStack<B>, SingularGeometry>
    where
        I: Interpolator<B>,
    {
        let metadata = input.metadata();
        let [nz, ny, nx] = input.spatial_shape();
        let size = self.output_size([nx, ny, nz], metadata.spacing());
        let output_metadata = metadata.with_spacing(self.spacing);
        let (a, b) = self.index_mapping(metadata, &output_metadata)?;
        if metadata.spacing().0 == self.spacing.0 {
            return Ok(input.clone());
        }

        let [out_x, out_y, out_z] = size;
        let channels = input.num_channels();
        let device = input.data().device();
        let slab = (self.chunk_voxels / (out_x * out_y)).max(1);

        let mut chunks = Vec::with_capacity(out_z.div_ceil(slab));
        let mut z_start = 0;
        while z_start < out_z {
            let z_end = (z_start + slab).min(out_z);
            let grid = index_grid::<B>([out_x, out_y], z_start..z_end, &device);
            let source = apply_affine(grid, &a, &b, &device);
            chunks.push(self.interpolator.sample(input.data(), source));
            z_start = z_end;
        }

        let data = Tensor::cat(chunks, 1).reshape([channels, out_z, out_y, out_x]);
        Ok(VolumeStack::new(data, output_metadata))
    }

    /// Resample a single volume.
    pub fn apply_image<B: Backend>(&self, input: &Image<B, 3>) -> Result<Image<B, 3>, SingularGeometry>
    where
        I: Interpolator<B>,
    {
        let [z, y, x] = input.shape();
        let stack = VolumeStack::new(input.data().clone().reshape([1, z, y, x]), *input.metadata());
        Ok(self.apply(&stack)?.channel(0))
    }
}

/// Continuous `(x, y, z)` indices of a z-slab, ordered z-major like the tensor layout.
fn index_grid<B: Backend>(size_xy: [usize; 2], z_range: std::ops::Range<usize>, device: &B::Device) -> Tensor<B, 2> {
    let [w, h] = size_xy;
    let d = z_range.len();
    let n = d * h * w;

    let z = Tensor::<B, 1, Int>::arange(z_range.start as i64..z_range.end as i64, device)
        .reshape([d, 1, 1])
        .repeat(&[1, h, w])
        .reshape([n]);
    let y = Tensor::<B, 1, Int>::arange(0..h as i64, device)
        .reshape([1, h, 1])
        .repeat(&[d, 1, w])
        .reshape([n]);
    let x = Tensor::<B, 1, Int>::arange(0..w as i64, device)
        .reshape([1, 1, w])
        .repeat(&[d, h, 1])
        .reshape([n]);

    Tensor::stack(vec![x.float(), y.float(), z.float()], 1)
}

/// Apply `p -> A p + b` to row points `[N, 3]`.
fn apply_affine<B: Backend>(points: Tensor<B, 2>, a: &Matrix3<f64>, b: &NaVector3<f64>, device: &B::Device) -> Tensor<B, 2> {
    // Row vectors, so multiply by A^T.
    let mut a_t = Vec::with_capacity(9);
    for r in 0..3 {
        for c in 0..3 {
            a_t.push(a[(c, r)] as f32);
        }
    }
    let a_t = Tensor::<B, 2>::from_data(TensorData::new(a_t, Shape::new([3, 3])), device);
    let offset = Tensor::<B, 1>::from_data(
        TensorData::new(vec![b[0] as f32, b[1] as f32, b[2] as f32], Shape::new([3])),
        device,
    )
    .reshape([1, 3]);

    points.matmul(a_t) + offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::{LinearInterpolator, NearestNeighborInterpolator};
    use crate::spatial::{Direction, Point, Vector};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp(shape: [usize; 3], spacing: [f64; 3]) -> Image<TestBackend, 3> {
        let device = Default::default();
        let [nz, ny, nx] = shape;
        let mut values = Vec::with_capacity(nz * ny * nx);
        for _z in 0..nz {
            for _y in 0..ny {
                for x in 0..nx {
                    values.push(x as f32 * spacing[0] as f32);
                }
            }
        }
        Image::new(
            Tensor::from_data(TensorData::new(values, shape), &device),
            Point::origin(),
            Spacing::new(spacing),
            Direction::identity(),
        )
    }

    #[test]
    fn test_output_size_covers_field_of_view() {
        let filter = ResampleFilter::isotropic(1.0, LinearInterpolator::new());
        let size = filter.output_size([10, 20, 5], &Spacing::new([2.0, 0.5, 3.0]));
        assert_eq!(size, [20, 10, 15]);
    }

    #[test]
    fn test_upsample_linear_ramp() {
        let image = ramp([2, 2, 4], [2.0, 1.0, 1.0]);
        let filter = ResampleFilter::isotropic(1.0, LinearInterpolator::new());
        let out = filter.apply_image(&image).unwrap();

        assert_eq!(out.size(), [8, 2, 2]);
        assert!(out.spacing().is_isotropic(1.0));
        let data = out.into_data().into_data();
        let row = &data.as_slice::<f32>().unwrap()[0..8];
        // World x of output voxel i is i mm; the ramp stores world x, clamped at 6 mm.
        let expected = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 6.0];
        for (v, e) in row.iter().zip(expected) {
            assert!((v - e).abs() < 1e-4, "{v} vs {e}");
        }
    }

    #[test]
    fn test_chunked_matches_single_pass() {
        let image = ramp([3, 4, 5], [1.5, 0.75, 2.0]);
        let whole = ResampleFilter::isotropic(1.0, LinearInterpolator::new())
            .apply_image(&image)
            .unwrap();
        let chunked = ResampleFilter::isotropic(1.0, LinearInterpolator::new())
            .with_chunk_voxels(7)
            .apply_image(&image)
            .unwrap();

        assert_eq!(whole.shape(), chunked.shape());
        let a = whole.into_data().into_data();
        let b = chunked.into_data().into_data();
        for (x, y) in a.as_slice::<f32>().unwrap().iter().zip(b.as_slice::<f32>().unwrap()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_nearest_keeps_values_discrete() {
        let image = ramp([2, 2, 3], [3.0, 1.0, 1.0]);
        let out = ResampleFilter::isotropic(1.0, NearestNeighborInterpolator::new())
            .apply_image(&image)
            .unwrap();
        let data = out.into_data().into_data();
        assert!(data
            .as_slice::<f32>()
            .unwrap()
            .iter()
            .all(|v| [0.0, 3.0, 6.0].contains(v)));
    }

    #[test]
    fn test_matching_spacing_is_identity() {
        let image = ramp([2, 3, 4], [1.0, 1.0, 1.0]);
        let out = ResampleFilter::isotropic(1.0, LinearInterpolator::new()).apply_image(&image).unwrap();
        assert_eq!(out.shape(), [2, 3, 4]);
    }

    #[test]
    fn test_collinear_direction_is_an_error() {
        let device = Default::default();
        let direction = Direction::from_columns([
            Vector::new([1.0, 0.0, 0.0]),
            Vector::new([1.0, 0.0, 0.0]),
            Vector::new([0.0, 0.0, 1.0]),
        ]);
        let image = Image::<TestBackend, 3>::new(
            Tensor::zeros([2, 2, 2], &device),
            Point::origin(),
            Spacing::uniform(2.0),
            direction,
        );

        for spacing in [1.0, 2.0] {
            let err = ResampleFilter::isotropic(spacing, LinearInterpolator::new())
                .apply_image(&image)
                .unwrap_err();
            assert_eq!(err.direction[0], [1.0, 1.0, 0.0]);
            assert_eq!(err.spacing, [2.0; 3]);
        }
    }
}
