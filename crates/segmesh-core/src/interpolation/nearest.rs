//! Nearest-neighbour interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{gather_channels, split_xyz, Interpolator};

/// Rounds each index to the closest voxel. Keeps label values intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn sample(&self, data: &Tensor<B, 4>, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let [c, nz, ny, nx] = data.dims();
        let (x, y, z) = split_xyz(indices);

        let xi = x.round().clamp(0.0, (nx - 1) as f64).int();
        let yi = y.round().clamp(0.0, (ny - 1) as f64).int();
        let zi = z.round().clamp(0.0, (nz - 1) as f64).int();

        let offsets = zi * (ny * nx) as i32 + yi * nx as i32 + xi;
        let flat = data.clone().reshape([c, nz * ny * nx]);
        gather_channels(&flat, offsets)
    }
}
