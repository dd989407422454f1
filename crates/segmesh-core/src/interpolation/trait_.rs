//! Interpolator trait.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

/// Samples channel-first volumes at continuous `(x, y, z)` indices.
///
/// Out-of-range indices are clamped to the border voxel.
pub trait Interpolator<B: Backend> {
    /// Sample every channel of `data` (`[C, Z, Y, X]`) at `indices` (`[N, 3]`).
    ///
    /// Returns `[C, N]`.
    fn sample(&self, data: &Tensor<B, 4>, indices: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Sample a single volume (`[Z, Y, X]`). Returns `[N]`.
    fn sample_volume(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [z, y, x] = data.dims();
        let n = indices.dims()[0];
        let stacked = data.clone().reshape([1, z, y, x]);
        self.sample(&stacked, indices).reshape([n])
    }
}

/// Interpolation kind, chosen per data kind (intensities vs labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InterpolationMode {
    /// Trilinear; used for intensity images.
    #[default]
    Linear,
    /// Nearest neighbour; used for label maps.
    Nearest,
}

/// Split `[N, 3]` indices into their x, y and z columns.
pub(crate) fn split_xyz<B: Backend>(indices: Tensor<B, 2>) -> (Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1>) {
    let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
    let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
    let z = indices.narrow(1, 2, 1).squeeze::<1>(1);
    (x, y, z)
}

/// Gather voxels at flat offsets `[N]` from every channel of `flat` (`[C, V]`).
pub(crate) fn gather_channels<B: Backend>(flat: &Tensor<B, 2>, offsets: Tensor<B, 1, Int>) -> Tensor<B, 2> {
    let channels = flat.dims()[0];
    let n = offsets.dims()[0];
    let offsets = offsets.reshape([1, n]).repeat(&[channels, 1]);
    flat.clone().gather(1, offsets)
}
