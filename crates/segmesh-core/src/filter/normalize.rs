//! Intensity normalization.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::image::VolumeStack;

/// Zero-mean, unit-variance normalization over non-zero voxels.
///
/// Statistics are computed per channel from voxels that are not exactly zero;
/// background voxels are excluded and stay zero. The standard deviation is the
/// population one, and a channel with zero deviation is only centred.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonZeroNormalizer;

impl NonZeroNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn apply<B: Backend>(&self, input: VolumeStack<B>) -> VolumeStack<B> {
        let metadata = *input.metadata();
        let data = input.into_data();
        let [c, z, y, x] = data.dims();

        let normalized = normalize_rows(data.reshape([c, z * y * x]));
        VolumeStack::new(normalized.reshape([c, z, y, x]), metadata)
    }
}

/// Normalize each row of `[C, V]` over its non-zero entries.
fn normalize_rows<B: Backend>(values: Tensor<B, 2>) -> Tensor<B, 2> {
    let mask = values.clone().equal_elem(0.0).bool_not();
    let weights = mask.clone().float();

    let count = weights.clone().sum_dim(1).clamp_min(1.0);
    let mean = (values.clone() * weights.clone()).sum_dim(1) / count.clone();

    let centred = values.clone() - mean;
    let variance = (centred.clone().powf_scalar(2.0) * weights).sum_dim(1) / count;
    let std = variance.sqrt();
    let std = std.clone().mask_fill(std.equal_elem(0.0), 1.0);

    values.mask_where(mask, centred / std)
}
