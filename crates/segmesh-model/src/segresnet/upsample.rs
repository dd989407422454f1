//! Factor-two trilinear upsampling.
//!
//! Half-pixel aligned: output sample `i` reads input coordinate `(i + 0.5) / 2 - 0.5`,
//! so every output voxel mixes its parent voxel (weight 0.75) with the nearer
//! neighbour (weight 0.25). Borders replicate the edge voxel.

use burn::prelude::*;

/// Double every spatial dim of `[N, C, D, H, W]`.
pub fn upsample_trilinear<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let x = upsample_axis(x, 2);
    let x = upsample_axis(x, 3);
    upsample_axis(x, 4)
}

fn upsample_axis<B: Backend>(x: Tensor<B, 5>, dim: usize) -> Tensor<B, 5> {
    let n = x.dims()[dim];
    let (previous, next) = if n > 1 {
        let previous = Tensor::cat(vec![x.clone().narrow(dim, 0, 1), x.clone().narrow(dim, 0, n - 1)], dim);
        let next = Tensor::cat(vec![x.clone().narrow(dim, 1, n - 1), x.clone().narrow(dim, n - 1, 1)], dim);
        (previous, next)
    } else {
        (x.clone(), x.clone())
    };

    let even = x.clone().mul_scalar(0.75) + previous.mul_scalar(0.25);
    let odd = x.mul_scalar(0.75) + next.mul_scalar(0.25);

    let mut dims = even.dims();
    dims[dim] *= 2;
    Tensor::stack::<6>(vec![even, odd], dim + 1).reshape(dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_upsample_1d_profile() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([0.0, 4.0, 8.0], &device).reshape([1, 1, 1, 1, 3]);
        let y = upsample_axis(x, 4);
        assert_eq!(y.dims(), [1, 1, 1, 1, 6]);
        let values = y.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 3.0, 5.0, 7.0, 8.0]);
    }

    #[test]
    fn test_constant_stays_constant() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 5>::ones([1, 2, 3, 1, 2], &device).mul_scalar(2.5);
        let y = upsample_trilinear(x);
        assert_eq!(y.dims(), [1, 2, 6, 2, 4]);
        let values = y.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 2.5).abs() < 1e-6));
    }
}
