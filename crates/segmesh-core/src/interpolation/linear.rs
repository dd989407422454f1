//! Trilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::{gather_channels, split_xyz, Interpolator};

/// Trilinear interpolation with border clamping.
///
/// Corner offsets and weights are computed once per call and shared by every
/// channel, so sampling a four-channel stack costs one index pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn sample(&self, data: &Tensor<B, 4>, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let [c, nz, ny, nx] = data.dims();
        let (x, y, z) = split_xyz(indices);

        // Clamp before flooring so indices outside the volume take border values.
        let x = x.clamp(0.0, (nx - 1) as f64);
        let y = y.clamp(0.0, (ny - 1) as f64);
        let z = z.clamp(0.0, (nz - 1) as f64);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();
        let wz = z - z0.clone();

        let x1 = (x0.clone() + 1.0).clamp(0.0, (nx - 1) as f64).int();
        let y1 = (y0.clone() + 1.0).clamp(0.0, (ny - 1) as f64).int();
        let z1 = (z0.clone() + 1.0).clamp(0.0, (nz - 1) as f64).int();
        let x0 = x0.int();
        let y0 = y0.int();
        let z0 = z0.int();

        let stride_z = (ny * nx) as i32;
        let stride_y = nx as i32;
        let flat = data.clone().reshape([c, nz * ny * nx]);

        let corner = |xi: &Tensor<B, 1, Int>, yi: &Tensor<B, 1, Int>, zi: &Tensor<B, 1, Int>| {
            let offsets = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
            gather_channels(&flat, offsets)
        };

        let v000 = corner(&x0, &y0, &z0);
        let v100 = corner(&x1, &y0, &z0);
        let v010 = corner(&x0, &y1, &z0);
        let v110 = corner(&x1, &y1, &z0);
        let v001 = corner(&x0, &y0, &z1);
        let v101 = corner(&x1, &y0, &z1);
        let v011 = corner(&x0, &y1, &z1);
        let v111 = corner(&x1, &y1, &z1);

        // Weights broadcast over channels: [1, N].
        let wx = wx.unsqueeze_dim::<2>(0);
        let wy = wy.unsqueeze_dim::<2>(0);
        let wz = wz.unsqueeze_dim::<2>(0);
        let one_minus_wx = wx.clone().neg().add_scalar(1.0);
        let one_minus_wy = wy.clone().neg().add_scalar(1.0);
        let one_minus_wz = wz.clone().neg().add_scalar(1.0);

        let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
        let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
        let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
        let c11 = v011 * one_minus_wx + v111 * wx;

        let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
        let c1 = c01 * one_minus_wy + c11 * wy;

        c0 * one_minus_wz + c1 * wz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn cube() -> Tensor<TestBackend, 3> {
        // [Z=2, Y=2, X=2]: value = 100 z + 10 y + x
        let device = Default::default();
        Tensor::from_data(
            TensorData::new(vec![0.0f32, 1.0, 10.0, 11.0, 100.0, 101.0, 110.0, 111.0], [2, 2, 2]),
            &device,
        )
    }

    #[test]
    fn test_linear_grid_points_and_axes() {
        let device = Default::default();
        let indices = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &device,
        );
        let out = LinearInterpolator::new().sample_volume(&cube(), indices).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[0.0, 1.0, 10.0, 100.0]);
    }

    #[test]
    fn test_linear_center_is_mean_of_corners() {
        let device = Default::default();
        let center = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5, 0.5]], &device);
        let out = LinearInterpolator::new().sample_volume(&cube(), center).into_data();
        assert!((out.as_slice::<f32>().unwrap()[0] - 55.5).abs() < 1e-4);
    }

    #[test]
    fn test_linear_clamps_outside() {
        let device = Default::default();
        let indices = Tensor::<TestBackend, 2>::from_floats([[-1.0, -1.0, -1.0], [5.0, 5.0, 5.0]], &device);
        let out = LinearInterpolator::new().sample_volume(&cube(), indices).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[0.0, 111.0]);
    }

    #[test]
    fn test_linear_channels_share_indices() {
        let device = Default::default();
        let base = cube();
        let stack = Tensor::stack::<4>(vec![base.clone(), base * 2.0], 0);
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.0, 0.0], [0.0, 0.5, 1.0]], &device);
        let out = LinearInterpolator::new().sample(&stack, indices);
        assert_eq!(out.dims(), [2, 2]);
        let values = out.into_data();
        let values = values.as_slice::<f32>().unwrap();
        assert!((values[0] - 0.5).abs() < 1e-5);
        assert!((values[1] - 105.0).abs() < 1e-5);
        assert!((values[2] - 1.0).abs() < 1e-5);
        assert!((values[3] - 210.0).abs() < 1e-5);
    }
}
