use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use segmesh_core::filter::{NonZeroNormalizer, OrientationFilter, ResampleFilter};
use segmesh_core::image::{Image, VolumeStack};
use segmesh_core::interpolation::LinearInterpolator;
use segmesh_core::spatial::{Direction, Point, Spacing, Vector};

type Backend = NdArray<f32>;

fn lps_volume(fill: f32) -> Image<Backend, 3> {
    let device = Default::default();
    let [nz, ny, nx] = [4, 6, 5];
    let mut values = vec![0.0; nz * ny * nx];
    for z in 1..3 {
        for y in 1..5 {
            for x in 1..4 {
                values[(z * ny + y) * nx + x] = fill + x as f32;
            }
        }
    }
    let direction = Direction::from_columns([
        Vector::new([-1.0, 0.0, 0.0]),
        Vector::new([0.0, -1.0, 0.0]),
        Vector::new([0.0, 0.0, 1.0]),
    ]);
    Image::new(
        Tensor::from_data(TensorData::new(values, [nz, ny, nx]), &device),
        Point::new([30.0, 40.0, -10.0]),
        Spacing::new([2.0, 1.5, 3.0]),
        direction,
    )
}

#[test]
fn test_chain_produces_isotropic_ras_stack() {
    let channels = (0..4).map(|c| lps_volume(10.0 * (c + 1) as f32)).collect();
    let stack = VolumeStack::from_channels(channels).unwrap();

    let stack = OrientationFilter::new().apply(stack);
    let stack = ResampleFilter::isotropic(1.0, LinearInterpolator::new())
        .apply(&stack)
        .unwrap();
    let stack = NonZeroNormalizer::new().apply(stack);

    assert_eq!(stack.num_channels(), 4);
    assert!(stack.metadata().direction().is_ras());
    assert!(stack.metadata().spacing().is_isotropic(1.0));
    // 5 * 2 mm, 6 * 1.5 mm, 4 * 3 mm
    assert_eq!(stack.spatial_shape(), [12, 9, 10]);

    for channel in stack.into_channels() {
        let values = channel.into_data().into_data().to_vec::<f32>().unwrap();
        let foreground: Vec<f32> = values.into_iter().filter(|v| *v != 0.0).collect();
        let n = foreground.len() as f32;
        let mean = foreground.iter().sum::<f32>() / n;
        let var = foreground.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-3);
        assert!((var - 1.0).abs() < 1e-3);
    }
}
