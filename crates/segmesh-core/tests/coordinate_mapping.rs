use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use nalgebra::Rotation3;
use proptest::prelude::*;
use segmesh_core::filter::ResampleFilter;
use segmesh_core::image::{Image, ImageMetadata};
use segmesh_core::interpolation::LinearInterpolator;
use segmesh_core::spatial::{Direction, Point, Spacing};

type Backend = NdArray<f32>;

fn rotation(ax: f64, ay: f64, az: f64) -> Direction<3> {
    Direction(Rotation3::from_euler_angles(ax, ay, az).into_inner())
}

/// A field that is linear in world space, so trilinear sampling reproduces it exactly.
fn plane(p: &Point<3>) -> f64 {
    0.5 * p[0] - 0.25 * p[1] + 0.1 * p[2] + 3.0
}

proptest! {
    #[test]
    fn test_index_to_physical_matches_affine(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in 0.1f64..5.0, sz in 0.1f64..5.0,
        ax in -3.14f64..3.14, ay in -3.14f64..3.14, az in -3.14f64..3.14,
        ix in -10.0f64..50.0, iy in -10.0f64..50.0, iz in -10.0f64..50.0
    ) {
        let metadata = ImageMetadata::new(
            Point::new([ox, oy, oz]),
            Spacing::new([sx, sy, sz]),
            rotation(ax, ay, az),
        );
        let world = metadata.index_to_physical(&Point::new([ix, iy, iz]));
        let affine = metadata.affine();

        for (row, line) in affine.iter().take(3).enumerate() {
            let expected = line[0] * ix + line[1] * iy + line[2] * iz + line[3];
            prop_assert!((world[row] - expected).abs() < 1e-9, "row {}: {} vs {}", row, world[row], expected);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_resample_follows_world_space(
        ox in -10.0f64..10.0, oy in -10.0f64..10.0, oz in -10.0f64..10.0,
        sx in 0.5f64..2.0, sy in 0.5f64..2.0, sz in 0.5f64..2.0,
        ax in -3.14f64..3.14, ay in -1.5f64..1.5, az in -3.14f64..3.14
    ) {
        let device = Default::default();
        let [nz, ny, nx] = [4, 5, 6];
        let metadata = ImageMetadata::new(
            Point::new([ox, oy, oz]),
            Spacing::new([sx, sy, sz]),
            rotation(ax, ay, az),
        );

        let mut values = Vec::with_capacity(nz * ny * nx);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let world = metadata.index_to_physical(&Point::new([x as f64, y as f64, z as f64]));
                    values.push(plane(&world) as f32);
                }
            }
        }
        let image = Image::from_metadata(
            Tensor::<Backend, 3>::from_data(TensorData::new(values, [nz, ny, nx]), &device),
            metadata,
        );

        let out = ResampleFilter::isotropic(1.0, LinearInterpolator::new()).apply_image(&image).unwrap();
        let [out_x, out_y, out_z] = out.size();
        let out_metadata = *out.metadata();
        let sampled = out.into_data().into_data().to_vec::<f32>().unwrap();

        let inside = |i: usize, s: f64, n: usize| i as f64 / s <= (n - 1) as f64 + 1e-9;
        for z in (0..out_z).filter(|&z| inside(z, sz, nz)) {
            for y in (0..out_y).filter(|&y| inside(y, sy, ny)) {
                for x in (0..out_x).filter(|&x| inside(x, sx, nx)) {
                    let world = out_metadata.index_to_physical(&Point::new([x as f64, y as f64, z as f64]));
                    let value = sampled[(z * out_y + y) * out_x + x] as f64;
                    prop_assert!(
                        (value - plane(&world)).abs() < 1e-3,
                        "voxel ({}, {}, {}): {} vs {}", x, y, z, value, plane(&world)
                    );
                }
            }
        }
    }
}

#[test]
fn test_rotated_direction_maps_axes() {
    // Index x runs along world y after a quarter turn about z.
    let metadata = ImageMetadata::new(
        Point::origin(),
        Spacing::new([2.0, 1.0, 1.0]),
        Direction(Rotation3::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2).into_inner()),
    );
    let world = metadata.index_to_physical(&Point::new([1.0, 0.0, 0.0]));
    assert!(world[0].abs() < 1e-12);
    assert!((world[1] - 2.0).abs() < 1e-12);
}
