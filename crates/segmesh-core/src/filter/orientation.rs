//! Reorientation of index axes to a canonical anatomical frame.

use burn::tensor::backend::Backend;

use crate::image::{ImageMetadata, VolumeStack};
use crate::spatial::{AxisCode, Direction, Point, Spacing, Vector};

/// Axis permutation and flips that bring a volume to RAS.
///
/// Output index axis `j` reads input index axis `permutation[j]`, traversed
/// backwards when `flipped[j]` is set. No voxel is interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationPlan {
    pub permutation: [usize; 3],
    pub flipped: [bool; 3],
}

impl OrientationPlan {
    /// Plan for a volume whose axes carry the given anatomical codes.
    pub fn from_codes(codes: [AxisCode; 3]) -> Self {
        let mut permutation = [0, 1, 2];
        let mut flipped = [false; 3];
        for (index_axis, code) in codes.iter().enumerate() {
            let target = code.world_axis();
            permutation[target] = index_axis;
            flipped[target] = !code.is_positive();
        }
        Self { permutation, flipped }
    }

    pub fn for_direction(direction: &Direction<3>) -> Self {
        Self::from_codes(direction.axis_codes())
    }

    pub fn is_identity(&self) -> bool {
        self.permutation == [0, 1, 2] && self.flipped == [false; 3]
    }

    /// Metadata of the reoriented volume. `size` is the input size `(x, y, z)`.
    pub fn apply_metadata(&self, metadata: &ImageMetadata<3>, size: [usize; 3]) -> ImageMetadata<3> {
        let spacing = metadata.spacing();
        let direction = metadata.direction();
        let mut origin: Point<3> = *metadata.origin();
        let mut columns = [Vector::<3>::zeros(); 3];
        let mut new_spacing = Spacing::<3>::zeros();

        for j in 0..3 {
            let source = self.permutation[j];
            let column = direction.column(source);
            new_spacing[j] = spacing[source];
            if self.flipped[j] {
                let steps = size[source].saturating_sub(1) as f64;
                origin = origin + column * (spacing[source] * steps);
                columns[j] = -column;
            } else {
                columns[j] = column;
            }
        }

        ImageMetadata::new(origin, new_spacing, Direction::from_columns(columns))
    }
}

/// Reorients multi-channel volumes to RAS.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationFilter;

impl OrientationFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn apply<B: Backend>(&self, input: VolumeStack<B>) -> VolumeStack<B> {
        let plan = OrientationPlan::for_direction(input.metadata().direction());
        if plan.is_identity() {
            return input;
        }

        let [nz, ny, nx] = input.spatial_shape();
        let metadata = plan.apply_metadata(input.metadata(), [nx, ny, nz]);

        // Index axis i lives in tensor dim 3 - i.
        let tensor_dim = |axis: usize| (3 - axis) as isize;
        let [px, py, pz] = plan.permutation;
        let mut data = input
            .into_data()
            .permute([0, tensor_dim(pz), tensor_dim(py), tensor_dim(px)]);

        for (axis, flipped) in plan.flipped.iter().enumerate() {
            if *flipped {
                data = data.flip([tensor_dim(axis)]);
            }
        }

        VolumeStack::new(data, metadata)
    }
}
