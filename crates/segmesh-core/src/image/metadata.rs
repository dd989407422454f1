//! World-space metadata shared by volumes.

use serde::{Deserialize, Serialize};

use crate::spatial::{Direction, Point, Spacing, Vector};

/// Origin, spacing and direction of a volume.
///
/// Maps a continuous index `(x, y, z)` to world space with
/// `point = origin + direction * (index * spacing)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata<const D: usize> {
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<const D: usize> ImageMetadata<D> {
    pub fn new(origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            origin,
            spacing,
            direction,
        }
    }

    /// World position of the centre of voxel `(0, 0, 0)`, in millimetres.
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Voxel size along each index axis `(x, y, z)`, in millimetres.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// World direction of each index axis, one unit column per axis.
    ///
    /// Volumes read from disk always carry an invertible matrix; the reader
    /// rejects degenerate headers.
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Replace the spacing, keeping origin and direction.
    pub fn with_spacing(mut self, spacing: Spacing<D>) -> Self {
        self.spacing = spacing;
        self
    }

    /// World position of a continuous index.
    pub fn index_to_physical(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// Row-major 4x4 affine (index to world), as stored in NIfTI `srow_*`.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        let mut affine = [[0.0; 4]; 4];
        for (row, line) in affine.iter_mut().enumerate().take(D.min(3)) {
            for col in 0..D.min(3) {
                line[col] = self.direction[(row, col)] * self.spacing[col];
            }
            line[3] = self.origin[row];
        }
        affine[3][3] = 1.0;
        affine
    }
}

impl<const D: usize> Default for ImageMetadata<D> {
    fn default() -> Self {
        Self {
            origin: Point::origin(),
            spacing: Spacing::uniform(1.0),
            direction: Direction::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_to_physical() {
        let metadata = ImageMetadata::<3>::new(
            Point::new([10.0, -20.0, 5.0]),
            Spacing::new([0.5, 2.0, 3.0]),
            Direction::identity(),
        );
        let index = Point::new([4.0, 1.5, 2.0]);
        let world = metadata.index_to_physical(&index);
        assert!((world[0] - 12.0).abs() < 1e-12);
        assert!((world[1] - -17.0).abs() < 1e-12);
        assert!((world[2] - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_affine_layout() {
        let mut direction = Direction::<3>::identity();
        direction[(0, 0)] = -1.0;
        let metadata = ImageMetadata::new(Point::new([1.0, 2.0, 3.0]), Spacing::new([2.0, 1.0, 1.0]), direction);
        let affine = metadata.affine();
        assert_eq!(affine[0], [-2.0, 0.0, 0.0, 1.0]);
        assert_eq!(affine[1], [0.0, 1.0, 0.0, 2.0]);
        assert_eq!(affine[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
