//! Direction cosines and anatomical axis codes.
//!
//! Column `i` of a direction matrix is the world-space direction of voxel
//! index axis `i`. World space follows the NIfTI convention: +x is Right,
//! +y is Anterior, +z is Superior.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

use super::Vector;

/// Orientation of the voxel axes in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

/// Anatomical direction an index axis points towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisCode {
    R,
    L,
    A,
    P,
    S,
    I,
}

impl AxisCode {
    /// Build the code for a world axis (0 = x, 1 = y, 2 = z) and a sign.
    pub fn from_world_axis(axis: usize, positive: bool) -> Self {
        match (axis, positive) {
            (0, true) => AxisCode::R,
            (0, false) => AxisCode::L,
            (1, true) => AxisCode::A,
            (1, false) => AxisCode::P,
            (2, true) => AxisCode::S,
            _ => AxisCode::I,
        }
    }

    /// World axis this code lies on.
    pub fn world_axis(self) -> usize {
        match self {
            AxisCode::R | AxisCode::L => 0,
            AxisCode::A | AxisCode::P => 1,
            AxisCode::S | AxisCode::I => 2,
        }
    }

    /// Whether the code points along the positive world axis.
    pub fn is_positive(self) -> bool {
        matches!(self, AxisCode::R | AxisCode::A | AxisCode::S)
    }
}

impl std::fmt::Display for AxisCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl<const D: usize> Direction<D> {
    /// Identity orientation (index axes aligned with world axes).
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Build from column vectors, one per index axis.
    pub fn from_columns(columns: [Vector<D>; D]) -> Self {
        let cols: Vec<_> = columns.iter().map(|c| c.0).collect();
        Self(SMatrix::from_columns(&cols))
    }

    /// World direction of index axis `axis`.
    pub fn column(&self, axis: usize) -> Vector<D> {
        Vector(self.0.column(axis).into_owned())
    }

    /// Inverse matrix, if the matrix is not singular.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl Direction<3> {
    /// Closest anatomical code for every index axis.
    ///
    /// Axes are assigned greedily by largest absolute cosine so that oblique
    /// acquisitions still map each index axis to a distinct world axis.
    pub fn axis_codes(&self) -> [AxisCode; 3] {
        let mut codes = [AxisCode::R; 3];
        let mut used_world = [false; 3];
        let mut used_index = [false; 3];

        for _ in 0..3 {
            let mut best = (0usize, 0usize, -1.0f64);
            for col in (0..3).filter(|c| !used_index[*c]) {
                for row in (0..3).filter(|r| !used_world[*r]) {
                    let value = self.0[(row, col)].abs();
                    if value > best.2 {
                        best = (row, col, value);
                    }
                }
            }
            let (row, col, _) = best;
            used_world[row] = true;
            used_index[col] = true;
            codes[col] = AxisCode::from_world_axis(row, self.0[(row, col)] >= 0.0);
        }

        codes
    }

    /// Whether the index axes already point Right, Anterior, Superior.
    pub fn is_ras(&self) -> bool {
        self.axis_codes() == [AxisCode::R, AxisCode::A, AxisCode::S]
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}
