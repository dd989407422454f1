//! Voxel spacing.

use super::Vector;

/// Physical distance between adjacent voxels along each index axis.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing on every axis.
    pub fn uniform(value: f64) -> Self {
        Vector::new([value; D])
    }

    /// Whether every axis has spacing `value` (within `1e-6`).
    pub fn is_isotropic(&self, value: f64) -> bool {
        (0..D).all(|i| (self[i] - value).abs() < 1e-6)
    }
}
