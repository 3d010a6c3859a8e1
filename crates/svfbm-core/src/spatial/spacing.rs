//! Voxel spacing.

use super::Vector;

/// Physical distance between adjacent voxels along each index axis.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing along every axis.
    pub fn uniform(value: f64) -> Self {
        Vector::new([value; D])
    }

    /// Arithmetic mean of the per-axis spacings.
    ///
    /// Used to turn voxel-unit parameters (sigmas, radii) into physical units
    /// on anisotropic grids.
    pub fn mean_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).sum::<f64>() / D as f64
    }

    /// Smallest per-axis spacing.
    pub fn min_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).fold(f64::INFINITY, f64::min)
    }

    /// True when every component is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        (0..D).all(|i| self[i].is_finite() && self[i] > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_statistics() {
        let s = Spacing::<3>::new([1.0, 2.0, 3.0]);
        assert!((s.mean_spacing() - 2.0).abs() < 1e-12);
        assert_eq!(s.min_spacing(), 1.0);
        assert!(s.is_valid());
        assert!(!Spacing::<3>::new([1.0, 0.0, 1.0]).is_valid());
        assert_eq!(Spacing::<2>::uniform(0.5), Spacing::new([0.5, 0.5]));
    }
}
