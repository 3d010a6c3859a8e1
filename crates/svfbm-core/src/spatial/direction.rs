//! Direction cosine matrices.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::Vector;

/// Orientation of the image axes in physical space.
///
/// Column `i` is the physical direction of index axis `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Axis-aligned orientation.
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Build from unit column vectors.
    pub fn from_columns(columns: [Vector<D>; D]) -> Self {
        let mut m = SMatrix::<f64, D, D>::zeros();
        for (c, col) in columns.iter().enumerate() {
            for r in 0..D {
                m[(r, c)] = col[r];
            }
        }
        Self(m)
    }

    /// Cofactor expansion for 2-D and 3-D, partial-pivot elimination above.
    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        match D {
            1 => m[(0, 0)],
            2 => m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
            3 => {
                m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
                    - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
                    + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
            }
            _ => {
                let mut m = self.0;
                let mut det = 1.0;
                for i in 0..D {
                    let pivot = (i..D)
                        .max_by(|&a, &b| m[(a, i)].abs().total_cmp(&m[(b, i)].abs()))
                        .unwrap_or(i);
                    if m[(pivot, i)].abs() < 1e-12 {
                        return 0.0;
                    }
                    if pivot != i {
                        m.swap_rows(i, pivot);
                        det = -det;
                    }
                    det *= m[(i, i)];
                    for j in (i + 1)..D {
                        let factor = m[(j, i)] / m[(i, i)];
                        for k in i..D {
                            m[(j, k)] -= factor * m[(i, k)];
                        }
                    }
                }
                det
            }
        }
    }

    /// True when `D * D^T` is the identity within `1e-6`.
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        (0..D).all(|i| {
            (0..D).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (product[(i, j)] - expected).abs() < 1e-6
            })
        })
    }

    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_is_orthogonal() {
        let rot = Direction::<3>::from_columns([
            Vector::new([0.0, 1.0, 0.0]),
            Vector::new([-1.0, 0.0, 0.0]),
            Vector::new([0.0, 0.0, 1.0]),
        ]);
        assert!(rot.is_orthogonal());
        assert!((rot.determinant() - 1.0).abs() < 1e-12);
        let inv = rot.try_inverse().unwrap();
        let v = inv * (rot * Vector::new([1.0, 2.0, 3.0]));
        assert!((v - Vector::new([1.0, 2.0, 3.0])).norm() < 1e-12);
    }

    #[test]
    fn test_determinant_by_elimination_matches_permutation_sign() {
        // Swapping two axes of the 4-D identity flips the sign.
        let mut d = Direction::<4>::identity();
        d[(0, 0)] = 0.0;
        d[(1, 1)] = 0.0;
        d[(0, 1)] = 1.0;
        d[(1, 0)] = 1.0;
        assert!((d.determinant() + 1.0).abs() < 1e-12);

        let mut scaled = Direction::<2>::identity();
        scaled[(1, 1)] = 2.0;
        assert!((scaled.determinant() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_direction_has_no_inverse() {
        let mut d = Direction::<3>::identity();
        d[(2, 2)] = 0.0;
        assert!(d.try_inverse().is_none());
        assert_eq!(d.determinant(), 0.0);
        assert!(!d.is_orthogonal());
    }
}
