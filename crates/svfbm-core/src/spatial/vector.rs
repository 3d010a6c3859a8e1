//! Physical-space vectors (displacements, velocities, axis directions).

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// A D-dimensional vector backed by an nalgebra `SVector<f64, D>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector<const D: usize>(pub SVector<f64, D>);

impl<const D: usize> Vector<D> {
    /// Create a vector from its components.
    pub fn new(components: [f64; D]) -> Self {
        Self(SVector::from(components))
    }

    /// The zero vector.
    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    /// Components as a fixed-size array.
    pub fn to_array(&self) -> [f64; D] {
        let mut out = [0.0; D];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.0[i];
        }
        out
    }
}

impl<const D: usize> std::ops::Index<usize> for Vector<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Vector<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Add for Vector<D> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl<const D: usize> std::ops::Sub for Vector<D> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self(self.0 - other.0)
    }
}

impl<const D: usize> std::ops::Mul<f64> for Vector<D> {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}

impl<const D: usize> std::ops::Neg for Vector<D> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_arithmetic() {
        let a = Vector::<3>::new([1.0, 2.0, 2.0]);
        let b = Vector::new([1.0, 1.0, 1.0]);
        assert_eq!(a + b, Vector::new([2.0, 3.0, 3.0]));
        assert_eq!(a - b, Vector::new([0.0, 1.0, 1.0]));
        assert_eq!(-(a * 2.0), Vector::new([-2.0, -4.0, -4.0]));
        assert!((a.norm() - 3.0).abs() < 1e-12);
    }
}
