//! Low-dimensional transforms expressed about a block center.

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3 as NaVector3};
use serde::{Deserialize, Serialize};
use crate::spatial::Point3;
use super::lie::matrix_log;

/// Family of local transforms searched per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalTransformKind {
    Translation,
    Rigid,
    Affine,
}

impl LocalTransformKind {
    /// Number of free parameters.
    ///
    /// Parameters are laid out as translation (3), rotation angles in
    /// radians (3), log-scales (3), then skew angles in radians (3).
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::Translation => 3,
            Self::Rigid => 6,
            Self::Affine => 12,
        }
    }
}

/// A homogeneous physical mapping `p -> A (p - c) + c + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTransform {
    kind: LocalTransformKind,
    center: Point3,
    matrix: Matrix4<f64>,
}

impl LocalTransform {
    pub fn identity(kind: LocalTransformKind, center: Point3) -> Self {
        Self {
            kind,
            center,
            matrix: Matrix4::identity(),
        }
    }

    /// Build from a parameter vector; missing trailing parameters are zero.
    pub fn from_parameters(kind: LocalTransformKind, center: Point3, params: &[f64]) -> Self {
        let p = |i: usize| if i < kind.parameter_count() { params.get(i).copied().unwrap_or(0.0) } else { 0.0 };

        let translation = NaVector3::new(p(0), p(1), p(2));
        let rotation = Rotation3::from_euler_angles(p(3), p(4), p(5)).into_inner();
        let scale = Matrix3::from_diagonal(&NaVector3::new(p(6).exp(), p(7).exp(), p(8).exp()));
        let mut skew = Matrix3::identity();
        skew[(0, 1)] = p(9).tan();
        skew[(0, 2)] = p(10).tan();
        skew[(1, 2)] = p(11).tan();
        let linear = rotation * skew * scale;

        let c = center.0.coords;
        let offset = c + translation - linear * c;

        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        Self { kind, center, matrix }
    }

    pub fn kind(&self) -> LocalTransformKind {
        self.kind
    }

    pub fn center(&self) -> &Point3 {
        &self.center
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// Displacement of the block center.
    pub fn center_displacement(&self) -> [f64; 3] {
        let moved = self.apply(&self.center);
        [
            moved[0] - self.center[0],
            moved[1] - self.center[1],
            moved[2] - self.center[2],
        ]
    }

    pub fn apply(&self, point: &Point3) -> Point3 {
        let p = self.matrix * point.0.to_homogeneous();
        Point3::new([p[0], p[1], p[2]])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self {
            kind: self.kind,
            center: self.center,
            matrix,
        })
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.matrix - Matrix4::identity()).abs().max() <= tolerance
    }

    /// Velocity generator `log(T)`, or `None` if it has no real logarithm.
    pub fn log(&self) -> Option<Matrix4<f64>> {
        matrix_log(&self.matrix)
    }
}

/// Evaluate the velocity of a generator at a physical point.
pub fn generator_velocity(generator: &Matrix4<f64>, point: &Point3) -> [f64; 3] {
    let v = generator * point.0.to_homogeneous();
    [v[0], v[1], v[2]]
}
