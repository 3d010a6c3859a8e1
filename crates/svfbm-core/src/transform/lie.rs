//! Matrix logarithm for homogeneous 4×4 transforms.
//!
//! The logarithm maps a local affine transform to the constant-in-time
//! velocity generator whose flow reaches it after unit time, which is how
//! block transforms are turned into velocities.

use nalgebra::Matrix4;

const SERIES_TERMS: usize = 16;
const MAX_SQUARE_ROOTS: usize = 24;

/// Principal matrix logarithm by inverse scaling and squaring.
///
/// Returns `None` when the matrix has no real principal logarithm reachable
/// by repeated square roots (singular or reflecting linear part).
pub fn matrix_log(m: &Matrix4<f64>) -> Option<Matrix4<f64>> {
    let identity = Matrix4::<f64>::identity();

    // Pure translations have an exact logarithm.
    let linear = m.fixed_view::<3, 3>(0, 0);
    if (linear - nalgebra::Matrix3::identity()).norm() < 1e-12 {
        let mut log = Matrix4::zeros();
        for r in 0..3 {
            log[(r, 3)] = m[(r, 3)];
        }
        return Some(log);
    }

    if linear.determinant() <= 0.0 {
        return None;
    }

    let mut a = *m;
    let mut roots = 0;
    while (a - identity).norm() > 0.25 {
        if roots == MAX_SQUARE_ROOTS {
            return None;
        }
        a = matrix_sqrt(&a)?;
        roots += 1;
    }

    // log(I + X) = X - X²/2 + X³/3 - ...
    let x = a - identity;
    let mut log = Matrix4::zeros();
    let mut power = identity;
    for n in 1..=SERIES_TERMS {
        power *= x;
        let sign = if n % 2 == 1 { 1.0 } else { -1.0 };
        log += power * (sign / n as f64);
    }

    let log = log * 2f64.powi(roots as i32);
    if log.iter().all(|v| v.is_finite()) {
        Some(log)
    } else {
        None
    }
}

/// Principal square root by the Denman–Beavers iteration.
fn matrix_sqrt(m: &Matrix4<f64>) -> Option<Matrix4<f64>> {
    let mut y = *m;
    let mut z = Matrix4::<f64>::identity();
    for _ in 0..64 {
        let y_inv = y.try_inverse()?;
        let z_inv = z.try_inverse()?;
        let next_y = (y + z_inv) * 0.5;
        let next_z = (z + y_inv) * 0.5;
        let delta = (next_y - y).norm();
        y = next_y;
        z = next_z;
        if delta < 1e-13 * (1.0 + y.norm()) {
            break;
        }
    }
    Some(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    /// Matrix exponential by scaling and squaring with a truncated Taylor series.
    fn matrix_exp(m: &Matrix4<f64>) -> Matrix4<f64> {
        let norm = m.norm();
        let squarings = if norm > 0.5 {
            (norm / 0.5).log2().ceil() as i32
        } else {
            0
        };
        let scaled = m / 2f64.powi(squarings);

        let mut result = Matrix4::identity();
        let mut term = Matrix4::identity();
        for n in 1..=SERIES_TERMS {
            term = term * scaled / n as f64;
            result += term;
        }
        for _ in 0..squarings {
            result = result * result;
        }
        result
    }

    fn rigid(angle: f64, t: [f64; 3]) -> Matrix4<f64> {
        let r = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(r.matrix());
        for i in 0..3 {
            m[(i, 3)] = t[i];
        }
        m
    }

    #[test]
    fn test_log_of_translation_is_exact() {
        let m = rigid(0.0, [1.0, -2.0, 0.5]);
        let log = matrix_log(&m).unwrap();
        assert_eq!(log[(0, 3)], 1.0);
        assert_eq!(log[(1, 3)], -2.0);
        assert_eq!(log.fixed_view::<3, 3>(0, 0).norm(), 0.0);
    }

    #[test]
    fn test_exp_inverts_log() {
        let m = rigid(0.7, [3.0, 1.0, -4.0]);
        let log = matrix_log(&m).unwrap();
        let back = matrix_exp(&log);
        assert!((back - m).norm() < 1e-9, "error {}", (back - m).norm());
        // Rotation about z: the generator carries the angle.
        assert!((log[(1, 0)] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_log_rejects_reflection() {
        let mut m = Matrix4::identity();
        m[(0, 0)] = -1.0;
        assert!(matrix_log(&m).is_none());
    }

    #[test]
    fn test_exp_of_zero_is_identity() {
        assert_eq!(matrix_exp(&Matrix4::zeros()), Matrix4::identity());
    }
}
