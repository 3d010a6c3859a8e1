//! Stationary velocity fields and their exponential.

use burn::tensor::backend::Backend;
use tracing::debug;
use crate::error::Result;
use crate::image::ImageGeometry;
use super::displacement_field::DisplacementFieldTransform;
use super::vector_field::VectorField;

/// Upper bound on scaling-and-squaring steps.
pub const MAX_SQUARING_STEPS: u32 = 20;

/// A velocity field whose flow after unit time is a diffeomorphism.
///
/// Values are physical velocities. The field is not a mapping by itself; use
/// [`StationaryVelocityField::exponential`] to obtain one.
#[derive(Debug, Clone)]
pub struct StationaryVelocityField<B: Backend> {
    velocity: VectorField<B>,
}

impl<B: Backend> StationaryVelocityField<B> {
    pub fn new(velocity: VectorField<B>) -> Self {
        Self { velocity }
    }

    pub fn zeros(geometry: ImageGeometry<3>, device: &B::Device) -> Self {
        Self::new(VectorField::zeros(geometry, device))
    }

    pub fn velocity(&self) -> &VectorField<B> {
        &self.velocity
    }

    pub fn into_velocity(self) -> VectorField<B> {
        self.velocity
    }

    pub fn geometry(&self) -> &ImageGeometry<3> {
        self.velocity.geometry()
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.velocity.scale(factor))
    }

    pub fn resample_onto(&self, geometry: &ImageGeometry<3>) -> Self {
        Self::new(self.velocity.resample_onto(geometry))
    }

    pub fn smooth(&self, sigma: f64) -> Self {
        Self::new(self.velocity.smooth(sigma))
    }

    /// Number of squarings so that the scaled field moves less than half the
    /// smallest voxel spacing.
    pub fn squaring_steps(&self) -> u32 {
        let max_norm = self.velocity.max_norm();
        let half_spacing = 0.5 * self.geometry().spacing().min_spacing();
        if max_norm.is_nan() || max_norm <= 0.0 {
            return 0;
        }
        let steps = (max_norm / half_spacing).log2().ceil();
        steps.clamp(0.0, MAX_SQUARING_STEPS as f64) as u32
    }

    /// `exp(v)` by scaling and squaring.
    pub fn exponential(&self) -> DisplacementFieldTransform<B> {
        let steps = self.squaring_steps();
        let mut displacement = self.velocity.scale(0.5f64.powi(steps as i32));
        for _ in 0..steps {
            displacement = displacement.compose(&displacement);
        }
        debug!(steps, "velocity field exponentiated");
        DisplacementFieldTransform::new(displacement)
    }

    /// First-order BCH composition `v + u + ½[v, u]`, approximating
    /// `log(exp(v) ∘ exp(u))`.
    pub fn compose_update(&self, update: &VectorField<B>) -> Result<Self> {
        let device = self.velocity.device();
        let v = self.velocity.to_host()?;
        let u = update.to_host()?;
        let bracket = VectorField::from_host(&v.lie_bracket(&u)?, &device);
        let sum = self.velocity.add(update)?;
        Ok(Self::new(sum.add(&bracket.scale(0.5))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::transform::HostVectorField;

    type TestBackend = NdArray<f32>;

    fn constant(v: [f64; 3]) -> StationaryVelocityField<TestBackend> {
        let geometry = ImageGeometry::<3>::with_size([8, 8, 8]).unwrap();
        let host = HostVectorField::from_vectors(geometry, &vec![v; 512]).unwrap();
        StationaryVelocityField::new(VectorField::from_host(&host, &Default::default()))
    }

    #[test]
    fn test_zero_field_exponentiates_to_identity() {
        let v = StationaryVelocityField::<TestBackend>::zeros(
            ImageGeometry::with_size([4, 4, 4]).unwrap(),
            &Default::default(),
        );
        assert_eq!(v.squaring_steps(), 0);
        assert_eq!(v.exponential().displacement().max_norm(), 0.0);
    }

    #[test]
    fn test_squaring_steps_follow_norm() {
        // |v| = 2, half spacing = 0.5 -> log2(4) = 2
        assert_eq!(constant([2.0, 0.0, 0.0]).squaring_steps(), 2);
        assert_eq!(constant([0.1, 0.0, 0.0]).squaring_steps(), 0);
        assert_eq!(constant([1e9, 0.0, 0.0]).squaring_steps(), MAX_SQUARING_STEPS);
    }

    #[test]
    fn test_constant_velocity_is_a_translation_in_the_interior() {
        let v = constant([1.0, 0.0, 0.0]);
        let u = v.exponential().displacement().to_host().unwrap();
        let center = (4 * 8 + 4) * 8 + 2;
        let d = u.get(center);
        assert!((d[0] - 1.0).abs() < 1e-5, "got {:?}", d);
    }

    #[test]
    fn test_bch_of_constant_fields_is_sum() {
        let v = constant([1.0, 0.0, 0.0]);
        let u = constant([0.0, 0.5, 0.0]);
        let z = v.compose_update(u.velocity()).unwrap().velocity().to_host().unwrap();
        assert_eq!(z.get(100), [1.0, 0.5, 0.0]);
    }
}
