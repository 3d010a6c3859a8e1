//! Dense displacement field transform.
//!
//! Maps a physical point `p` to `p + u(p)`, where `u` is interpolated from a
//! vector field and is zero outside the field's sampled region.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use super::trait_::Transform;
use super::vector_field::VectorField;
use crate::image::ImageGeometry;

/// Displacement field transform for 3-D volumes.
#[derive(Debug, Clone)]
pub struct DisplacementFieldTransform<B: Backend> {
    displacement: VectorField<B>,
}

impl<B: Backend> DisplacementFieldTransform<B> {
    pub fn new(displacement: VectorField<B>) -> Self {
        Self { displacement }
    }

    /// The identity mapping on `geometry`.
    pub fn identity(geometry: ImageGeometry<3>, device: &B::Device) -> Self {
        Self::new(VectorField::zeros(geometry, device))
    }

    pub fn displacement(&self) -> &VectorField<B> {
        &self.displacement
    }

    pub fn into_displacement(self) -> VectorField<B> {
        self.displacement
    }

    pub fn geometry(&self) -> &ImageGeometry<3> {
        self.displacement.geometry()
    }

    /// `self ∘ inner`: apply `inner` first.
    pub fn compose(&self, inner: &Self) -> Self {
        Self::new(self.displacement.compose(&inner.displacement))
    }
}

impl<B: Backend> Transform<B, 3> for DisplacementFieldTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let displacement = self.displacement.sample(points.clone());
        points + displacement
    }
}
