use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use super::trait_::Transform;

/// The identity mapping. Resampling through it only changes the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl<B: Backend, const D: usize> Transform<B, D> for IdentityTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        points
    }
}
