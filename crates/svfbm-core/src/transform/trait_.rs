//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps points from one physical space to another.
///
/// Resampling uses transforms backwards: the transform handed to a resample
/// filter maps output (reference) points to input (floating) points.
///
/// # Type Parameters
/// * `B` - The burn backend
/// * `D` - The spatial dimensionality
pub trait Transform<B: Backend, const D: usize> {
    /// Apply the transform to a batch of physical points `[Batch, D]`.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
