use burn::tensor::backend::Backend;
use crate::error::Result;
use crate::image::Image;
use crate::interpolation::LinearInterpolator;
use crate::transform::IdentityTransform;
use super::resample::ResampleImageFilter;

/// Integer shrink filter.
///
/// Reduces the grid by `factors[i]` along index axis `i`. The coarse grid
/// comes from [`ImageGeometry::shrink`](crate::image::ImageGeometry::shrink)
/// and values are read at the coarse node centers by linear interpolation.
/// Smoothing beforehand is the caller's business.
pub struct ShrinkImageFilter<const D: usize> {
    factors: [usize; D],
}

impl<const D: usize> ShrinkImageFilter<D> {
    pub fn new(factors: [usize; D]) -> Self {
        Self { factors }
    }

    pub fn uniform(factor: usize) -> Self {
        Self::new([factor; D])
    }

    pub fn apply<B: Backend>(&self, input: &Image<B, D>) -> Result<Image<B, D>> {
        if self.factors.iter().all(|&f| f == 1) {
            return Ok(input.clone());
        }
        let geometry = input.geometry().shrink(self.factors)?;
        ResampleImageFilter::<B, _, _, D>::new(geometry, IdentityTransform, LinearInterpolator::new())
            .apply(input)
    }
}
