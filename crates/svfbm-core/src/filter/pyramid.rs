use burn::tensor::backend::Backend;
use tracing::debug;
use crate::error::{CoreError, Result};
use crate::image::Image;
use super::gaussian::GaussianFilter;
use super::shrink::ShrinkImageFilter;

/// Multi-resolution image pyramid.
///
/// Level 0 is the coarsest and level `K - 1` is the input itself. Level `i`
/// is smoothed with a Gaussian of `0.5 * f` voxels then shrunk by
/// `f = 2^(K - 1 - i)` along every axis.
#[derive(Debug, Clone)]
pub struct MultiResolutionPyramid<B: Backend, const D: usize> {
    images: Vec<Image<B, D>>,
}

impl<B: Backend, const D: usize> MultiResolutionPyramid<B, D> {
    /// Build a pyramid with `levels` levels.
    pub fn new(input: &Image<B, D>, levels: usize) -> Result<Self> {
        let (shrink_factors, smoothing_sigmas) = Self::default_schedule(levels)?;
        Self::with_schedule(input, &shrink_factors, &smoothing_sigmas)
    }

    /// Build a pyramid from explicit schedules, ordered coarsest first.
    ///
    /// Sigmas are in voxels of the input grid.
    pub fn with_schedule(
        input: &Image<B, D>,
        shrink_factors: &[[usize; D]],
        smoothing_sigmas: &[[f64; D]],
    ) -> Result<Self> {
        if shrink_factors.is_empty() {
            return Err(CoreError::invalid_argument("a pyramid needs at least one level"));
        }
        if shrink_factors.len() != smoothing_sigmas.len() {
            return Err(CoreError::invalid_argument(format!(
                "schedule lengths differ: {} shrink factors, {} sigmas",
                shrink_factors.len(),
                smoothing_sigmas.len()
            )));
        }

        let spacing = input.spacing();
        let mut images = Vec::with_capacity(shrink_factors.len());
        for (level, (factors, sigmas)) in shrink_factors.iter().zip(smoothing_sigmas).enumerate() {
            let smoothed = if sigmas.iter().all(|&s| s <= 1e-6) {
                input.clone()
            } else {
                let physical = (0..D).map(|a| sigmas[a] * spacing[a]).collect();
                GaussianFilter::new(physical).apply(input)?
            };
            let image = ShrinkImageFilter::new(*factors).apply(&smoothed)?;
            debug!(level, size = ?image.geometry().size(), "pyramid level built");
            images.push(image);
        }

        Ok(Self { images })
    }

    /// Power-of-two schedule for `levels` levels.
    ///
    /// E.g. 3 levels -> factors [4, 2, 1], sigmas [2.0, 1.0, 0.0].
    pub fn default_schedule(levels: usize) -> Result<(Vec<[usize; D]>, Vec<[f64; D]>)> {
        if levels == 0 {
            return Err(CoreError::invalid_argument("a pyramid needs at least one level"));
        }
        let mut shrink_factors = Vec::with_capacity(levels);
        let mut smoothing_sigmas = Vec::with_capacity(levels);
        for i in 0..levels {
            let factor = 1usize << (levels - 1 - i);
            let sigma = if factor > 1 { 0.5 * factor as f64 } else { 0.0 };
            shrink_factors.push([factor; D]);
            smoothing_sigmas.push([sigma; D]);
        }
        Ok((shrink_factors, smoothing_sigmas))
    }

    pub fn level(&self, level: usize) -> Option<&Image<B, D>> {
        self.images.get(level)
    }

    pub fn levels(&self) -> usize {
        self.images.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image<B, D>> {
        self.images.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::image::ImageGeometry;
    use crate::spatial::{Direction, Point, Spacing};

    type TestBackend = NdArray<f32>;

    fn volume(size: [usize; 3]) -> Image<TestBackend, 3> {
        let device = Default::default();
        let geometry = ImageGeometry::new(size, Point::new([1.0, 2.0, 3.0]), Spacing::uniform(1.5), Direction::identity())
            .unwrap();
        let values = (0..geometry.num_voxels()).map(|v| (v % 7) as f32).collect();
        Image::from_vec(values, geometry, &device).unwrap()
    }

    #[test]
    fn test_levels_are_coarsest_first() {
        let input = volume([16, 12, 8]);
        let pyramid = MultiResolutionPyramid::new(&input, 3).unwrap();
        assert_eq!(pyramid.levels(), 3);
        assert_eq!(pyramid.level(0).unwrap().geometry().size(), [4, 3, 2]);
        assert_eq!(pyramid.level(1).unwrap().geometry().size(), [8, 6, 4]);
        assert_eq!(pyramid.level(2).unwrap().geometry(), input.geometry());
        assert_eq!(pyramid.level(0).unwrap().spacing()[0], 6.0);
        assert!(pyramid.level(3).is_none());
    }

    #[test]
    fn test_zero_levels_is_an_error() {
        let input = volume([4, 4, 4]);
        assert!(MultiResolutionPyramid::new(&input, 0).is_err());
    }

    #[test]
    fn test_deep_pyramid_collapses_short_axes() {
        let input = volume([8, 8, 2]);
        let pyramid = MultiResolutionPyramid::new(&input, 4).unwrap();
        assert_eq!(pyramid.level(0).unwrap().geometry().size(), [1, 1, 1]);
        assert_eq!(pyramid.level(1).unwrap().geometry().size(), [2, 2, 1]);
    }
}
