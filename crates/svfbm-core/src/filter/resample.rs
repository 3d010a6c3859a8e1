//! Resample image filter.
//!
//! Resamples an image onto a new grid through a transform and an
//! interpolator.

use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor};
use crate::error::Result;
use crate::image::{generate_grid, Image, ImageGeometry};
use crate::interpolation::trait_::Interpolator;
use crate::transform::trait_::Transform;

/// Resample image filter.
///
/// For every node of the output grid, maps its physical point through the
/// transform (output space → input space), and interpolates the input there.
/// Points landing outside the input's sampled region get the default pixel
/// value.
///
/// # Type Parameters
/// * `B` - The burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
/// * `D` - The dimensionality (2 or 3)
pub struct ResampleImageFilter<B, T, I, const D: usize>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    geometry: ImageGeometry<D>,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    _phantom: PhantomData<B>,
}

impl<B, T, I, const D: usize> ResampleImageFilter<B, T, I, D>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    /// Create a filter producing images on `geometry`.
    pub fn new(geometry: ImageGeometry<D>, transform: T, interpolator: I) -> Self {
        Self {
            geometry,
            transform,
            interpolator,
            default_pixel_value: 0.0,
            _phantom: PhantomData,
        }
    }

    /// Use the grid of a reference image as output grid.
    pub fn new_from_reference(reference: &Image<B, D>, transform: T, interpolator: I) -> Self {
        Self::new(*reference.geometry(), transform, interpolator)
    }

    /// Set default pixel value for outside the field of view.
    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    /// Apply the filter to an input image.
    pub fn apply(&self, input: &Image<B, D>) -> Result<Image<B, D>> {
        let data = self.apply_tensor(input.data(), input.geometry());
        Image::from_geometry(data, self.geometry)
    }

    /// Resample raw data that lives on `input_geometry`.
    pub fn apply_tensor(&self, data: &Tensor<B, D>, input_geometry: &ImageGeometry<D>) -> Tensor<B, D> {
        let device = data.device();

        let output_indices = generate_grid::<B, D>(self.geometry.size(), &device);
        let output_points = self.geometry.index_to_world_tensor(output_indices);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input_geometry.world_to_index_tensor(input_points);

        let inside = inside_mask(&input_indices, input_geometry.size());
        let values = self.interpolator.interpolate(data, input_indices);

        let outside = inside.clone().neg().add_scalar(1.0);
        let values = values * inside + outside.mul_scalar(self.default_pixel_value);

        values.reshape(Shape::new(self.geometry.tensor_shape()))
    }
}

/// 1.0 where a continuous index lies in the sampled region, 0.0 elsewhere.
pub(crate) fn inside_mask<B: Backend, const D: usize>(indices: &Tensor<B, 2>, size: [usize; D]) -> Tensor<B, 1> {
    let rows = indices.dims()[0];
    let mut mask = Tensor::<B, 1>::ones([rows], &indices.device());
    for (axis, &n) in size.iter().enumerate() {
        let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        let lower = coord.clone().greater_equal_elem(-0.5).float();
        let upper = coord.lower_equal_elem(n as f64 - 0.5).float();
        mask = mask * lower * upper;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::interpolation::LinearInterpolator;
    use crate::spatial::{Direction2, Point2, Spacing2};
    use crate::transform::IdentityTransform;

    type TestBackend = NdArray<f32>;

    /// Shifts points by a fixed offset.
    struct Shift([f32; 2]);

    impl Transform<TestBackend, 2> for Shift {
        fn transform_points(&self, points: Tensor<TestBackend, 2>) -> Tensor<TestBackend, 2> {
            let offset = Tensor::<TestBackend, 1>::from_floats(self.0, &points.device()).reshape([1, 2]);
            points + offset
        }
    }

    fn square() -> Image<TestBackend, 2> {
        let device = Default::default();
        let mut data = vec![0.0; 100];
        data[4 * 10 + 4] = 1.0;
        data[4 * 10 + 5] = 1.0;
        data[5 * 10 + 4] = 1.0;
        data[5 * 10 + 5] = 1.0;
        let geometry = ImageGeometry::new(
            [10, 10],
            Point2::new([0.0, 0.0]),
            Spacing2::new([1.0, 1.0]),
            Direction2::identity(),
        )
        .unwrap();
        Image::from_vec(data, geometry, &device).unwrap()
    }

    #[test]
    fn test_resample_translation_2d() {
        let image = square();

        // Output (x, y) reads input (x - 2, y - 1): content moves by (+2, +1).
        let filter = ResampleImageFilter::new_from_reference(&image, Shift([-2.0, -1.0]), LinearInterpolator::new());
        let result = filter.apply(&image).unwrap();
        let slice = result.to_vec().unwrap();

        assert!(slice[5 * 10 + 6] > 0.9);
        assert!(slice[5 * 10 + 7] > 0.9);
        assert!(slice[6 * 10 + 6] > 0.9);
        assert!(slice[6 * 10 + 7] > 0.9);
        assert!(slice[4 * 10 + 4] < 0.1);
    }

    #[test]
    fn test_default_value_outside_field_of_view() {
        let image = square();
        let filter = ResampleImageFilter::new_from_reference(&image, Shift([5.0, 0.0]), LinearInterpolator::new())
            .with_default_pixel_value(-1.0);
        let slice = filter.apply(&image).unwrap().to_vec().unwrap();

        // Columns 5..9 read x + 5 >= 10: outside.
        assert_eq!(slice[9], -1.0);
        assert_eq!(slice[3 * 10 + 5], -1.0);
        // Column 4 reads x = 9, still inside.
        assert_eq!(slice[3 * 10 + 4], 0.0);
    }

    #[test]
    fn test_identity_onto_coarser_grid() {
        let image = square();
        let coarse = image.geometry().shrink([2, 2]).unwrap();
        let filter = ResampleImageFilter::<TestBackend, _, _, 2>::new(coarse, IdentityTransform, LinearInterpolator::new());
        let result = filter.apply(&image).unwrap();
        assert_eq!(result.shape(), [5, 5]);
        // Coarse node (2, 2) sits at fine (4.5, 4.5): the middle of the square.
        let slice = result.to_vec().unwrap();
        assert!((slice[2 * 5 + 2] - 1.0).abs() < 1e-5);
    }
}
