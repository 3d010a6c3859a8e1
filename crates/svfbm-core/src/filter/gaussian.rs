use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor};
use crate::error::Result;
use crate::image::Image;
use crate::spatial::Spacing;

/// Gaussian smoothing filter.
///
/// Separable 1-D convolutions along each axis. Sigmas are physical (mm) and
/// converted to voxels with the image spacing. Near the borders the kernel is
/// renormalized over the samples that exist, so constant images stay constant.
pub struct GaussianFilter<B: Backend> {
    sigmas: Vec<f64>,
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Create a filter with one sigma per index axis `(x, y, z)`, in physical
    /// units. A single value applies to every axis.
    pub fn new(sigmas: Vec<f64>) -> Self {
        Self {
            sigmas,
            max_kernel_width: 32,
            _b: std::marker::PhantomData,
        }
    }

    /// Isotropic physical sigma.
    pub fn isotropic(sigma: f64) -> Self {
        Self::new(vec![sigma])
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    /// Apply the filter to an image.
    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Result<Image<B, D>> {
        let data = self.apply_tensor(image.data().clone(), image.spacing());
        image.with_data(data)
    }

    /// Apply the filter to a tensor stored slowest axis first.
    ///
    /// # Arguments
    /// * `input` - Input tensor (`[Z, Y, X]` in 3-D)
    /// * `spacing` - Spacing ordered by index axis `(x, y, z)`
    pub fn apply_tensor<const D: usize>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        let mut data = input;
        let device = data.device();

        for axis in 0..D {
            let sigma = self.sigmas.get(axis).or(self.sigmas.first()).copied().unwrap_or(0.0);
            if sigma <= 1e-6 {
                continue;
            }

            let voxel_sigma = sigma / spacing[axis];
            let radius = (3.0 * voxel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width);
            let radius = (width - 1) / 2;
            if radius == 0 {
                continue;
            }

            let kernel = Self::generate_kernel(voxel_sigma, radius);
            let kernel = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);

            // Index axis `axis` is tensor dimension `D - 1 - axis`.
            data = Self::convolve_1d::<D>(data, kernel, D - 1 - axis);
        }
        data
    }

    fn generate_kernel(sigma: f64, radius: usize) -> Vec<f32> {
        let two_sigma2 = 2.0 * sigma * sigma;
        let weights: Vec<f64> = (0..=(2 * radius))
            .map(|i| {
                let x = i as f64 - radius as f64;
                (-x * x / two_sigma2).exp()
            })
            .collect();
        let sum: f64 = weights.iter().sum();
        weights.iter().map(|w| (w / sum) as f32).collect()
    }

    fn convolve_1d<const D: usize>(input: Tensor<B, D>, kernel: Tensor<B, 1>, dim: usize) -> Tensor<B, D> {
        let dims: [usize; D] = input.dims();
        let device = input.device();

        // Move the target dimension last and fold the others into a batch.
        let mut permutation = [0isize; D];
        let mut idx = 0;
        for i in 0..D {
            if i != dim {
                permutation[idx] = i as isize;
                idx += 1;
            }
        }
        permutation[D - 1] = dim as isize;

        let length = dims[dim];
        let batch: usize = (0..D).filter(|&i| i != dim).map(|i| dims[i]).product();
        let folded = input.permute(permutation).reshape([batch, 1, length]);

        let kernel_size = kernel.dims()[0];
        let kernel = kernel.reshape([1, 1, kernel_size]);
        let options = ConvOptions::new([1], [kernel_size / 2], [1], 1);

        let smoothed = burn::tensor::module::conv1d(folded, kernel.clone(), None, options.clone());
        let coverage = burn::tensor::module::conv1d(
            Tensor::<B, 3>::ones([1, 1, length], &device),
            kernel,
            None,
            options,
        );
        let smoothed = smoothed / coverage;

        let mut permuted_shape = [0usize; D];
        for (slot, &src) in permutation.iter().enumerate() {
            permuted_shape[slot] = dims[src as usize];
        }
        let mut inverse = [0isize; D];
        for (slot, &src) in permutation.iter().enumerate() {
            inverse[src as usize] = slot as isize;
        }

        smoothed.reshape(Shape::new(permuted_shape)).permute(inverse)
    }
}
