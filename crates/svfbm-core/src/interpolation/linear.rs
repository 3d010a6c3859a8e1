//! Linear interpolation (bilinear in 2-D, trilinear in 3-D).

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use super::trait_::Interpolator;

/// Linear interpolator.
///
/// Neighbor indices are clamped to the grid, so samples past the border
/// replicate the edge value. Callers that need a fill value outside the
/// field of view mask the result themselves (see `ResampleImageFilter`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

/// Per-axis floor/ceil indices and fractional weight.
struct AxisSamples<B: Backend> {
    lower: Tensor<B, 1, Int>,
    upper: Tensor<B, 1, Int>,
    weight: Tensor<B, 1>,
}

impl<B: Backend> AxisSamples<B> {
    fn new(coord: Tensor<B, 1>, len: usize) -> Self {
        let max = (len - 1) as f64;
        let floor = coord.clone().floor();
        let weight = coord - floor.clone();
        let upper = (floor.clone() + 1.0).clamp(0.0, max).int();
        let lower = floor.clamp(0.0, max).int();
        Self { lower, upper, weight }
    }

    fn pick(&self, high: bool) -> (Tensor<B, 1, Int>, Tensor<B, 1>) {
        if high {
            (self.upper.clone(), self.weight.clone())
        } else {
            (self.lower.clone(), self.weight.clone().neg().add_scalar(1.0))
        }
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match D {
            3 => self.interpolate_nd::<B, D, 3>(data, indices),
            2 => self.interpolate_nd::<B, D, 2>(data, indices),
            _ => panic!("LinearInterpolator only supports 2D and 3D tensors"),
        }
    }
}

impl LinearInterpolator {
    /// Blend the `2^N` corner values gathered from the flattened tensor.
    fn interpolate_nd<B: Backend, const D: usize, const N: usize>(
        &self,
        data: &Tensor<B, D>,
        indices: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let dims = data.dims();
        let total: usize = dims.iter().product();
        let flat = data.clone().reshape([total]);

        // Index column `a` addresses tensor dimension `N - 1 - a`.
        let mut axes = Vec::with_capacity(N);
        let mut strides = Vec::with_capacity(N);
        for a in 0..N {
            let tensor_dim = N - 1 - a;
            let coord = indices.clone().narrow(1, a, 1).squeeze::<1>(1);
            axes.push(AxisSamples::new(coord, dims[tensor_dim]));
            strides.push(dims[tensor_dim + 1..].iter().product::<usize>() as i32);
        }

        let mut result: Option<Tensor<B, 1>> = None;
        for corner in 0..(1usize << N) {
            let mut offset: Option<Tensor<B, 1, Int>> = None;
            let mut weight: Option<Tensor<B, 1>> = None;
            for a in 0..N {
                let (idx, w) = axes[a].pick(corner & (1 << a) != 0);
                let term = idx * strides[a];
                offset = Some(match offset {
                    Some(o) => o + term,
                    None => term,
                });
                weight = Some(match weight {
                    Some(acc) => acc * w,
                    None => w,
                });
            }
            if let (Some(offset), Some(weight)) = (offset, weight) {
                let value = flat.clone().gather(0, offset) * weight;
                result = Some(match result {
                    Some(acc) => acc + value,
                    None => value,
                });
            }
        }

        result.unwrap_or_else(|| Tensor::zeros([indices.dims()[0]], &indices.device()))
    }
}
