//! Host-side volume storage for random-access sampling.
//!
//! Block statistics and block matching read many small scattered
//! neighborhoods, so those stages work on a flat `Vec<f32>` copy of the volume.

use burn::tensor::backend::Backend;
use crate::error::{CoreError, Result};
use crate::image::{Image, ImageGeometry};
use crate::spatial::Point3;

/// A 3-D scalar volume held in host memory, x fastest.
#[derive(Debug, Clone)]
pub struct VolumeBuffer {
    geometry: ImageGeometry<3>,
    data: Vec<f32>,
}

impl VolumeBuffer {
    pub fn new(geometry: ImageGeometry<3>, data: Vec<f32>) -> Result<Self> {
        if data.len() != geometry.num_voxels() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![geometry.num_voxels()],
                actual: vec![data.len()],
            });
        }
        Ok(Self { geometry, data })
    }

    /// Copy a tensor image to the host.
    pub fn from_image<B: Backend>(image: &Image<B, 3>) -> Result<Self> {
        Self::new(*image.geometry(), image.to_vec()?)
    }

    /// Upload back into a tensor image.
    pub fn to_image<B: Backend>(&self, device: &B::Device) -> Result<Image<B, 3>> {
        Image::from_vec(self.data.clone(), self.geometry, device)
    }

    pub fn geometry(&self) -> &ImageGeometry<3> {
        &self.geometry
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.geometry.size();
        (z * ny + y) * nx + x
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[self.linear_index(x, y, z)]
    }

    /// Trilinear sample at a continuous index `(x, y, z)`.
    ///
    /// Returns `None` outside the sampled region (half a voxel past the
    /// outer nodes); inside it, neighbors are clamped to the grid.
    pub fn sample(&self, index: [f64; 3]) -> Option<f64> {
        let size = self.geometry.size();
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let c = index[axis];
            let n = size[axis];
            if !(c >= -0.5 && c <= n as f64 - 0.5) {
                return None;
            }
            let max = (n - 1) as f64;
            let c = c.clamp(0.0, max);
            let f = c.floor();
            lo[axis] = f as usize;
            hi[axis] = (f + 1.0).min(max) as usize;
            frac[axis] = c - f;
        }

        let mut acc = 0.0;
        for corner in 0..8 {
            let mut weight = 1.0;
            let mut at = [0usize; 3];
            for axis in 0..3 {
                if corner & (1 << axis) == 0 {
                    weight *= 1.0 - frac[axis];
                    at[axis] = lo[axis];
                } else {
                    weight *= frac[axis];
                    at[axis] = hi[axis];
                }
            }
            if weight > 0.0 {
                acc += weight * self.value(at[0], at[1], at[2]) as f64;
            }
        }
        Some(acc)
    }

    /// Trilinear sample at a physical point.
    pub fn sample_physical(&self, point: &Point3) -> Option<f64> {
        let index = self.geometry.physical_to_index(point);
        self.sample([index[0], index[1], index[2]])
    }

    /// Voxel-wise average of two buffers on the same grid.
    pub fn average(&self, other: &Self) -> Result<Self> {
        if self.geometry.size() != other.geometry.size() {
            return Err(CoreError::ShapeMismatch {
                expected: self.geometry.size().to_vec(),
                actual: other.geometry.size().to_vec(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| 0.5 * (a + b))
            .collect();
        Self::new(self.geometry, data)
    }
}
