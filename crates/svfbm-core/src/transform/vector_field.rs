//! Dense 3-D vector fields on a grid.
//!
//! A field is stored as a `[3, Z, Y, X]` tensor whose component `c` is the
//! physical vector coordinate along world axis `c`. The same storage serves
//! velocity fields and displacement fields.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Shape, Tensor, TensorData};
use rayon::prelude::*;
use crate::error::{CoreError, Result};
use crate::filter::resample::inside_mask;
use crate::filter::{GaussianFilter, ResampleImageFilter};
use crate::image::{generate_grid, ImageGeometry};
use crate::interpolation::{Interpolator, LinearInterpolator};
use crate::spatial::Vector3;
use crate::transform::IdentityTransform;

/// Vector field held as a burn tensor.
#[derive(Debug, Clone)]
pub struct VectorField<B: Backend> {
    data: Tensor<B, 4>,
    geometry: ImageGeometry<3>,
}

impl<B: Backend> VectorField<B> {
    /// The zero field on `geometry`.
    pub fn zeros(geometry: ImageGeometry<3>, device: &B::Device) -> Self {
        let [z, y, x] = geometry.tensor_shape();
        Self {
            data: Tensor::zeros([3, z, y, x], device),
            geometry,
        }
    }

    /// Wrap a `[3, Z, Y, X]` tensor.
    pub fn from_tensor(data: Tensor<B, 4>, geometry: ImageGeometry<3>) -> Result<Self> {
        let [z, y, x] = geometry.tensor_shape();
        let expected = [3, z, y, x];
        if data.dims() != expected {
            return Err(CoreError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: data.dims().to_vec(),
            });
        }
        Ok(Self { data, geometry })
    }

    /// Upload a host field.
    pub fn from_host(host: &HostVectorField, device: &B::Device) -> Self {
        let [z, y, x] = host.geometry.tensor_shape();
        let mut values = Vec::with_capacity(3 * host.len());
        for component in &host.components {
            values.extend_from_slice(component);
        }
        let data = Tensor::from_data(TensorData::new(values, Shape::new([3, z, y, x])), device);
        Self {
            data,
            geometry: host.geometry,
        }
    }

    /// Copy to host memory.
    pub fn to_host(&self) -> Result<HostVectorField> {
        let values = self
            .data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::tensor_data(format!("{:?}", e)))?;
        let n = self.geometry.num_voxels();
        let components = [
            values[..n].to_vec(),
            values[n..2 * n].to_vec(),
            values[2 * n..].to_vec(),
        ];
        Ok(HostVectorField {
            geometry: self.geometry,
            components,
        })
    }

    pub fn data(&self) -> &Tensor<B, 4> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, 4> {
        self.data
    }

    pub fn geometry(&self) -> &ImageGeometry<3> {
        &self.geometry
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Component `c` as a `[Z, Y, X]` volume.
    pub fn component(&self, c: usize) -> Tensor<B, 3> {
        self.data
            .clone()
            .narrow(0, c, 1)
            .reshape(Shape::new(self.geometry.tensor_shape()))
    }

    /// Vectors as rows `[N, 3]`, in grid scan order.
    pub fn to_rows(&self) -> Tensor<B, 2> {
        let n = self.geometry.num_voxels();
        self.data.clone().reshape([3, n]).swap_dims(0, 1)
    }

    fn from_rows(rows: Tensor<B, 2>, geometry: ImageGeometry<3>) -> Self {
        let [z, y, x] = geometry.tensor_shape();
        let data = rows.swap_dims(0, 1).reshape([3, z, y, x]);
        Self { data, geometry }
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            data: self.data.clone().mul_scalar(factor),
            geometry: self.geometry,
        }
    }

    /// Voxel-wise sum of two fields on the same grid.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_same_grid(other)?;
        Ok(Self {
            data: self.data.clone() + other.data.clone(),
            geometry: self.geometry,
        })
    }

    /// Voxel-wise difference of two fields on the same grid.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_same_grid(other)?;
        Ok(Self {
            data: self.data.clone() - other.data.clone(),
            geometry: self.geometry,
        })
    }

    fn check_same_grid(&self, other: &Self) -> Result<()> {
        if self.geometry != other.geometry {
            return Err(CoreError::invalid_geometry(format!(
                "vector fields live on different grids ({:?} vs {:?})",
                self.geometry.size(),
                other.geometry.size()
            )));
        }
        Ok(())
    }

    /// Largest vector norm over the grid, in physical units.
    pub fn max_norm(&self) -> f64 {
        self.data
            .clone()
            .powf_scalar(2.0)
            .sum_dim(0)
            .max()
            .sqrt()
            .into_scalar()
            .elem::<f64>()
    }

    /// Interpolate the field at physical points `[N, 3]`.
    ///
    /// Points outside the sampled region read a zero vector.
    pub fn sample(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let indices = self.geometry.world_to_index_tensor(points);
        let inside = inside_mask(&indices, self.geometry.size()).unsqueeze_dim::<2>(1);
        let interpolator = LinearInterpolator::new();
        let columns = (0..3)
            .map(|c| {
                interpolator
                    .interpolate(&self.component(c), indices.clone())
                    .unsqueeze_dim::<2>(1)
            })
            .collect();
        Tensor::cat(columns, 1) * inside
    }

    /// Displacement composition `(self ∘ inner)(x) = inner(x) + self(x + inner(x))`
    /// on the grid of `inner`.
    pub fn compose(&self, inner: &Self) -> Self {
        let device = inner.device();
        let indices = generate_grid::<B, 3>(inner.geometry.size(), &device);
        let points = inner.geometry.index_to_world_tensor(indices);
        let inner_rows = inner.to_rows();
        let outer_rows = self.sample(points + inner_rows.clone());
        Self::from_rows(inner_rows + outer_rows, inner.geometry)
    }

    /// Resample onto another grid through the identity mapping.
    ///
    /// Outside this field's sampled region the result is zero.
    pub fn resample_onto(&self, geometry: &ImageGeometry<3>) -> Self {
        if *geometry == self.geometry {
            return self.clone();
        }
        let filter = ResampleImageFilter::<B, _, _, 3>::new(*geometry, IdentityTransform, LinearInterpolator::new());
        let components = (0..3)
            .map(|c| filter.apply_tensor(&self.component(c), &self.geometry).unsqueeze_dim::<4>(0))
            .collect();
        Self {
            data: Tensor::cat(components, 0),
            geometry: *geometry,
        }
    }

    /// Gaussian smoothing of every component with a physical sigma.
    pub fn smooth(&self, sigma: f64) -> Self {
        if sigma <= 0.0 {
            return self.clone();
        }
        let filter = GaussianFilter::<B>::isotropic(sigma);
        let spacing = self.geometry.spacing();
        let components = (0..3)
            .map(|c| filter.apply_tensor(self.component(c), spacing).unsqueeze_dim::<4>(0))
            .collect();
        Self {
            data: Tensor::cat(components, 0),
            geometry: self.geometry,
        }
    }
}

/// Vector field in host memory, one `Vec<f32>` per component, x fastest.
///
/// Used where every voxel needs neighbor access (Jacobians) or where values
/// are produced voxel by voxel (aggregation).
#[derive(Debug, Clone, PartialEq)]
pub struct HostVectorField {
    geometry: ImageGeometry<3>,
    components: [Vec<f32>; 3],
}

impl HostVectorField {
    pub fn zeros(geometry: ImageGeometry<3>) -> Self {
        let n = geometry.num_voxels();
        Self {
            geometry,
            components: [vec![0.0; n], vec![0.0; n], vec![0.0; n]],
        }
    }

    /// Build from one vector per voxel, in scan order.
    pub fn from_vectors(geometry: ImageGeometry<3>, vectors: &[[f64; 3]]) -> Result<Self> {
        if vectors.len() != geometry.num_voxels() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![geometry.num_voxels()],
                actual: vec![vectors.len()],
            });
        }
        let mut field = Self::zeros(geometry);
        for (i, v) in vectors.iter().enumerate() {
            field.set(i, *v);
        }
        Ok(field)
    }

    pub fn geometry(&self) -> &ImageGeometry<3> {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.components[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn component(&self, c: usize) -> &[f32] {
        &self.components[c]
    }

    #[inline]
    pub fn get(&self, i: usize) -> [f64; 3] {
        [
            self.components[0][i] as f64,
            self.components[1][i] as f64,
            self.components[2][i] as f64,
        ]
    }

    #[inline]
    pub fn set(&mut self, i: usize, v: [f64; 3]) {
        for c in 0..3 {
            self.components[c][i] = v[c] as f32;
        }
    }

    pub fn max_norm(&self) -> f64 {
        (0..self.len())
            .map(|i| {
                let v = self.get(i);
                (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
            })
            .fold(0.0, f64::max)
    }

    /// Physical Jacobian `∂v_r / ∂x_c` at every voxel, central differences
    /// inside and one-sided differences on the border.
    pub fn jacobians(&self) -> Vec<nalgebra::Matrix3<f64>> {
        let [nx, ny, nz] = self.geometry.size();
        let size = [nx, ny, nz];
        // index-space derivative -> physical derivative: J_phys = J_index * (Dir * diag(spacing))^-1
        let mut index_to_physical = self.geometry.direction().0;
        for c in 0..3 {
            let s = self.geometry.spacing()[c];
            for r in 0..3 {
                index_to_physical[(r, c)] *= s;
            }
        }
        let chain = index_to_physical.try_inverse().unwrap_or_else(nalgebra::Matrix3::zeros);

        (0..self.len())
            .into_par_iter()
            .map(|i| {
                let at = [i % nx, (i / nx) % ny, i / (nx * ny)];
                let mut j_index = nalgebra::Matrix3::<f64>::zeros();
                for axis in 0..3 {
                    let n = size[axis];
                    if n < 2 {
                        continue;
                    }
                    let lo = at[axis].saturating_sub(1);
                    let hi = (at[axis] + 1).min(n - 1);
                    let mut lo_at = at;
                    let mut hi_at = at;
                    lo_at[axis] = lo;
                    hi_at[axis] = hi;
                    let a = self.get(linear(lo_at, nx, ny));
                    let b = self.get(linear(hi_at, nx, ny));
                    let h = (hi - lo) as f64;
                    for r in 0..3 {
                        j_index[(r, axis)] = (b[r] - a[r]) / h;
                    }
                }
                j_index * chain
            })
            .collect()
    }

    /// Lie bracket `[v, u](x) = J_v(x) u(x) - J_u(x) v(x)`.
    pub fn lie_bracket(&self, other: &Self) -> Result<Self> {
        if self.geometry != other.geometry {
            return Err(CoreError::invalid_geometry("lie bracket of fields on different grids"));
        }
        let jv = self.jacobians();
        let ju = other.jacobians();
        let vectors: Vec<[f64; 3]> = (0..self.len())
            .into_par_iter()
            .map(|i| {
                let v = nalgebra::Vector3::from(self.get(i));
                let u = nalgebra::Vector3::from(other.get(i));
                let b = jv[i] * u - ju[i] * v;
                [b[0], b[1], b[2]]
            })
            .collect();
        Self::from_vectors(self.geometry, &vectors)
    }

    /// The vector at a voxel as a spatial vector.
    pub fn vector(&self, i: usize) -> Vector3 {
        Vector3::new(self.get(i))
    }
}

#[inline]
fn linear(at: [usize; 3], nx: usize, ny: usize) -> usize {
    (at[2] * ny + at[1]) * nx + at[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::spatial::{Direction, Point, Spacing};

    type TestBackend = NdArray<f32>;

    fn grid(size: [usize; 3]) -> ImageGeometry<3> {
        ImageGeometry::new(size, Point::origin(), Spacing::new([1.0, 2.0, 1.0]), Direction::identity()).unwrap()
    }

    fn constant(geometry: ImageGeometry<3>, v: [f64; 3]) -> VectorField<TestBackend> {
        let host = HostVectorField::from_vectors(geometry, &vec![v; geometry.num_voxels()]).unwrap();
        VectorField::from_host(&host, &Default::default())
    }

    #[test]
    fn test_host_round_trip_and_max_norm() {
        let g = grid([4, 3, 2]);
        let mut host = HostVectorField::zeros(g);
        host.set(5, [3.0, 0.0, 4.0]);
        let field = VectorField::<TestBackend>::from_host(&host, &Default::default());
        assert!((field.max_norm() - 5.0).abs() < 1e-5);
        assert_eq!(field.to_host().unwrap(), host);
        assert_eq!(field.data().dims(), [3, 2, 3, 4]);
    }

    #[test]
    fn test_sample_is_zero_outside() {
        let g = grid([4, 4, 4]);
        let field = constant(g, [1.0, -2.0, 0.5]);
        let device = Default::default();
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 1.0], [100.0, 0.0, 0.0]], &device);
        let out = field.sample(points).into_data().to_vec::<f32>().unwrap();
        assert_eq!(&out[..3], &[1.0, -2.0, 0.5]);
        assert_eq!(&out[3..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_compose_constant_translations_adds() {
        let g = grid([6, 6, 6]);
        let a = constant(g, [0.5, 0.0, 0.0]);
        let b = constant(g, [0.0, 1.0, 0.0]);
        let composed = a.compose(&b).to_host().unwrap();
        // Center voxel stays well inside after the shift.
        let center = (3 * 6 + 3) * 6 + 3;
        let v = composed.get(center);
        assert!((v[0] - 0.5).abs() < 1e-5 && (v[1] - 1.0).abs() < 1e-5 && v[2].abs() < 1e-6);
    }

    #[test]
    fn test_resample_zero_field_is_zero() {
        let g = grid([5, 5, 5]);
        let zero = VectorField::<TestBackend>::zeros(g, &Default::default());
        let target = ImageGeometry::new([7, 3, 2], Point::new([-3.0, 1.0, 0.0]), Spacing::uniform(0.7), Direction::identity())
            .unwrap();
        let resampled = zero.resample_onto(&target);
        assert_eq!(resampled.geometry(), &target);
        assert_eq!(resampled.max_norm(), 0.0);
    }

    #[test]
    fn test_jacobian_of_linear_field() {
        // v(x) = (2 x_phys, 0, 0) with spacing (1, 2, 1).
        let g = grid([5, 4, 3]);
        let mut host = HostVectorField::zeros(g);
        for i in 0..host.len() {
            let x = (i % 5) as f64;
            host.set(i, [2.0 * x, 0.0, 0.0]);
        }
        let j = host.jacobians();
        for m in &j {
            assert!((m[(0, 0)] - 2.0).abs() < 1e-9);
            assert!(m[(0, 1)].abs() < 1e-9);
        }
    }

    #[test]
    fn test_bracket_of_commuting_fields_vanishes() {
        let g = grid([4, 4, 4]);
        let a = HostVectorField::from_vectors(g, &vec![[1.0, 0.0, 0.0]; 64]).unwrap();
        let b = HostVectorField::from_vectors(g, &vec![[0.0, 2.0, 0.0]; 64]).unwrap();
        assert_eq!(a.lie_bracket(&b).unwrap().max_norm(), 0.0);
    }
}
