//! Grid geometry: size, origin, spacing and direction of a volume.
//!
//! The mapping between continuous indices and physical points is
//! `point = origin + Direction * (index * spacing)` and its inverse
//! `index = (Direction^-1 * (point - origin)) / spacing`.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing, Vector};

/// Physical layout of a sampled grid.
///
/// `size` is ordered like continuous indices, `(x, y, z)` in 3-D. The
/// corresponding tensor shape is the reverse, see [`ImageGeometry::tensor_shape`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry<const D: usize> {
    size: [usize; D],
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    inverse_direction: Direction<D>,
}

impl<const D: usize> ImageGeometry<D> {
    /// Create a geometry, rejecting empty grids, non-positive spacing and
    /// singular directions.
    pub fn new(
        size: [usize; D],
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Result<Self> {
        if size.iter().any(|&n| n == 0) {
            return Err(CoreError::empty_volume(format!("grid size {:?}", size)));
        }
        if !spacing.is_valid() {
            return Err(CoreError::invalid_geometry(format!(
                "spacing must be finite and positive, got {:?}",
                spacing.to_array()
            )));
        }
        if direction.determinant().abs() < 1e-12 {
            return Err(CoreError::invalid_geometry("direction matrix is singular"));
        }
        if !direction.is_orthogonal() {
            tracing::debug!("direction matrix is not orthonormal");
        }
        let inverse_direction = direction
            .try_inverse()
            .ok_or_else(|| CoreError::invalid_geometry("direction matrix is singular"))?;

        Ok(Self {
            size,
            origin,
            spacing,
            direction,
            inverse_direction,
        })
    }

    /// Unit spacing, zero origin and identity direction.
    pub fn with_size(size: [usize; D]) -> Result<Self> {
        Self::new(size, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    pub fn size(&self) -> [usize; D] {
        self.size
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Number of grid nodes.
    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Mean of the per-axis spacings.
    pub fn mean_spacing(&self) -> f64 {
        self.spacing.mean_spacing()
    }

    /// Tensor shape for data on this grid (slowest axis first).
    pub fn tensor_shape(&self) -> [usize; D] {
        let mut shape = self.size;
        shape.reverse();
        shape
    }

    /// Continuous index to physical point.
    pub fn index_to_physical(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// Physical point to continuous index.
    pub fn physical_to_index(&self, point: &Point<D>) -> Point<D> {
        let rotated = self.inverse_direction * (*point - self.origin);
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Physical displacement to index-space displacement.
    pub fn physical_vector_to_index(&self, vector: &Vector<D>) -> Vector<D> {
        let mut rotated = self.inverse_direction * *vector;
        for i in 0..D {
            rotated[i] /= self.spacing[i];
        }
        rotated
    }

    /// Whether a continuous index falls in the sampled region.
    ///
    /// The region extends half a voxel beyond the first and last nodes along
    /// every axis.
    pub fn contains_index(&self, index: &Point<D>) -> bool {
        (0..D).all(|i| index[i] >= -0.5 && index[i] <= self.size[i] as f64 - 0.5)
    }

    /// Axis-aligned physical bounding box of the sampled region.
    pub fn physical_bounds(&self) -> (Point<D>, Point<D>) {
        let mut lower = Point::<D>::new([f64::INFINITY; D]);
        let mut upper = Point::<D>::new([f64::NEG_INFINITY; D]);
        for corner in 0..(1usize << D) {
            let mut index = Point::<D>::origin();
            for i in 0..D {
                index[i] = if corner & (1 << i) == 0 {
                    -0.5
                } else {
                    self.size[i] as f64 - 0.5
                };
            }
            let p = self.index_to_physical(&index);
            for i in 0..D {
                lower[i] = lower[i].min(p[i]);
                upper[i] = upper[i].max(p[i]);
            }
        }
        (lower, upper)
    }

    /// True when the physical bounding boxes of both grids intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        let (a_lo, a_hi) = self.physical_bounds();
        let (b_lo, b_hi) = other.physical_bounds();
        (0..D).all(|i| a_lo[i] < b_hi[i] && b_lo[i] < a_hi[i])
    }

    /// Geometry of the grid obtained by merging `factors[i]` nodes into one
    /// along each axis, with coarse node centers at the middle of the merged
    /// fine nodes.
    pub fn shrink(&self, factors: [usize; D]) -> Result<Self> {
        if factors.iter().any(|&f| f == 0) {
            return Err(CoreError::invalid_argument("shrink factors must be >= 1"));
        }
        let mut size = self.size;
        let mut spacing = self.spacing;
        let mut offset = Vector::<D>::zeros();
        for i in 0..D {
            // An axis shorter than the factor collapses to a single node.
            let f = factors[i].min(self.size[i]);
            size[i] = self.size[i] / f;
            spacing[i] = self.spacing[i] * f as f64;
            offset[i] = 0.5 * (f as f64 - 1.0) * self.spacing[i];
        }
        let origin = self.origin + self.direction * offset;
        Self::new(size, origin, spacing, self.direction)
    }

    /// Batch physical points `[N, D]` to continuous indices `[N, D]`.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin = self.origin_tensor::<B>(&device);

        // I = (P - O) @ T with T[r, c] = inv_dir[c, r] / spacing[c]
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((self.inverse_direction[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        (points - origin).matmul(t)
    }

    /// Batch continuous indices `[N, D]` to physical points `[N, D]`.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let origin = self.origin_tensor::<B>(&device);

        // P = O + I @ T with T[r, c] = dir[c, r] * spacing[r]
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((self.direction[(c, r)] * self.spacing[r]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        origin + indices.matmul(t)
    }

    fn origin_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D])
    }
}
