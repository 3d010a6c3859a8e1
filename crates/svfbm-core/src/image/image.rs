//! Image type with physical metadata.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{CoreError, Result};
use crate::image::geometry::ImageGeometry;
use crate::spatial::{Direction, Point, Spacing};

/// Volume data plus the geometry that places it in physical space.
///
/// # Type Parameters
/// * `B` - The burn backend holding the voxel data
/// * `D` - The dimensionality (2 or 3)
///
/// # Layout
/// The tensor is stored slowest axis first (`[Z, Y, X]` in 3-D) while the
/// geometry and every continuous index are ordered `(x, y, z)`.
///
/// # Examples
/// ```rust
/// use svfbm_core::Image;
/// use svfbm_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 6, 8], &device);
/// let image = Image::new(
///     data,
///     Point3::new([0.0, 0.0, 0.0]),
///     Spacing3::new([1.0, 1.0, 2.0]),
///     Direction3::identity(),
/// )
/// .unwrap();
/// assert_eq!(image.geometry().size(), [8, 6, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    geometry: ImageGeometry<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create an image, deriving the grid size from the tensor shape.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Result<Self> {
        let mut size = data.dims();
        size.reverse();
        let geometry = ImageGeometry::new(size, origin, spacing, direction)?;
        Ok(Self { data, geometry })
    }

    /// Wrap data that was produced on a known grid.
    pub fn from_geometry(data: Tensor<B, D>, geometry: ImageGeometry<D>) -> Result<Self> {
        let actual = data.dims();
        let expected = geometry.tensor_shape();
        if actual != expected {
            return Err(CoreError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(Self { data, geometry })
    }

    /// Build an image from host values laid out slowest axis first.
    pub fn from_vec(values: Vec<f32>, geometry: ImageGeometry<D>, device: &B::Device) -> Result<Self> {
        if values.len() != geometry.num_voxels() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![geometry.num_voxels()],
                actual: vec![values.len()],
            });
        }
        let data = Tensor::<B, D>::from_data(
            TensorData::new(values, Shape::new(geometry.tensor_shape())),
            device,
        );
        Ok(Self { data, geometry })
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    pub fn geometry(&self) -> &ImageGeometry<D> {
        &self.geometry
    }

    pub fn origin(&self) -> &Point<D> {
        self.geometry.origin()
    }

    pub fn spacing(&self) -> &Spacing<D> {
        self.geometry.spacing()
    }

    pub fn direction(&self) -> &Direction<D> {
        self.geometry.direction()
    }

    /// Tensor shape, slowest axis first.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Copy the voxel values to the host, slowest axis first.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::tensor_data(format!("{:?}", e)))
    }

    /// Same geometry, new values.
    pub fn with_data(&self, data: Tensor<B, D>) -> Result<Self> {
        Self::from_geometry(data, self.geometry)
    }

    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        self.geometry.physical_to_index(point)
    }

    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        self.geometry.index_to_physical(index)
    }

    /// Batch physical points `[N, D]` to continuous indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry.world_to_index_tensor(points)
    }

    /// Batch continuous indices `[N, D]` to physical points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry.index_to_world_tensor(indices)
    }
}
