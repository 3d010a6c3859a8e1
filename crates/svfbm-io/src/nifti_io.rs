use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use nalgebra::SMatrix;
use ndarray::{Array3, Array5, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use nifti::writer::WriterOptions;
use std::path::{Path, PathBuf};
use svfbm_core::image::{Image, ImageGeometry};
use svfbm_core::spatial::{Direction, Point, Spacing, Vector};
use svfbm_core::transform::VectorField;

/// NIfTI intent code of a vector-valued image.
pub const VECTOR_INTENT_CODE: i16 = 1007;

/// Scanner-based sform/qform code used when writing.
const ALIGNED_ANAT: i16 = 2;

/// Read a 3-D NIfTI volume (`.nii` or `.nii.gz`).
///
/// Geometry comes from the sform when present, then the qform, then the
/// voxel sizes alone.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    let origin = Point::new([affine[0][3], affine[1][3], affine[2][3]]);
    let columns: [Vector<3>; 3] = std::array::from_fn(|c| Vector::new([affine[0][c], affine[1][c], affine[2][c]]));
    let spacing = Spacing::new(std::array::from_fn(|c| columns[c].norm()));
    let axes = [
        nalgebra::Vector3::x_axis().into_inner(),
        nalgebra::Vector3::y_axis().into_inner(),
        nalgebra::Vector3::z_axis().into_inner(),
    ];
    let unit: [nalgebra::Vector3<f64>; 3] = std::array::from_fn(|c| {
        let norm = spacing[c];
        if norm > 1e-9 {
            columns[c].0 / norm
        } else {
            axes[c]
        }
    });
    let direction = Direction(SMatrix::<f64, 3, 3>::from_columns(&unit));

    let volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let volume = volume
        .into_dimensionality::<Ix3>()
        .context("Expected a 3-D NIfTI volume")?;
    let (nx, ny, nz) = volume.dim();

    // Tensor layout is [Z, Y, X]: x fastest.
    let mut values = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                values.push(volume[[x, y, z]]);
            }
        }
    }

    let geometry = ImageGeometry::new([nx, ny, nz], origin, spacing, direction)
        .context("NIfTI header describes an invalid geometry")?;
    Image::from_vec(values, geometry, device).context("Failed to build image from NIfTI data")
}

fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    let widen = |row: [f32; 4]| row.map(f64::from);
    if header.sform_code > 0 {
        return [widen(header.srow_x), widen(header.srow_y), widen(header.srow_z)];
    }

    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;
    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;
        return [
            [(a * a + b * b - c * c - d * d) * dx, (2.0 * b * c - 2.0 * a * d) * dy, (2.0 * b * d + 2.0 * a * c) * dz, header.quatern_x as f64],
            [(2.0 * b * c + 2.0 * a * d) * dx, (a * a + c * c - b * b - d * d) * dy, (2.0 * c * d - 2.0 * a * b) * dz, header.quatern_y as f64],
            [(2.0 * b * d - 2.0 * a * c) * dx, (2.0 * c * d + 2.0 * a * b) * dy, (a * a + d * d - c * c - b * b) * dz, header.quatern_z as f64],
        ];
    }

    [[dx, 0.0, 0.0, 0.0], [0.0, dy, 0.0, 0.0], [0.0, 0.0, dz, 0.0]]
}

/// Header carrying `geometry` in its sform.
fn geometry_header(geometry: &ImageGeometry<3>) -> NiftiHeader {
    let origin = geometry.origin();
    let spacing = geometry.spacing();
    let direction = geometry.direction();
    let row = |r: usize| -> [f32; 4] {
        [
            (direction[(r, 0)] * spacing[0]) as f32,
            (direction[(r, 1)] * spacing[1]) as f32,
            (direction[(r, 2)] * spacing[2]) as f32,
            origin[r] as f32,
        ]
    };

    let mut header = NiftiHeader::default();
    header.sform_code = ALIGNED_ANAT;
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.pixdim = [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0];
    header
}

/// Write an image to a NIfTI file. A path ending in `.gz` is compressed.
///
/// # Arguments
/// * `path` - Path to write the NIfTI file
/// * `image` - The image to write
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    let path = path.as_ref();
    let [nx, ny, _] = image.geometry().size();
    let values = image.to_vec().context("Failed to read image data")?;
    let array = Array3::from_shape_fn(size_tuple(image.geometry()), |(x, y, z)| values[(z * ny + y) * nx + x]);

    WriterOptions::new(path)
        .reference_header(&geometry_header(image.geometry()))
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    tracing::debug!(path = %path.display(), size = ?image.geometry().size(), "NIfTI volume written");
    Ok(())
}

/// Write a gzip-compressed NIfTI file, appending `.gz` when missing.
///
/// Returns the path actually written.
pub fn write_nifti_compressed<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<PathBuf> {
    let path = gz_path(path.as_ref());
    write_nifti(&path, image)?;
    Ok(path)
}

/// Write a velocity or displacement field as a 5-D vector NIfTI image
/// `[x, y, z, 1, 3]` with intent code 1007.
pub fn write_velocity_field<B: Backend, P: AsRef<Path>>(path: P, field: &VectorField<B>) -> Result<()> {
    let path = path.as_ref();
    let host = field.to_host().context("Failed to read field data")?;
    let geometry = host.geometry();
    let [nx, ny, nz] = geometry.size();
    let array = Array5::from_shape_fn((nx, ny, nz, 1, 3), |(x, y, z, _, c)| {
        host.component(c)[(z * ny + y) * nx + x]
    });

    let mut header = geometry_header(geometry);
    header.intent_code = VECTOR_INTENT_CODE;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write vector field {}", path.display()))?;
    Ok(())
}

fn size_tuple(geometry: &ImageGeometry<3>) -> (usize, usize, usize) {
    let [nx, ny, nz] = geometry.size();
    (nx, ny, nz)
}

fn gz_path(path: &Path) -> PathBuf {
    if path.extension().map_or(false, |e| e == "gz") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn sample_image() -> Image<TestBackend, 3> {
        let geometry = ImageGeometry::new(
            [3, 4, 5],
            Point::new([10.0, -5.0, 2.5]),
            Spacing::new([1.0, 2.0, 0.5]),
            Direction::identity(),
        )
        .unwrap();
        let values = (0..60).map(|v| v as f32).collect();
        Image::from_vec(values, geometry, &Default::default()).unwrap()
    }

    #[test]
    fn test_round_trip_keeps_values_and_geometry() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("volume.nii");
        let image = sample_image();
        write_nifti(&path, &image)?;

        let loaded = read_nifti::<TestBackend, _>(&path, &Default::default())?;
        assert_eq!(loaded.shape(), [5, 4, 3]);
        assert_eq!(loaded.to_vec()?, image.to_vec()?);
        assert_eq!(loaded.origin().to_array(), [10.0, -5.0, 2.5]);
        assert_eq!(loaded.spacing().to_array(), [1.0, 2.0, 0.5]);
        Ok(())
    }

    #[test]
    fn test_read_array_written_by_nifti_writer() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("plain.nii");
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&path).write_nifti(&array)?;

        let image = read_nifti::<TestBackend, _>(&path, &Default::default())?;
        assert_eq!(image.geometry().size(), [3, 4, 5]);
        let values = image.to_vec()?;
        // Index (x, y, z) = (2, 1, 3) sits at (z * ny + y) * nx + x.
        assert_eq!(values[(3 * 4 + 1) * 3 + 2], 312.0);
        Ok(())
    }

    #[test]
    fn test_compressed_path() -> Result<()> {
        let dir = tempdir()?;
        let written = write_nifti_compressed(dir.path().join("warped.nii"), &sample_image())?;
        assert!(written.to_string_lossy().ends_with("warped.nii.gz"));
        assert!(written.exists());
        let loaded = read_nifti::<TestBackend, _>(&written, &Default::default())?;
        assert_eq!(loaded.to_vec()?, sample_image().to_vec()?);
        assert_eq!(gz_path(Path::new("a.nii.gz")), PathBuf::from("a.nii.gz"));
        Ok(())
    }

    #[test]
    fn test_velocity_field_layout() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("svf.nii.gz");
        let geometry = ImageGeometry::with_size([4, 3, 2])?;
        let vectors: Vec<[f64; 3]> = (0..24).map(|i| [i as f64, -(i as f64), 0.5]).collect();
        let host = svfbm_core::transform::HostVectorField::from_vectors(geometry, &vectors)?;
        let field = VectorField::<TestBackend>::from_host(&host, &Default::default());
        write_velocity_field(&path, &field)?;

        let obj = ReaderOptions::new().read_file(&path)?;
        assert_eq!(obj.header().intent_code, VECTOR_INTENT_CODE);
        let array = obj.into_volume().into_ndarray::<f32>()?;
        assert_eq!(array.shape(), &[4, 3, 2, 1, 3]);
        assert_eq!(array[[1, 2, 1, 0, 0]], ((1 * 3 + 2) * 4 + 1) as f32);
        assert_eq!(array[[1, 2, 1, 0, 1]], -(((1 * 3 + 2) * 4 + 1) as f32));
        Ok(())
    }
}
