//! Input and field checks run before and during registration.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};
use svfbm_core::image::Image;
use svfbm_core::transform::VectorField;
use crate::error::{RegistrationError, Result};

/// Check that a tensor holds only finite values.
pub fn validate_tensor<B: Backend, const D: usize>(tensor: &Tensor<B, D>, what: &str) -> Result<()> {
    let nan_count = tensor.clone().is_nan().int().sum().into_scalar().elem::<i64>();
    if nan_count > 0 {
        return Err(RegistrationError::numerical_instability(format!("{} contains NaN values", what)));
    }
    let max_abs = tensor.clone().abs().max().into_scalar().elem::<f64>();
    if !max_abs.is_finite() {
        return Err(RegistrationError::numerical_instability(format!(
            "{} contains infinite values",
            what
        )));
    }
    Ok(())
}

/// Check that two volumes can be registered: finite voxels and overlapping
/// physical extents.
pub fn validate_volume_pair<B: Backend>(reference: &Image<B, 3>, floating: &Image<B, 3>) -> Result<()> {
    validate_tensor(reference.data(), "reference image")
        .map_err(|e| RegistrationError::image_validation(e.to_string()))?;
    validate_tensor(floating.data(), "floating image")
        .map_err(|e| RegistrationError::image_validation(e.to_string()))?;

    if !reference.geometry().overlaps(floating.geometry()) {
        let (r_lo, r_hi) = reference.geometry().physical_bounds();
        let (f_lo, f_hi) = floating.geometry().physical_bounds();
        return Err(RegistrationError::image_validation(format!(
            "reference extent {:?}..{:?} does not overlap floating extent {:?}..{:?}",
            r_lo.to_array(),
            r_hi.to_array(),
            f_lo.to_array(),
            f_hi.to_array()
        )));
    }
    Ok(())
}

/// Check a velocity or displacement field after an update.
pub fn validate_field<B: Backend>(field: &VectorField<B>, what: &str) -> Result<()> {
    let norm = field.max_norm();
    if !norm.is_finite() {
        return Err(RegistrationError::numerical_instability(format!(
            "{} has a non-finite maximum norm",
            what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use svfbm_core::image::ImageGeometry;
    use svfbm_core::spatial::{Direction, Point, Spacing};

    type B = NdArray<f32>;

    fn volume(origin: [f64; 3], values: Vec<f32>) -> Image<B, 3> {
        let geometry = ImageGeometry::new([2, 2, 2], Point::new(origin), Spacing::uniform(1.0), Direction::identity())
            .unwrap();
        Image::from_vec(values, geometry, &Default::default()).unwrap()
    }

    #[test]
    fn test_validate_tensor_rejects_non_finite() {
        let device = Default::default();
        assert!(validate_tensor(&Tensor::<B, 1>::from_floats([1.0, 2.0, 3.0], &device), "t").is_ok());
        let nan = Tensor::<B, 1>::from_floats([1.0, f32::NAN], &device);
        assert!(matches!(validate_tensor(&nan, "t"), Err(RegistrationError::NumericalInstability(_))));
        let inf = Tensor::<B, 1>::from_floats([f32::INFINITY, 0.0], &device);
        assert!(validate_tensor(&inf, "t").is_err());
    }

    #[test]
    fn test_volume_pair_must_overlap() {
        let a = volume([0.0, 0.0, 0.0], vec![1.0; 8]);
        let b = volume([1.0, 0.0, 0.0], vec![2.0; 8]);
        let far = volume([50.0, 0.0, 0.0], vec![2.0; 8]);
        assert!(validate_volume_pair(&a, &b).is_ok());
        assert!(matches!(
            validate_volume_pair(&a, &far),
            Err(RegistrationError::ImageValidation(_))
        ));
    }

    #[test]
    fn test_volume_pair_rejects_nan_voxels() {
        let a = volume([0.0, 0.0, 0.0], vec![1.0; 8]);
        let mut values = vec![0.0; 8];
        values[3] = f32::NAN;
        let b = volume([0.0, 0.0, 0.0], values);
        assert!(matches!(validate_volume_pair(&a, &b), Err(RegistrationError::ImageValidation(_))));
    }
}
