pub mod gaussian;
pub mod shrink;
pub mod pyramid;
pub mod resample;

pub use gaussian::GaussianFilter;
pub use resample::ResampleImageFilter;
pub use pyramid::MultiResolutionPyramid;
pub use shrink::ShrinkImageFilter;
