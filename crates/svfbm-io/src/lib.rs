pub mod nifti_io;

pub use nifti_io::{read_nifti, write_nifti, write_nifti_compressed, write_velocity_field, VECTOR_INTENT_CODE};
