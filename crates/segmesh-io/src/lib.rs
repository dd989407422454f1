pub mod nifti_io;
pub mod stl;

pub use nifti_io::{read_nifti, read_nifti_with_header, write_nifti, NiftiVolume, VolumeHeader};
pub use stl::{write_stl, StlFormat};
