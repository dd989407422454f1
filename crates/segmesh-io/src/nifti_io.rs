use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::SMatrix;
use ndarray::{Array3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use segmesh_core::image::Image;
use segmesh_core::spatial::{Direction, Point, Spacing};
use std::path::Path;

/// Header fields kept alongside a loaded volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// Voxel counts `(x, y, z)`.
    pub dim: [usize; 3],
    pub pixdim: [f32; 3],
    pub datatype: i16,
    pub sform_code: i16,
    pub qform_code: i16,
    pub description: String,
    /// Index to world affine actually used, row-major.
    pub affine: [[f64; 4]; 4],
}

/// A volume together with its header record.
#[derive(Debug, Clone)]
pub struct NiftiVolume<B: Backend> {
    pub image: Image<B, 3>,
    pub header: VolumeHeader,
}

/// Index to world affine from the header: sform, then qform, then pixdim only.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 4] {
    let affine: [[f32; 4]; 4] = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z, [0.0, 0.0, 0.0, 1.0]]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();

        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let r11 = a * a + b * b - c * c - d * d;
        let r12 = 2.0 * b * c - 2.0 * a * d;
        let r13 = 2.0 * b * d + 2.0 * a * c;

        let r21 = 2.0 * b * c + 2.0 * a * d;
        let r22 = a * a + c * c - b * b - d * d;
        let r23 = 2.0 * c * d - 2.0 * a * b;

        let r31 = 2.0 * b * d - 2.0 * a * c;
        let r32 = 2.0 * c * d + 2.0 * a * b;
        let r33 = a * a + d * d - c * c - b * b;

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [r11 * dx, r12 * dy, r13 * dz, header.quatern_x],
            [r21 * dx, r22 * dy, r23 * dz, header.quatern_y],
            [r31 * dx, r32 * dy, r33 * dz, header.quatern_z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3];
        [
            [dx, 0.0, 0.0, 0.0],
            [0.0, dy, 0.0, 0.0],
            [0.0, 0.0, dz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    };

    affine.map(|row| row.map(f64::from))
}

/// Smallest `|det|` accepted for the unit direction columns.
const MIN_DIRECTION_DETERMINANT: f64 = 1e-6;

/// Split an affine into origin, spacing (column norms) and unit direction columns.
///
/// Fails if the direction columns are (nearly) linearly dependent, since no
/// world point could then be mapped back to a voxel.
fn decompose_affine(affine: &[[f64; 4]; 4]) -> Result<(Point<3>, Spacing<3>, Direction<3>)> {
    let origin = Point::new([affine[0][3], affine[1][3], affine[2][3]]);

    let mut spacing = [1.0; 3];
    let mut columns = [nalgebra::Vector3::zeros(); 3];
    for axis in 0..3 {
        let column = nalgebra::Vector3::new(affine[0][axis], affine[1][axis], affine[2][axis]);
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[axis] = norm;
            columns[axis] = column / norm;
        } else {
            // Degenerate column: keep the axis, unit spacing.
            columns[axis][axis] = 1.0;
        }
    }

    let matrix = SMatrix::<f64, 3, 3>::from_columns(&columns);
    let determinant = matrix.determinant();
    if determinant.abs() < MIN_DIRECTION_DETERMINANT {
        anyhow::bail!(
            "Singular orientation: direction columns {:?} have determinant {determinant:e}",
            columns.map(|c| [c.x, c.y, c.z])
        );
    }
    Ok((origin, Spacing::new(spacing), Direction(matrix)))
}

pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    Ok(read_nifti_with_header(path, device)?.image)
}

/// Read a 3D NIfTI file (`.nii` or `.nii.gz`) with its header record.
pub fn read_nifti_with_header<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<NiftiVolume<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let header = obj.header().clone();

    let affine = header_affine(&header);
    let (origin, spacing, direction) =
        decompose_affine(&affine).with_context(|| format!("Invalid geometry in {}", path.display()))?;

    let volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;

    // Trailing singleton dimensions (e.g. a single time point) are dropped.
    let shape = volume.shape().to_vec();
    if shape.len() < 3 || shape[3..].iter().any(|d| *d != 1) {
        anyhow::bail!("Expected 3D NIfTI file, found shape {:?}", shape);
    }
    let mut volume = volume;
    while volume.ndim() > 3 {
        let last = volume.ndim() - 1;
        volume = volume.index_axis_move(Axis(last), 0);
    }
    let volume = volume
        .into_dimensionality::<Ix3>()
        .context("Failed to view volume as 3D")?;

    let [nx, ny, nz] = [volume.shape()[0], volume.shape()[1], volume.shape()[2]];

    // Logical [X, Y, Z] to row-major [Z, Y, X].
    let zyx = volume.permuted_axes([2, 1, 0]);
    let values: Vec<f32> = zyx.as_standard_layout().iter().copied().collect();
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([nz, ny, nx])), device);

    let record = VolumeHeader {
        dim: [nx, ny, nz],
        pixdim: [header.pixdim[1], header.pixdim[2], header.pixdim[3]],
        datatype: header.datatype,
        sform_code: header.sform_code,
        qform_code: header.qform_code,
        description: String::from_utf8_lossy(&header.descrip)
            .trim_end_matches('\0')
            .to_string(),
        affine,
    };

    tracing::debug!(path = %path.display(), dim = ?record.dim, sform = record.sform_code, qform = record.qform_code, "loaded volume");

    Ok(NiftiVolume {
        image: Image::new(tensor, origin, spacing, direction),
        header: record,
    })
}

/// Write an image to a NIfTI file, storing its geometry as an sform.
///
/// A `.nii.gz` path is gzip-compressed.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    use nifti::writer::WriterOptions;

    let [nz, ny, nx] = image.shape();
    let data = image.data().to_data();
    let values = data
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    let array = Array3::from_shape_vec((nz, ny, nx), values)
        .context("Failed to create ndarray")?
        .permuted_axes([2, 1, 0]);

    let affine = image.metadata().affine();
    let spacing = image.spacing();
    let mut header = NiftiHeader::default();
    header.sform_code = 1;
    header.qform_code = 0;
    header.pixdim[1] = spacing[0] as f32;
    header.pixdim[2] = spacing[1] as f32;
    header.pixdim[3] = spacing[2] as f32;
    header.srow_x = affine[0].map(|v| v as f32);
    header.srow_y = affine[1].map(|v| v as f32);
    header.srow_z = affine[2].map(|v| v as f32);

    let path = path.as_ref();
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| anyhow::anyhow!("Failed to write NIfTI file {}: {}", path.display(), e))?;

    Ok(())
}
