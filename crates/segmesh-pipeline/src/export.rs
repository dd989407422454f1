//! Mesh persistence.

use std::path::{Path, PathBuf};

use segmesh_io::{write_stl, StlFormat};

use crate::error::{PipelineError, Result};
use crate::mesh::SurfaceMesh;

/// Writes per-class meshes to `<output_root>/<patient_id>_meshes/`.
#[derive(Debug, Clone)]
pub struct MeshWriter {
    output_root: PathBuf,
    format: StlFormat,
}

impl MeshWriter {
    pub fn new(output_root: impl Into<PathBuf>, format: StlFormat) -> Self {
        Self {
            output_root: output_root.into(),
            format,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn output_dir(&self, patient_id: &str) -> PathBuf {
        self.output_root.join(format!("{patient_id}_meshes"))
    }

    pub fn mesh_path(&self, patient_id: &str, class: usize) -> PathBuf {
        self.output_dir(patient_id).join(format!("{patient_id}_{class}.stl"))
    }

    /// Create the patient's output directory.
    pub fn prepare(&self, patient_id: &str) -> Result<PathBuf> {
        let dir = self.output_dir(patient_id);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(dir)
    }

    pub fn write(&self, patient_id: &str, class: usize, mesh: &SurfaceMesh) -> Result<PathBuf> {
        let path = self.mesh_path(patient_id, class);
        write_stl(&path, &mesh.vertices, &mesh.faces, self.format).map_err(|e| match e.downcast::<std::io::Error>() {
            Ok(io) => PipelineError::io(&path, io),
            Err(other) => PipelineError::Io {
                path: path.clone(),
                source: std::io::Error::other(format!("{other:#}")),
            },
        })?;
        tracing::debug!(path = %path.display(), triangles = mesh.triangle_count(), "wrote mesh");
        Ok(path)
    }

    /// Remove a mesh left over from an earlier run of the same patient.
    ///
    /// Returns whether a file was removed.
    pub fn remove_stale(&self, patient_id: &str, class: usize) -> Result<bool> {
        let path = self.mesh_path(patient_id, class);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PipelineError::io(&path, e)),
        }
    }
}
