use std::path::{Path, PathBuf};
use std::time::Duration;

use segmesh_core::filter::SingularGeometry;
use segmesh_core::image::StackError;
use segmesh_model::ModelLoadError;
use thiserror::Error;

use crate::modality::Modality;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no images found for patient {patient_id}: {reason}")]
    NoImagesFound { patient_id: String, reason: String },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(transparent)]
    ModelLoadFailure(#[from] ModelLoadError),

    #[error("class {class} has no iso-surface at level {level}")]
    EmptyIsoSurface { class: usize, level: f32 },

    #[error("surface needs more than {limit} vertices")]
    MeshTooLarge { limit: usize },

    #[error("modality {modality} given twice: {} and {}", .first.display(), .second.display())]
    DuplicateModality {
        modality: Modality,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("unknown modality tag {0:?}")]
    UnknownModality(String),

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("inference exceeded {limit:?} after {elapsed:?}")]
    InferenceTimeout { elapsed: Duration, limit: Duration },

    #[error("failed to read {}: {cause:#}", .path.display())]
    Read { path: PathBuf, cause: anyhow::Error },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn no_images(patient_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoImagesFound {
            patient_id: patient_id.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn read(path: impl AsRef<Path>, cause: anyhow::Error) -> Self {
        Self::Read {
            path: path.as_ref().to_path_buf(),
            cause,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Short machine-readable code reported at the trigger boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoImagesFound { .. } => "no images found",
            Self::DimensionMismatch(_) => "dimension mismatch",
            Self::ModelLoadFailure(_) => "model load failure",
            Self::EmptyIsoSurface { .. } => "empty iso-surface",
            Self::MeshTooLarge { .. } => "mesh too large",
            Self::DuplicateModality { .. } => "duplicate modality",
            Self::UnknownModality(_) => "unknown modality",
            Self::MissingField(_) => "missing field",
            Self::InvalidConfiguration(_) => "invalid configuration",
            Self::InferenceTimeout { .. } => "inference timeout",
            Self::Read { .. } => "read failure",
            Self::Io { .. } => "io failure",
        }
    }

    /// HTTP-style status for the failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::NoImagesFound { .. } => 404,
            Self::MissingField(_) | Self::UnknownModality(_) => 400,
            Self::DimensionMismatch(_)
            | Self::DuplicateModality { .. }
            | Self::Read { .. }
            | Self::MeshTooLarge { .. } => 422,
            Self::InferenceTimeout { .. } => 504,
            Self::ModelLoadFailure(_)
            | Self::EmptyIsoSurface { .. }
            | Self::InvalidConfiguration(_)
            | Self::Io { .. } => 500,
        }
    }
}

impl From<StackError> for PipelineError {
    fn from(err: StackError) -> Self {
        Self::DimensionMismatch(err.to_string())
    }
}

impl From<SingularGeometry> for PipelineError {
    fn from(err: SingularGeometry) -> Self {
        Self::DimensionMismatch(err.to_string())
    }
}
