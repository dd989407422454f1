//! Run configuration.
//!
//! Every struct derives burn's `Config`, so defaults come from the attributes
//! and the whole tree can be saved to and loaded from JSON.

use std::path::PathBuf;

use burn::config::Config;
use segmesh_core::interpolation::InterpolationMode;
use segmesh_io::StlFormat;
use segmesh_model::SegResNetConfig;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// How overlapping window predictions are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Gaussian,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Full,
    /// Half precision forward pass on the accelerator; everything else stays f32
    Mixed,
}

/// Applied to the reassembled logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    None,
    Sigmoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    /// Scan `<media_root>/nifti_images` for `<id>_<modality>.nii[.gz]`
    #[default]
    Directory,
    /// Look the id up in the upload record index
    Records,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    #[default]
    Binary,
    Ascii,
}

impl From<MeshFormat> for StlFormat {
    fn from(format: MeshFormat) -> Self {
        match format {
            MeshFormat::Binary => StlFormat::Binary,
            MeshFormat::Ascii => StlFormat::Ascii,
        }
    }
}

#[derive(Config, Debug, PartialEq)]
pub struct SlidingWindowConfig {
    /// Window size in voxels, `(x, y, z)`
    #[config(default = "[240, 240, 160]")]
    pub roi_size: [usize; 3],
    /// Windows per forward pass
    #[config(default = "1")]
    pub sw_batch_size: usize,
    /// Fraction of a window shared with its neighbour
    #[config(default = "0.5")]
    pub overlap: f64,
    #[config(default = "BlendMode::Gaussian")]
    pub mode: BlendMode,
    /// Gaussian sigma as a fraction of the window size
    #[config(default = "0.125")]
    pub sigma_scale: f64,
}

#[derive(Config, Debug, PartialEq)]
pub struct MeshConfig {
    #[config(default = "0.5")]
    pub level: f32,
    #[config(default = "MeshFormat::Binary")]
    pub format: MeshFormat,
    /// Write vertices in scanner coordinates instead of voxel indices
    #[config(default = "false")]
    pub world_coordinates: bool,
}

#[derive(Config, Debug, PartialEq)]
pub struct PipelineConfig {
    #[config(default = "PathBuf::from(\"media\")")]
    pub media_root: PathBuf,
    #[config(default = "PathBuf::from(\"model.mpk\")")]
    pub weights_path: PathBuf,
    #[config(default = "LocatorKind::Directory")]
    pub locator: LocatorKind,
    /// Isotropic output spacing of the resampling step
    #[config(default = "1.0")]
    pub target_spacing: f64,
    #[config(default = "InterpolationMode::Linear")]
    pub interpolation: InterpolationMode,
    #[config(default = "SegResNetConfig::new()")]
    pub model: SegResNetConfig,
    #[config(default = "SlidingWindowConfig::new()")]
    pub window: SlidingWindowConfig,
    #[config(default = "MeshConfig::new()")]
    pub mesh: MeshConfig,
    #[config(default = "Precision::Full")]
    pub precision: Precision,
    #[config(default = "Activation::None")]
    pub activation: Activation,
    /// Abort inference once this many seconds have passed
    pub timeout_secs: Option<u64>,
}

impl PipelineConfig {
    pub fn images_dir(&self) -> PathBuf {
        self.media_root.join("nifti_images")
    }

    pub fn output_root(&self) -> PathBuf {
        self.media_root.join("inference_output")
    }

    pub fn record_index(&self) -> PathBuf {
        self.media_root.join("records.json")
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.target_spacing.is_finite() && self.target_spacing > 0.0) {
            return Err(PipelineError::invalid_config(format!(
                "target spacing must be positive, got {}",
                self.target_spacing
            )));
        }
        if self.model.in_channels != crate::modality::Modality::ALL.len() {
            return Err(PipelineError::invalid_config(format!(
                "model expects {} input channels, one per modality is required",
                self.model.in_channels
            )));
        }
        self.model
            .validate()
            .map_err(|e| PipelineError::invalid_config(format!("model: {e}")))?;
        self.window.validate()?;
        if !self.mesh.level.is_finite() {
            return Err(PipelineError::invalid_config("iso level must be finite"));
        }
        Ok(())
    }
}

impl SlidingWindowConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.roi_size.iter().any(|s| *s == 0) {
            return Err(PipelineError::invalid_config(format!(
                "window size must be non-zero, got {:?}",
                self.roi_size
            )));
        }
        if self.sw_batch_size == 0 {
            return Err(PipelineError::invalid_config("window batch size must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(PipelineError::invalid_config(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        if self.sigma_scale.is_nan() || self.sigma_scale <= 0.0 {
            return Err(PipelineError::invalid_config("sigma scale must be positive"));
        }
        Ok(())
    }
}
