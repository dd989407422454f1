//! End-to-end run for one patient: locate, preprocess, infer, mesh, export.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::config::{LocatorKind, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::export::MeshWriter;
use crate::inference::{load_shared_model, CastPredictor, InferenceEngine, Predictor, SharedModel, SlidingWindowInferer};
use crate::locator::{DirectoryLocator, ImageLocator, RecordLocator};
use crate::mesh::MeshExtractor;
use crate::preprocess::Preprocessor;
use crate::store::RecordStore;

/// One class mesh written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedMesh {
    pub class: usize,
    pub path: PathBuf,
    pub vertices: usize,
    pub triangles: usize,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub patient_id: String,
    pub save_directory: PathBuf,
    pub meshes: Vec<ExportedMesh>,
    /// Classes whose prediction never crossed the iso level
    pub skipped: Vec<usize>,
}

/// JSON body returned to whoever triggered the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerResponse {
    Success {
        success: bool,
        save_directory: PathBuf,
        meshes: Vec<PathBuf>,
        skipped: Vec<usize>,
    },
    Failure {
        error: String,
        message: String,
        status: u16,
    },
}

impl TriggerResponse {
    pub fn from_result(result: &Result<PipelineReport>) -> Self {
        match result {
            Ok(report) => Self::Success {
                success: true,
                save_directory: report.save_directory.clone(),
                meshes: report.meshes.iter().map(|m| m.path.clone()).collect(),
                skipped: report.skipped.clone(),
            },
            Err(err) => Self::Failure {
                error: err.code().to_string(),
                message: err.to_string(),
                status: err.status(),
            },
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Success { .. } => 200,
            Self::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Locator configured by `config.locator`.
pub fn locator_from_config(config: &PipelineConfig) -> Box<dyn ImageLocator> {
    match config.locator {
        LocatorKind::Directory => Box::new(DirectoryLocator::new(config.images_dir())),
        LocatorKind::Records => Box::new(RecordLocator::new(RecordStore::new(&config.media_root))),
    }
}

pub struct Pipeline<B: Backend, P> {
    config: PipelineConfig,
    locator: Box<dyn ImageLocator>,
    preprocessor: Preprocessor<B>,
    engine: InferenceEngine<B, P>,
    extractor: MeshExtractor,
    writer: MeshWriter,
}

impl<B: Backend, P: Predictor<B>> Pipeline<B, P> {
    pub fn new(config: PipelineConfig, locator: Box<dyn ImageLocator>, predictor: P, device: B::Device) -> Result<Self> {
        config.validate()?;

        let inferer = SlidingWindowInferer::new(&config.window)?.with_timeout(config.timeout_secs.map(Duration::from_secs));
        let preprocessor = Preprocessor::new(device.clone(), config.target_spacing, config.interpolation);
        let engine = InferenceEngine::new(predictor, inferer, config.activation, device);
        let extractor = MeshExtractor::new(config.mesh.level);
        let writer = MeshWriter::new(config.output_root(), config.mesh.format.into());

        Ok(Self {
            config,
            locator,
            preprocessor,
            engine,
            extractor,
            writer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &InferenceEngine<B, P> {
        &self.engine
    }

    pub fn writer(&self) -> &MeshWriter {
        &self.writer
    }

    pub fn run(&self, patient_id: &str) -> Result<PipelineReport> {
        let started = Instant::now();
        tracing::info!(patient_id, "pipeline started");

        let modalities = self.locator.resolve(patient_id)?;
        let input = self.preprocessor.run(&modalities)?;
        let prediction = self.engine.predict(&input.stack)?;

        let save_directory = self.writer.prepare(patient_id)?;
        let mut meshes = Vec::new();
        let mut skipped = Vec::new();

        for (class, mesh) in self.extractor.extract(&prediction) {
            match mesh {
                Ok(mesh) => {
                    let mesh = if self.config.mesh.world_coordinates {
                        mesh.to_world(prediction.metadata())
                    } else {
                        mesh
                    };
                    let path = self.writer.write(patient_id, class, &mesh)?;
                    meshes.push(ExportedMesh {
                        class,
                        path,
                        vertices: mesh.vertex_count(),
                        triangles: mesh.triangle_count(),
                    });
                }
                Err(PipelineError::EmptyIsoSurface { class, level }) => {
                    tracing::warn!(patient_id, class, level, "no iso-surface, skipping class");
                    if self.writer.remove_stale(patient_id, class)? {
                        tracing::debug!(patient_id, class, "removed mesh from an earlier run");
                    }
                    skipped.push(class);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            patient_id,
            meshes = meshes.len(),
            skipped = skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(PipelineReport {
            patient_id: patient_id.to_string(),
            save_directory,
            meshes,
            skipped,
        })
    }

    /// [`run`](Self::run) folded into the response body.
    pub fn trigger(&self, patient_id: &str) -> TriggerResponse {
        let result = self.run(patient_id);
        if let Err(e) = &result {
            tracing::error!(patient_id, code = e.code(), error = %e, "pipeline failed");
        }
        TriggerResponse::from_result(&result)
    }
}

/// Build a pipeline around weights loaded eagerly from `config.weights_path`.
pub fn load_pipeline<B: Backend>(config: PipelineConfig, device: B::Device) -> Result<Pipeline<B, SharedModel<B>>> {
    config.validate()?;
    let model = load_shared_model::<B>(&config.model, &config.weights_path, &device)?;
    tracing::info!(weights = %config.weights_path.display(), "model loaded");
    let locator = locator_from_config(&config);
    Pipeline::new(config, locator, model, device)
}

/// Like [`load_pipeline`], but with the network held on backend `M`.
///
/// Volumes are preprocessed, blended and meshed on `B`; each window batch is
/// converted to `M` only for the forward pass.
pub fn load_mixed_pipeline<B: Backend, M: Backend>(
    config: PipelineConfig,
    device: B::Device,
    model_device: M::Device,
) -> Result<Pipeline<B, CastPredictor<M, SharedModel<M>>>> {
    config.validate()?;
    let model = load_shared_model::<M>(&config.model, &config.weights_path, &model_device)?;
    tracing::info!(weights = %config.weights_path.display(), "model loaded for mixed precision");
    let locator = locator_from_config(&config);
    Pipeline::new(config, locator, CastPredictor::new(model, model_device), device)
}
