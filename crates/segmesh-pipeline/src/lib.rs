//! Multi-modal MRI segmentation into per-class surface meshes.
//!
//! A run resolves a patient's four modality volumes, preprocesses them into a
//! network input, predicts per-class volumes with a sliding window, and writes
//! one STL surface per class.

pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod inference;
pub mod locator;
pub mod mesh;
pub mod modality;
pub mod pipeline;
pub mod preprocess;
pub mod runtime;
pub mod store;

pub use config::{MeshConfig, PipelineConfig, SlidingWindowConfig};
pub use error::{PipelineError, Result};
pub use export::MeshWriter;
pub use inference::{CastPredictor, FnPredictor, InferenceEngine, Predictor, SharedModel, SlidingWindowInferer};
pub use locator::{DirectoryLocator, ImageLocator, RecordLocator};
pub use mesh::{MeshExtractor, SurfaceMesh};
pub use modality::{Modality, ModalitySet};
pub use pipeline::{
    load_mixed_pipeline, load_pipeline, locator_from_config, ExportedMesh, Pipeline, PipelineReport, TriggerResponse,
};
pub use preprocess::{Preprocessed, Preprocessor};
pub use runtime::Runtime;
pub use store::{RecordStore, UploadRecord};
