//! Backend dispatch for a loaded pipeline.

use burn::tensor::backend::Backend;

use crate::config::PipelineConfig;
use crate::device::{select_target, ComputeTarget, CpuBackend};
#[cfg(feature = "wgpu")]
use crate::device::{GpuBackend, HalfGpuBackend};
use crate::error::Result;
#[cfg(feature = "wgpu")]
use crate::inference::CastPredictor;
use crate::inference::SharedModel;
#[cfg(feature = "wgpu")]
use crate::pipeline::load_mixed_pipeline;
use crate::pipeline::{load_pipeline, Pipeline, PipelineReport, TriggerResponse};

type Loaded<B> = Pipeline<B, SharedModel<B>>;

/// Full precision volumes around a half precision network.
#[cfg(feature = "wgpu")]
type MixedLoaded = Pipeline<GpuBackend, CastPredictor<HalfGpuBackend, SharedModel<HalfGpuBackend>>>;

/// A pipeline on whichever device [`select_target`] picked.
pub enum Runtime {
    Cpu(Loaded<CpuBackend>),
    #[cfg(feature = "wgpu")]
    Gpu(Loaded<GpuBackend>),
    #[cfg(feature = "wgpu")]
    GpuHalf(MixedLoaded),
}

impl Runtime {
    /// Pick a device and load the weights onto it.
    pub fn load(config: PipelineConfig) -> Result<Self> {
        let target = select_target(config.precision);
        tracing::info!(?target, "selected compute target");
        Ok(match target {
            ComputeTarget::Cpu => Self::Cpu(load_on::<CpuBackend>(config)?),
            #[cfg(feature = "wgpu")]
            ComputeTarget::Gpu => Self::Gpu(load_on::<GpuBackend>(config)?),
            #[cfg(feature = "wgpu")]
            ComputeTarget::GpuHalf => Self::GpuHalf(load_mixed_pipeline::<GpuBackend, HalfGpuBackend>(
                config,
                Default::default(),
                Default::default(),
            )?),
        })
    }

    pub fn target(&self) -> ComputeTarget {
        match self {
            Self::Cpu(_) => ComputeTarget::Cpu,
            #[cfg(feature = "wgpu")]
            Self::Gpu(_) => ComputeTarget::Gpu,
            #[cfg(feature = "wgpu")]
            Self::GpuHalf(_) => ComputeTarget::GpuHalf,
        }
    }

    pub fn run(&self, patient_id: &str) -> Result<PipelineReport> {
        match self {
            Self::Cpu(pipeline) => pipeline.run(patient_id),
            #[cfg(feature = "wgpu")]
            Self::Gpu(pipeline) => pipeline.run(patient_id),
            #[cfg(feature = "wgpu")]
            Self::GpuHalf(pipeline) => pipeline.run(patient_id),
        }
    }

    pub fn trigger(&self, patient_id: &str) -> TriggerResponse {
        match self {
            Self::Cpu(pipeline) => pipeline.trigger(patient_id),
            #[cfg(feature = "wgpu")]
            Self::Gpu(pipeline) => pipeline.trigger(patient_id),
            #[cfg(feature = "wgpu")]
            Self::GpuHalf(pipeline) => pipeline.trigger(patient_id),
        }
    }
}

fn load_on<B: Backend>(config: PipelineConfig) -> Result<Loaded<B>> {
    load_pipeline::<B>(config, B::Device::default())
}
