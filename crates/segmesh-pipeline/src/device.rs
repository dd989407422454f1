//! Compute device selection.

use crate::config::Precision;

pub type CpuBackend = burn_ndarray::NdArray<f32>;

#[cfg(feature = "wgpu")]
pub type GpuBackend = burn::backend::Wgpu<f32, i32>;

/// Backend of the network's forward pass under mixed precision.
#[cfg(feature = "wgpu")]
pub type HalfGpuBackend = burn::backend::Wgpu<half::f16, i32>;

/// Where and at which precision the network runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeTarget {
    Cpu,
    #[cfg(feature = "wgpu")]
    Gpu,
    #[cfg(feature = "wgpu")]
    GpuHalf,
}

impl ComputeTarget {
    pub fn precision(self) -> Precision {
        match self {
            ComputeTarget::Cpu => Precision::Full,
            #[cfg(feature = "wgpu")]
            ComputeTarget::Gpu => Precision::Full,
            #[cfg(feature = "wgpu")]
            ComputeTarget::GpuHalf => Precision::Mixed,
        }
    }
}

/// Whether a graphics adapter can be opened.
#[cfg(feature = "wgpu")]
pub fn accelerator_available() -> bool {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()));
    match adapter {
        Some(adapter) => {
            tracing::debug!(adapter = ?adapter.get_info().name, "found graphics adapter");
            true
        }
        None => {
            tracing::debug!("no graphics adapter, running on cpu");
            false
        }
    }
}

#[cfg(not(feature = "wgpu"))]
pub fn accelerator_available() -> bool {
    tracing::debug!("built without accelerator support, running on cpu");
    false
}

#[cfg(feature = "wgpu")]
fn accelerated_target(precision: Precision) -> Option<ComputeTarget> {
    accelerator_available().then_some(match precision {
        Precision::Full => ComputeTarget::Gpu,
        Precision::Mixed => ComputeTarget::GpuHalf,
    })
}

#[cfg(not(feature = "wgpu"))]
fn accelerated_target(_precision: Precision) -> Option<ComputeTarget> {
    accelerator_available();
    None
}

/// Best target for the requested precision.
///
/// Without an accelerator the request silently falls back to the CPU; a mixed
/// precision request then runs at full precision with a warning.
pub fn select_target(precision: Precision) -> ComputeTarget {
    if let Some(target) = accelerated_target(precision) {
        return target;
    }
    if precision == Precision::Mixed {
        tracing::warn!("mixed precision needs an accelerator, using full precision on cpu");
    }
    ComputeTarget::Cpu
}
