//! Volume loading and preprocessing into the network input.

use burn::tensor::backend::Backend;
use segmesh_core::filter::{NonZeroNormalizer, OrientationFilter, ResampleFilter};
use segmesh_core::image::VolumeStack;
use segmesh_core::interpolation::{InterpolationMode, LinearInterpolator, NearestNeighborInterpolator};
use segmesh_io::{read_nifti_with_header, VolumeHeader};

use crate::error::{PipelineError, Result};
use crate::modality::ModalitySet;

/// Network-ready volume and the headers of the files it came from.
#[derive(Debug, Clone)]
pub struct Preprocessed<B: Backend> {
    pub stack: VolumeStack<B>,
    /// Headers in channel order
    pub headers: Vec<VolumeHeader>,
}

/// Load, stack, reorient to RAS, resample to isotropic spacing, normalize.
#[derive(Debug, Clone)]
pub struct Preprocessor<B: Backend> {
    device: B::Device,
    target_spacing: f64,
    interpolation: InterpolationMode,
}

impl<B: Backend> Preprocessor<B> {
    pub fn new(device: B::Device, target_spacing: f64, interpolation: InterpolationMode) -> Self {
        Self {
            device,
            target_spacing,
            interpolation,
        }
    }

    pub fn run(&self, set: &ModalitySet) -> Result<Preprocessed<B>> {
        let mut images = Vec::with_capacity(4);
        let mut headers = Vec::with_capacity(4);
        for (modality, path) in set.iter() {
            let volume = read_nifti_with_header::<B, _>(path, &self.device).map_err(|e| PipelineError::read(path, e))?;
            tracing::debug!(%modality, size = ?volume.image.size(), spacing = ?volume.image.spacing().to_array(), "loaded modality");
            images.push(volume.image);
            headers.push(volume.header);
        }

        let stack = VolumeStack::from_channels(images)?;
        let stack = self.process(stack)?;

        tracing::info!(shape = ?stack.data().dims(), "preprocessing finished");
        Ok(Preprocessed { stack, headers })
    }

    /// The in-memory part of [`run`](Self::run).
    pub fn process(&self, stack: VolumeStack<B>) -> Result<VolumeStack<B>> {
        let stack = OrientationFilter::new().apply(stack);
        let stack = match self.interpolation {
            InterpolationMode::Linear => {
                ResampleFilter::isotropic(self.target_spacing, LinearInterpolator::new()).apply(&stack)?
            }
            InterpolationMode::Nearest => {
                ResampleFilter::isotropic(self.target_spacing, NearestNeighborInterpolator::new()).apply(&stack)?
            }
        };
        Ok(NonZeroNormalizer::new().apply(stack))
    }
}
