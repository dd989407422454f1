#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use segmesh_core::image::Image;
use segmesh_core::spatial::{Direction, Point, Spacing, Vector};
use segmesh_io::write_nifti;
use segmesh_pipeline::{Modality, PipelineConfig, Predictor};

pub type TestBackend = NdArray<f32>;

/// `n`^3 volume, zero except for a cube of side `side` at `start` holding `fill + x`.
pub fn cube_volume(n: usize, start: usize, side: usize, fill: f32) -> Image<TestBackend, 3> {
    let device = Default::default();
    let mut values = vec![0.0f32; n * n * n];
    for z in start..start + side {
        for y in start..start + side {
            for x in start..start + side {
                values[(z * n + y) * n + x] = fill + x as f32;
            }
        }
    }
    Image::new(
        Tensor::from_data(TensorData::new(values, [n, n, n]), &device),
        Point::origin(),
        Spacing::uniform(1.0),
        Direction::identity(),
    )
}

pub fn volume_path(media_root: &Path, patient_id: &str, modality: Modality) -> PathBuf {
    media_root
        .join("nifti_images")
        .join(format!("{patient_id}_{}.nii.gz", modality.tag()))
}

/// Write one cube volume per modality under `<media_root>/nifti_images`.
pub fn write_patient(media_root: &Path, patient_id: &str, n: usize, modalities: &[Modality]) {
    std::fs::create_dir_all(media_root.join("nifti_images")).unwrap();
    for &modality in modalities {
        let image = cube_volume(n, n / 4, 10.min(n / 2), 10.0 * (modality.channel() + 1) as f32);
        write_nifti(volume_path(media_root, patient_id, modality), &image).unwrap();
    }
}

/// Direction whose first two index axes both run along world x.
pub fn collinear_direction() -> Direction<3> {
    Direction::from_columns([
        Vector::new([1.0, 0.0, 0.0]),
        Vector::new([1.0, 0.0, 0.0]),
        Vector::new([0.0, 0.0, 1.0]),
    ])
}

/// Write every modality with a degenerate sform.
pub fn write_collinear_patient(media_root: &Path, patient_id: &str, n: usize) {
    std::fs::create_dir_all(media_root.join("nifti_images")).unwrap();
    for modality in Modality::ALL {
        let cube = cube_volume(n, n / 4, n / 2, 1.0);
        let image = Image::from_metadata(
            cube.into_data(),
            segmesh_core::image::ImageMetadata::new(Point::origin(), Spacing::uniform(2.0), collinear_direction()),
        );
        write_nifti(volume_path(media_root, patient_id, modality), &image).unwrap();
    }
}

/// Configuration rooted at `media_root` with a window covering small test volumes.
pub fn test_config(media_root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::new().with_media_root(media_root.to_path_buf());
    config.window.roi_size = [64, 64, 64];
    config
}

/// Counts calls and returns zeros for `classes` channels.
#[derive(Default)]
pub struct SpyPredictor {
    pub calls: AtomicUsize,
    pub classes: usize,
}

impl SpyPredictor {
    pub fn new(classes: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            classes,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Predictor<TestBackend> for SpyPredictor {
    fn predict(&self, batch: Tensor<TestBackend, 5>) -> Tensor<TestBackend, 5> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let [n, _, d, h, w] = batch.dims();
        Tensor::zeros([n, self.classes, d, h, w], &batch.device())
    }
}
