//! Memory-bounded inference over whole volumes.
//!
//! The volume is covered by overlapping windows of a fixed size. Each window
//! is run through the predictor and the outputs are blended back with an
//! importance map, then divided by the accumulated weights.

use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use segmesh_core::image::VolumeStack;
use segmesh_model::io::{batch_to_windows, windows_to_batch};
use segmesh_model::{load_segresnet, SegResNet, SegResNetConfig};

use crate::config::{Activation, BlendMode, SlidingWindowConfig};
use crate::error::{PipelineError, Result};

/// A network shared read-only between requests.
pub type SharedModel<B> = Arc<SegResNet<B>>;

/// Maps a batch of windows `[N, C, D, H, W]` to per-class outputs `[N, K, D, H, W]`.
pub trait Predictor<B: Backend> {
    fn predict(&self, batch: Tensor<B, 5>) -> Tensor<B, 5>;
}

impl<B: Backend> Predictor<B> for SegResNet<B> {
    fn predict(&self, batch: Tensor<B, 5>) -> Tensor<B, 5> {
        self.forward(batch)
    }
}

impl<B: Backend, P: Predictor<B> + ?Sized> Predictor<B> for Arc<P> {
    fn predict(&self, batch: Tensor<B, 5>) -> Tensor<B, 5> {
        (**self).predict(batch)
    }
}

/// Closure adapter.
pub struct FnPredictor<F>(pub F);

impl<B, F> Predictor<B> for FnPredictor<F>
where
    B: Backend,
    F: Fn(Tensor<B, 5>) -> Tensor<B, 5>,
{
    fn predict(&self, batch: Tensor<B, 5>) -> Tensor<B, 5> {
        (self.0)(batch)
    }
}

/// Runs an inner predictor on backend `M`, converting each batch to `M`'s
/// float element on the way in and back to `B`'s on the way out.
///
/// Used for mixed precision: preprocessing, blending and meshing stay at the
/// outer precision while only the forward pass runs at the inner one.
#[derive(Debug, Clone)]
pub struct CastPredictor<M: Backend, P> {
    inner: P,
    device: M::Device,
}

impl<M: Backend, P> CastPredictor<M, P> {
    pub fn new(inner: P, device: M::Device) -> Self {
        Self { inner, device }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<B, M, P> Predictor<B> for CastPredictor<M, P>
where
    B: Backend,
    M: Backend,
    P: Predictor<M>,
{
    fn predict(&self, batch: Tensor<B, 5>) -> Tensor<B, 5> {
        let device = batch.device();
        let input = Tensor::<M, 5>::from_data(batch.into_data().convert::<M::FloatElem>(), &self.device);
        let output = self.inner.predict(input);
        Tensor::from_data(output.into_data().convert::<B::FloatElem>(), &device)
    }
}

/// Load the network once for sharing between requests.
pub fn load_shared_model<B: Backend>(
    config: &SegResNetConfig,
    weights: impl AsRef<Path>,
    device: &B::Device,
) -> Result<SharedModel<B>> {
    Ok(Arc::new(load_segresnet(config, weights, device)?))
}

/// Start offsets along one axis: stride `max(1, floor(w * (1 - overlap)))`,
/// the last window flush with the far edge.
pub fn window_starts(size: usize, window: usize, overlap: f64) -> Vec<usize> {
    if size <= window {
        return vec![0];
    }
    let stride = ((window as f64 * (1.0 - overlap)).floor() as usize).max(1);
    let last = size - window;
    let count = last.div_ceil(stride) + 1;
    let mut starts: Vec<usize> = (0..count).map(|i| (i * stride).min(last)).collect();
    starts.dedup();
    starts
}

fn gaussian_profile(len: usize, sigma: f64) -> Vec<f64> {
    let center = (len as f64 - 1.0) / 2.0;
    (0..len)
        .map(|i| {
            let d = i as f64 - center;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SlidingWindowInferer {
    /// `(x, y, z)`
    roi_size: [usize; 3],
    sw_batch_size: usize,
    overlap: f64,
    mode: BlendMode,
    sigma_scale: f64,
    timeout: Option<Duration>,
}

impl SlidingWindowInferer {
    pub fn new(config: &SlidingWindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            roi_size: config.roi_size,
            sw_batch_size: config.sw_batch_size,
            overlap: config.overlap,
            mode: config.mode,
            sigma_scale: config.sigma_scale,
            timeout: None,
        })
    }

    /// Abort with [`PipelineError::InferenceTimeout`] once `timeout` has passed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Window extent `[z, y, x]` for a volume of tensor shape `[z, y, x]`.
    pub fn window_shape(&self, spatial: [usize; 3]) -> [usize; 3] {
        let [rx, ry, rz] = self.roi_size;
        [rz.min(spatial[0]), ry.min(spatial[1]), rx.min(spatial[2])]
    }

    /// Every window as tensor ranges `[z, y, x]`, z-major.
    pub fn regions(&self, spatial: [usize; 3]) -> Vec<[Range<usize>; 3]> {
        let window = self.window_shape(spatial);
        let zs = window_starts(spatial[0], window[0], self.overlap);
        let ys = window_starts(spatial[1], window[1], self.overlap);
        let xs = window_starts(spatial[2], window[2], self.overlap);

        let mut regions = Vec::with_capacity(zs.len() * ys.len() * xs.len());
        for &z in &zs {
            for &y in &ys {
                for &x in &xs {
                    regions.push([z..z + window[0], y..y + window[1], x..x + window[2]]);
                }
            }
        }
        regions
    }

    /// Blending weights `[1, z, y, x]`, peak 1 at the window centre.
    pub fn importance_map<B: Backend>(&self, window: [usize; 3], device: &B::Device) -> Tensor<B, 4> {
        let [wz, wy, wx] = window;
        match self.mode {
            BlendMode::Constant => Tensor::ones([1, wz, wy, wx], device),
            BlendMode::Gaussian => {
                let profile = |w: usize| gaussian_profile(w, (self.sigma_scale * w as f64).max(f64::EPSILON));
                let (gz, gy, gx) = (profile(wz), profile(wy), profile(wx));
                let peak = gz.iter().cloned().fold(0.0, f64::max)
                    * gy.iter().cloned().fold(0.0, f64::max)
                    * gx.iter().cloned().fold(0.0, f64::max);

                let mut values = Vec::with_capacity(wz * wy * wx);
                for z in &gz {
                    for y in &gy {
                        for x in &gx {
                            let v = (z * y * x / peak) as f32;
                            values.push(v.max(f32::MIN_POSITIVE));
                        }
                    }
                }
                Tensor::from_data(TensorData::new(values, Shape::new([1, wz, wy, wx])), device)
            }
        }
    }

    /// Run `predictor` over `input` `[C, Z, Y, X]`, returning `[K, Z, Y, X]`.
    pub fn infer<B, P>(&self, input: Tensor<B, 4>, predictor: &P) -> Result<Tensor<B, 4>>
    where
        B: Backend,
        P: Predictor<B> + ?Sized,
    {
        let [channels, nz, ny, nx] = input.dims();
        let spatial = [nz, ny, nx];
        let window = self.window_shape(spatial);
        let regions = self.regions(spatial);
        let device = input.device();
        let importance = self.importance_map::<B>(window, &device);

        tracing::debug!(?spatial, ?window, windows = regions.len(), "sliding window plan");

        let started = Instant::now();
        let mut output: Option<Tensor<B, 4>> = None;
        let mut weights = Tensor::<B, 4>::zeros([1, nz, ny, nx], &device);

        for (batch_index, chunk) in regions.chunks(self.sw_batch_size).enumerate() {
            if let Some(limit) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(PipelineError::InferenceTimeout { elapsed, limit });
                }
            }

            let windows = chunk
                .iter()
                .map(|[z, y, x]| input.clone().slice([0..channels, z.clone(), y.clone(), x.clone()]))
                .collect();
            let batch = windows_to_batch(windows).map_err(|e| PipelineError::DimensionMismatch(e.to_string()))?;

            let predicted = predictor.predict(batch);
            let [n, classes, pz, py, px] = predicted.dims();
            if n != chunk.len() || [pz, py, px] != window {
                return Err(PipelineError::DimensionMismatch(format!(
                    "predictor returned {:?} for {} windows of {:?}",
                    predicted.dims(),
                    chunk.len(),
                    window
                )));
            }

            let acc = output.get_or_insert_with(|| Tensor::zeros([classes, nz, ny, nx], &device));
            if acc.dims()[0] != classes {
                return Err(PipelineError::DimensionMismatch(format!(
                    "predictor changed class count from {} to {}",
                    acc.dims()[0],
                    classes
                )));
            }

            for (prediction, [z, y, x]) in batch_to_windows(predicted).into_iter().zip(chunk) {
                let ranges = [0..classes, z.clone(), y.clone(), x.clone()];
                let current = acc.clone().slice(ranges.clone());
                *acc = acc
                    .clone()
                    .slice_assign(ranges, current + prediction * importance.clone());

                let ranges = [0..1, z.clone(), y.clone(), x.clone()];
                let current = weights.clone().slice(ranges.clone());
                weights = weights.slice_assign(ranges, current + importance.clone());
            }

            tracing::debug!(batch = batch_index, windows = chunk.len(), "window batch done");
        }

        let output = output.ok_or_else(|| PipelineError::DimensionMismatch("volume has no windows".into()))?;
        Ok(output / weights)
    }
}

/// Shared network plus the windowing used to apply it.
pub struct InferenceEngine<B: Backend, P> {
    predictor: P,
    inferer: SlidingWindowInferer,
    activation: Activation,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend, P: Predictor<B>> InferenceEngine<B, P> {
    pub fn new(predictor: P, inferer: SlidingWindowInferer, activation: Activation, device: B::Device) -> Self {
        Self {
            predictor,
            inferer,
            activation,
            device,
            _backend: PhantomData,
        }
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Per-class prediction volume with the input's geometry.
    pub fn predict(&self, stack: &VolumeStack<B>) -> Result<VolumeStack<B>> {
        let started = Instant::now();
        let input = stack.data().clone().to_device(&self.device);
        let logits = self.inferer.infer(input, &self.predictor)?;
        let output = match self.activation {
            Activation::None => logits,
            Activation::Sigmoid => sigmoid(logits),
        };

        tracing::info!(
            classes = output.dims()[0],
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inference finished"
        );
        Ok(VolumeStack::new(output, *stack.metadata()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn inferer(roi: [usize; 3], overlap: f64, mode: BlendMode) -> SlidingWindowInferer {
        SlidingWindowInferer::new(
            &SlidingWindowConfig::new()
                .with_roi_size(roi)
                .with_overlap(overlap)
                .with_mode(mode),
        )
        .unwrap()
    }

    #[test]
    fn test_cast_predictor_round_trips_element_type() {
        let device = Default::default();
        let inner = FnPredictor(|batch: Tensor<NdArray<f64>, 5>| batch.mul_scalar(2.0));
        let cast = CastPredictor::<NdArray<f64>, _>::new(inner, Default::default());

        let input = vec![0.1f32, 1.5, -3.0, 7.0e4];
        let batch = Tensor::<TestBackend, 5>::from_data(TensorData::new(input.clone(), [1, 1, 1, 2, 2]), &device);
        let out = Predictor::<TestBackend>::predict(&cast, batch);

        assert_eq!(out.dims(), [1, 1, 1, 2, 2]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        let expected: Vec<f32> = input.iter().map(|v| v * 2.0).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_window_starts() {
        assert_eq!(window_starts(10, 16, 0.5), vec![0]);
        assert_eq!(window_starts(16, 16, 0.5), vec![0]);
        assert_eq!(window_starts(20, 8, 0.5), vec![0, 4, 8, 12]);
        assert_eq!(window_starts(21, 8, 0.5), vec![0, 4, 8, 12, 13]);
        assert_eq!(window_starts(5, 2, 0.9), vec![0, 1, 2, 3]);
        assert_eq!(window_starts(10, 4, 0.0), vec![0, 4, 6]);
    }

    #[test]
    fn test_window_clamped_to_volume() {
        let inferer = inferer([240, 240, 160], 0.5, BlendMode::Gaussian);
        // Tensor order is [z, y, x]; window order is (x, y, z).
        assert_eq!(inferer.window_shape([64, 300, 100]), [64, 240, 100]);
        assert_eq!(inferer.regions([64, 64, 64]).len(), 1);
        assert_eq!(inferer.regions([64, 300, 100]).len(), 2);
    }

    #[test]
    fn test_gaussian_map_peaks_at_centre() {
        let device = Default::default();
        let map = inferer([5, 5, 5], 0.5, BlendMode::Gaussian).importance_map::<TestBackend>([5, 5, 5], &device);
        let values = map.into_data().to_vec::<f32>().unwrap();
        let centre = values[62];
        assert!((centre - 1.0).abs() < 1e-6);
        assert!(values.iter().all(|v| *v > 0.0 && *v <= centre));
        assert!(values[0] < values[31]);
    }

    #[test]
    fn test_pointwise_predictor_is_reproduced() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [2, 9, 10, 11],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let predictor = FnPredictor(|x: Tensor<TestBackend, 5>| x.mul_scalar(3.0).add_scalar(1.0));
        let expected = input.clone().mul_scalar(3.0).add_scalar(1.0).into_data().to_vec::<f32>().unwrap();

        for mode in [BlendMode::Gaussian, BlendMode::Constant] {
            let out = inferer([4, 4, 4], 0.5, mode).infer(input.clone(), &predictor).unwrap();
            let values = out.into_data().to_vec::<f32>().unwrap();
            for (a, b) in values.iter().zip(&expected) {
                assert!((a - b).abs() < 1e-4, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_batches_cover_every_window() {
        let device = Default::default();
        let calls = std::cell::Cell::new(0);
        let predictor = FnPredictor(|x: Tensor<TestBackend, 5>| {
            calls.set(calls.get() + x.dims()[0]);
            x
        });
        let inferer = SlidingWindowInferer::new(
            &SlidingWindowConfig::new()
                .with_roi_size([4, 4, 4])
                .with_sw_batch_size(3),
        )
        .unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 8, 8, 8], &device);
        inferer.infer(input, &predictor).unwrap();
        assert_eq!(calls.get(), inferer.regions([8, 8, 8]).len());
    }

    #[test]
    fn test_timeout_aborts() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([1, 4, 4, 4], &device);
        let predictor = FnPredictor(|x: Tensor<TestBackend, 5>| x);
        let err = inferer([2, 2, 2], 0.5, BlendMode::Gaussian)
            .with_timeout(Some(Duration::ZERO))
            .infer(input, &predictor)
            .unwrap_err();
        assert_eq!(err.code(), "inference timeout");
    }

    #[test]
    fn test_wrong_output_shape_is_reported() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([1, 4, 4, 4], &device);
        let predictor = FnPredictor(|x: Tensor<TestBackend, 5>| x.slice([0..1, 0..1, 0..2, 0..2, 0..2]));
        let err = inferer([4, 4, 4], 0.5, BlendMode::Constant).infer(input, &predictor).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch(_)));
    }

    #[test]
    fn test_engine_applies_sigmoid() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let stack = VolumeStack::new(Tensor::<TestBackend, 4>::zeros([4, 2, 2, 2], &device), Default::default());
        let predictor = FnPredictor(|x: Tensor<TestBackend, 5>| x.slice([0..1, 0..3, 0..2, 0..2, 0..2]));
        let engine = InferenceEngine::new(
            predictor,
            inferer([8, 8, 8], 0.5, BlendMode::Gaussian),
            Activation::Sigmoid,
            device,
        );
        let out = engine.predict(&stack).unwrap();
        assert_eq!(out.data().dims(), [3, 2, 2, 2]);
        let values = out.into_data().into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }
}
