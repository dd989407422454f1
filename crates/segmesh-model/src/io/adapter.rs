use anyhow::{ensure, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Stack `[C, Z, Y, X]` windows into one `[N, C, Z, Y, X]` batch.
pub fn windows_to_batch<B: Backend>(windows: Vec<Tensor<B, 4>>) -> Result<Tensor<B, 5>> {
    ensure!(!windows.is_empty(), "Cannot batch empty list of windows");

    let reference = windows[0].dims();
    for (i, window) in windows.iter().enumerate().skip(1) {
        ensure!(
            window.dims() == reference,
            "Window {} shape mismatch: {:?} vs {:?}",
            i,
            window.dims(),
            reference
        );
    }

    Ok(Tensor::stack(windows, 0))
}

/// Split `[N, C, Z, Y, X]` into `N` windows.
pub fn batch_to_windows<B: Backend>(batch: Tensor<B, 5>) -> Vec<Tensor<B, 4>> {
    let [n, c, z, y, x] = batch.dims();
    (0..n)
        .map(|i| batch.clone().narrow(0, i, 1).reshape([c, z, y, x]))
        .collect()
}
