//! Persisted SegResNet parameters.
//!
//! Two layouts are understood: burn's named MessagePack file format, which
//! forces the `.mpk` extension, and the same encoding read as raw bytes from
//! the exact path given. Loading tries them in [`LoadStrategy::ORDER`];
//! a file is only rejected once every strategy has failed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, NamedMpkFileRecorder, Recorder};
use thiserror::Error;

use crate::segresnet::{SegResNet, SegResNetConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Named MessagePack file (`.mpk`)
    NamedFile,
    /// Raw bytes at the exact path, decoded in memory
    BinaryStream,
}

impl LoadStrategy {
    pub const ORDER: [LoadStrategy; 2] = [LoadStrategy::NamedFile, LoadStrategy::BinaryStream];

    fn load<B: Backend>(
        self,
        model: SegResNet<B>,
        path: &Path,
        device: &B::Device,
    ) -> anyhow::Result<SegResNet<B>> {
        match self {
            LoadStrategy::NamedFile => {
                if !path.is_file() {
                    anyhow::bail!("{} is not a file", path.display());
                }
                let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
                model
                    .load_file(path.to_path_buf(), &recorder, device)
                    .map_err(|e| anyhow::anyhow!("{e:?}"))
            }
            LoadStrategy::BinaryStream => {
                let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
                    .load(bytes, device)
                    .map_err(|e| anyhow::anyhow!("{e:?}"))?;
                Ok(model.load_record(record))
            }
        }
    }

    fn save<B: Backend>(self, model: SegResNet<B>, path: &Path) -> anyhow::Result<()> {
        match self {
            LoadStrategy::NamedFile => {
                let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
                model
                    .save_file(path.to_path_buf(), &recorder)
                    .map_err(|e| anyhow::anyhow!("{e:?}"))
            }
            LoadStrategy::BinaryStream => {
                let bytes = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
                    .record(model.into_record(), ())
                    .map_err(|e| anyhow::anyhow!("{e:?}"))?;
                std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
            }
        }
    }
}

impl std::fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStrategy::NamedFile => write!(f, "named file"),
            LoadStrategy::BinaryStream => write!(f, "binary stream"),
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to load weights from {}: {}", .path.display(), describe(.attempts))]
pub struct ModelLoadError {
    pub path: PathBuf,
    /// Failure of every strategy, in the order tried
    pub attempts: Vec<(LoadStrategy, String)>,
}

fn describe(attempts: &[(LoadStrategy, String)]) -> String {
    attempts
        .iter()
        .map(|(strategy, cause)| format!("{strategy}: {cause}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Initialise a network from `config` and fill it from the weights at `path`.
pub fn load_segresnet<B: Backend>(
    config: &SegResNetConfig,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<SegResNet<B>, ModelLoadError> {
    let path = path.as_ref();
    let mut attempts = Vec::new();

    for strategy in LoadStrategy::ORDER {
        match strategy.load(config.init(device), path, device) {
            Ok(model) => {
                tracing::info!(path = %path.display(), %strategy, "loaded model weights");
                return Ok(model);
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), %strategy, error = %e, "weight load strategy failed");
                attempts.push((strategy, format!("{e:#}")));
            }
        }
    }

    Err(ModelLoadError {
        path: path.to_path_buf(),
        attempts,
    })
}

/// Persist `model` at `path` in the given layout.
///
/// The named file layout always uses the `.mpk` extension; the returned path
/// is the file actually written.
pub fn save_segresnet<B: Backend>(
    model: SegResNet<B>,
    path: impl AsRef<Path>,
    strategy: LoadStrategy,
) -> anyhow::Result<PathBuf> {
    let path = match strategy {
        LoadStrategy::NamedFile => path.as_ref().with_extension("mpk"),
        LoadStrategy::BinaryStream => path.as_ref().to_path_buf(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    strategy.save(model, &path)?;
    Ok(path)
}
