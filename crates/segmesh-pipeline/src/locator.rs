//! Resolving a patient identifier to its modality files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::modality::ModalitySet;
use crate::store::RecordStore;

/// Read-only lookup of a patient's input volumes.
pub trait ImageLocator: Send + Sync {
    fn resolve(&self, patient_id: &str) -> Result<ModalitySet>;
}

/// Split `<id>_<tag>.nii[.gz]` into id and tag.
pub fn parse_volume_name(file_name: &str) -> Option<(&str, &str)> {
    let stem = file_name
        .strip_suffix(".nii.gz")
        .or_else(|| file_name.strip_suffix(".nii"))?;
    stem.rsplit_once('_')
}

/// Scans a directory tree for `<id>_<modality>.nii[.gz]` files.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageLocator for DirectoryLocator {
    fn resolve(&self, patient_id: &str) -> Result<ModalitySet> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(root = %self.root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some((id, tag)) = parse_volume_name(name) {
                if id == patient_id {
                    candidates.push((tag.to_string(), entry.path().to_path_buf()));
                }
            }
        }

        tracing::debug!(patient_id, found = candidates.len(), root = %self.root.display(), "directory scan finished");
        ModalitySet::from_candidates(patient_id, candidates)
    }
}

/// Looks the identifier up among uploaded records.
#[derive(Debug, Clone)]
pub struct RecordLocator {
    store: RecordStore,
}

impl RecordLocator {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

impl ImageLocator for RecordLocator {
    fn resolve(&self, patient_id: &str) -> Result<ModalitySet> {
        let index = self.store.load()?;
        let candidates = index
            .records
            .iter()
            .filter(|r| r.name == patient_id)
            .map(|r| (r.modality.tag().to_string(), self.store.media_root().join(&r.file)))
            .collect::<Vec<_>>();
        ModalitySet::from_candidates(patient_id, candidates)
    }
}
