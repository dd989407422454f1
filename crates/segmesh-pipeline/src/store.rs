//! Upload records kept as a JSON index under the media root.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::modality::Modality;

const INDEX_FILE: &str = "records.json";
const IMAGES_DIR: &str = "nifti_images";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: u64,
    /// Display name the file was uploaded under (the patient identifier)
    pub name: String,
    pub modality: Modality,
    /// Path relative to the media root
    pub file: PathBuf,
    /// Seconds since the Unix epoch
    pub uploaded_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIndex {
    pub next_id: u64,
    pub records: Vec<UploadRecord>,
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    media_root: PathBuf,
}

impl RecordStore {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn index_path(&self) -> PathBuf {
        self.media_root.join(INDEX_FILE)
    }

    /// Current index; an absent file is an empty index.
    pub fn load(&self) -> Result<RecordIndex> {
        let path = self.index_path();
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| PipelineError::read(&path, e.into())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordIndex::default()),
            Err(e) => Err(PipelineError::io(&path, e)),
        }
    }

    fn save(&self, index: &RecordIndex) -> Result<()> {
        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(index)
            .map_err(|e| PipelineError::invalid_config(format!("serializing record index: {e}")))?;
        std::fs::write(&tmp, json).map_err(|e| PipelineError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| PipelineError::io(&path, e))
    }

    /// Store an uploaded volume as `nifti_images/<name>_<modality>.nii.gz` and register it.
    pub fn upload(&self, name: &str, modality: &str, contents: &[u8]) -> Result<UploadRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::MissingField("file name"));
        }
        if modality.trim().is_empty() {
            return Err(PipelineError::MissingField("MRI modality"));
        }
        if contents.is_empty() {
            return Err(PipelineError::MissingField("uploaded file"));
        }
        if name.contains(['/', '\\']) {
            return Err(PipelineError::invalid_config(format!("file name {name:?} contains a path separator")));
        }
        let modality: Modality = modality.parse()?;
        let mut index = self.load()?;

        let relative = Path::new(IMAGES_DIR).join(format!("{name}_{}.nii.gz", modality.tag()));
        let full = self.media_root.join(&relative);
        let dir = self.media_root.join(IMAGES_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        std::fs::write(&full, contents).map_err(|e| PipelineError::io(&full, e))?;

        let record = UploadRecord {
            id: index.next_id,
            name: name.to_string(),
            modality,
            file: relative,
            uploaded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        index.next_id += 1;
        // A re-upload replaces the earlier record for the same file.
        index.records.retain(|r| r.file != record.file);
        index.records.push(record.clone());
        self.save(&index)?;

        tracing::info!(id = record.id, name, %modality, file = %full.display(), "stored upload");
        Ok(record)
    }
}
