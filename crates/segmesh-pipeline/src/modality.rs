//! MRI modalities and their network channel order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Flair,
    T1,
    T1ce,
    T2,
}

impl Modality {
    /// All modalities in network channel order.
    pub const ALL: [Modality; 4] = [Modality::Flair, Modality::T1, Modality::T1ce, Modality::T2];

    pub fn channel(self) -> usize {
        match self {
            Modality::Flair => 0,
            Modality::T1 => 1,
            Modality::T1ce => 2,
            Modality::T2 => 3,
        }
    }

    /// Canonical file name tag.
    pub fn tag(self) -> &'static str {
        match self {
            Modality::Flair => "flair",
            Modality::T1 => "t1",
            Modality::T1ce => "t1ce",
            Modality::T2 => "t2",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Modality {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flair" => Ok(Modality::Flair),
            "t1" | "t1w" => Ok(Modality::T1),
            "t1ce" | "t1gd" | "t1c" | "t1post" => Ok(Modality::T1ce),
            "t2" | "t2w" => Ok(Modality::T2),
            _ => Err(PipelineError::UnknownModality(s.to_string())),
        }
    }
}

/// One file per modality, held in channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalitySet {
    paths: [PathBuf; 4],
}

impl ModalitySet {
    /// Validate tagged candidate files for one patient.
    ///
    /// Unknown tags are skipped with a warning. A modality seen twice is an
    /// error, and any missing modality means the patient has no usable images.
    pub fn from_candidates<I>(patient_id: &str, candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        let mut slots: [Option<PathBuf>; 4] = Default::default();

        for (tag, path) in candidates {
            let modality = match tag.parse::<Modality>() {
                Ok(m) => m,
                Err(_) => {
                    tracing::warn!(patient_id, tag = %tag, path = %path.display(), "ignoring file with unknown modality");
                    continue;
                }
            };
            let slot = &mut slots[modality.channel()];
            if let Some(first) = slot.take() {
                return Err(PipelineError::DuplicateModality {
                    modality,
                    first,
                    second: path,
                });
            }
            *slot = Some(path);
        }

        let missing: Vec<&str> = Modality::ALL
            .iter()
            .filter(|m| slots[m.channel()].is_none())
            .map(|m| m.tag())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::no_images(
                patient_id,
                format!("missing modalities: {}", missing.join(", ")),
            ));
        }

        let [flair, t1, t1ce, t2] = slots;
        match (flair, t1, t1ce, t2) {
            (Some(flair), Some(t1), Some(t1ce), Some(t2)) => Ok(Self {
                paths: [flair, t1, t1ce, t2],
            }),
            _ => Err(PipelineError::no_images(patient_id, "incomplete modality set")),
        }
    }

    /// Paths in channel order.
    pub fn paths(&self) -> &[PathBuf; 4] {
        &self.paths
    }

    pub fn path(&self, modality: Modality) -> &Path {
        &self.paths[modality.channel()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Modality, &Path)> {
        Modality::ALL.into_iter().map(move |m| (m, self.path(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(tags: &[&str]) -> Vec<(String, PathBuf)> {
        tags.iter()
            .map(|t| (t.to_string(), PathBuf::from(format!("/data/1_{t}.nii.gz"))))
            .collect()
    }

    #[test]
    fn test_aliases() {
        assert_eq!("FLAIR".parse::<Modality>().unwrap(), Modality::Flair);
        assert_eq!("t1gd".parse::<Modality>().unwrap(), Modality::T1ce);
        assert_eq!("T2w".parse::<Modality>().unwrap(), Modality::T2);
        assert!("dwi".parse::<Modality>().is_err());
    }

    #[test]
    fn test_channel_order_is_fixed() {
        let set = ModalitySet::from_candidates("1", candidates(&["t2", "t1ce", "flair", "t1"])).unwrap();
        let tags: Vec<_> = set
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(tags, ["1_flair.nii.gz", "1_t1.nii.gz", "1_t1ce.nii.gz", "1_t2.nii.gz"]);
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let set = ModalitySet::from_candidates("1", candidates(&["t1", "seg", "t2", "flair", "t1ce"]));
        assert!(set.is_ok());
    }

    #[test]
    fn test_duplicate_modality() {
        let err = ModalitySet::from_candidates("1", candidates(&["t1", "t1w", "t2", "flair", "t1ce"])).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateModality { modality: Modality::T1, .. }));
    }

    #[test]
    fn test_missing_modality() {
        let err = ModalitySet::from_candidates("1", candidates(&["t1", "t2", "flair"])).unwrap_err();
        assert_eq!(err.code(), "no images found");
        assert!(err.to_string().contains("t1ce"));
    }
}
