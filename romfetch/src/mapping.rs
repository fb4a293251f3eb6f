//! Drive folder name to local ROM directory table.
//!
//! The built-in table targets a stock RetroPie layout. A JSON object of the
//! same shape can replace it at startup; `null` marks a folder that is known
//! but never synced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

const RETROPIE_FOLDERS: &[(&str, Option<&str>)] = &[
    ("Atari2600", Some("atari2600")),
    ("Atari7800", Some("atari7800")),
    ("AtariLynx", Some("atarilynx")),
    ("GameBoy", Some("gb")),
    ("GameBoyAdvanced", Some("gba")),
    ("GameBoyColor", Some("gbc")),
    ("GameGear", Some("gamegear")),
    ("Huge Game Collection", None),
    ("MasterSystem", Some("mastersystem")),
    ("N64", Some("n64")),
    ("NEOGEO", Some("neogeo")),
    ("NEOGEOPocket", Some("ngp")),
    ("NEOGEOPocketColor", Some("ngpc")),
    ("NES", Some("nes")),
    ("Pictures", Some("../splashscreens")),
    ("SG100", Some("sg100")),
    ("SNES", Some("snes")),
    ("ZXSpectrum", Some("zxspectrum")),
];

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid mapping json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("folder {folder:?} maps to an absolute path")]
    AbsolutePath { folder: String },
    #[error("folder {folder:?} maps to an empty path")]
    EmptyPath { folder: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingTarget {
    Local(PathBuf),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Mapped(&'a Path),
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct FolderMapping {
    entries: BTreeMap<String, MappingTarget>,
}

impl FolderMapping {
    pub fn retropie_default() -> Self {
        let entries = RETROPIE_FOLDERS
            .iter()
            .map(|(name, target)| {
                let target = match target {
                    Some(rel) => MappingTarget::Local(PathBuf::from(rel)),
                    None => MappingTarget::Unsupported,
                };
                (name.to_string(), target)
            })
            .collect();
        Self { entries }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MappingError> {
        let parsed: BTreeMap<String, Option<PathBuf>> = serde_json::from_str(raw)?;
        let mut entries = BTreeMap::new();
        for (folder, target) in parsed {
            let target = match target {
                None => MappingTarget::Unsupported,
                Some(path) if path.as_os_str().is_empty() => {
                    return Err(MappingError::EmptyPath { folder });
                }
                Some(path) if path.is_absolute() => {
                    return Err(MappingError::AbsolutePath { folder });
                }
                Some(path) => MappingTarget::Local(path),
            };
            entries.insert(folder, target);
        }
        Ok(Self { entries })
    }

    pub async fn load(path: &Path) -> Result<Self, MappingError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| MappingError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&raw)
    }

    pub fn lookup(&self, remote_folder: &str) -> Lookup<'_> {
        match self.entries.get(remote_folder) {
            Some(MappingTarget::Local(path)) => Lookup::Mapped(path),
            Some(MappingTarget::Unsupported) => Lookup::Unsupported,
            None => Lookup::Unknown,
        }
    }

    pub fn resolve_local_path(&self, remote_folder: &str) -> Option<&Path> {
        match self.lookup(remote_folder) {
            Lookup::Mapped(path) => Some(path),
            Lookup::Unsupported | Lookup::Unknown => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappingTarget)> {
        self.entries.iter().map(|(name, target)| (name.as_str(), target))
    }
}

impl Default for FolderMapping {
    fn default() -> Self {
        Self::retropie_default()
    }
}
