use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotMapped,
    Unsupported,
    MissingLocalDir,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedFolder {
    pub folder: String,
    pub reason: SkipReason,
}

/// Outcome of one reconciliation pass. In dry-run mode `deleted` and
/// `downloaded` hold what would have happened.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FolderReport {
    pub folder: String,
    pub local_dir: PathBuf,
    pub dry_run: bool,
    pub deleted: Vec<String>,
    pub kept_directories: Vec<String>,
    pub downloaded: Vec<String>,
    pub failed: Vec<FileFailure>,
    pub unsafe_names: Vec<String>,
    pub duplicate_names: Vec<String>,
}

impl FolderReport {
    pub fn new(folder: impl Into<String>, local_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            folder: folder.into(),
            local_dir: local_dir.into(),
            dry_run,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.downloaded.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub folders: Vec<FolderReport>,
    pub skipped: Vec<SkippedFolder>,
}

impl SyncReport {
    pub fn total_deleted(&self) -> usize {
        self.folders.iter().map(|f| f.deleted.len()).sum()
    }

    pub fn total_downloaded(&self) -> usize {
        self.folders.iter().map(|f| f.downloaded.len()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.folders.iter().map(|f| f.failed.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.total_failed() > 0
    }
}
