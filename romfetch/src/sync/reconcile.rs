//! Set difference between a remote folder listing and a local snapshot.
//!
//! A pass consumes its [`RemoteFiles`] working copy: every local name found
//! remotely is removed from it, so whatever is left afterwards is exactly the
//! add-set. Nothing is carried over to the next folder.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info, warn};

use super::local::LocalSnapshot;
use super::paths::local_file_path;
use super::remote::RemoteFiles;
use super::report::FileFailure;
use crate::provider::RemoteEntry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Local names absent from the remote listing.
    pub to_delete: Vec<String>,
    /// Remote entries absent locally, keyed by filename.
    pub to_download: BTreeMap<String, RemoteEntry>,
    pub duplicates: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_download.is_empty()
    }
}

pub fn plan(mut remote: RemoteFiles, local: &LocalSnapshot) -> SyncPlan {
    let mut to_delete = Vec::new();
    for name in local.iter() {
        if remote.remove(name).is_none() {
            to_delete.push(name.to_string());
        }
    }
    let (to_download, duplicates) = remote.into_parts();
    SyncPlan {
        to_delete,
        to_download,
        duplicates,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePass {
    pub deleted: Vec<String>,
    pub kept_directories: Vec<String>,
    pub failed: Vec<FileFailure>,
}

/// Removes stale names from `dir`. Only regular files are removed; directories
/// and special files are left alone. With `dry_run` nothing is touched.
pub async fn delete_stale(dir: &Path, names: &[String], dry_run: bool) -> DeletePass {
    let mut pass = DeletePass::default();
    for name in names {
        let path = match local_file_path(dir, name) {
            Ok(path) => path,
            Err(err) => {
                pass.failed.push(FileFailure {
                    name: name.clone(),
                    error: err.to_string(),
                });
                continue;
            }
        };
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "stale entry vanished before delete");
                continue;
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to inspect stale entry");
                pass.failed.push(FileFailure {
                    name: name.clone(),
                    error: err.to_string(),
                });
                continue;
            }
        };
        if meta.is_dir() {
            debug!(dir = %path.display(), "keeping local directory");
            pass.kept_directories.push(name.clone());
            continue;
        }
        if !meta.is_file() {
            debug!(file = %path.display(), "keeping non-regular file");
            continue;
        }
        if dry_run {
            info!(file = %path.display(), "would delete");
            pass.deleted.push(name.clone());
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(file = %path.display(), "deleted");
                pass.deleted.push(name.clone());
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "stale file vanished before delete");
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to delete stale file");
                pass.failed.push(FileFailure {
                    name: name.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    pass
}
