use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use futures_util::stream;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::local::{list_local_files, path_exists};
use super::paths::{PathError, local_file_path, target_dir_for};
use super::reconcile::{delete_stale, plan};
use super::remote::list_remote_files;
use super::report::{FolderReport, SkipReason, SkippedFolder, SyncReport};
use super::transfer::{TransferClient, TransferError};
use crate::mapping::{FolderMapping, Lookup};
use crate::provider::{ProviderError, RemoteFolder, RemoteProvider};

const DEFAULT_FOLDER_CONCURRENCY: usize = 2;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("local folder {}: {source}", path.display())]
    Local { path: PathBuf, source: io::Error },
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        match self {
            SyncError::Provider(err) => err.is_auth(),
            SyncError::Transfer(TransferError::Provider(err)) => err.is_auth(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Destination folders processed at the same time.
    pub folder_concurrency: usize,
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            folder_concurrency: DEFAULT_FOLDER_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// Mirrors starred remote folders into their mapped local directories.
pub struct SyncEngine<P> {
    provider: P,
    mapping: FolderMapping,
    roms_root: PathBuf,
    transfer: TransferClient,
    options: SyncOptions,
}

impl<P: RemoteProvider> SyncEngine<P> {
    pub fn new(provider: P, mapping: FolderMapping, roms_root: PathBuf) -> Self {
        Self {
            provider,
            mapping,
            roms_root,
            transfer: TransferClient::new(),
            options: SyncOptions::default(),
        }
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn roms_root(&self) -> &Path {
        &self.roms_root
    }

    /// Runs one full pass over every starred folder.
    ///
    /// Folders sharing a destination directory are reconciled one after the
    /// other; distinct destinations run concurrently.
    pub async fn perform_sync(&self) -> Result<SyncReport, SyncError> {
        let folders = self.provider.list_starred_folders().await?;
        info!(folders = folders.len(), "listed starred folders");

        let mut report = SyncReport::default();
        let mut groups: Vec<(PathBuf, Vec<RemoteFolder>)> = Vec::new();
        for folder in folders {
            let relative = match self.mapping.lookup(&folder.name) {
                Lookup::Mapped(relative) => relative,
                Lookup::Unsupported => {
                    info!(folder = %folder.name, "folder is not synced, skipping");
                    report.skipped.push(SkippedFolder {
                        folder: folder.name,
                        reason: SkipReason::Unsupported,
                    });
                    continue;
                }
                Lookup::Unknown => {
                    debug!(folder = %folder.name, "no mapping for folder, skipping");
                    report.skipped.push(SkippedFolder {
                        folder: folder.name,
                        reason: SkipReason::NotMapped,
                    });
                    continue;
                }
            };
            let target = target_dir_for(&self.roms_root, relative)?;
            if !path_exists(&target).await {
                debug!(
                    folder = %folder.name,
                    dir = %target.display(),
                    "local folder does not exist, skipping"
                );
                report.skipped.push(SkippedFolder {
                    folder: folder.name,
                    reason: SkipReason::MissingLocalDir,
                });
                continue;
            }
            match groups.iter_mut().find(|(dir, _)| *dir == target) {
                Some((dir, members)) => {
                    warn!(
                        folder = %folder.name,
                        dir = %dir.display(),
                        "several folders share a destination, syncing them in order"
                    );
                    members.push(folder);
                }
                None => groups.push((target, vec![folder])),
            }
        }

        let results: Vec<Result<Vec<FolderReport>, SyncError>> = stream::iter(groups)
            .map(|(dir, members)| self.sync_group(dir, members))
            .buffered(self.options.folder_concurrency.max(1))
            .collect()
            .await;
        for result in results {
            report.folders.extend(result?);
        }

        info!(
            synced = report.folders.len(),
            skipped = report.skipped.len(),
            deleted = report.total_deleted(),
            downloaded = report.total_downloaded(),
            failed = report.total_failed(),
            dry_run = self.options.dry_run,
            "sync finished"
        );
        Ok(report)
    }

    async fn sync_group(
        &self,
        dir: PathBuf,
        members: Vec<RemoteFolder>,
    ) -> Result<Vec<FolderReport>, SyncError> {
        let mut reports = Vec::with_capacity(members.len());
        for folder in &members {
            reports.push(self.sync_folder(folder, &dir).await?);
        }
        Ok(reports)
    }

    /// Reconciles one remote folder against `dir`: stale local files are
    /// deleted, then missing remote files are downloaded.
    pub async fn sync_folder(
        &self,
        folder: &RemoteFolder,
        dir: &Path,
    ) -> Result<FolderReport, SyncError> {
        let dry_run = self.options.dry_run;
        let remote = list_remote_files(&self.provider, folder).await?;
        let local = list_local_files(dir).await.map_err(|source| SyncError::Local {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!(
            folder = %folder.name,
            remote = remote.len(),
            local = local.len(),
            "comparing listings"
        );

        let plan = plan(remote, &local);
        let mut report = FolderReport::new(folder.name.as_str(), dir, dry_run);
        report.duplicate_names = plan.duplicates;

        let deletions = delete_stale(dir, &plan.to_delete, dry_run).await;
        report.deleted = deletions.deleted;
        report.kept_directories = deletions.kept_directories;
        report.failed = deletions.failed;

        if dry_run {
            for name in plan.to_download.into_keys() {
                match local_file_path(dir, &name) {
                    Ok(target) => {
                        info!(file = %target.display(), "would download");
                        report.downloaded.push(name);
                    }
                    Err(_) => report.unsafe_names.push(name),
                }
            }
        } else {
            let pass = self
                .transfer
                .download_all(&self.provider, plan.to_download, dir)
                .await?;
            report.downloaded = pass.downloaded;
            report.failed.extend(pass.failed);
            report.unsafe_names = pass.unsafe_names;
        }

        if report.is_noop() {
            debug!(folder = %folder.name, "folder already in sync");
        } else {
            info!(
                folder = %folder.name,
                deleted = report.deleted.len(),
                downloaded = report.downloaded.len(),
                failed = report.failed.len(),
                "folder synced"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
