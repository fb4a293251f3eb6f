use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use md5::Context;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::paths::local_file_path;
use super::report::FileFailure;
use super::retry::RetryPolicy;
use crate::provider::{MediaSource, ProviderError, RemoteEntry, RemoteProvider};

const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;
const STAGING_SUFFIX: &str = "romfetch-part";
const STAGING_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("download integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Provider(err) => err.is_retryable(),
            TransferError::IntegrityMismatch { .. } => true,
            TransferError::Io(_) | TransferError::ConcurrencyClosed => false,
        }
    }

    /// Errors that invalidate the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransferError::Provider(err) => err.is_auth(),
            TransferError::ConcurrencyClosed => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadPass {
    pub downloaded: Vec<String>,
    pub failed: Vec<FileFailure>,
    pub unsafe_names: Vec<String>,
}

/// Streams remote media onto local files. A shared semaphore bounds the number
/// of transfers in flight across every folder using this client.
#[derive(Clone)]
pub struct TransferClient {
    download_limit: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    pub fn with_config(config: TransferConfig) -> Self {
        Self {
            download_limit: Arc::new(Semaphore::new(config.download_concurrency.max(1))),
            retry: config.retry,
        }
    }

    /// Downloads every entry of `add_set` into `dest_dir`. Per-file failures
    /// are collected; only a fatal error (e.g. revoked credentials) aborts.
    pub async fn download_all<P>(
        &self,
        provider: &P,
        add_set: BTreeMap<String, RemoteEntry>,
        dest_dir: &Path,
    ) -> Result<DownloadPass, TransferError>
    where
        P: RemoteProvider + ?Sized,
    {
        let mut pass = DownloadPass::default();
        let mut jobs = Vec::with_capacity(add_set.len());
        for (name, entry) in add_set {
            match local_file_path(dest_dir, &name) {
                Ok(target) => jobs.push((name, entry, target)),
                Err(err) => {
                    warn!(name = %name, error = %err, "refusing unsafe remote filename");
                    pass.unsafe_names.push(name);
                }
            }
        }

        let results = join_all(jobs.into_iter().map(|(name, entry, target)| async move {
            let result = self.download_to_path(provider, &entry, &target).await;
            (name, target, result)
        }))
        .await;

        let mut fatal = None;
        for (name, target, result) in results {
            match result {
                Ok(bytes) => {
                    info!(file = %target.display(), bytes, "downloaded");
                    pass.downloaded.push(name);
                }
                Err(err) if err.is_fatal() => {
                    fatal.get_or_insert(err);
                }
                Err(err) => {
                    warn!(file = %target.display(), error = %err, "download failed");
                    pass.failed.push(FileFailure {
                        name,
                        error: err.to_string(),
                    });
                }
            }
        }
        match fatal {
            Some(err) => Err(err),
            None => Ok(pass),
        }
    }

    /// Downloads one entry, retrying transient failures. Returns the number of
    /// bytes written.
    pub async fn download_to_path<P>(
        &self,
        provider: &P,
        entry: &RemoteEntry,
        target: &Path,
    ) -> Result<u64, TransferError>
    where
        P: RemoteProvider + ?Sized,
    {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;

        let mut attempt = 1;
        loop {
            match self.download_once(provider, entry, target).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_retryable() && self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        file = %entry.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "download attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn download_once<P>(
        &self,
        provider: &P,
        entry: &RemoteEntry,
        target: &Path,
    ) -> Result<u64, TransferError>
    where
        P: RemoteProvider + ?Sized,
    {
        let media = provider.open_media(&entry.id).await?;
        // The staging file is created exclusively, so only a file this call
        // created is ever removed or renamed.
        let (staging, file) = create_staging_file(target).await?;
        let written = match stream_to_file(media, entry, file).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(err);
            }
        };
        if let Err(err) = tokio::fs::rename(&staging, target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(written)
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn stream_to_file(
    mut media: Box<dyn MediaSource>,
    entry: &RemoteEntry,
    mut file: tokio::fs::File,
) -> Result<u64, TransferError> {
    let total = media.total_size();
    let mut md5 = entry.md5.as_ref().map(|_| Context::new());
    let mut received = 0u64;
    let mut last_percent = None;

    while let Some(chunk) = media.next_chunk().await? {
        file.write_all(&chunk).await?;
        if let Some(ctx) = md5.as_mut() {
            ctx.consume(&chunk);
        }
        received = received.saturating_add(chunk.len() as u64);
        let percent = progress_percent(received, total);
        if percent.is_some() && percent != last_percent {
            debug!(file = %entry.name, percent, "downloading");
            last_percent = percent;
        }
    }

    file.flush().await?;
    file.sync_all().await?;

    if let (Some(expected), Some(ctx)) = (entry.md5.as_deref(), md5) {
        let actual_md5 = format!("{:x}", ctx.compute());
        if !actual_md5.eq_ignore_ascii_case(expected) {
            return Err(TransferError::IntegrityMismatch {
                expected_md5: expected.to_ascii_lowercase(),
                actual_md5,
            });
        }
    }
    Ok(received)
}

/// Whole-percent progress, or `None` when the total size is unknown.
pub fn progress_percent(received: u64, total: Option<u64>) -> Option<u8> {
    match total? {
        0 => Some(100),
        total => {
            let percent = u128::from(received) * 100 / u128::from(total);
            Some(percent.min(100) as u8)
        }
    }
}

async fn create_staging_file(target: &Path) -> Result<(PathBuf, tokio::fs::File), TransferError> {
    let mut last_err = None;
    for _ in 0..STAGING_ATTEMPTS {
        let path = staging_path(target, rand::random());
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => last_err = Some(err),
            Err(err) => return Err(err.into()),
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists))
        .into())
}

/// Hidden sibling of `target` carrying a random token, e.g.
/// `.mario.nes.00000000deadbeef.romfetch-part`.
fn staging_path(target: &Path, token: u64) -> PathBuf {
    let name = target.file_name().unwrap_or_default().to_string_lossy();
    target.with_file_name(format!(".{name}.{token:016x}.{STAGING_SUFFIX}"))
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
