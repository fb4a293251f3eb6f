//! Remote file provider seam.
//!
//! The sync engine only needs three capabilities from the cloud side:
//! starred folder discovery, flat child listing and streamed media reads.
//! [`DriveProvider`] implements them on top of the Drive v3 client; tests
//! plug in in-memory providers.

use async_trait::async_trait;
use bytes::Bytes;
use romfetch_core::{DriveClient, DriveError, MediaDownload, children_query, starred_folders_query};
use thiserror::Error;

const LISTING_ORDER: &str = "createdTime";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("drive api error: {0}")]
    Drive(#[from] DriveError),
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        match self {
            ProviderError::Drive(err) => err.is_auth(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Drive(err) => err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub id: String,
    pub md5: Option<String>,
}

#[async_trait]
pub trait MediaSource: Send {
    /// Total payload size when the provider announces it up front.
    fn total_size(&self) -> Option<u64>;

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProviderError>;
}

#[async_trait]
pub trait RemoteProvider: Send + Sync {
    async fn list_starred_folders(&self) -> Result<Vec<RemoteFolder>, ProviderError>;

    /// Direct children of `folder_id`, in provider order (oldest first).
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, ProviderError>;

    async fn open_media(&self, file_id: &str) -> Result<Box<dyn MediaSource>, ProviderError>;
}

#[derive(Clone)]
pub struct DriveProvider {
    client: DriveClient,
    page_size: u32,
}

impl DriveProvider {
    pub fn new(client: DriveClient, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl RemoteProvider for DriveProvider {
    async fn list_starred_folders(&self) -> Result<Vec<RemoteFolder>, ProviderError> {
        let files = self
            .client
            .list_files_all(&starred_folders_query(), self.page_size, Some(LISTING_ORDER))
            .await?;
        Ok(files
            .into_iter()
            .filter(|file| file.is_folder())
            .map(|file| RemoteFolder {
                name: file.name,
                id: file.id,
            })
            .collect())
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, ProviderError> {
        let files = self
            .client
            .list_files_all(&children_query(folder_id), self.page_size, Some(LISTING_ORDER))
            .await?;
        Ok(files
            .into_iter()
            .filter(|file| !file.is_folder())
            .map(|file| RemoteEntry {
                name: file.name,
                id: file.id,
                md5: file.md5_checksum,
            })
            .collect())
    }

    async fn open_media(&self, file_id: &str) -> Result<Box<dyn MediaSource>, ProviderError> {
        let download = self.client.download_media(file_id).await?;
        Ok(Box::new(DriveMedia { download }))
    }
}

struct DriveMedia {
    download: MediaDownload,
}

#[async_trait]
impl MediaSource for DriveMedia {
    fn total_size(&self) -> Option<u64> {
        self.download.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProviderError> {
        Ok(self.download.chunk().await?)
    }
}
