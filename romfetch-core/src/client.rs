use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size,md5Checksum)";
const MAX_PAGE_SIZE: u32 = 1000;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_http(Client::new(), base_url, token)
    }

    /// Builds a client on top of a preconfigured `reqwest::Client`, e.g. one
    /// carrying connect/request timeouts.
    pub fn with_http(
        http: Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, DriveError> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_about(&self) -> Result<AboutInfo, DriveError> {
        let mut url = self.endpoint("/drive/v3/about")?;
        url.query_pairs_mut().append_pair(
            "fields",
            "user(displayName,emailAddress),storageQuota(limit,usage)",
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Fetches a single page of `files.list`.
    pub async fn list_files_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("pageSize", &page_size.clamp(1, MAX_PAGE_SIZE).to_string());
            pairs.append_pair("fields", LIST_FIELDS);
            pairs.append_pair("spaces", "drive");
            if let Some(order_by) = order_by {
                pairs.append_pair("orderBy", order_by);
            }
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                pairs.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Follows `nextPageToken` until the listing is exhausted.
    pub async fn list_files_all(
        &self,
        query: &str,
        page_size: u32,
        order_by: Option<&str>,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_files_page(query, page_size, page_token.as_deref(), order_by)
                .await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }

    /// Opens the raw content of a file. The body is consumed chunk by chunk
    /// through [`MediaDownload::chunk`].
    pub async fn download_media(&self, file_id: &str) -> Result<MediaDownload, DriveError> {
        let mut url = self.endpoint("/drive/v3/files/")?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(file_id);
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }
        Ok(MediaDownload { response })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

/// Query matching starred, non-trashed folders.
pub fn starred_folders_query() -> String {
    format!("mimeType = '{FOLDER_MIME_TYPE}' and starred = true and trashed = false")
}

/// Query matching the direct, non-trashed, non-folder children of `folder_id`.
pub fn children_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and trashed = false and mimeType != '{FOLDER_MIME_TYPE}'",
        escape_query_literal(folder_id)
    )
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub struct MediaDownload {
    response: reqwest::Response,
}

impl MediaDownload {
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub async fn chunk(&mut self) -> Result<Option<Bytes>, DriveError> {
        Ok(self.response.chunk().await?)
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, body } => Some(classify_api_status(*status, body)),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.classification(), Some(ApiErrorClass::Auth))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DriveError::Request(err) => !err.is_builder() && !err.is_redirect(),
            DriveError::Url(_) => false,
            DriveError::Api { .. } => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

fn classify_api_status(status: StatusCode, body: &str) -> ApiErrorClass {
    // Drive reports per-user quota exhaustion as 403 with a rateLimitExceeded reason.
    if status == StatusCode::UNAUTHORIZED {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && body.contains("ateLimitExceeded"))
    {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    #[serde(default)]
    pub user: Option<DriveUser>,
    #[serde(default)]
    pub storage_quota: Option<StorageQuota>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StorageQuota {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
