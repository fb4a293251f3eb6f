use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use romfetch_core::DriveError;

use crate::provider::{MediaSource, ProviderError, RemoteEntry, RemoteFolder, RemoteProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Delivers the first chunk, then fails the stream with a 503.
    Interrupt,
    NotFound,
    Unauthorized,
}

pub fn api_error(status: StatusCode, body: &str) -> ProviderError {
    ProviderError::Drive(DriveError::Api {
        status,
        body: body.into(),
    })
}

/// In-memory provider. File contents are keyed by remote id and served in
/// fixed-size chunks; failures are queued per id and consumed one per open.
pub struct FakeProvider {
    folders: Vec<RemoteFolder>,
    children: HashMap<String, Vec<RemoteEntry>>,
    contents: HashMap<String, Vec<u8>>,
    failures: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
    opened: Mutex<Vec<String>>,
    listed: Mutex<Vec<String>>,
    chunk_size: usize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
            children: HashMap::new(),
            contents: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            listed: Mutex::new(Vec::new()),
            chunk_size: 3,
        }
    }

    pub fn with_folder(mut self, name: &str, id: &str, files: &[(&str, &str, &[u8])]) -> Self {
        self.folders.push(RemoteFolder {
            name: name.into(),
            id: id.into(),
        });
        let entries = self.children.entry(id.to_string()).or_default();
        for (file_name, file_id, content) in files {
            entries.push(RemoteEntry {
                name: (*file_name).into(),
                id: (*file_id).into(),
                md5: None,
            });
            self.contents.insert((*file_id).into(), content.to_vec());
        }
        self
    }

    pub fn with_entry(mut self, folder_id: &str, entry: RemoteEntry, content: &[u8]) -> Self {
        self.contents.insert(entry.id.clone(), content.to_vec());
        self.children
            .entry(folder_id.to_string())
            .or_default()
            .push(entry);
        self
    }

    pub fn fail(self, file_id: &str, failure: FakeFailure, times: usize) -> Self {
        {
            let mut failures = self.failures.lock().unwrap();
            let queue = failures.entry(file_id.to_string()).or_default();
            for _ in 0..times {
                queue.push_back(failure);
            }
        }
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteProvider for FakeProvider {
    async fn list_starred_folders(&self) -> Result<Vec<RemoteFolder>, ProviderError> {
        Ok(self.folders.clone())
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, ProviderError> {
        self.listed.lock().unwrap().push(folder_id.to_string());
        Ok(self.children.get(folder_id).cloned().unwrap_or_default())
    }

    async fn open_media(&self, file_id: &str) -> Result<Box<dyn MediaSource>, ProviderError> {
        self.opened.lock().unwrap().push(file_id.to_string());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(file_id)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(FakeFailure::NotFound) => {
                return Err(api_error(StatusCode::NOT_FOUND, "file not found"));
            }
            Some(FakeFailure::Unauthorized) => {
                return Err(api_error(StatusCode::UNAUTHORIZED, "token expired"));
            }
            _ => {}
        }
        let content = self
            .contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "file not found"))?;
        let total = content.len() as u64;
        let chunks = content
            .chunks(self.chunk_size.max(1))
            .map(Bytes::copy_from_slice)
            .collect();
        Ok(Box::new(FakeMedia {
            chunks,
            total,
            interrupt: failure == Some(FakeFailure::Interrupt),
            served: 0,
        }))
    }
}

struct FakeMedia {
    chunks: VecDeque<Bytes>,
    total: u64,
    interrupt: bool,
    served: usize,
}

#[async_trait]
impl MediaSource for FakeMedia {
    fn total_size(&self) -> Option<u64> {
        Some(self.total)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProviderError> {
        if self.interrupt && self.served >= 1 {
            return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "backend error"));
        }
        self.served += 1;
        Ok(self.chunks.pop_front())
    }
}
