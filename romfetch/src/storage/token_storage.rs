use keyring::Entry;
use romfetch_core::OAuthToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SERVICE_NAME: &str = "io.github.romfetch";
const TOKEN_KEY: &str = "google_drive_oauth";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("keyring error: {0}")]
    KeyringError(#[from] keyring::Error),
    #[error("token not found")]
    TokenNotFound,
    #[error("stored credentials are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Credentials as persisted between runs. `expires_at` is a unix timestamp.
/// Fields written by older versions are ignored on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl OAuthState {
    pub fn from_oauth_token(token: &OAuthToken) -> Self {
        Self::from_oauth_token_at(token, now_unix())
    }

    fn from_oauth_token_at(token: &OAuthToken, now: i64) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))),
        }
    }

    /// True when the access token is gone or will be within `skew_secs`.
    /// Tokens without a known expiry are trusted until Drive rejects them.
    pub fn expires_within(&self, skew_secs: i64, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now.saturating_add(skew_secs))
    }

    /// State after a refresh grant. Google only returns a new refresh token
    /// when it rotates one, so the current one is carried over otherwise.
    pub fn refreshed(&self, token: &OAuthToken, now: i64) -> Self {
        let mut next = Self::from_oauth_token_at(token, now);
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
        }
        next
    }
}

pub struct TokenStorage {
    entry: Entry,
}

impl TokenStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            entry: Entry::new(SERVICE_NAME, TOKEN_KEY)?,
        })
    }

    pub fn save_oauth_state(&self, state: &OAuthState) -> Result<(), StorageError> {
        let raw = serde_json::to_string(state)?;
        self.entry.set_password(&raw)?;
        Ok(())
    }

    pub fn get_oauth_state(&self) -> Result<OAuthState, StorageError> {
        match self.entry.get_password() {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(keyring::Error::NoEntry) => Err(StorageError::TokenNotFound),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn delete_token(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn has_token(&self) -> bool {
        self.entry.get_password().is_ok()
    }
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
