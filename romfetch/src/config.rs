use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::mapping::{FolderMapping, MappingError};
use crate::oauth_flow::{ClientSecret, OAuthFlowError, OAuthFlowOptions, load_client_secret};
use crate::sync::retry::RetryPolicy;
use crate::sync::transfer::TransferConfig;
use crate::sync::SyncOptions;

const DEFAULT_ROMS_DIR: &str = "RetroPie/roms";
const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com";
const DEFAULT_PAGE_SIZE: u64 = 100;
const MAX_PAGE_SIZE: u64 = 1000;
const DEFAULT_DOWNLOAD_CONCURRENCY: u64 = 4;
const DEFAULT_FOLDER_CONCURRENCY: u64 = 2;
const DEFAULT_DOWNLOAD_ATTEMPTS: u64 = 3;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub roms_dir: PathBuf,
    pub mapping_file: Option<PathBuf>,
    pub api_base_url: String,
    pub page_size: u32,
    pub download_concurrency: usize,
    pub folder_concurrency: usize,
    pub download_attempts: u32,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_secret_file: Option<PathBuf>,
    pub oauth: OAuthFlowOptions,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        Ok(Self::from_lookup(|name| std::env::var(name).ok(), &home))
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F, home: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let number = |name: &str, default: u64| read_u64(lookup(name), default);

        let roms_dir = non_empty("ROMFETCH_ROMS_DIR")
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(|| home.join(DEFAULT_ROMS_DIR));
        let mapping_file =
            non_empty("ROMFETCH_MAPPING_FILE").map(|value| expand_with_home(&value, home));
        let client_secret_file =
            non_empty("ROMFETCH_CLIENT_SECRET_FILE").map(|value| expand_with_home(&value, home));

        Self {
            roms_dir,
            mapping_file,
            api_base_url: non_empty("ROMFETCH_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            page_size: number("ROMFETCH_PAGE_SIZE", DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE) as u32,
            download_concurrency: number(
                "ROMFETCH_DOWNLOAD_CONCURRENCY",
                DEFAULT_DOWNLOAD_CONCURRENCY,
            ) as usize,
            folder_concurrency: number("ROMFETCH_FOLDER_CONCURRENCY", DEFAULT_FOLDER_CONCURRENCY)
                as usize,
            download_attempts: number("ROMFETCH_DOWNLOAD_ATTEMPTS", DEFAULT_DOWNLOAD_ATTEMPTS)
                .min(u64::from(u32::MAX)) as u32,
            read_timeout: Duration::from_secs(number(
                "ROMFETCH_READ_TIMEOUT_SECS",
                DEFAULT_READ_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(number(
                "ROMFETCH_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            token: non_empty("ROMFETCH_TOKEN"),
            client_id: non_empty("ROMFETCH_CLIENT_ID"),
            client_secret: non_empty("ROMFETCH_CLIENT_SECRET"),
            client_secret_file,
            oauth: OAuthFlowOptions {
                force_manual: read_bool(lookup("ROMFETCH_OAUTH_FORCE_MANUAL"), false),
                timeout: Duration::from_secs(number(
                    "ROMFETCH_OAUTH_TIMEOUT_SECS",
                    DEFAULT_OAUTH_TIMEOUT_SECS,
                )),
            },
        }
    }

    /// HTTP client shared by every Drive call. Only connect and per-read
    /// timeouts apply, so a large ROM is never cut off while it still flows.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .user_agent(concat!("romfetch/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    pub fn transfer_config(&self) -> TransferConfig {
        let defaults = RetryPolicy::default();
        TransferConfig {
            download_concurrency: self.download_concurrency,
            retry: RetryPolicy::new(
                self.download_attempts,
                defaults.base_delay(),
                defaults.max_delay(),
                true,
            ),
        }
    }

    pub fn sync_options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            folder_concurrency: self.folder_concurrency,
            dry_run,
        }
    }

    pub async fn load_mapping(&self) -> Result<FolderMapping, MappingError> {
        match &self.mapping_file {
            Some(path) => FolderMapping::load(path).await,
            None => Ok(FolderMapping::retropie_default()),
        }
    }

    /// OAuth client credentials: explicit variables win over the secret file.
    pub async fn client_credentials(&self) -> Result<Option<ClientSecret>, OAuthFlowError> {
        if let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) {
            return Ok(Some(ClientSecret {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }));
        }
        match &self.client_secret_file {
            Some(path) => load_client_secret(path).await.map(Some),
            None => Ok(None),
        }
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
