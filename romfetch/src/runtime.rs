use anyhow::Context;
use reqwest::Client;
use romfetch_core::{AboutInfo, ApiErrorClass, DriveClient, DriveError, OAuthClient};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::mapping::FolderMapping;
use crate::oauth_flow::OAuthFlow;
use crate::provider::DriveProvider;
use crate::storage::{OAuthState, StorageError, TokenStorage};
use crate::sync::local::path_exists;
use crate::sync::transfer::TransferClient;
use crate::sync::{SyncEngine, SyncReport};
use crate::token_provider::TokenProvider;

pub struct SyncRuntime {
    config: AppConfig,
    engine: SyncEngine<DriveProvider>,
}

impl SyncRuntime {
    /// Loads the folder mapping and resolves a working access token, running
    /// the browser consent flow when nothing is stored yet.
    pub async fn bootstrap(config: AppConfig) -> anyhow::Result<Self> {
        let mapping = config
            .load_mapping()
            .await
            .context("failed to load folder mapping")?;
        if !path_exists(&config.roms_dir).await {
            warn!(
                roms_dir = %config.roms_dir.display(),
                "rom directory does not exist, every folder will be skipped"
            );
        }
        let http = config
            .http_client()
            .context("failed to build http client")?;
        let token = resolve_valid_token(&config, &http).await?;
        Self::with_token(config, mapping, http, token)
    }

    pub fn with_token(
        config: AppConfig,
        mapping: FolderMapping,
        http: Client,
        token: String,
    ) -> anyhow::Result<Self> {
        let client = build_client(&http, &config.api_base_url, &token)
            .context("invalid drive api base url")?;
        let provider = DriveProvider::new(client, config.page_size);
        let engine = SyncEngine::new(provider, mapping, config.roms_dir.clone())
            .with_transfer(TransferClient::with_config(config.transfer_config()));
        Ok(Self { config, engine })
    }

    pub async fn run(self, dry_run: bool) -> anyhow::Result<SyncReport> {
        info!(
            roms_dir = %self.config.roms_dir.display(),
            dry_run,
            "starting sync"
        );
        let options = self.config.sync_options(dry_run);
        let engine = self.engine.with_options(options);
        engine.perform_sync().await.context("sync failed")
    }
}

/// Runs the consent flow unconditionally and replaces stored credentials.
pub async fn login(config: &AppConfig) -> anyhow::Result<()> {
    let storage = TokenStorage::new().context("failed to initialize token storage")?;
    let state = authenticate_and_store(config, &storage).await?;
    let http = config
        .http_client()
        .context("failed to build http client")?;
    let oauth_client = oauth_client_from_config(config).await?;
    let mut provider = TokenProvider::new(state, oauth_client);
    let about = fetch_about_with_retry(&mut provider, &http, &config.api_base_url)
        .await
        .context("failed to verify drive access")?;
    info!(account = %describe_account(&about), "logged in");
    Ok(())
}

pub fn logout() -> anyhow::Result<()> {
    let storage = TokenStorage::new().context("failed to initialize token storage")?;
    storage
        .delete_token()
        .context("failed to remove stored credentials")?;
    info!("stored credentials removed");
    Ok(())
}

include!("runtime_helpers.rs");

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
