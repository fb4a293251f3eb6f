async fn resolve_valid_token(config: &AppConfig, http: &Client) -> anyhow::Result<String> {
    if let Some(token) = &config.token {
        return Ok(token.clone());
    }
    let storage = TokenStorage::new().context("failed to initialize token storage")?;
    let state = match storage.get_oauth_state() {
        Ok(state) => state,
        Err(StorageError::TokenNotFound) => authenticate_and_store(config, &storage).await?,
        Err(err) => return Err(err).context("failed to read stored credentials"),
    };
    let oauth_client = oauth_client_from_config(config).await?;
    let mut provider = TokenProvider::new(state, oauth_client);
    let about = fetch_about_with_retry(&mut provider, http, &config.api_base_url)
        .await
        .context("failed to verify drive access")?;
    info!(account = %describe_account(&about), "authenticated");
    storage
        .save_oauth_state(provider.state())
        .context("failed to persist oauth state")?;
    Ok(provider.state().access_token.clone())
}

async fn authenticate_and_store(
    config: &AppConfig,
    storage: &TokenStorage,
) -> anyhow::Result<OAuthState> {
    let client = oauth_client_from_config(config).await?.context(
        "no OAuth client configured; set ROMFETCH_CLIENT_ID and ROMFETCH_CLIENT_SECRET \
         or ROMFETCH_CLIENT_SECRET_FILE",
    )?;
    let flow = OAuthFlow::new(client, config.oauth);
    let token = flow.authenticate().await?;
    let state = OAuthState::from_oauth_token(&token);
    storage
        .save_oauth_state(&state)
        .context("failed to save token")?;
    Ok(state)
}

async fn oauth_client_from_config(config: &AppConfig) -> anyhow::Result<Option<OAuthClient>> {
    let credentials = config
        .client_credentials()
        .await
        .context("failed to load oauth client credentials")?;
    credentials
        .map(|creds| {
            OAuthClient::new(creds.client_id, creds.client_secret).context("invalid oauth config")
        })
        .transpose()
}

async fn fetch_about_with_retry(
    provider: &mut TokenProvider,
    http: &Client,
    base_url: &str,
) -> anyhow::Result<AboutInfo> {
    let token = provider
        .valid_access_token()
        .await
        .context("failed to resolve valid access token")?;
    let client = build_client(http, base_url, &token)?;
    match client.get_about().await {
        Ok(info) => Ok(info),
        Err(err)
            if matches!(err.classification(), Some(ApiErrorClass::Auth))
                && provider.can_refresh() =>
        {
            warn!("access token rejected, refreshing");
            let refreshed = provider
                .refresh_now()
                .await
                .context("failed to refresh token after 401")?;
            let retry_client = build_client(http, base_url, &refreshed)?;
            Ok(retry_client.get_about().await?)
        }
        Err(err) => Err(err.into()),
    }
}

fn build_client(http: &Client, base_url: &str, token: &str) -> Result<DriveClient, DriveError> {
    DriveClient::with_http(http.clone(), base_url, token)
}

fn describe_account(about: &AboutInfo) -> String {
    about
        .user
        .as_ref()
        .and_then(|user| user.email_address.clone().or_else(|| user.display_name.clone()))
        .unwrap_or_else(|| "unknown account".to_string())
}
