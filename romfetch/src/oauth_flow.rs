use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use romfetch_core::{DRIVE_READONLY_SCOPE, OAuthClient, OAuthToken};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

const MANUAL_REDIRECT_URI: &str = "http://localhost";
const CALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(10);
const STATE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] romfetch_core::OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid client secret file: {0}")]
    ClientSecret(#[from] serde_json::Error),
    #[error("client secret file has no installed or web section")]
    MissingClientSection,
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("authorization timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy)]
pub struct OAuthFlowOptions {
    pub force_manual: bool,
    pub timeout: Duration,
}

impl Default for OAuthFlowOptions {
    fn default() -> Self {
        Self {
            force_manual: false,
            timeout: Duration::from_secs(180),
        }
    }
}

/// Installed-app authorization against Google: a loopback redirect when a
/// browser is reachable, otherwise the user pastes the redirected URL.
pub struct OAuthFlow {
    client: OAuthClient,
    options: OAuthFlowOptions,
}

impl OAuthFlow {
    pub fn new(client: OAuthClient, options: OAuthFlowOptions) -> Self {
        Self { client, options }
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        if !self.options.force_manual {
            match self.authenticate_via_loopback().await {
                Ok(token) => return Ok(token),
                Err(err @ (OAuthFlowError::OAuth(_) | OAuthFlowError::StateMismatch)) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, "oauth loopback flow unavailable, falling back to manual code entry");
                }
            }
        }
        self.authenticate_manually().await
    }

    async fn authenticate_via_loopback(&self) -> Result<OAuthToken, OAuthFlowError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", addr.port());
        let state = random_state();
        let url = self
            .client
            .authorize_url(&redirect_uri, DRIVE_READONLY_SCOPE, Some(&state));

        eprintln!("Open this URL in your browser to grant read-only Drive access:\n{url}");
        open_in_browser(&url);
        info!(redirect_uri = %redirect_uri, "waiting for oauth callback");

        let (mut stream, _) = tokio::time::timeout(self.options.timeout, listener.accept())
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;

        let mut request = vec![0u8; 8192];
        let read = tokio::time::timeout(CALLBACK_READ_TIMEOUT, stream.read(&mut request))
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;
        let request_text = String::from_utf8_lossy(&request[..read]);
        let callback = parse_callback_request(&request_text);

        let body: &[u8] = if callback.code.is_some() {
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><h2>romfetch authorized</h2><p>You can close this tab.</p></body></html>"
        } else {
            b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><h2>Authorization failed</h2><p>Return to the terminal.</p></body></html>"
        };
        let _ = stream.write_all(body).await;
        let _ = stream.shutdown().await;

        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(OAuthFlowError::StateMismatch);
        }
        let code = callback.code.ok_or(OAuthFlowError::MissingCode)?;
        Ok(self.client.exchange_code(&code, &redirect_uri).await?)
    }

    async fn authenticate_manually(&self) -> Result<OAuthToken, OAuthFlowError> {
        let url = self
            .client
            .authorize_url(MANUAL_REDIRECT_URI, DRIVE_READONLY_SCOPE, None);
        eprintln!("Open this URL in your browser:\n{url}");
        eprintln!(
            "After granting access the browser is sent to {MANUAL_REDIRECT_URI}; \
             paste that full address (or just the code) here:"
        );

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        let code = extract_code_from_input(&line).ok_or(OAuthFlowError::MissingCode)?;
        debug!("exchanging manually entered authorization code");
        Ok(self.client.exchange_code(&code, MANUAL_REDIRECT_URI).await?)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
}

fn parse_callback_request(request: &str) -> Callback {
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return Callback::default();
    };
    let Ok(url) = Url::parse(&format!("http://127.0.0.1{target}")) else {
        return Callback::default();
    };
    let mut callback = Callback::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => callback.code = Some(value.into_owned()),
            "state" => callback.state = Some(value.into_owned()),
            _ => {}
        }
    }
    callback
}

pub fn extract_code_from_http_request(request: &str) -> Option<String> {
    parse_callback_request(request).code
}

/// Accepts either a bare authorization code or the full redirect URL.
pub fn extract_code_from_input(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find_map(|(key, value)| (key == "code" && !value.is_empty()).then(|| value.into_owned())),
        Err(_) => Some(input.to_string()),
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

fn open_in_browser(url: &Url) {
    let spawned = Command::new("xdg-open")
        .arg(url.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(err) = spawned {
        debug!(error = %err, "could not launch a browser");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

pub fn parse_client_secret(raw: &str) -> Result<ClientSecret, OAuthFlowError> {
    let file: ClientSecretFile = serde_json::from_str(raw)?;
    file.installed
        .or(file.web)
        .ok_or(OAuthFlowError::MissingClientSection)
}

/// Reads a `client_secret.json` as downloaded from the Google Cloud console.
pub async fn load_client_secret(path: &Path) -> Result<ClientSecret, OAuthFlowError> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_client_secret(&raw)
}
