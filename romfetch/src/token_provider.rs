use romfetch_core::{OAuthClient, OAuthError};
use thiserror::Error;
use tracing::debug;

use crate::storage::{OAuthState, now_unix};

/// Access tokens are renewed this long before Google would reject them.
const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("oauth client is required to refresh expired token")]
    MissingOAuthClient,
    #[error("refresh token is missing")]
    MissingRefreshToken,
    #[error("oauth refresh failed: {0}")]
    OAuth(#[from] OAuthError),
}

/// Stored Google credentials plus the client able to renew them.
pub struct TokenProvider {
    state: OAuthState,
    oauth_client: Option<OAuthClient>,
}

impl TokenProvider {
    pub fn new(state: OAuthState, oauth_client: Option<OAuthClient>) -> Self {
        Self {
            state,
            oauth_client,
        }
    }

    pub fn state(&self) -> &OAuthState {
        &self.state
    }

    pub fn can_refresh(&self) -> bool {
        self.oauth_client.is_some() && self.state.refresh_token.is_some()
    }

    pub async fn valid_access_token(&mut self) -> Result<String, TokenProviderError> {
        if self.state.expires_within(REFRESH_SKEW_SECS, now_unix()) {
            debug!("access token expires soon, refreshing");
            return self.refresh_now().await;
        }
        Ok(self.state.access_token.clone())
    }

    /// Trades the refresh token for a new access token.
    pub async fn refresh_now(&mut self) -> Result<String, TokenProviderError> {
        let refresh_token = self
            .state
            .refresh_token
            .as_deref()
            .ok_or(TokenProviderError::MissingRefreshToken)?;
        let client = self
            .oauth_client
            .as_ref()
            .ok_or(TokenProviderError::MissingOAuthClient)?;
        let grant = client.refresh_token(refresh_token).await?;
        self.state = self.state.refreshed(&grant, now_unix());
        Ok(self.state.access_token.clone())
    }
}
