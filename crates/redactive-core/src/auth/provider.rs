use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::AuthError;

/// Parameters for starting a provider connection flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginConnectionParams {
    pub provider: String,
    pub redirect_uri: Url,
    pub state: Option<String>,
    pub endpoint: Option<String>,
    pub code_param_alias: Option<String>,
}

impl BeginConnectionParams {
    pub fn new<S: Into<String>>(provider: S, redirect_uri: Url) -> Self {
        Self {
            provider: provider.into(),
            redirect_uri,
            state: None,
            endpoint: None,
            code_param_alias: None,
        }
    }

    pub fn with_state<S: Into<String>>(mut self, state: S) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Provider-specific endpoint, e.g. a self-hosted instance URL.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Query parameter name under which the callback receives the code.
    pub fn with_code_param_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.code_param_alias = Some(alias.into());
        self
    }
}

/// Tokens minted by a code or refresh-token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchange {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchange")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Providers a user currently has authorized.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserConnections {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "current_connections")]
    pub connections: Vec<String>,
}

/// Remote operations offered by the auth service.
///
/// Implementations are stateless request/response wrappers; timeouts and retries
/// belong to the implementation, not to callers.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Obtain the provider-specific URL a user's browser should be sent to.
    async fn begin_connection(&self, params: &BeginConnectionParams) -> Result<String, AuthError>;

    /// Exchange an authorization code or a refresh token for fresh tokens.
    ///
    /// The implementation decides precedence when both are given and rejects a call with neither.
    async fn exchange_tokens(
        &self,
        code: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<TokenExchange, AuthError>;

    async fn list_connections(&self, id_token: &str) -> Result<UserConnections, AuthError>;
}

#[async_trait]
impl<T> AuthProvider for Arc<T>
where
    T: AuthProvider + ?Sized,
{
    async fn begin_connection(&self, params: &BeginConnectionParams) -> Result<String, AuthError> {
        (**self).begin_connection(params).await
    }

    async fn exchange_tokens(
        &self,
        code: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<TokenExchange, AuthError> {
        (**self).exchange_tokens(code, refresh_token).await
    }

    async fn list_connections(&self, id_token: &str) -> Result<UserConnections, AuthError> {
        (**self).list_connections(id_token).await
    }
}
