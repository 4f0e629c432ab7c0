use std::time::Duration as StdDuration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{AuthError, AuthProvider, BeginConnectionParams, TokenExchange, UserConnections};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://api.redactive.ai";
pub(crate) const USER_AGENT: &str = "redactive-sdk-rust";

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// HTTP client for the Redactive auth service.
///
/// Begin-connection and token-exchange calls authenticate with the application's API key;
/// connection listing authenticates with the user's id token.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl AuthClient {
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self, AuthError> {
        Self::with_base_url(api_key, Url::parse(DEFAULT_AUTH_BASE_URL)?)
    }

    pub fn with_base_url<S: Into<String>>(api_key: S, base_url: Url) -> Result<Self, AuthError> {
        if base_url.cannot_be_a_base() {
            return Err(AuthError::InvalidBaseUrl(base_url.to_string()));
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AuthError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AuthError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<R>(response: reqwest::Response) -> Result<R, AuthError>
    where
        R: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint { status, body });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for AuthClient {
    async fn begin_connection(&self, params: &BeginConnectionParams) -> Result<String, AuthError> {
        let mut url = self.endpoint(&["api", "auth", "connect", &params.provider, "url"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("redirect_uri", params.redirect_uri.as_str());
            if let Some(endpoint) = &params.endpoint {
                pairs.append_pair("endpoint", endpoint);
            }
            if let Some(state) = &params.state {
                pairs.append_pair("state", state);
            }
            if let Some(alias) = &params.code_param_alias {
                pairs.append_pair("code_param_alias", alias);
            }
        }

        debug!(provider = %params.provider, "requesting connection URL");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let payload: BeginConnectionResponse = Self::read_json(response).await?;
        Ok(payload.url)
    }

    async fn exchange_tokens(
        &self,
        code: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<TokenExchange, AuthError> {
        let code = code.filter(|value| !value.is_empty());
        let refresh_token = refresh_token.filter(|value| !value.is_empty());
        if code.is_none() && refresh_token.is_none() {
            return Err(AuthError::MissingGrant);
        }

        let url = self.endpoint(&["api", "auth", "token"])?;
        let grant_kind = if code.is_some() { "code" } else { "refresh_token" };
        debug!(grant = grant_kind, "exchanging tokens");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&TokenRequest {
                code,
                refresh_token,
            })
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn list_connections(&self, id_token: &str) -> Result<UserConnections, AuthError> {
        let url = self.endpoint(&["api", "auth", "connections"])?;
        let response = self.http.get(url).bearer_auth(id_token).send().await?;
        Self::read_json(response).await
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BeginConnectionResponse {
    url: String,
}
