use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the auth service client and token helpers.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("auth endpoint error {status}: {body}")]
    Endpoint { status: StatusCode, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("base URL '{0}' cannot carry a path")]
    InvalidBaseUrl(String),
    #[error("token exchange requires an authorization code or a refresh token")]
    MissingGrant,
    #[error("malformed id token: {0}")]
    MalformedIdToken(String),
    #[error("token lifetime of {0} seconds is out of range")]
    InvalidExpiry(i64),
}
