use thiserror::Error;

use super::StoreError;
use crate::auth::AuthError;
use crate::search::SearchError;

/// Errors surfaced by the session manager.
///
/// Upstream failures are passed through untouched; only the missing-session case is
/// produced here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no valid Redactive session for user '{user_id}'")]
    NoSession { user_id: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub(crate) fn no_session(user_id: &str) -> Self {
        SessionError::NoSession {
            user_id: user_id.to_owned(),
        }
    }

    /// Whether the caller should send the user through the connection flow again.
    pub fn requires_connection(&self) -> bool {
        matches!(self, SessionError::NoSession { .. })
    }
}
