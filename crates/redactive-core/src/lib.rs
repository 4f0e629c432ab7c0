//! Multi-user session management for Redactive search.
//!
//! [`session::SessionManager`] drives per-user provider connection flows, keeps each
//! user's tokens fresh through an application-supplied [`session::CredentialStore`], and
//! forwards search calls with the user's id token attached.

pub mod auth;
pub mod config;
pub mod search;
pub mod session;

pub use auth::{AuthClient, AuthError, AuthProvider};
pub use config::{ClientConfig, ConnectionMode};
pub use search::{SearchClient, SearchError, SearchProvider};
pub use session::{CredentialRecord, CredentialStore, SessionError, SessionManager};
