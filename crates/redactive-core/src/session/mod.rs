mod error;
mod manager;
mod record;
mod store;

pub use error::SessionError;
pub use manager::{ConnectionOptions, SessionManager};
pub use record::{token_expiry, CredentialRecord, EXPIRY_SAFETY_MARGIN_SECS};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
