mod claims;
mod client;
mod error;
mod provider;
mod utils;

pub use claims::email_from_id_token;
pub use client::{AuthClient, DEFAULT_AUTH_BASE_URL};
pub(crate) use client::USER_AGENT;
pub use error::AuthError;
pub use provider::{AuthProvider, BeginConnectionParams, TokenExchange, UserConnections};
pub use utils::{random_state, SIGN_IN_STATE_LEN};
