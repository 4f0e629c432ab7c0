use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{CredentialRecord, CredentialStore, SessionError};
use crate::auth::{
    email_from_id_token, random_state, AuthClient, AuthProvider, BeginConnectionParams,
    SIGN_IN_STATE_LEN,
};
use crate::config::ClientConfig;
use crate::search::{
    Chunk, DocumentRef, Filters, Query, RelevantChunk, SearchClient, SearchProvider,
};

/// Optional provider parameters for a connection flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub endpoint: Option<String>,
    pub code_param_alias: Option<String>,
}

/// Coordinates per-user connection flows, token refresh and authenticated search.
///
/// Every operation re-reads the user's record from the store; nothing is cached in
/// process and no locking is done around read-check-refresh-write sequences. Concurrent
/// calls for the same user may refresh twice, and the last write wins.
pub struct SessionManager<A, S, C> {
    auth: A,
    search: S,
    store: C,
    callback_uri: Url,
}

impl<C> SessionManager<AuthClient, SearchClient, C>
where
    C: CredentialStore,
{
    /// Build a manager talking to the Redactive HTTP services.
    pub fn with_clients(
        api_key: impl Into<String>,
        callback_uri: Url,
        store: C,
        config: &ClientConfig,
    ) -> Result<Self, SessionError> {
        let auth = AuthClient::with_base_url(api_key, config.auth_base_url.clone())?;
        let search = SearchClient::with_base_url(config.search_base_url.clone())?;
        Ok(Self::new(auth, search, store, callback_uri))
    }
}

impl<A, S, C> SessionManager<A, S, C>
where
    A: AuthProvider,
    S: SearchProvider,
    C: CredentialStore,
{
    pub fn new(auth: A, search: S, store: C, callback_uri: Url) -> Self {
        Self {
            auth,
            search,
            store,
            callback_uri,
        }
    }

    pub fn callback_uri(&self) -> &Url {
        &self.callback_uri
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Start a connection flow and return the URL to send the user's browser to.
    pub async fn begin_connection_flow(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<String, SessionError> {
        self.begin_connection_flow_with(user_id, provider, ConnectionOptions::default())
            .await
    }

    #[instrument(skip_all, fields(user_id = %user_id, provider = %provider))]
    pub async fn begin_connection_flow_with(
        &self,
        user_id: &str,
        provider: &str,
        options: ConnectionOptions,
    ) -> Result<String, SessionError> {
        let state = random_state(SIGN_IN_STATE_LEN);
        let mut params =
            BeginConnectionParams::new(provider, self.callback_uri.clone()).with_state(&state);
        params.endpoint = options.endpoint;
        params.code_param_alias = options.code_param_alias;

        let url = self.auth.begin_connection(&params).await?;

        let mut record = self.store.read(user_id).await?.unwrap_or_default();
        record.sign_in_state = Some(state);
        self.store.write(user_id, Some(&record)).await?;

        info!("connection flow started");
        Ok(url)
    }

    /// Finish a connection flow from the callback's code and state.
    ///
    /// Returns `false` when there is no record, no state, or a state mismatch, without
    /// distinguishing between those cases.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn complete_connection_flow(
        &self,
        user_id: &str,
        code: &str,
        state: Option<&str>,
    ) -> Result<bool, SessionError> {
        let Some(presented) = state.filter(|value| !value.is_empty()) else {
            debug!("callback carried no state");
            return Ok(false);
        };
        let record = self.store.read(user_id).await?;
        if !record.is_some_and(|record| record.matches_sign_in_state(presented)) {
            debug!("callback state rejected");
            return Ok(false);
        }

        self.refresh_credential(user_id, None, Some(code)).await?;
        info!("connection flow completed");
        Ok(true)
    }

    /// Exchange a refresh token or authorization code and replace the user's record.
    ///
    /// The new record overwrites every previous field. The call only succeeds once the
    /// record is persisted; a store failure is returned as [`SessionError::Store`].
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn refresh_credential(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
        code: Option<&str>,
    ) -> Result<CredentialRecord, SessionError> {
        let tokens = self.auth.exchange_tokens(code, refresh_token).await?;
        let connections = self.auth.list_connections(&tokens.id_token).await?;
        let record =
            CredentialRecord::from_exchange(tokens, connections.connections, Utc::now())?;

        if let Err(err) = self.store.write(user_id, Some(&record)).await {
            warn!(error = %err, "refreshed credentials could not be persisted");
            return Err(err.into());
        }
        debug!(expiry = ?record.id_token_expiry, "credentials refreshed");
        Ok(record)
    }

    /// Read the `email` claim of the user's id token, without any network call or validation.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn email_for_user(&self, user_id: &str) -> Result<Option<String>, SessionError> {
        let Some(id_token) = self
            .store
            .read(user_id)
            .await?
            .and_then(|record| record.id_token)
        else {
            return Ok(None);
        };
        Ok(email_from_id_token(&id_token)?)
    }

    /// Providers the user has connected, refreshing silently when the cached list is stale.
    ///
    /// A user without a session has no connections; that is not an error.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn connections_for_user(&self, user_id: &str) -> Result<Vec<String>, SessionError> {
        let Some(record) = self.store.read(user_id).await? else {
            return Ok(Vec::new());
        };
        if record.has_live_id_token(Utc::now()) {
            return Ok(record.connections);
        }
        match record.refresh_token.as_deref() {
            Some(refresh_token) => {
                let refreshed = self
                    .refresh_credential(user_id, Some(refresh_token), None)
                    .await?;
                Ok(refreshed.connections)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Forget everything stored for the user. Clearing an absent record is fine.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn clear_session(&self, user_id: &str) -> Result<(), SessionError> {
        self.store.write(user_id, None).await?;
        info!("session cleared");
        Ok(())
    }

    /// Semantic or keyword search on behalf of the user.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn search_chunks(
        &self,
        user_id: &str,
        query: &Query,
        count: u32,
        filters: Option<&Filters>,
    ) -> Result<Vec<RelevantChunk>, SessionError> {
        let id_token = self.authorized_id_token(user_id).await?;
        Ok(self
            .search
            .search_chunks(&id_token, query, count, filters)
            .await?)
    }

    /// All chunks of one document, looked up by name or by URL.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn get_document(
        &self,
        user_id: &str,
        reference: &DocumentRef,
        filters: Option<&Filters>,
    ) -> Result<Vec<Chunk>, SessionError> {
        let id_token = self.authorized_id_token(user_id).await?;
        Ok(self
            .search
            .get_document(&id_token, reference, filters)
            .await?)
    }

    // Sole gate for search calls: a refresh token must be on file.
    async fn authorized_id_token(&self, user_id: &str) -> Result<String, SessionError> {
        let record = self
            .store
            .read(user_id)
            .await?
            .ok_or_else(|| SessionError::no_session(user_id))?;
        if !record.has_session() {
            return Err(SessionError::no_session(user_id));
        }

        let record = if record.id_token_needs_refresh(Utc::now()) {
            debug!("id token stale, refreshing before dispatch");
            self.refresh_credential(user_id, record.refresh_token.as_deref(), None)
                .await?
        } else {
            record
        };

        record
            .id_token
            .ok_or_else(|| SessionError::no_session(user_id))
    }
}
