use std::fmt;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{Chunk, DocumentRef, Filters, Query, RelevantChunk, SearchProvider};
use crate::auth::USER_AGENT;

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://grpc.redactive.ai";

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Errors returned by the search client.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("invalid search endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("search service reported failure: {0}")]
    Service(ServiceFault),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;

/// Error object attached to an unsuccessful search response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceFault {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.details.is_empty()) {
            (Some(message), true) => write!(f, "{message}"),
            (Some(message), false) => write!(
                f,
                "{message} {}",
                serde_json::Value::Object(self.details.clone())
            ),
            (None, false) => write!(f, "{}", serde_json::Value::Object(self.details.clone())),
            (None, true) => write!(f, "unspecified error"),
        }
    }
}

/// HTTP client for the Redactive search service.
///
/// One instance owns one pooled connection set; build it once and share it.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: Client,
    base_url: Url,
}

impl SearchClient {
    pub fn new() -> SearchResult<Self> {
        let base_url = Url::parse(DEFAULT_SEARCH_BASE_URL)
            .map_err(|err| SearchError::InvalidEndpoint(err.to_string()))?;
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: Url) -> SearchResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(SearchError::InvalidEndpoint(base_url.to_string()));
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, method: &str) -> SearchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "search", "v2", method]);
        Ok(url)
    }

    async fn post<T, R>(&self, method: &str, access_token: &str, body: T) -> SearchResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(method)?)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::HttpStatus { status, body: text });
        }

        let bytes = response.bytes().await?;
        let envelope: ResponseEnvelope<R> = serde_json::from_slice(&bytes)?;
        envelope.into_outcome().into_result()
    }
}

#[async_trait]
impl SearchProvider for SearchClient {
    async fn search_chunks(
        &self,
        access_token: &str,
        query: &Query,
        count: u32,
        filters: Option<&Filters>,
    ) -> SearchResult<Vec<RelevantChunk>> {
        #[derive(Serialize)]
        struct Request<'a> {
            count: u32,
            query: &'a Query,
            #[serde(skip_serializing_if = "Option::is_none")]
            filters: Option<&'a Filters>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            #[serde(default)]
            relevant_chunks: Vec<RelevantChunk>,
        }

        debug!(count, filtered = filters.is_some(), "searching chunks");
        let payload: Payload = self
            .post(
                "search-chunks",
                access_token,
                Request {
                    count,
                    query,
                    filters,
                },
            )
            .await?;
        Ok(payload.relevant_chunks)
    }

    async fn get_document(
        &self,
        access_token: &str,
        reference: &DocumentRef,
        filters: Option<&Filters>,
    ) -> SearchResult<Vec<Chunk>> {
        #[derive(Serialize)]
        struct Request<'a> {
            #[serde(rename = "ref")]
            reference: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            filters: Option<&'a Filters>,
        }

        #[derive(Deserialize)]
        struct Payload {
            #[serde(default)]
            chunks: Vec<Chunk>,
        }

        debug!(filtered = filters.is_some(), "fetching document chunks");
        let payload: Payload = self
            .post(
                "get-document",
                access_token,
                Request {
                    reference: reference.as_str(),
                    filters,
                },
            )
            .await?;
        Ok(payload.chunks)
    }
}

/// Result of a search call as reported by the service.
#[derive(Debug)]
enum Outcome<T> {
    Success(T),
    Failure(ServiceFault),
}

impl<T> Outcome<T> {
    fn into_result(self) -> SearchResult<T> {
        match self {
            Outcome::Success(payload) => Ok(payload),
            Outcome::Failure(fault) => Err(SearchError::Service(fault)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<ServiceFault>,
    #[serde(flatten)]
    payload: T,
}

impl<T> ResponseEnvelope<T> {
    // Unset `success` counts as success unless an error object is attached.
    fn into_outcome(self) -> Outcome<T> {
        match (self.success, self.error) {
            (_, Some(fault)) => Outcome::Failure(fault),
            (Some(false), None) => Outcome::Failure(ServiceFault::default()),
            _ => Outcome::Success(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> SearchClient {
        SearchClient::with_base_url(Url::parse(&server.base_url()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn search_chunks_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/search/v2/search-chunks")
                .header("authorization", "Bearer id1")
                .json_body(serde_json::json!({
                    "count": 3,
                    "query": { "semanticQuery": "quarterly roadmap" },
                    "filters": { "scope": ["confluence"] }
                }));
            then.status(200).json_body_obj(&serde_json::json!({
                "success": true,
                "relevantChunks": [
                    {
                        "source": { "system": "confluence", "documentId": "doc-1", "documentName": "Roadmap" },
                        "chunk": { "chunkId": "c-1", "chunkHash": "h" },
                        "relevance": { "similarityScore": 0.87 },
                        "chunkBody": "Q3 goals",
                        "documentMetadata": { "link": "https://wiki/doc-1" }
                    }
                ]
            }));
        });

        let filters = Filters::default().with_scope(["confluence"]);
        let chunks = client(&server)
            .search_chunks("id1", &Query::semantic("quarterly roadmap"), 3, Some(&filters))
            .await
            .unwrap();
        mock.assert();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_body, "Q3 goals");
        assert_eq!(chunks[0].source.document_name.as_deref(), Some("Roadmap"));
    }

    #[tokio::test]
    async fn get_document_sends_reference() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/search/v2/get-document")
                .json_body(serde_json::json!({ "ref": "https://wiki/doc-1" }));
            then.status(200).json_body_obj(&serde_json::json!({
                "success": true,
                "chunks": [
                    {
                        "source": { "system": "confluence", "documentId": "doc-1" },
                        "chunk": { "chunkId": "c-1" },
                        "chunkBody": "first"
                    },
                    {
                        "source": { "system": "confluence", "documentId": "doc-1" },
                        "chunk": { "chunkId": "c-2" },
                        "chunkBody": "second"
                    }
                ]
            }));
        });

        let chunks = client(&server)
            .get_document("id1", &DocumentRef::Url("https://wiki/doc-1".into()), None)
            .await
            .unwrap();
        mock.assert();
        let bodies: Vec<_> = chunks.iter().map(|chunk| chunk.chunk_body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn service_failure_is_typed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/search/v2/search-chunks");
            then.status(200).json_body_obj(&serde_json::json!({
                "success": false,
                "error": { "message": "connection revoked", "provider": "slack" }
            }));
        });

        let err = client(&server)
            .search_chunks("id1", &Query::semantic("x"), 1, None)
            .await
            .unwrap_err();
        match err {
            SearchError::Service(fault) => {
                assert_eq!(fault.message.as_deref(), Some("connection revoked"));
                assert_eq!(fault.details["provider"], serde_json::json!("slack"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_status_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/search/v2/get-document");
            then.status(401).body("expired token");
        });

        let err = client(&server)
            .get_document("stale", &DocumentRef::Name("Roadmap".into()), None)
            .await
            .unwrap_err();
        match err {
            SearchError::HttpStatus { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "expired token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_success_flag_without_error_is_success() {
        let envelope: ResponseEnvelope<serde_json::Value> =
            serde_json::from_value(serde_json::json!({ "chunks": [] })).unwrap();
        assert!(matches!(envelope.into_outcome(), Outcome::Success(_)));
    }
}
