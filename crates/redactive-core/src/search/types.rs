use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of chunks requested when the caller does not say otherwise.
pub const DEFAULT_SEARCH_COUNT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_query: Option<String>,
}

impl Query {
    pub fn semantic<S: Into<String>>(query: S) -> Self {
        Self {
            semantic_query: Some(query.into()),
            keyword_query: None,
        }
    }

    pub fn keyword<S: Into<String>>(query: S) -> Self {
        Self {
            semantic_query: None,
            keyword_query: Some(query.into()),
        }
    }
}

/// Half-open time window; either bound may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeSpan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

/// Restrictions applied to search and document lookups.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Data sources or paths to search within (e.g. `confluence`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<TimeSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<TimeSpan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_content_in_trash: Option<bool>,
}

impl Filters {
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_emails = emails.into_iter().map(Into::into).collect();
        self
    }

    pub fn created_within(mut self, span: TimeSpan) -> Self {
        self.created = Some(span);
        self
    }

    pub fn modified_within(mut self, span: TimeSpan) -> Self {
        self.modified = Some(span);
        self
    }

    pub fn include_trash(mut self, include: bool) -> Self {
        self.include_content_in_trash = Some(include);
        self
    }
}

/// Identifies a document either by its name or by its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    Name(String),
    Url(String),
}

impl DocumentRef {
    pub fn as_str(&self) -> &str {
        match self {
            DocumentRef::Name(value) | DocumentRef::Url(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    pub system: String,
    #[serde(default)]
    pub system_version: String,
    #[serde(default)]
    pub connection_id: String,
    pub document_id: String,
    #[serde(default)]
    pub document_version: String,
    #[serde(default)]
    pub document_path: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReference {
    #[serde(default)]
    pub chunking_version: String,
    pub chunk_id: String,
    #[serde(default)]
    pub chunk_hash: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relevance {
    pub similarity_score: f32,
}

/// A chunk returned by a semantic query, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantChunk {
    pub source: SourceReference,
    pub chunk: ChunkReference,
    #[serde(default)]
    pub relevance: Relevance,
    pub chunk_body: String,
    #[serde(default)]
    pub document_metadata: ChunkMetadata,
}

/// A chunk of a document retrieved by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub source: SourceReference,
    pub chunk: ChunkReference,
    pub chunk_body: String,
    #[serde(default)]
    pub document_metadata: ChunkMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filters_serialize_to_empty_object() {
        let json = serde_json::to_value(Filters::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn filters_use_camel_case_fields() {
        let filters = Filters::default()
            .with_scope(["confluence"])
            .with_user_emails(["ada@example.com"])
            .include_trash(true);
        let json = serde_json::to_value(filters).unwrap();
        assert_eq!(json["scope"], serde_json::json!(["confluence"]));
        assert_eq!(json["userEmails"], serde_json::json!(["ada@example.com"]));
        assert_eq!(json["includeContentInTrash"], serde_json::json!(true));
    }

    #[test]
    fn relevant_chunk_tolerates_missing_optional_sections() {
        let chunk: RelevantChunk = serde_json::from_value(serde_json::json!({
            "source": { "system": "confluence", "documentId": "doc-1" },
            "chunk": { "chunkId": "c-1" },
            "chunkBody": "hello"
        }))
        .unwrap();
        assert_eq!(chunk.chunk_body, "hello");
        assert_eq!(chunk.relevance.similarity_score, 0.0);
        assert!(chunk.document_metadata.link.is_none());
    }
}
