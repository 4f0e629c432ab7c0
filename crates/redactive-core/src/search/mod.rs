mod client;
mod provider;
mod types;

pub use client::{SearchClient, SearchError, SearchResult, ServiceFault, DEFAULT_SEARCH_BASE_URL};
pub use provider::SearchProvider;
pub use types::{
    Chunk, ChunkMetadata, ChunkReference, DocumentRef, Filters, Query, Relevance, RelevantChunk,
    SourceReference, TimeSpan, DEFAULT_SEARCH_COUNT,
};
