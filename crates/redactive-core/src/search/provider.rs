use std::sync::Arc;

use async_trait::async_trait;

use super::{Chunk, DocumentRef, Filters, Query, RelevantChunk, SearchError};

/// Authenticated calls offered by the search service.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search_chunks(
        &self,
        access_token: &str,
        query: &Query,
        count: u32,
        filters: Option<&Filters>,
    ) -> Result<Vec<RelevantChunk>, SearchError>;

    async fn get_document(
        &self,
        access_token: &str,
        reference: &DocumentRef,
        filters: Option<&Filters>,
    ) -> Result<Vec<Chunk>, SearchError>;
}

#[async_trait]
impl<T> SearchProvider for Arc<T>
where
    T: SearchProvider + ?Sized,
{
    async fn search_chunks(
        &self,
        access_token: &str,
        query: &Query,
        count: u32,
        filters: Option<&Filters>,
    ) -> Result<Vec<RelevantChunk>, SearchError> {
        (**self)
            .search_chunks(access_token, query, count, filters)
            .await
    }

    async fn get_document(
        &self,
        access_token: &str,
        reference: &DocumentRef,
        filters: Option<&Filters>,
    ) -> Result<Vec<Chunk>, SearchError> {
        (**self).get_document(access_token, reference, filters).await
    }
}
