//! Query-side retrieval: embed the query, search the store.

use anyhow::Result;

use crate::embedding::Embedder;
use crate::store::{SearchHit, VectorStore};

/// Embed `query` and return the `limit` nearest chunks.
pub async fn search_store(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let vector = embedder.embed(query).await?;
    store.search(&vector, limit).await
}
