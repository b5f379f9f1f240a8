//! Query-embedding cache using moka.
//!
//! Bounded entry count with a fixed TTL. Keys include the embedding model
//! version, so a provider swap never reuses vectors from the old space.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    owner_id: String,
    query: String,
    model_version: String,
}

/// Recent query embeddings, local to one [`Retriever`](super::Retriever).
pub struct QueryEmbeddingCache {
    cache: Cache<QueryKey, Arc<[f32]>>,
}

impl QueryEmbeddingCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn get(&self, owner_id: &str, query: &str, model_version: &str) -> Option<Arc<[f32]>> {
        self.cache.get(&key(owner_id, query, model_version))
    }

    /// Last writer wins when two callers miss on the same key.
    pub fn insert(&self, owner_id: &str, query: &str, model_version: &str, embedding: Arc<[f32]>) {
        self.cache.insert(key(owner_id, query, model_version), embedding);
    }
}

fn key(owner_id: &str, query: &str, model_version: &str) -> QueryKey {
    QueryKey {
        owner_id: owner_id.to_string(),
        query: query.to_string(),
        model_version: model_version.to_string(),
    }
}
