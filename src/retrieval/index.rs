//! Index adapter contracts.
//!
//! The coordinator talks to storage only through [`VectorIndex`] and
//! [`LexicalIndex`]. Both must scope results to `owner_id` themselves; the
//! coordinator re-checks ownership on every hit regardless. `filters` must be
//! applied before `limit`, exactly as [`Filters::matches`] would, or matching
//! memories can be crowded out. The coordinator still post-filters every hit.

use async_trait::async_trait;

use super::error::IndexError;
use crate::memory::filter::Filters;
use crate::memory::types::MemoryRecord;

/// One scored match from an index, with the record it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub memory: MemoryRecord,
    /// Cosine similarity in `[-1, 1]` for vector hits; BM25 relevance `>= 0`
    /// for lexical hits.
    pub score: f64,
}

/// Nearest-neighbour search over stored embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` of `owner_id`'s memories embedded by `model_version`,
    /// ordered by descending cosine similarity to `vector`.
    async fn search(
        &self,
        vector: &[f32],
        model_version: &str,
        owner_id: &str,
        limit: usize,
        filters: &Filters,
    ) -> Result<Vec<IndexHit>, IndexError>;
}

/// Term-relevance search over stored text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Up to `limit` of `owner_id`'s memories ordered by descending relevance
    /// to `query_text`.
    async fn search(
        &self,
        query_text: &str,
        owner_id: &str,
        limit: usize,
        filters: &Filters,
    ) -> Result<Vec<IndexHit>, IndexError>;
}
