//! The retrieval entry point.
//!
//! [`Retriever::retrieve`] validates the request, embeds the query (through the
//! cache), runs vector and lexical search concurrently under per-source
//! timeouts, re-checks every hit against the owner scope, then merges and ranks.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::QueryEmbeddingCache;
use super::error::{IndexError, RetrievalError};
use super::index::{IndexHit, LexicalIndex, VectorIndex};
use super::merge::merge_candidates;
use super::rank::{rank_candidates, RankedResult, ScoringWeights};
use super::task::AbortOnDrop;
use crate::config::{RetrievalConfig, ScoringConfig, TOP_K_LIMIT};
use crate::embedding::{ensure_dimensions, EmbeddingError, EmbeddingProvider};
use crate::memory::filter::Filters;

/// One call to [`Retriever::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: String,
    /// Required. `None` or an empty id is rejected with
    /// [`RetrievalError::ScopeRequired`].
    pub owner_id: Option<String>,
    /// `None` uses `retrieval.default_top_k`.
    pub top_k: Option<usize>,
    pub filters: Filters,
    pub threshold: Option<f64>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            owner_id: Some(owner_id.into()),
            top_k: None,
            filters: Filters::new(),
            threshold: None,
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// A candidate source that can fail independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Vector,
    Lexical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResponse {
    pub results: Vec<RankedResult>,
    /// True when one source failed and results come from the other alone.
    pub partial: bool,
    /// The source that failed, when `partial` is set.
    pub degraded: Option<Source>,
}

pub struct Retriever {
    embedding: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    cache: QueryEmbeddingCache,
    config: RetrievalConfig,
    weights: ScoringWeights,
}

impl Retriever {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        vector: Arc<dyn VectorIndex>,
        lexical: Arc<dyn LexicalIndex>,
        retrieval: &RetrievalConfig,
        scoring: &ScoringConfig,
    ) -> Self {
        Self {
            embedding,
            vector,
            lexical,
            cache: QueryEmbeddingCache::new(
                retrieval.query_cache_capacity,
                retrieval.query_cache_ttl(),
            ),
            config: retrieval.clone(),
            weights: ScoringWeights::from_config(scoring),
        }
    }

    fn max_top_k(&self) -> usize {
        self.config.max_top_k.clamp(1, TOP_K_LIMIT)
    }

    /// Rank `owner_id`'s memories against `query`.
    ///
    /// Dropping the returned future cancels both index searches.
    pub async fn retrieve(
        &self,
        request: RetrievalRequest,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let started = Instant::now();
        let RetrievalRequest {
            query,
            owner_id,
            top_k,
            filters,
            threshold,
        } = request;

        let top_k = top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 || top_k > self.max_top_k() {
            return Err(RetrievalError::InvalidArgument(format!(
                "top_k must be between 1 and {}, got {top_k}",
                self.max_top_k()
            )));
        }
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidArgument(
                "query must not be empty".into(),
            ));
        }
        if threshold.is_some_and(|t| !t.is_finite()) {
            return Err(RetrievalError::InvalidArgument(
                "threshold must be a finite number".into(),
            ));
        }
        let owner_id = match owner_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(RetrievalError::ScopeRequired),
        };

        let model_version = self.embedding.model_version().to_string();
        let query_vector = self.embed_query(&owner_id, &query, &model_version).await?;

        let limit = top_k.saturating_mul(self.config.candidate_multiplier.max(1));
        let filters = Arc::new(filters);

        let vector_task = {
            let index = Arc::clone(&self.vector);
            let vector = Arc::clone(&query_vector);
            let model_version = model_version.clone();
            let owner_id = owner_id.clone();
            let filters = Arc::clone(&filters);
            AbortOnDrop::spawn(bounded(self.config.vector_timeout(), async move {
                index
                    .search(&vector, &model_version, &owner_id, limit, &filters)
                    .await
            }))
        };
        let lexical_task = {
            let index = Arc::clone(&self.lexical);
            let query = query.clone();
            let owner_id = owner_id.clone();
            let filters = Arc::clone(&filters);
            AbortOnDrop::spawn(bounded(self.config.lexical_timeout(), async move {
                index.search(&query, &owner_id, limit, &filters).await
            }))
        };

        let (vector_result, lexical_result) = tokio::join!(vector_task, lexical_task);
        let vector_result =
            vector_result.unwrap_or_else(|e| Err(IndexError::TaskFailed(e.to_string())));
        let lexical_result =
            lexical_result.unwrap_or_else(|e| Err(IndexError::TaskFailed(e.to_string())));

        let vector_hits = accept_hits(
            Source::Vector,
            vector_result,
            &owner_id,
            Some(model_version.as_str()),
            &filters,
        );
        let lexical_hits = accept_hits(Source::Lexical, lexical_result, &owner_id, None, &filters);

        let (vector_hits, lexical_hits, degraded) = match (vector_hits, lexical_hits) {
            (Some(v), Some(l)) => (v, l, None),
            (None, Some(l)) => (Vec::new(), l, Some(Source::Vector)),
            (Some(v), None) => (v, Vec::new(), Some(Source::Lexical)),
            (None, None) => {
                return Err(RetrievalError::RetrievalUnavailable(
                    "vector and lexical search both failed".into(),
                ))
            }
        };

        let (vector_count, lexical_count) = (vector_hits.len(), lexical_hits.len());
        let candidates = merge_candidates(vector_hits, lexical_hits, Utc::now());
        let candidate_count = candidates.len();

        let mut results = rank_candidates(candidates, &self.weights, top_k);
        if let Some(threshold) = threshold {
            results.retain(|r| r.final_score >= threshold);
        }

        info!(
            owner_id = %owner_id,
            vector_hits = vector_count,
            lexical_hits = lexical_count,
            candidates = candidate_count,
            results = results.len(),
            partial = degraded.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval complete"
        );

        Ok(RetrievalResponse {
            results,
            partial: degraded.is_some(),
            degraded,
        })
    }

    /// Embed through the cache. A provider outage is retried once after
    /// `embed_retry_backoff`.
    async fn embed_query(
        &self,
        owner_id: &str,
        query: &str,
        model_version: &str,
    ) -> Result<Arc<[f32]>, RetrievalError> {
        if let Some(cached) = self.cache.get(owner_id, query, model_version) {
            debug!(owner_id = %owner_id, "query embedding cache hit");
            return Ok(cached);
        }

        let vector = match self.embed_blocking(query).await {
            Ok(v) => v,
            Err(EmbeddingError::Unavailable(reason)) => {
                warn!(error = %reason, "query embedding failed, retrying once");
                tokio::time::sleep(self.config.embed_retry_backoff()).await;
                self.embed_blocking(query).await.map_err(|e| {
                    RetrievalError::RetrievalUnavailable(format!("query embedding failed: {e}"))
                })?
            }
            Err(e) => {
                return Err(RetrievalError::RetrievalUnavailable(format!(
                    "query embedding failed: {e}"
                )))
            }
        };

        let vector: Arc<[f32]> = Arc::from(vector);
        self.cache
            .insert(owner_id, query, model_version, Arc::clone(&vector));
        Ok(vector)
    }

    async fn embed_blocking(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let provider = Arc::clone(&self.embedding);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || provider.embed(&text))
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("embedding task failed: {e}")))??;
        ensure_dimensions(&vector, self.embedding.dimensions())?;
        Ok(vector)
    }
}

/// Run one index search under its own deadline.
///
/// SQL already running on the blocking pool finishes in the background after
/// a timeout; its result is discarded.
async fn bounded<F>(timeout: Duration, search: F) -> Result<Vec<IndexHit>, IndexError>
where
    F: Future<Output = Result<Vec<IndexHit>, IndexError>>,
{
    tokio::time::timeout(timeout, search)
        .await
        .unwrap_or(Err(IndexError::Timeout(timeout)))
}

/// Turn one source's outcome into usable hits, or `None` if the source failed.
///
/// Hits outside the owner scope, from another embedding model, or failing the
/// filters are dropped here whatever the adapter claims to have enforced.
fn accept_hits(
    source: Source,
    result: Result<Vec<IndexHit>, IndexError>,
    owner_id: &str,
    model_version: Option<&str>,
    filters: &Filters,
) -> Option<Vec<IndexHit>> {
    let mut hits = match result {
        Ok(hits) => hits,
        Err(e) => {
            warn!(source = ?source, error = %e, "index search failed, degrading");
            return None;
        }
    };

    hits.retain(|hit| {
        if hit.memory.owner_id != owner_id {
            warn!(
                source = ?source,
                memory_id = %hit.memory.id,
                "index returned a memory outside the owner scope, dropping"
            );
            return false;
        }
        if let Some(model) = model_version {
            if hit.memory.embedding_model != model {
                warn!(
                    memory_id = %hit.memory.id,
                    stored_model = %hit.memory.embedding_model,
                    query_model = %model,
                    "vector hit from a different embedding model, dropping"
                );
                return false;
            }
        }
        filters.matches(&hit.memory.metadata)
    });

    Some(hits)
}
