//! SQLite-backed index adapters.
//!
//! [`SqliteVectorIndex`] runs an exact cosine scan (sqlite-vec
//! `vec_distance_cosine`) over one owner's vectors; [`SqliteLexicalIndex`]
//! runs FTS5 BM25. Both execute on the blocking pool. Give each adapter its own
//! connection to the same WAL database so the two searches do not serialize
//! on one lock.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

use super::error::IndexError;
use super::index::{IndexHit, LexicalIndex, VectorIndex};
use crate::memory::embedding_to_bytes;
use crate::memory::filter::Filters;
use crate::memory::store::{record_from_row, RECORD_COLUMNS};

pub struct SqliteVectorIndex {
    db: Arc<Mutex<Connection>>,
}

impl SqliteVectorIndex {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        model_version: &str,
        owner_id: &str,
        limit: usize,
        filters: &Filters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let db = Arc::clone(&self.db);
        let blob = embedding_to_bytes(vector).to_vec();
        let model_version = model_version.to_string();
        let owner_id = owner_id.to_string();
        let filters = filters.clone();

        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| IndexError::Storage(format!("db lock poisoned: {e}")))?;
            vector_search(&conn, blob, &model_version, &owner_id, limit, &filters)
        })
        .await
        .map_err(|e| IndexError::TaskFailed(e.to_string()))?
    }
}

pub struct SqliteLexicalIndex {
    db: Arc<Mutex<Connection>>,
}

impl SqliteLexicalIndex {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LexicalIndex for SqliteLexicalIndex {
    async fn search(
        &self,
        query_text: &str,
        owner_id: &str,
        limit: usize,
        filters: &Filters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let match_expr = fts_match_expression(query_text);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let db = Arc::clone(&self.db);
        let owner_id = owner_id.to_string();
        let filters = filters.clone();

        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| IndexError::Storage(format!("db lock poisoned: {e}")))?;
            lexical_search(&conn, match_expr, &owner_id, limit, &filters)
        })
        .await
        .map_err(|e| IndexError::TaskFailed(e.to_string()))?
    }
}

/// Exact cosine scan over `owner_id`'s vectors from `model_version`.
///
/// Vectors from other models are never compared. A zero vector has no
/// direction; its similarity is reported as 0.
fn vector_search(
    conn: &Connection,
    query_blob: Vec<u8>,
    model_version: &str,
    owner_id: &str,
    limit: usize,
    filters: &Filters,
) -> Result<Vec<IndexHit>, IndexError> {
    let (filter_sql, filter_params) = filters.to_sql("m.metadata");
    let sql = format!(
        "SELECT {RECORD_COLUMNS}, \
         COALESCE(1.0 - vec_distance_cosine(v.embedding, ?), 0.0) AS similarity \
         FROM memories m JOIN memories_vec v ON v.id = m.id \
         WHERE m.owner_id = ? AND m.embedding_model = ?{filter_sql} \
         ORDER BY similarity DESC, m.id ASC LIMIT ?"
    );

    let mut bind = vec![
        SqlValue::Blob(query_blob),
        SqlValue::Text(owner_id.to_string()),
        SqlValue::Text(model_version.to_string()),
    ];
    bind.extend(filter_params);
    bind.push(SqlValue::Integer(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params_from_iter(bind), |row| {
            let similarity: f64 = row.get(6)?;
            Ok(IndexHit {
                memory: record_from_row(row)?,
                score: if similarity.is_finite() {
                    similarity.clamp(-1.0, 1.0)
                } else {
                    0.0
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

/// FTS5 BM25 search. FTS5 reports bm25 as negative (more negative = better),
/// so it is negated into a non-negative relevance.
fn lexical_search(
    conn: &Connection,
    match_expr: String,
    owner_id: &str,
    limit: usize,
    filters: &Filters,
) -> Result<Vec<IndexHit>, IndexError> {
    let (filter_sql, filter_params) = filters.to_sql("m.metadata");
    let sql = format!(
        "SELECT {RECORD_COLUMNS}, -bm25(memories_fts) AS relevance \
         FROM memories_fts JOIN memories m ON m.rowid = memories_fts.rowid \
         WHERE memories_fts MATCH ? AND m.owner_id = ?{filter_sql} \
         ORDER BY relevance DESC, m.id ASC LIMIT ?"
    );

    let mut bind = vec![SqlValue::Text(match_expr), SqlValue::Text(owner_id.to_string())];
    bind.extend(filter_params);
    bind.push(SqlValue::Integer(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params_from_iter(bind), |row| {
            let relevance: f64 = row.get(6)?;
            Ok(IndexHit {
                memory: record_from_row(row)?,
                score: relevance.max(0.0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

/// Build an FTS5 MATCH expression from free text.
///
/// Each word is quoted so FTS5 syntax characters are inert, words without any
/// alphanumeric character are dropped, and terms are OR-ed so partial overlap
/// still scores.
fn fts_match_expression(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.replace('"', ""))
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .map(|word| format!("\"{word}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
