//! Durable memory store: the write path and owner-scoped reads.
//!
//! [`add_memory`] inserts the row, syncs the FTS5 index and stores the vector in
//! one transaction. [`get_all`] and [`delete_memory`] complete the store
//! contract. [`MemoryStore`] wraps these with an embedding provider for async
//! callers. The retrieval core never calls into this module's writers.

use std::sync::{Arc, Mutex};

use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};

use super::filter::Filters;
use super::types::{Memory, MemoryRecord, Metadata};
use super::{bytes_to_embedding, embedding_to_bytes};
use crate::embedding::EmbeddingProvider;

/// Columns selected by [`record_from_row`], in order, for a `memories` alias `m`.
pub(crate) const RECORD_COLUMNS: &str =
    "m.id, m.owner_id, m.content, m.embedding_model, m.created_at, m.metadata";

/// Fixed-width RFC 3339 so that text order equals time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build a [`MemoryRecord`] from the first six columns of `row` (see [`RECORD_COLUMNS`]).
pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let created_raw: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let id: String = row.get(0)?;
    let metadata_str: Option<String> = row.get(5)?;
    let metadata = match metadata_str {
        Some(raw) => serde_json::from_str::<Metadata>(&raw).unwrap_or_else(|e| {
            tracing::warn!(id = %id, error = %e, "unreadable metadata, treating as empty");
            Metadata::new()
        }),
        None => Metadata::new(),
    };

    Ok(MemoryRecord {
        id,
        owner_id: row.get(1)?,
        text: row.get(2)?,
        embedding_model: row.get(3)?,
        created_at,
        metadata,
    })
}

/// Insert a memory with its vector. Returns the new UUID v7 id.
///
/// All writes run inside a transaction; a failure leaves no partial row in
/// any of the three tables.
pub fn add_memory(
    conn: &mut Connection,
    owner_id: &str,
    text: &str,
    metadata: &Metadata,
    embedding: &[f32],
    embedding_model: &str,
    created_at: DateTime<Utc>,
) -> Result<String> {
    ensure!(!owner_id.trim().is_empty(), "owner_id must not be empty");
    ensure!(!text.trim().is_empty(), "memory text must not be empty");
    if let Some(dims) = crate::db::schema::stored_dimensions(conn)? {
        ensure!(
            embedding.len() == dims,
            "embedding has {} dimensions, database expects {dims}",
            embedding.len()
        );
    }

    let tx = conn.transaction()?;
    let id = uuid::Uuid::now_v7().to_string();

    let rowid = insert_row(&tx, &id, owner_id, text, metadata, embedding_model, created_at)?;
    tx.execute(
        "INSERT INTO memories_fts (rowid, content, id) VALUES (?1, ?2, ?3)",
        params![rowid, text, id],
    )?;
    tx.execute(
        "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(embedding)],
    )?;

    tx.commit()?;
    tracing::debug!(id = %id, owner_id = %owner_id, "memory added");
    Ok(id)
}

fn insert_row(
    tx: &Transaction,
    id: &str,
    owner_id: &str,
    text: &str,
    metadata: &Metadata,
    embedding_model: &str,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let metadata_json = if metadata.is_empty() {
        None
    } else {
        Some(serde_json::to_string(metadata)?)
    };
    tx.execute(
        "INSERT INTO memories (id, owner_id, content, embedding_model, created_at, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            owner_id,
            text,
            embedding_model,
            format_timestamp(created_at),
            metadata_json
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// All of one owner's memories matching `filters`, newest first, at most `limit`.
pub fn get_all(
    conn: &Connection,
    owner_id: &str,
    filters: &Filters,
    limit: usize,
) -> Result<Vec<Memory>> {
    ensure!(!owner_id.trim().is_empty(), "owner_id must not be empty");

    let (filter_sql, filter_params) = filters.to_sql("m.metadata");
    let sql = format!(
        "SELECT {RECORD_COLUMNS}, v.embedding \
         FROM memories m JOIN memories_vec v ON v.id = m.id \
         WHERE m.owner_id = ?{filter_sql} \
         ORDER BY m.created_at DESC, m.id ASC LIMIT ?"
    );

    let mut bind: Vec<SqlValue> = Vec::with_capacity(filter_params.len() + 2);
    bind.push(SqlValue::Text(owner_id.to_string()));
    bind.extend(filter_params);
    bind.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |row| {
            let record = record_from_row(row)?;
            let blob: Vec<u8> = row.get(6)?;
            Ok((record, bytes_to_embedding(&blob)))
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to read memories")?;

    Ok(rows
        .into_iter()
        .map(|(r, embedding)| Memory {
            id: r.id,
            owner_id: r.owner_id,
            text: r.text,
            embedding,
            embedding_model: r.embedding_model,
            created_at: r.created_at,
            metadata: r.metadata,
        })
        .collect())
}

/// Permanently remove a memory from the row table, FTS5 index and vector table.
pub fn delete_memory(conn: &mut Connection, memory_id: &str) -> Result<()> {
    let tx = conn.transaction()?;

    let found: Option<(i64, String)> = tx
        .query_row(
            "SELECT rowid, content FROM memories WHERE id = ?1",
            params![memory_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((rowid, content)) = found else {
        bail!("memory not found: {memory_id}");
    };

    // External content tables need the old values to remove the postings
    tx.execute(
        "INSERT INTO memories_fts(memories_fts, rowid, content, id) VALUES('delete', ?1, ?2, ?3)",
        params![rowid, content, memory_id],
    )?;
    tx.execute("DELETE FROM memories_vec WHERE id = ?1", params![memory_id])?;
    tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;

    tx.commit()?;
    tracing::debug!(id = %memory_id, "memory deleted");
    Ok(())
}

/// Async front for the write path: embeds text with the configured provider,
/// then runs the SQLite work on the blocking pool.
#[derive(Clone)]
pub struct MemoryStore {
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
}

impl MemoryStore {
    pub fn new(db: Arc<Mutex<Connection>>, embedding: Arc<dyn EmbeddingProvider>) -> Self {
        Self { db, embedding }
    }

    /// Embed and store `text` for `owner_id`. Returns the memory id.
    pub async fn add(&self, text: &str, owner_id: &str, metadata: Metadata) -> Result<String> {
        let provider = Arc::clone(&self.embedding);
        let text_for_embed = text.to_string();
        let embedding = tokio::task::spawn_blocking(move || provider.embed(&text_for_embed))
            .await
            .context("embedding task failed")??;

        let db = Arc::clone(&self.db);
        let model = self.embedding.model_version().to_string();
        let text = text.to_string();
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            add_memory(
                &mut conn,
                &owner_id,
                &text,
                &metadata,
                &embedding,
                &model,
                Utc::now(),
            )
        })
        .await
        .context("db task failed")?
    }

    pub async fn get_all(
        &self,
        owner_id: &str,
        filters: Filters,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let db = Arc::clone(&self.db);
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            get_all(&conn, &owner_id, &filters, limit)
        })
        .await
        .context("db task failed")?
    }

    pub async fn delete(&self, memory_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let memory_id = memory_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            delete_memory(&mut conn, &memory_id)
        })
        .await
        .context("db task failed")?
    }
}
