#![allow(dead_code)]

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memsift::config::{RetrievalConfig, ScoringConfig};
use memsift::db;
use memsift::embedding::{EmbeddingError, EmbeddingProvider};
use memsift::memory::filter::Filters;
use memsift::memory::store::add_memory;
use memsift::memory::types::Metadata;
use memsift::retrieval::{
    IndexError, IndexHit, LexicalIndex, Retriever, SqliteLexicalIndex, SqliteVectorIndex,
    VectorIndex,
};
use rusqlite::Connection;
use tempfile::TempDir;

pub const DIMS: usize = 16;
pub const MODEL: &str = "stub-v1";

pub type SharedDb = Arc<Mutex<Connection>>;

/// A database file in its own temp directory, plus a writer connection.
///
/// Derefs to the writer so helpers like [`insert`] take `&mut TestDb` directly.
/// [`TestDb::connect`] opens further connections, one per adapter, the way
/// the CLI does.
pub struct TestDb {
    _dir: TempDir,
    path: PathBuf,
    dims: usize,
    conn: Connection,
}

impl TestDb {
    pub fn connect(&self) -> SharedDb {
        shared(db::open_database(&self.path, self.dims).unwrap())
    }
}

impl Deref for TestDb {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for TestDb {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Fresh on-disk database with schema and migrations applied.
pub fn test_db() -> TestDb {
    test_db_with(DIMS)
}

pub fn test_db_with(dims: usize) -> TestDb {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memsift.db");
    let conn = db::open_database(&path, dims).unwrap();
    TestDb {
        _dir: dir,
        path,
        dims,
        conn,
    }
}

pub fn shared(conn: Connection) -> SharedDb {
    Arc::new(Mutex::new(conn))
}

/// Unit vector along axis `i`.
pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[i % DIMS] = 1.0;
    v
}

/// Insert a memory created `age_days` ago with the default stub model.
pub fn insert(conn: &mut Connection, owner: &str, text: &str, emb: &[f32], age_days: i64) -> String {
    insert_at(conn, owner, text, emb, Utc::now() - chrono::Duration::days(age_days))
}

pub fn insert_at(
    conn: &mut Connection,
    owner: &str,
    text: &str,
    emb: &[f32],
    created_at: DateTime<Utc>,
) -> String {
    add_memory(conn, owner, text, &Metadata::new(), emb, MODEL, created_at).unwrap()
}

pub fn insert_with_meta(
    conn: &mut Connection,
    owner: &str,
    text: &str,
    emb: &[f32],
    metadata: serde_json::Value,
) -> String {
    let metadata = metadata.as_object().cloned().unwrap();
    add_memory(conn, owner, text, &metadata, emb, MODEL, Utc::now()).unwrap()
}

/// Embedder returning preset vectors per text, `axis(0)` otherwise.
///
/// The first `failures` calls fail with `Unavailable`.
pub struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    failures: AtomicUsize,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing(self, times: usize) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EmbeddingError::Unavailable("stub outage".into()));
        }
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| axis(0)))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_version(&self) -> &str {
        MODEL
    }
}

/// Index that sleeps, then either fails or returns nothing. Sets `finished`
/// only if it ran to completion.
pub struct FaultyIndex {
    pub delay: Duration,
    pub fail: bool,
    pub finished: Arc<AtomicBool>,
}

impl FaultyIndex {
    pub fn failing() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: true,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn run(&self) -> Result<Vec<IndexHit>, IndexError> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        if self.fail {
            Err(IndexError::Storage("injected failure".into()))
        } else {
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl VectorIndex for FaultyIndex {
    async fn search(
        &self,
        _vector: &[f32],
        _model_version: &str,
        _owner_id: &str,
        _limit: usize,
        _filters: &Filters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.run().await
    }
}

#[async_trait]
impl LexicalIndex for FaultyIndex {
    async fn search(
        &self,
        _query_text: &str,
        _owner_id: &str,
        _limit: usize,
        _filters: &Filters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.run().await
    }
}

/// Generous timeouts so the SQLite adapters never trip them on a loaded machine.
pub fn test_config() -> RetrievalConfig {
    RetrievalConfig {
        vector_timeout_ms: 2_000,
        lexical_timeout_ms: 2_000,
        embed_retry_backoff_ms: 1,
        ..RetrievalConfig::default()
    }
}

pub fn retriever_with(
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    config: &RetrievalConfig,
) -> Retriever {
    Retriever::new(embedder, vector, lexical, config, &ScoringConfig::default())
}

/// Retriever over both SQLite adapters, each on its own connection to `db`.
pub fn sqlite_retriever(db: &TestDb, embedder: Arc<dyn EmbeddingProvider>) -> Retriever {
    retriever_with(
        embedder,
        Arc::new(SqliteVectorIndex::new(db.connect())),
        Arc::new(SqliteLexicalIndex::new(db.connect())),
        &test_config(),
    )
}
