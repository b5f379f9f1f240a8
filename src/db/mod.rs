pub mod migrations;
pub mod schema;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the memsift database at the given path, with all extensions
/// loaded and schema initialized.
///
/// Fails if the database was created for a different embedding width.
pub fn open_database(path: impl AsRef<Path>, dimensions: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets the vector and lexical readers run beside the writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    prepare(&conn, dimensions)?;

    tracing::info!(path = %path.display(), dimensions, "database initialized");
    Ok(conn)
}

/// Open a private in-memory database with schema and migrations applied.
pub fn open_in_memory(dimensions: usize) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    prepare(&conn, dimensions)?;
    Ok(conn)
}

fn prepare(conn: &Connection, dimensions: usize) -> Result<()> {
    schema::init_schema(conn, dimensions).context("failed to initialize schema")?;
    migrations::run_migrations(conn).context("failed to run migrations")?;

    if let Some(stored) = schema::stored_dimensions(conn)? {
        if stored != dimensions {
            bail!(
                "database holds {stored}-dimensional embeddings but the provider produces \
                 {dimensions}; use a separate database per embedding width"
            );
        }
    }
    Ok(())
}

/// Summary of database state, printed by `memsift doctor`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub embedding_dimensions: Option<usize>,
    pub memory_count: i64,
    pub owner_count: i64,
    /// Memory counts grouped by the embedding model that produced their vectors.
    pub model_counts: Vec<(String, i64)>,
}

/// Run `PRAGMA integrity_check` and collect row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity_details: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .context("integrity check failed to run")?;
    let sqlite_vec_version: String =
        conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    let memory_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
    let owner_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT owner_id) FROM memories",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT embedding_model, COUNT(*) FROM memories \
         GROUP BY embedding_model ORDER BY embedding_model",
    )?;
    let model_counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HealthReport {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version: migrations::get_schema_version(conn)?,
        sqlite_vec_version,
        embedding_dimensions: schema::stored_dimensions(conn)?,
        memory_count,
        owner_count,
        model_counts,
    })
}
