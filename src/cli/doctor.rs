//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::MemsiftConfig;
use crate::db;

pub fn doctor(config: &MemsiftConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `memsift add` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path, config.embedding.dimensions)
        .context("failed to open database (may be corrupt or built for another width)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("memsift health report");
    println!("=====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    match report.embedding_dimensions {
        Some(d) => println!("Dimensions:        {d}"),
        None => println!("Dimensions:        (not set)"),
    }
    println!();
    println!("Memories:          {}", report.memory_count);
    println!("Owners:            {}", report.owner_count);
    println!("By embedding model:");
    for (model, count) in &report.model_counts {
        println!("  {model:<24} {count}");
    }
    if report.model_counts.len() > 1 {
        println!("  Note: only memories from the active model are vector-searchable.");
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
