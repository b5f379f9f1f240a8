use anyhow::Result;

use crate::config::MemsiftConfig;

/// Store one memory and print its id.
pub async fn add(config: &MemsiftConfig, owner_id: &str, meta: &[String], text: &str) -> Result<()> {
    let metadata = super::parse_metadata(meta)?;
    let engine = super::open_engine(config)?;
    let id = engine.store.add(text, owner_id, metadata).await?;
    println!("{id}");
    Ok(())
}
