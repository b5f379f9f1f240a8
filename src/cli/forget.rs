use anyhow::Result;

use crate::config::MemsiftConfig;

pub async fn forget(config: &MemsiftConfig, memory_id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    engine.store.delete(memory_id).await?;
    println!("Deleted {memory_id}");
    Ok(())
}
