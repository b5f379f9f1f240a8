pub mod add;
pub mod doctor;
pub mod forget;
pub mod search;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::config::MemsiftConfig;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::memory::filter::{FilterExpr, FilterValue, Filters};
use crate::memory::store::MemoryStore;
use crate::memory::types::Metadata;
use crate::retrieval::{Retriever, SqliteLexicalIndex, SqliteVectorIndex};

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Write path and read path over one on-disk database.
pub struct Engine {
    pub store: MemoryStore,
    pub retriever: Retriever,
}

/// Open the configured database and embedding provider.
///
/// The writer and each index adapter get their own connection so vector and
/// lexical searches do not queue on a shared lock.
pub fn open_engine(config: &MemsiftConfig) -> Result<Engine> {
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let db_path = config.resolved_db_path();
    let dimensions = provider.dimensions();

    let open = || -> Result<Arc<Mutex<rusqlite::Connection>>> {
        Ok(Arc::new(Mutex::new(db::open_database(&db_path, dimensions)?)))
    };

    let store = MemoryStore::new(open()?, Arc::clone(&provider));
    let retriever = Retriever::new(
        provider,
        Arc::new(SqliteVectorIndex::new(open()?)),
        Arc::new(SqliteLexicalIndex::new(open()?)),
        &config.retrieval,
        &config.scoring,
    );
    Ok(Engine { store, retriever })
}

/// Parse `--meta key=value` pairs into a metadata map.
pub fn parse_metadata(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("metadata must be key=value, got {pair:?}"))?;
        if key.is_empty() {
            bail!("metadata key must not be empty in {pair:?}");
        }
        metadata.insert(key.to_string(), FilterValue::parse_scalar(value).to_json());
    }
    Ok(metadata)
}

/// Parse `--filter` expressions: `key=value`, `key>=value`, `key<=value`,
/// or `key=a|b|c` for set membership. Repeated range bounds on one key combine.
pub fn parse_filters(exprs: &[String]) -> Result<Filters> {
    let mut filters = Filters::new();
    let mut ranges: Vec<(String, Option<FilterValue>, Option<FilterValue>)> = Vec::new();

    for raw in exprs {
        if let Some((key, value)) = raw.split_once(">=") {
            range_bound(&mut ranges, key, raw)?.1 = Some(FilterValue::parse_scalar(value));
        } else if let Some((key, value)) = raw.split_once("<=") {
            range_bound(&mut ranges, key, raw)?.2 = Some(FilterValue::parse_scalar(value));
        } else if let Some((key, value)) = raw.split_once('=') {
            check_key(key, raw)?;
            let expr = if value.contains('|') {
                FilterExpr::In(value.split('|').map(FilterValue::parse_scalar).collect())
            } else {
                FilterExpr::Eq(FilterValue::parse_scalar(value))
            };
            filters = filters.with(key, expr);
        } else {
            bail!("filter must be key=value, key>=value or key<=value, got {raw:?}");
        }
    }

    for (key, min, max) in ranges {
        filters = filters.with(key, FilterExpr::Range { min, max });
    }
    Ok(filters)
}

fn range_bound<'a>(
    ranges: &'a mut Vec<(String, Option<FilterValue>, Option<FilterValue>)>,
    key: &str,
    raw: &str,
) -> Result<&'a mut (String, Option<FilterValue>, Option<FilterValue>)> {
    check_key(key, raw)?;
    let idx = match ranges.iter().position(|(k, _, _)| k == key) {
        Some(idx) => idx,
        None => {
            ranges.push((key.to_string(), None, None));
            ranges.len() - 1
        }
    };
    Ok(&mut ranges[idx])
}

fn check_key(key: &str, raw: &str) -> Result<()> {
    if key.is_empty() {
        bail!("filter key must not be empty in {raw:?}");
    }
    Ok(())
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &crate::config::EmbeddingConfig) -> Result<()> {
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    for (name, url) in [("model.onnx", MODEL_URL), ("tokenizer.json", TOKENIZER_URL)] {
        let dest = cache_dir.join(name);
        if dest.exists() {
            println!("{name} already present at {}", dest.display());
            continue;
        }
        println!("Downloading {name}...");
        download_file(url, &dest).await?;
        println!("Saved {}", dest.display());
    }

    println!("Model ready. Set embedding.provider = \"local\" to use it.");
    Ok(())
}

/// Stream a file to disk with a progress bar. Writes to a temp file, then renames.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
