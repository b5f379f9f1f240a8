use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Hard upper bound on `top_k` accepted by the retrieval coordinator.
pub const TOP_K_LIMIT: usize = 50;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemsiftConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub candidate_multiplier: usize,
    pub vector_timeout_ms: u64,
    pub lexical_timeout_ms: u64,
    pub embed_retry_backoff_ms: u64,
    pub query_cache_ttl_secs: u64,
    pub query_cache_capacity: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub w_vector: f64,
    pub w_lexical: f64,
    pub w_recency: f64,
    pub recency_scale_days: f64,
}

impl Default for MemsiftConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_memsift_dir()
            .join("memsift.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_memsift_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            dimensions: crate::embedding::DEFAULT_DIMENSIONS,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: TOP_K_LIMIT,
            candidate_multiplier: 3,
            vector_timeout_ms: 80,
            lexical_timeout_ms: 80,
            embed_retry_backoff_ms: 50,
            query_cache_ttl_secs: 60,
            query_cache_capacity: 1024,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_vector: 0.5,
            w_lexical: 0.3,
            w_recency: 0.2,
            recency_scale_days: 1.0,
        }
    }
}

impl RetrievalConfig {
    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }

    pub fn lexical_timeout(&self) -> Duration {
        Duration::from_millis(self.lexical_timeout_ms)
    }

    pub fn embed_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.embed_retry_backoff_ms)
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_secs)
    }
}

/// Returns `~/.memsift/`
pub fn default_memsift_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memsift")
}

/// Returns the default config file path: `~/.memsift/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memsift_dir().join("config.toml")
}

impl MemsiftConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, apply env var overrides, then validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemsiftConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MEMSIFT_DB, MEMSIFT_LOG_LEVEL, MEMSIFT_EMBEDDING_PROVIDER).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMSIFT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMSIFT_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMSIFT_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
    }

    /// Reject settings the retrieval engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be greater than zero"
        );
        ensure!(
            (1..=TOP_K_LIMIT).contains(&self.retrieval.max_top_k),
            "retrieval.max_top_k must be between 1 and {TOP_K_LIMIT}"
        );
        ensure!(
            (1..=self.retrieval.max_top_k).contains(&self.retrieval.default_top_k),
            "retrieval.default_top_k must be between 1 and retrieval.max_top_k"
        );
        ensure!(
            self.retrieval.candidate_multiplier > 0,
            "retrieval.candidate_multiplier must be greater than zero"
        );
        ensure!(
            self.retrieval.query_cache_capacity > 0,
            "retrieval.query_cache_capacity must be greater than zero"
        );

        let s = &self.scoring;
        for (name, w) in [
            ("w_vector", s.w_vector),
            ("w_lexical", s.w_lexical),
            ("w_recency", s.w_recency),
        ] {
            ensure!(
                w.is_finite() && w >= 0.0,
                "scoring.{name} must be a non-negative number"
            );
        }
        ensure!(
            s.w_vector + s.w_lexical + s.w_recency > 0.0,
            "at least one scoring weight must be positive"
        );
        ensure!(
            s.recency_scale_days.is_finite() && s.recency_scale_days > 0.0,
            "scoring.recency_scale_days must be positive"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
