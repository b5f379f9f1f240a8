//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and two backends: a local ONNX
//! model ([`local::LocalEmbeddingProvider`]) and a dependency-free
//! feature-hashing embedder ([`hashed::HashedEmbeddingProvider`]). The backend
//! is selected from configuration via [`create_provider`].

pub mod hashed;
pub mod local;

use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Width of all-MiniLM-L6-v2 vectors, the default local model.
pub const DEFAULT_DIMENSIONS: usize = 384;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding text into vectors.
///
/// Implementations must be deterministic for a fixed [`model_version`] and
/// produce vectors of exactly [`dimensions`] entries. All methods are
/// synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
///
/// [`model_version`]: EmbeddingProvider::model_version
/// [`dimensions`]: EmbeddingProvider::dimensions
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier of the model that produced the vectors. Stored with every
    /// memory so vectors from different models are never compared.
    fn model_version(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// `"local"` loads the ONNX model from `cache_dir` (run `memsift model download`
/// first); `"hashed"` needs no model files.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        "hashed" => Ok(Box::new(hashed::HashedEmbeddingProvider::new(config.dimensions))),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, hashed"),
    }
}

/// Check a vector against the width the provider promised.
pub fn ensure_dimensions(embedding: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if embedding.len() == expected {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        })
    }
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub(crate) fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = vec![3.0, 4.0];
        let normalized = l2_normalize(&v);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let v = vec![0.0, 0.0, 0.0];
        assert_eq!(l2_normalize(&v), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn ensure_dimensions_reports_mismatch() {
        let err = ensure_dimensions(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 3, actual: 2 }
        ));
        ensure_dimensions(&[1.0, 2.0, 3.0], 3).unwrap();
    }

    #[test]
    fn create_provider_rejects_unknown_backend() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("unknown embedding provider"));
    }

    #[test]
    fn create_provider_builds_hashed_backend() {
        let config = EmbeddingConfig {
            provider: "hashed".into(),
            dimensions: 32,
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dimensions(), 32);
        assert_eq!(provider.embed("hello world").unwrap().len(), 32);
    }
}
