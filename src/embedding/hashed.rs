//! Feature-hashing embedding provider.
//!
//! Hashes lowercase word terms into fixed buckets (FNV-1a) weighted by term
//! frequency, then L2-normalizes. No model files, so it works offline and in
//! tests; similarity reflects shared vocabulary only.

use std::collections::BTreeMap;

use super::{l2_normalize, EmbeddingError, EmbeddingProvider};

pub struct HashedEmbeddingProvider {
    dimensions: usize,
    model_version: String,
}

impl HashedEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_version: format!("hashed-fnv1a-{dimensions}"),
        }
    }

    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() >= 2)
            .map(|s| s.to_lowercase())
    }
}

impl EmbeddingProvider for HashedEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimensions == 0 {
            return Err(EmbeddingError::Unavailable(
                "hashed provider configured with zero dimensions".into(),
            ));
        }

        // BTreeMap keeps the float accumulation order stable across runs
        let mut tf: BTreeMap<String, f32> = BTreeMap::new();
        for term in Self::terms(text) {
            *tf.entry(term).or_default() += 1.0;
        }

        let mut v = vec![0.0f32; self.dimensions];
        for (term, count) in &tf {
            let idf = 1.0 + (term.len() as f32).ln();
            v[Self::bucket(term, self.dimensions)] += count * idf;
        }
        Ok(l2_normalize(&v))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn output_is_normalized_and_sized() {
        let p = HashedEmbeddingProvider::new(64);
        let v = p.embed("The quick brown fox").unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn deterministic() {
        let p = HashedEmbeddingProvider::new(64);
        assert_eq!(p.embed("same text").unwrap(), p.embed("same text").unwrap());
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let p = HashedEmbeddingProvider::new(256);
        let a = p.embed("user lives in paris").unwrap();
        let b = p.embed("the user lives near paris").unwrap();
        let c = p.embed("quantum computing with qubits").unwrap();
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let p = HashedEmbeddingProvider::new(16);
        assert!(p.embed("").unwrap().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn model_version_encodes_width() {
        assert_eq!(HashedEmbeddingProvider::new(32).model_version(), "hashed-fnv1a-32");
    }
}
