//! Composite scoring and final ordering.
//!
//! ```text
//! normalized_lexical = min-max of lexical_score over the candidates that have one
//! recency_boost      = 1 / (1 + ln(1 + recency_days / recency_scale_days))
//! final_score        = w_vector * vector_score
//!                    + w_lexical * normalized_lexical
//!                    + w_recency * recency_boost
//! ```
//!
//! Missing scores count as 0. The whole candidate set is scored and sorted
//! before truncation because lexical normalization depends on every
//! candidate. Ties are broken by ascending memory id.

use serde::Serialize;

use super::merge::{Candidate, CandidateSource};
use crate::config::ScoringConfig;

/// A ranked memory, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub memory_id: String,
    pub text: String,
    pub final_score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
    pub source: CandidateSource,
}

/// Weights for the composite score. Always normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub w_vector: f64,
    pub w_lexical: f64,
    pub w_recency: f64,
    pub recency_scale_days: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl ScoringWeights {
    /// Build from config, renormalizing the three weights to sum to 1.
    ///
    /// Config validation guarantees non-negative weights with a positive sum;
    /// a zero sum falls back to the defaults.
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            config.w_vector,
            config.w_lexical,
            config.w_recency,
            config.recency_scale_days,
        )
    }

    pub fn new(w_vector: f64, w_lexical: f64, w_recency: f64, recency_scale_days: f64) -> Self {
        let clean = |w: f64| if w.is_finite() { w.max(0.0) } else { 0.0 };
        let (v, l, r) = (clean(w_vector), clean(w_lexical), clean(w_recency));
        let sum = v + l + r;
        let (v, l, r) = if sum > 0.0 {
            (v / sum, l / sum, r / sum)
        } else {
            (0.5, 0.3, 0.2)
        };
        let scale = if recency_scale_days.is_finite() && recency_scale_days > 0.0 {
            recency_scale_days
        } else {
            1.0
        };
        Self {
            w_vector: v,
            w_lexical: l,
            w_recency: r,
            recency_scale_days: scale,
        }
    }
}

/// Bounded in `(0, 1]`, 1 for a memory created today, strictly decreasing with age.
pub fn recency_boost(recency_days: u32, scale_days: f64) -> f64 {
    1.0 / (1.0 + (f64::from(recency_days) / scale_days).ln_1p())
}

/// Min-max normalize the present scores to `[0, 1]`. Absent scores map to 0,
/// and every score maps to 0 when the range is degenerate.
pub fn min_max_normalize(scores: &[Option<f64>]) -> Vec<f64> {
    let present = scores.iter().flatten().copied().filter(|s| s.is_finite());
    let (min, max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });
    let range = max - min;

    scores
        .iter()
        .map(|s| match s {
            Some(s) if s.is_finite() && range.is_finite() && range > 0.0 => (s - min) / range,
            _ => 0.0,
        })
        .collect()
}

/// Score every candidate, sort, and keep the first `top_k`.
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    weights: &ScoringWeights,
    top_k: usize,
) -> Vec<RankedResult> {
    let lexical: Vec<Option<f64>> = candidates.iter().map(|c| c.lexical_score).collect();
    let normalized = min_max_normalize(&lexical);

    let mut scored: Vec<(f64, Candidate)> = candidates
        .into_iter()
        .zip(normalized)
        .map(|(c, norm_lex)| {
            let vector = c.vector_score.filter(|s| s.is_finite()).unwrap_or(0.0);
            let score = weights.w_vector * vector
                + weights.w_lexical * norm_lex
                + weights.w_recency * recency_boost(c.recency_days, weights.recency_scale_days);
            (score, c)
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.total_cmp(sa)
            .then_with(|| a.memory_id.cmp(&b.memory_id))
    });

    scored
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, (final_score, c))| RankedResult {
            memory_id: c.memory_id,
            text: c.text,
            final_score,
            rank: i + 1,
            source: c.source,
        })
        .collect()
}
