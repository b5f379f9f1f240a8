//! Candidate merging.
//!
//! Unions vector and lexical hits by memory id. A memory seen by only one
//! index keeps `None` for the other score; nothing is dropped here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::index::IndexHit;

/// Which index (or both) produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Vector,
    Lexical,
    Both,
}

/// Per-query merge record. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub memory_id: String,
    pub text: String,
    pub source: CandidateSource,
    pub vector_score: Option<f64>,
    pub lexical_score: Option<f64>,
    pub recency_days: u32,
}

/// Merge both hit lists into one candidate per memory, ordered by memory id.
///
/// The output depends only on the two lists and `now`, never on which search
/// finished first. If an index reports the same memory twice, the higher
/// score is kept.
pub fn merge_candidates(
    vector_hits: Vec<IndexHit>,
    lexical_hits: Vec<IndexHit>,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut merged: BTreeMap<String, Candidate> = BTreeMap::new();

    for hit in vector_hits {
        let candidate = merged
            .entry(hit.memory.id.clone())
            .or_insert_with(|| new_candidate(&hit, CandidateSource::Vector, now));
        candidate.vector_score = Some(max_score(candidate.vector_score, hit.score));
    }

    for hit in lexical_hits {
        let candidate = merged
            .entry(hit.memory.id.clone())
            .or_insert_with(|| new_candidate(&hit, CandidateSource::Lexical, now));
        if candidate.source == CandidateSource::Vector {
            candidate.source = CandidateSource::Both;
        }
        candidate.lexical_score = Some(max_score(candidate.lexical_score, hit.score));
    }

    merged.into_values().collect()
}

fn new_candidate(hit: &IndexHit, source: CandidateSource, now: DateTime<Utc>) -> Candidate {
    Candidate {
        memory_id: hit.memory.id.clone(),
        text: hit.memory.text.clone(),
        source,
        vector_score: None,
        lexical_score: None,
        recency_days: hit.memory.age_days(now),
    }
}

fn max_score(existing: Option<f64>, incoming: f64) -> f64 {
    existing.map_or(incoming, |e| e.max(incoming))
}
