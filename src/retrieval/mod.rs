//! Hybrid retrieval: vector and lexical search fanned out concurrently, merged
//! by memory id and ranked by a weighted composite score.

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod merge;
pub mod rank;
pub mod sqlite;
mod task;

pub use coordinator::{RetrievalRequest, RetrievalResponse, Retriever, Source};
pub use error::{IndexError, RetrievalError};
pub use index::{IndexHit, LexicalIndex, VectorIndex};
pub use merge::{Candidate, CandidateSource};
pub use rank::{RankedResult, ScoringWeights};
pub use sqlite::{SqliteLexicalIndex, SqliteVectorIndex};
