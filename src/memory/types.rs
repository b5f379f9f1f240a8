//! Core memory type definitions.
//!
//! [`Memory`] is a full durable record including its vector; [`MemoryRecord`]
//! is the same record without the vector, as returned by the search indexes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to a memory, used for filtering.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A stored memory, as returned by the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key. Never reassigned.
    pub id: String,
    /// Scoping key (user, agent or session). Every read is scoped to one owner.
    pub owner_id: String,
    /// The natural-language content.
    pub text: String,
    /// The vector produced for `text`.
    pub embedding: Vec<f32>,
    /// Model version that produced `embedding`.
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A memory without its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub owner_id: String,
    pub text: String,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryRecord {
    /// Whole days between creation and `now`, clamped at zero for clock skew.
    pub fn age_days(&self, now: DateTime<Utc>) -> u32 {
        let days = (now - self.created_at).num_days();
        u32::try_from(days.max(0)).unwrap_or(u32::MAX)
    }
}
