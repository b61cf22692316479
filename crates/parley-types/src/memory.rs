//! Memory record shape exchanged with the external memory collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One memory entry as read from (or written to) the memory provider.
///
/// The engine writes one record per resolved turn and one summary record
/// at session end; long-term storage and compression are the provider's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    /// Free-form tags (topic names, participant ids) used for retrieval.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`; providers may use it for compression.
    pub significance: f32,
    pub at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(content: impl Into<String>, tags: Vec<String>, significance: f32) -> Self {
        Self {
            content: content.into(),
            tags,
            significance: significance.clamp(0.0, 1.0),
            at: Utc::now(),
        }
    }
}
