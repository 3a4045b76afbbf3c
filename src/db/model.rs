//! Database entities. Business logic lives in higher layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, retrievable image set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wat {
    pub id: i64,
    pub name: String,
    /// Telegram file ids ascending by image size; non-empty after creation
    /// and never updated afterwards.
    pub file_ids: Vec<String>,
    /// Lowercased free-text expressions; treated as a set for matching.
    pub expressions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Wat {
    /// The largest rendition, used for full-size photo replies.
    pub fn largest_file_id(&self) -> Option<&str> {
        self.file_ids.last().map(String::as_str)
    }

    /// The smallest rendition, used for inline query thumbnails.
    pub fn smallest_file_id(&self) -> Option<&str> {
        self.file_ids.first().map(String::as_str)
    }
}
