//! Document record type.

use crate::value::Object;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single record in a collection.
///
/// The id is caller-assigned and unique within the collection. `data` is
/// an arbitrary tree of [`crate::Value`]s; the engine imposes no schema
/// on it. The two timestamps are maintained by the engine: `created_at`
/// is set once at insert, `updated_at` refreshes on every update, so
/// `updated_at >= created_at` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// User data.
    pub data: Object,
    /// When the document was inserted.
    pub created_at: DateTime<Utc>,
    /// When the document was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a document with both timestamps set to now.
    pub fn new(id: impl Into<String>, data: Object) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the data wholesale and refreshes `updated_at`.
    pub(crate) fn replace_data(&mut self, data: Object) {
        self.data = data;
        self.updated_at = Utc::now();
    }

    /// Byte length of the document's JSON encoding (used by the stats
    /// walker for average document size).
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}
