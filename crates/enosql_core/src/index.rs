//! Secondary index on a top-level document field.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An equality index mapping stringified field values to document ids.
///
/// Each key holds exactly one id: when two documents share a stringified
/// value for the indexed field, the most recently inserted or updated one
/// wins and the earlier entry is overwritten. Callers indexing unique
/// fields (usernames, order numbers) get O(1) lookups with at-most-one
/// semantics; callers indexing non-unique fields should prefer the scan
/// path of [`crate::Collection::find`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Top-level field this index covers.
    pub field: String,
    /// Stringified field value to document id.
    pub values: BTreeMap<String, String>,
}

impl Index {
    /// Creates an empty index on a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            values: BTreeMap::new(),
        }
    }

    /// Looks up the document id for a stringified value.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Registers a document: if it carries the indexed field, its entry
    /// overwrites any previous holder of the same stringified value.
    pub(crate) fn note(&mut self, doc: &Document) {
        if let Some(value) = doc.data.get(&self.field) {
            self.values.insert(value.stringify(), doc.id.clone());
        }
    }

    /// Removes a document's contribution. The entry is only dropped when
    /// it still points at this document; a later writer's entry survives.
    pub(crate) fn forget(&mut self, doc: &Document) {
        if let Some(value) = doc.data.get(&self.field) {
            let key = value.stringify();
            if self.values.get(&key).map(String::as_str) == Some(doc.id.as_str()) {
                self.values.remove(&key);
            }
        }
    }

    /// Clears the index and replays the given documents.
    pub(crate) fn rebuild<'a>(&mut self, docs: impl IntoIterator<Item = &'a Document>) {
        self.values.clear();
        for doc in docs {
            self.note(doc);
        }
    }
}
