//! Collections of documents and their index maintenance.

use crate::document::Document;
use crate::error::{EngineError, EngineResult};
use crate::index::Index;
use crate::query::QueryBuilder;
use crate::value::{Object, Value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named set of documents with optional per-field secondary indexes.
///
/// Every operation takes `&self` and acquires the collection's own
/// reader-writer lock internally: reads (`find`, `get_all`, queries)
/// take the read lock, mutations take the write lock. The engine's lock
/// order is Engine → Database → Collection, and nothing here ever locks
/// upward.
///
/// # Index maintenance
///
/// After any `insert`, `update`, `delete`, or `create_index` returns,
/// every index entry refers to a live document whose field stringifies
/// to the entry's key. Entries are last-writer-wins: see [`Index`].
#[derive(Debug)]
pub struct Collection {
    name: String,
    inner: RwLock<CollectionInner>,
}

#[derive(Debug, Default)]
struct CollectionInner {
    documents: BTreeMap<String, Document>,
    indexes: BTreeMap<String, Index>,
}

/// Serialized form of a collection inside a database snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CollectionSnapshot {
    pub(crate) name: String,
    pub(crate) documents: BTreeMap<String, Document>,
    pub(crate) indexes: BTreeMap<String, Index>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(CollectionInner::default()),
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DocumentExists`] if the id is taken.
    pub fn insert(&self, id: impl Into<String>, data: Object) -> EngineResult<()> {
        let id = id.into();
        let mut inner = self.inner.write();

        if inner.documents.contains_key(&id) {
            return Err(EngineError::document_exists(id));
        }

        let doc = Document::new(id.clone(), data);
        for index in inner.indexes.values_mut() {
            index.note(&doc);
        }
        inner.documents.insert(id, doc);

        Ok(())
    }

    /// Replaces a document's data wholesale and refreshes `updated_at`.
    ///
    /// Prior index contributions are removed before the new data
    /// re-registers, so an update that changes an indexed field never
    /// leaves a stale entry behind.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DocumentNotFound`] if the id is absent.
    pub fn update(&self, id: &str, data: Object) -> EngineResult<()> {
        let mut inner = self.inner.write();

        let old = inner
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::document_not_found(id))?;
        for index in inner.indexes.values_mut() {
            index.forget(&old);
        }

        let doc = inner
            .documents
            .get_mut(id)
            .ok_or_else(|| EngineError::document_not_found(id))?;
        doc.replace_data(data);
        let doc = doc.clone();

        for index in inner.indexes.values_mut() {
            index.note(&doc);
        }

        Ok(())
    }

    /// Deletes a document and removes its index contributions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DocumentNotFound`] if the id is absent.
    pub fn delete(&self, id: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();

        let doc = inner
            .documents
            .remove(id)
            .ok_or_else(|| EngineError::document_not_found(id))?;
        for index in inner.indexes.values_mut() {
            index.forget(&doc);
        }

        Ok(())
    }

    /// Fetches a single document by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.inner.read().documents.get(id).cloned()
    }

    /// Finds documents whose `field` equals `value` under the
    /// stringification rule.
    ///
    /// With an index on `field` this is an O(1) lookup returning at most
    /// one document (the last writer for that value). Without one it is
    /// a linear scan returning every match in id order.
    #[must_use]
    pub fn find(&self, field: &str, value: &Value) -> Vec<Document> {
        let inner = self.inner.read();

        if let Some(index) = inner.indexes.get(field) {
            return index
                .lookup(&value.stringify())
                .and_then(|id| inner.documents.get(id))
                .cloned()
                .into_iter()
                .collect();
        }

        inner
            .documents
            .values()
            .filter(|doc| {
                doc.data
                    .get(field)
                    .is_some_and(|v| v.compare(value) == std::cmp::Ordering::Equal)
            })
            .cloned()
            .collect()
    }

    /// Returns all documents in id order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Document> {
        self.inner.read().documents.values().cloned().collect()
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    /// Whether the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().documents.is_empty()
    }

    /// Builds an index on a top-level field from the current documents,
    /// replacing any prior index on that field.
    pub fn create_index(&self, field: impl Into<String>) {
        let field = field.into();
        let mut inner = self.inner.write();

        let mut index = Index::new(field.clone());
        index.rebuild(inner.documents.values());
        inner.indexes.insert(field, index);
    }

    /// Fields that currently carry an index.
    #[must_use]
    pub fn index_fields(&self) -> Vec<String> {
        self.inner.read().indexes.keys().cloned().collect()
    }

    /// Starts a query against this collection.
    #[must_use]
    pub fn query(self: &Arc<Self>) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(self))
    }

    /// Clears every index and replays all documents into each.
    ///
    /// This is the per-collection half of compaction: it repairs any
    /// index-invariant drift without touching the documents.
    pub(crate) fn rebuild_indexes(&self) {
        let mut inner = self.inner.write();
        let CollectionInner {
            documents, indexes, ..
        } = &mut *inner;
        for index in indexes.values_mut() {
            index.rebuild(documents.values());
        }
    }

    /// Removes every document and every index entry.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write();
        inner.documents.clear();
        for index in inner.indexes.values_mut() {
            index.values.clear();
        }
    }

    /// Runs a closure over the document map under the read lock.
    pub(crate) fn with_documents<R>(
        &self,
        f: impl FnOnce(&BTreeMap<String, Document>) -> R,
    ) -> R {
        f(&self.inner.read().documents)
    }

    /// Runs a closure over documents and indexes under the read lock.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&BTreeMap<String, Document>, &BTreeMap<String, Index>) -> R,
    ) -> R {
        let inner = self.inner.read();
        f(&inner.documents, &inner.indexes)
    }

    /// Copies the current state into its serialized form.
    pub(crate) fn snapshot(&self) -> CollectionSnapshot {
        let inner = self.inner.read();
        CollectionSnapshot {
            name: self.name.clone(),
            documents: inner.documents.clone(),
            indexes: inner.indexes.clone(),
        }
    }

    /// Rebuilds a live collection from its serialized form. The lock is
    /// runtime state and starts fresh.
    pub(crate) fn from_snapshot(snapshot: CollectionSnapshot) -> Self {
        Self {
            name: snapshot.name,
            inner: RwLock::new(CollectionInner {
                documents: snapshot.documents,
                indexes: snapshot.indexes,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, Value)]) -> Object {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn fruit_collection() -> Collection {
        let coll = Collection::new("items");
        coll.insert("a", data(&[("name", "apple".into()), ("qty", 3.into())]))
            .unwrap();
        coll.insert("b", data(&[("name", "banana".into()), ("qty", 5.into())]))
            .unwrap();
        coll
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let coll = fruit_collection();
        let err = coll.insert("a", Object::new()).unwrap_err();
        assert!(matches!(err, EngineError::DocumentExists { .. }));
        assert_eq!(coll.len(), 2);
    }

    #[test]
    fn find_by_scan() {
        let coll = fruit_collection();
        let found = coll.find("name", &"apple".into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        assert!(coll.find("name", &"cherry".into()).is_empty());
        assert!(coll.find("missing", &"apple".into()).is_empty());
    }

    #[test]
    fn find_compares_across_types() {
        let coll = Collection::new("c");
        coll.insert("a", data(&[("qty", "3".into())])).unwrap();
        // Int(3) matches String("3") under the stringification rule.
        assert_eq!(coll.find("qty", &3.into()).len(), 1);
    }

    #[test]
    fn indexed_find_is_last_writer_wins() {
        let coll = fruit_collection();
        coll.create_index("qty");
        coll.insert("c", data(&[("name", "cherry".into()), ("qty", 3.into())]))
            .unwrap();

        let found = coll.find("qty", &3.into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c");

        // The scan path still sees both holders of qty=3.
        let scanned: Vec<_> = coll
            .get_all()
            .into_iter()
            .filter(|d| d.data.get("qty") == Some(&Value::Int(3)))
            .collect();
        assert_eq!(scanned.len(), 2);
    }

    #[test]
    fn update_refreshes_indexes() {
        let coll = fruit_collection();
        coll.create_index("name");

        coll.update("a", data(&[("name", "apricot".into())])).unwrap();

        assert!(coll.find("name", &"apple".into()).is_empty());
        let found = coll.find("name", &"apricot".into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[test]
    fn update_missing_document_fails() {
        let coll = Collection::new("c");
        let err = coll.update("ghost", Object::new()).unwrap_err();
        assert!(matches!(err, EngineError::DocumentNotFound { .. }));
    }

    #[test]
    fn delete_removes_document_and_index_entry() {
        let coll = fruit_collection();
        coll.create_index("name");

        coll.delete("a").unwrap();

        assert!(coll.get("a").is_none());
        assert!(coll.find("name", &"apple".into()).is_empty());
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn index_consistency_after_mutation_sequence() {
        let coll = Collection::new("c");
        coll.create_index("n");

        for i in 0..10i64 {
            coll.insert(format!("d{i}"), data(&[("n", (i % 3).into())]))
                .unwrap();
        }
        coll.update("d4", data(&[("n", 7.into())])).unwrap();
        coll.delete("d2").unwrap();
        coll.delete("d7").unwrap();

        coll.with_state(|documents, indexes| {
            for index in indexes.values() {
                for (key, id) in &index.values {
                    let doc = documents.get(id).expect("entry points at live document");
                    let value = doc.data.get(&index.field).expect("indexed field present");
                    assert_eq!(&value.stringify(), key);
                }
            }
        });
    }

    #[test]
    fn create_index_replaces_previous() {
        let coll = fruit_collection();
        coll.create_index("qty");
        coll.delete("a").unwrap();
        coll.create_index("qty");

        coll.with_state(|_, indexes| {
            assert_eq!(indexes["qty"].len(), 1);
        });
    }

    #[test]
    fn snapshot_round_trip() {
        let coll = fruit_collection();
        coll.create_index("qty");

        let restored = Collection::from_snapshot(coll.snapshot());
        assert_eq!(restored.name(), "items");
        assert_eq!(restored.get_all(), coll.get_all());
        assert_eq!(restored.index_fields(), vec!["qty".to_string()]);
    }
}
