//! Database: a named set of collections backed by one snapshot file.

use crate::collection::{Collection, CollectionSnapshot};
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A named container of collections.
///
/// Handles are shared (`Arc<Database>`); the collection registry sits
/// behind the database's reader-writer lock, one level below the engine
/// in the lock order. The `path` names the snapshot file that
/// [`crate::Engine::save_database`] writes; the file either does not
/// exist yet or holds a valid serialized snapshot.
#[derive(Debug)]
pub struct Database {
    name: String,
    path: PathBuf,
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
}

/// Serialized form of a whole database: the content of a `.enosql` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DatabaseSnapshot {
    pub(crate) name: String,
    pub(crate) collections: BTreeMap<String, CollectionSnapshot>,
    pub(crate) path: String,
}

impl Database {
    /// Creates an empty database.
    pub(crate) fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates a new empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CollectionExists`] if the name is taken,
    /// [`EngineError::InvalidArgument`] if the name is empty.
    pub fn create_collection(&self, name: impl Into<String>) -> EngineResult<Arc<Collection>> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::invalid_argument("collection name is empty"));
        }

        let mut collections = self.collections.write();
        if collections.contains_key(&name) {
            return Err(EngineError::collection_exists(name));
        }

        let collection = Arc::new(Collection::new(name.clone()));
        collections.insert(name, Arc::clone(&collection));
        Ok(collection)
    }

    /// Returns a handle to a collection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CollectionNotFound`] if absent.
    pub fn get_collection(&self, name: &str) -> EngineResult<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::collection_not_found(name))
    }

    /// Removes a collection and all its documents.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CollectionNotFound`] if absent.
    pub fn delete_collection(&self, name: &str) -> EngineResult<()> {
        self.collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::collection_not_found(name))
    }

    /// Names of all collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Handles to all collections.
    #[must_use]
    pub fn collections(&self) -> Vec<Arc<Collection>> {
        self.collections.read().values().cloned().collect()
    }

    /// Copies the current state into its serialized form.
    ///
    /// The database lock is held for read while each collection is
    /// snapshotted in turn, so the result is consistent per collection.
    pub(crate) fn snapshot(&self) -> DatabaseSnapshot {
        let collections = self.collections.read();
        DatabaseSnapshot {
            name: self.name.clone(),
            collections: collections
                .iter()
                .map(|(name, coll)| (name.clone(), coll.snapshot()))
                .collect(),
            path: self.path.to_string_lossy().into_owned(),
        }
    }

    /// Rebuilds a live database from its serialized form.
    ///
    /// `name` and `path` are taken from the caller, not the snapshot:
    /// the file's location is authoritative for loads, and restores
    /// install the snapshot under a new name. All locks start fresh.
    pub(crate) fn from_snapshot(
        snapshot: DatabaseSnapshot,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let collections = snapshot
            .collections
            .into_iter()
            .map(|(coll_name, coll)| (coll_name, Arc::new(Collection::from_snapshot(coll))))
            .collect();
        Self {
            name: name.into(),
            path: path.into(),
            collections: RwLock::new(collections),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Object, Value};

    fn sample_db() -> Database {
        let db = Database::new("shop", "/tmp/shop.enosql");
        let items = db.create_collection("items").unwrap();
        let mut data = Object::new();
        data.insert("name".into(), Value::from("apple"));
        items.insert("a", data).unwrap();
        db
    }

    #[test]
    fn create_and_get_collection() {
        let db = sample_db();
        let coll = db.get_collection("items").unwrap();
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn duplicate_collection_rejected() {
        let db = sample_db();
        let err = db.create_collection("items").unwrap_err();
        assert!(matches!(err, EngineError::CollectionExists { .. }));
    }

    #[test]
    fn empty_collection_name_rejected() {
        let db = sample_db();
        let err = db.create_collection("").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[test]
    fn missing_collection_errors() {
        let db = sample_db();
        assert!(matches!(
            db.get_collection("ghost"),
            Err(EngineError::CollectionNotFound { .. })
        ));
        assert!(matches!(
            db.delete_collection("ghost"),
            Err(EngineError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn delete_collection_removes_it() {
        let db = sample_db();
        db.delete_collection("items").unwrap();
        assert!(db.collection_names().is_empty());
    }

    #[test]
    fn snapshot_round_trip_preserves_content() {
        let db = sample_db();
        db.get_collection("items").unwrap().create_index("name");

        let restored = Database::from_snapshot(db.snapshot(), "shop", "/tmp/shop.enosql");

        assert_eq!(restored.collection_names(), vec!["items".to_string()]);
        let original = db.get_collection("items").unwrap();
        let copy = restored.get_collection("items").unwrap();
        assert_eq!(copy.get_all(), original.get_all());
        assert_eq!(copy.index_fields(), original.index_fields());
    }

    #[test]
    fn restore_overrides_name_and_path() {
        let db = sample_db();
        let restored = Database::from_snapshot(db.snapshot(), "copy", "/tmp/copy.enosql");
        assert_eq!(restored.name(), "copy");
        assert_eq!(restored.path(), Path::new("/tmp/copy.enosql"));
    }
}
