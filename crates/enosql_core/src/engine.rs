//! Engine: the registry of databases rooted at a data directory.

use crate::database::{Database, DatabaseSnapshot};
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File extension of database snapshot files.
pub const SNAPSHOT_EXT: &str = "enosql";

/// The database engine.
///
/// An `Engine` owns a data directory and a registry of loaded databases.
/// The in-memory registry is a cache: databases on disk that have not
/// been referenced yet are still discoverable through
/// [`list_databases`](Engine::list_databases) and load lazily on first
/// [`get_database`](Engine::get_database).
///
/// Mutations live in memory until [`save_database`](Engine::save_database)
/// writes a full snapshot; durability is snapshot-on-save granularity.
/// The engine assumes exclusive ownership of its data directory.
///
/// # Example
///
/// ```rust,ignore
/// use enosql_core::Engine;
///
/// let engine = Engine::new("/var/lib/myapp/data")?;
/// let db = engine.create_database("shop")?;
/// let items = db.create_collection("items")?;
/// items.insert("a", data)?;
/// engine.save_database("shop")?;
/// ```
#[derive(Debug)]
pub struct Engine {
    data_dir: PathBuf,
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Engine {
    /// Creates an engine rooted at `data_dir`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        Ok(Self {
            data_dir,
            databases: RwLock::new(HashMap::new()),
        })
    }

    /// The engine's data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Snapshot file path for a database name.
    #[must_use]
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.{SNAPSHOT_EXT}"))
    }

    /// Creates a new empty database and persists it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DatabaseExists`] if the name is already
    /// registered, [`EngineError::InvalidArgument`] for an empty name or
    /// a name containing a path separator.
    pub fn create_database(&self, name: &str) -> EngineResult<Arc<Database>> {
        validate_name(name)?;

        let mut databases = self.databases.write();
        if databases.contains_key(name) {
            return Err(EngineError::database_exists(name));
        }

        let db = Arc::new(Database::new(name, self.database_path(name)));
        self.write_snapshot(&db)?;
        databases.insert(name.to_string(), Arc::clone(&db));

        info!(database = name, "created database");
        Ok(db)
    }

    /// Returns a handle to a database, loading it from disk on first
    /// reference.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DatabaseNotFound`] if neither the registry
    /// nor the data directory knows the name, [`EngineError::Malformed`]
    /// if the snapshot file does not parse.
    pub fn get_database(&self, name: &str) -> EngineResult<Arc<Database>> {
        if let Some(db) = self.databases.read().get(name) {
            return Ok(Arc::clone(db));
        }

        let mut databases = self.databases.write();
        // Another thread may have loaded it while we upgraded the lock.
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }

        let db = Arc::new(self.load_database(name)?);
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Writes a full snapshot of a database to its file.
    ///
    /// The snapshot is taken under the database's read locks, buffered,
    /// then written to a temporary file and renamed into place, so
    /// concurrent readers of the path never observe a torn file. Every
    /// mutation that completed before this call is reflected in the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DatabaseNotFound`] if the name is not
    /// registered, or an I/O error from the write.
    pub fn save_database(&self, name: &str) -> EngineResult<()> {
        let db = {
            let databases = self.databases.read();
            databases
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::database_not_found(name))?
        };
        self.write_snapshot(&db)
    }

    /// Saves every loaded database. Intended for host shutdown.
    ///
    /// # Errors
    ///
    /// Returns the first save failure; earlier databases stay saved.
    pub fn flush_all(&self) -> EngineResult<()> {
        let databases: Vec<_> = self.databases.read().values().cloned().collect();
        for db in databases {
            self.write_snapshot(&db)?;
        }
        Ok(())
    }

    /// Removes a database from the registry and deletes its file.
    ///
    /// A missing file is not an error: deleting a never-saved or
    /// already-deleted database succeeds.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn delete_database(&self, name: &str) -> EngineResult<()> {
        self.databases.write().remove(name);

        match fs::remove_file(self.database_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(database = name, "deleted database");
        Ok(())
    }

    /// Names of all databases: the union of the in-memory registry and
    /// the `*.enosql` files in the data directory, deduplicated and
    /// sorted.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the data directory cannot be read.
    pub fn list_databases(&self) -> EngineResult<Vec<String>> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();

        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Rebuilds every index of every collection, then persists.
    ///
    /// This is the repair operation after any index-invariant drift.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DatabaseNotFound`] if the database is
    /// unknown, or an I/O error from the save.
    pub fn compact_database(&self, name: &str) -> EngineResult<()> {
        let db = self.get_database(name)?;

        for collection in db.collections() {
            debug!(
                database = name,
                collection = collection.name(),
                "rebuilding indexes"
            );
            collection.rebuild_indexes();
        }
        self.write_snapshot(&db)?;

        info!(database = name, "compacted database");
        Ok(())
    }

    /// Installs a database built from a snapshot (a restored backup)
    /// under a new name, replacing any same-named entry, and persists it.
    pub(crate) fn install_snapshot(
        &self,
        snapshot: DatabaseSnapshot,
        name: &str,
    ) -> EngineResult<Arc<Database>> {
        validate_name(name)?;

        let db = Arc::new(Database::from_snapshot(
            snapshot,
            name,
            self.database_path(name),
        ));
        self.write_snapshot(&db)?;
        self.databases
            .write()
            .insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Serializes a database and atomically replaces its file.
    pub(crate) fn write_snapshot(&self, db: &Database) -> EngineResult<()> {
        let snapshot = db.snapshot();
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| EngineError::malformed(format!("failed to encode snapshot: {e}")))?;

        let path = db.path();
        let tmp = path.with_extension(format!("{SNAPSHOT_EXT}.tmp"));
        fs::write(&tmp, &body)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(database = db.name(), bytes = body.len(), "saved snapshot");
        Ok(())
    }

    /// Reads and parses a snapshot file, reinitializing runtime state.
    fn load_database(&self, name: &str) -> EngineResult<Database> {
        let path = self.database_path(name);
        if !path.exists() {
            return Err(EngineError::database_not_found(name));
        }

        let body = fs::read_to_string(&path)?;
        let snapshot: DatabaseSnapshot = serde_json::from_str(&body).map_err(|e| {
            EngineError::malformed(format!("failed to parse snapshot {}: {e}", path.display()))
        })?;

        info!(database = name, "loaded database from disk");
        Ok(Database::from_snapshot(snapshot, name, path))
    }
}

fn validate_name(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::invalid_argument("database name is empty"));
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(EngineError::invalid_argument(format!(
            "database name contains path components: {name}"
        )));
    }
    Ok(())
}
