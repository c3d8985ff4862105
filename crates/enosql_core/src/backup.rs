//! Compressed archival backups.
//!
//! A backup is a gzip-compressed POSIX tar archive holding exactly two
//! regular files: the database snapshot (`{db}.enosql`) and a
//! `metadata.json` describing it. Archives are self-contained, so a
//! backup can be restored into any engine under any database name.

use crate::database::DatabaseSnapshot;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::{Archive, Builder, Header};
use tracing::{info, warn};

/// Format version written into `metadata.json`.
const BACKUP_VERSION: &str = "1.0";

/// Description of one backup archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupInfo {
    /// Caller-supplied backup name.
    pub name: String,
    /// Database the archive holds.
    pub database: String,
    /// When the backup was created.
    pub timestamp: DateTime<Utc>,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Archive location.
    pub path: PathBuf,
}

/// The `metadata.json` member of an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupMetadata {
    database: String,
    backup: String,
    timestamp: DateTime<Utc>,
    version: String,
}

/// Creates, restores, and lists backup archives for an engine.
pub struct BackupManager {
    engine: Arc<Engine>,
    backup_dir: PathBuf,
}

impl BackupManager {
    /// Creates a backup manager writing into `backup_dir`, creating the
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new(engine: Arc<Engine>, backup_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir)?;

        Ok(Self { engine, backup_dir })
    }

    /// The directory this manager scans and writes.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Creates a compressed backup of a database.
    ///
    /// The archive lands at
    /// `{backup_dir}/{db}_{name}_{YYYYMMDD_HHMMSS}.tar.gz`, written to a
    /// temporary path first and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DatabaseNotFound`] for an unknown
    /// database, or an I/O error from the archive write.
    pub fn create_backup(&self, db_name: &str, backup_name: &str) -> EngineResult<BackupInfo> {
        let db = self.engine.get_database(db_name)?;

        let snapshot = db.snapshot();
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| EngineError::malformed(format!("failed to encode snapshot: {e}")))?;

        let timestamp = Utc::now();
        let filename = format!(
            "{db_name}_{backup_name}_{}.tar.gz",
            timestamp.format("%Y%m%d_%H%M%S")
        );
        let path = self.backup_dir.join(&filename);
        let tmp = self.backup_dir.join(format!("{filename}.tmp"));

        let metadata = BackupMetadata {
            database: db_name.to_string(),
            backup: backup_name.to_string(),
            timestamp,
            version: BACKUP_VERSION.to_string(),
        };
        let metadata_body = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| EngineError::malformed(format!("failed to encode metadata: {e}")))?;

        if let Err(e) = write_archive(&tmp, &format!("{db_name}.enosql"), &body, &metadata_body) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path)?;

        let size_bytes = fs::metadata(&path)?.len();
        info!(database = db_name, backup = backup_name, size_bytes, "created backup");

        Ok(BackupInfo {
            name: backup_name.to_string(),
            database: db_name.to_string(),
            timestamp,
            size_bytes,
            path,
        })
    }

    /// Restores an archive into the engine under a new database name.
    ///
    /// The snapshot's stored name and path are rewritten, the database
    /// is installed into the engine (replacing any same-named entry),
    /// and its file is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Malformed`] if the archive holds no
    /// `.enosql` member or the snapshot does not parse, or I/O errors
    /// from reading the archive or writing the database file.
    pub fn restore_backup(
        &self,
        archive_path: impl AsRef<Path>,
        new_db_name: &str,
    ) -> EngineResult<Arc<crate::database::Database>> {
        let archive_path = archive_path.as_ref();
        let file = File::open(archive_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));

        let mut snapshot_body: Option<Vec<u8>> = None;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            if name.ends_with(".enosql") {
                let mut body = Vec::new();
                entry.read_to_end(&mut body)?;
                snapshot_body = Some(body);
            }
        }

        let body = snapshot_body
            .ok_or_else(|| EngineError::malformed("no database snapshot found in backup"))?;
        let snapshot: DatabaseSnapshot = serde_json::from_slice(&body)
            .map_err(|e| EngineError::malformed(format!("failed to parse backup snapshot: {e}")))?;

        let db = self.engine.install_snapshot(snapshot, new_db_name)?;
        info!(
            archive = %archive_path.display(),
            database = new_db_name,
            "restored backup"
        );
        Ok(db)
    }

    /// Lists the backups in the backup directory.
    ///
    /// Every `*.tar.gz` file is peeked for its `metadata.json`;
    /// malformed archives are skipped with a warning rather than
    /// failing the listing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn list_backups(&self) -> EngineResult<Vec<BackupInfo>> {
        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let is_archive = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".tar.gz"));
            if !is_archive {
                continue;
            }

            match read_backup_info(&path) {
                Ok(info) => backups.push(info),
                Err(e) => {
                    warn!(archive = %path.display(), error = %e, "skipping unreadable backup");
                }
            }
        }

        backups.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(backups)
    }

    /// Deletes a backup archive.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be removed.
    pub fn delete_backup(&self, archive_path: impl AsRef<Path>) -> EngineResult<()> {
        fs::remove_file(archive_path.as_ref())?;
        Ok(())
    }
}

/// Writes a two-member gzip tar archive.
fn write_archive(
    path: &Path,
    snapshot_name: &str,
    snapshot_body: &[u8],
    metadata_body: &[u8],
) -> EngineResult<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    append_member(&mut builder, snapshot_name, snapshot_body)?;
    append_member(&mut builder, "metadata.json", metadata_body)?;

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

fn append_member<W: std::io::Write>(
    builder: &mut Builder<W>,
    name: &str,
    body: &[u8],
) -> EngineResult<()> {
    let mut header = Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, body)?;
    Ok(())
}

/// Reads the metadata member of an archive into a [`BackupInfo`].
fn read_backup_info(path: &Path) -> EngineResult<BackupInfo> {
    let file = File::open(path)?;
    let size_bytes = file.metadata()?.len();
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_string_lossy() != "metadata.json" {
            continue;
        }

        let mut body = Vec::new();
        entry.read_to_end(&mut body)?;
        let metadata: BackupMetadata = serde_json::from_slice(&body)
            .map_err(|e| EngineError::malformed(format!("failed to parse metadata: {e}")))?;

        return Ok(BackupInfo {
            name: metadata.backup,
            database: metadata.database,
            timestamp: metadata.timestamp,
            size_bytes,
            path: path.to_path_buf(),
        });
    }

    Err(EngineError::malformed("no metadata found in backup"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Object, Value};
    use tempfile::tempdir;

    fn data(pairs: &[(&str, Value)]) -> Object {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn setup() -> (tempfile::TempDir, Arc<Engine>, BackupManager) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(Engine::new(dir.path().join("data")).unwrap());
        let manager =
            BackupManager::new(Arc::clone(&engine), dir.path().join("backups")).unwrap();
        (dir, engine, manager)
    }

    fn seed_database(engine: &Engine) {
        let db = engine.create_database("orig").unwrap();
        let items = db.create_collection("items").unwrap();
        items
            .insert("a", data(&[("name", "apple".into()), ("qty", 3.into())]))
            .unwrap();
        items
            .insert("b", data(&[("name", "banana".into()), ("qty", 5.into())]))
            .unwrap();
        items.create_index("qty");
    }

    #[test]
    fn create_backup_names_and_sizes_archive() {
        let (_dir, engine, manager) = setup();
        seed_database(&engine);

        let info = manager.create_backup("orig", "nightly").unwrap();

        assert_eq!(info.database, "orig");
        assert_eq!(info.name, "nightly");
        assert!(info.size_bytes > 0);
        assert!(info.path.exists());

        let filename = info.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(filename.starts_with("orig_nightly_"));
        assert!(filename.ends_with(".tar.gz"));
    }

    #[test]
    fn backup_restore_round_trip_under_new_name() {
        let (_dir, engine, manager) = setup();
        seed_database(&engine);

        let info = manager.create_backup("orig", "nightly").unwrap();
        manager.restore_backup(&info.path, "copy").unwrap();

        let names = engine.list_databases().unwrap();
        assert!(names.contains(&"copy".to_string()));
        assert!(names.contains(&"orig".to_string()));

        let orig = engine.get_database("orig").unwrap();
        let copy = engine.get_database("copy").unwrap();
        assert_eq!(copy.collection_names(), orig.collection_names());

        let orig_items = orig.get_collection("items").unwrap();
        let copy_items = copy.get_collection("items").unwrap();
        assert_eq!(copy_items.get_all(), orig_items.get_all());
        assert_eq!(copy_items.index_fields(), orig_items.index_fields());

        assert_eq!(copy.path(), engine.database_path("copy"));
        assert!(copy.path().exists());
    }

    #[test]
    fn restored_database_survives_reload() {
        let (dir, engine, manager) = setup();
        seed_database(&engine);

        let info = manager.create_backup("orig", "nightly").unwrap();
        manager.restore_backup(&info.path, "copy").unwrap();

        let fresh = Engine::new(dir.path().join("data")).unwrap();
        let copy = fresh.get_database("copy").unwrap();
        let items = copy.get_collection("items").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.find("qty", &Value::Int(5))[0].id, "b");
    }

    #[test]
    fn list_backups_reads_metadata() {
        let (_dir, engine, manager) = setup();
        seed_database(&engine);

        manager.create_backup("orig", "first").unwrap();
        manager.create_backup("orig", "second").unwrap();

        let backups = manager.list_backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().all(|b| b.database == "orig"));

        let mut names: Vec<_> = backups.iter().map(|b| b.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn list_backups_skips_malformed_archives() {
        let (_dir, engine, manager) = setup();
        seed_database(&engine);
        manager.create_backup("orig", "good").unwrap();

        fs::write(manager.backup_dir().join("junk.tar.gz"), b"not an archive").unwrap();

        let backups = manager.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].name, "good");
    }

    #[test]
    fn restore_without_snapshot_member_is_malformed() {
        let (_dir, _engine, manager) = setup();

        // A valid archive whose data member is not a .enosql snapshot.
        let path = manager.backup_dir().join("empty.tar.gz");
        write_archive(&path, "readme.txt", b"hello", b"{}").unwrap();

        let err = manager.restore_backup(&path, "copy").unwrap_err();
        assert!(matches!(err, EngineError::Malformed { .. }));
    }

    #[test]
    fn delete_backup_removes_archive() {
        let (_dir, engine, manager) = setup();
        seed_database(&engine);

        let info = manager.create_backup("orig", "nightly").unwrap();
        manager.delete_backup(&info.path).unwrap();
        assert!(!info.path.exists());
        assert!(manager.list_backups().unwrap().is_empty());
    }
}
