//! # enosql core
//!
//! Embeddable schemaless document database engine.
//!
//! This crate provides:
//! - Named databases holding named collections of documents
//! - Secondary indexes on top-level fields with O(1) equality lookup
//! - Filter/sort/paginate queries and aggregation pipelines
//! - JSON snapshot persistence (one `.enosql` file per database)
//! - JSON/CSV/SQL import and export
//! - Compressed `tar.gz` backup and restore
//!
//! The engine is a library, not a server: hosts obtain a [`Database`]
//! handle from the [`Engine`], a [`Collection`] from the database, and
//! operate on collections directly. Mutations live in memory until
//! [`Engine::save_database`] writes a full snapshot.
//!
//! ```rust,ignore
//! use enosql_core::{Engine, Object, Value};
//!
//! let engine = Engine::new("./data")?;
//! let db = engine.create_database("shop")?;
//! let items = db.create_collection("items")?;
//!
//! let mut data = Object::new();
//! data.insert("name".into(), Value::from("apple"));
//! data.insert("qty".into(), Value::from(3));
//! items.insert("a", data)?;
//!
//! let apples = items.find("name", &"apple".into());
//! engine.save_database("shop")?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregate;
mod backup;
mod collection;
mod database;
mod document;
mod engine;
mod error;
mod import_export;
mod index;
mod query;
mod stats;
mod value;

pub use aggregate::{AggregateFunc, AggregationStage, GroupStage, MatchStage};
pub use backup::{BackupInfo, BackupManager};
pub use collection::Collection;
pub use database::Database;
pub use document::Document;
pub use engine::{Engine, SNAPSHOT_EXT};
pub use error::{EngineError, EngineResult};
pub use import_export::{
    ExportOptions, Format, ImportExportManager, ImportOptions, ImportResult,
};
pub use index::Index;
pub use query::{Filter, Operator, QueryBuilder};
pub use stats::{CollectionStats, DatabaseStats};
pub use value::{Object, Value};
