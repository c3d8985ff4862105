//! Database and collection statistics.

use crate::collection::Collection;
use crate::engine::Engine;
use crate::error::EngineResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;

/// Statistics for one database.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    /// Database name.
    pub name: String,
    /// Number of collections.
    pub collections_count: usize,
    /// Documents across all collections.
    pub total_documents: usize,
    /// Indexes across all collections.
    pub total_indexes: usize,
    /// Size of the snapshot file in bytes, zero if never saved.
    pub size_on_disk: u64,
    /// Per-collection breakdown.
    pub collection_stats: BTreeMap<String, CollectionStats>,
}

/// Statistics for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub document_count: usize,
    /// Number of indexes.
    pub index_count: usize,
    /// Mean byte length of the JSON encoding of each document.
    pub avg_doc_size: f64,
    /// Most frequent type tag per top-level field seen in the data.
    pub field_types: BTreeMap<String, String>,
    /// Entry count of each index divided by the document count. An
    /// index over a unique field sits near 1.0; heavy last-writer-wins
    /// collapse pushes it toward zero.
    pub index_efficiency: BTreeMap<String, f64>,
}

impl Engine {
    /// Walks a database and computes its statistics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::DatabaseNotFound`] for an unknown
    /// database.
    pub fn database_stats(&self, name: &str) -> EngineResult<DatabaseStats> {
        let db = self.get_database(name)?;

        let size_on_disk = fs::metadata(db.path()).map(|m| m.len()).unwrap_or(0);

        let mut stats = DatabaseStats {
            name: name.to_string(),
            collections_count: 0,
            total_documents: 0,
            total_indexes: 0,
            size_on_disk,
            collection_stats: BTreeMap::new(),
        };

        for collection in db.collections() {
            let coll_stats = collect_stats(&collection);
            stats.collections_count += 1;
            stats.total_documents += coll_stats.document_count;
            stats.total_indexes += coll_stats.index_count;
            stats
                .collection_stats
                .insert(coll_stats.name.clone(), coll_stats);
        }

        Ok(stats)
    }
}

fn collect_stats(collection: &Collection) -> CollectionStats {
    collection.with_state(|documents, indexes| {
        let document_count = documents.len();

        let mut total_size = 0usize;
        let mut type_counts: BTreeMap<&str, BTreeMap<&'static str, usize>> = BTreeMap::new();
        for doc in documents.values() {
            total_size += doc.encoded_len();
            for (field, value) in &doc.data {
                *type_counts
                    .entry(field.as_str())
                    .or_default()
                    .entry(value.type_tag())
                    .or_default() += 1;
            }
        }

        let avg_doc_size = if document_count > 0 {
            total_size as f64 / document_count as f64
        } else {
            0.0
        };

        let field_types = type_counts
            .into_iter()
            .map(|(field, counts)| {
                let dominant = counts
                    .into_iter()
                    .max_by_key(|(_, count)| *count)
                    .map(|(tag, _)| tag)
                    .unwrap_or("unknown");
                (field.to_string(), dominant.to_string())
            })
            .collect();

        let index_efficiency = if document_count > 0 {
            indexes
                .iter()
                .map(|(field, index)| {
                    (field.clone(), index.len() as f64 / document_count as f64)
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        CollectionStats {
            name: collection.name().to_string(),
            document_count,
            index_count: indexes.len(),
            avg_doc_size,
            field_types,
            index_efficiency,
        }
    })
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

    #[test]
    fn stats_walk_counts_everything() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(dir.path()).unwrap();
        let db = engine.create_database("shop").unwrap();

        let items = db.create_collection("items").unwrap();
        items
            .insert("a", data(&[("name", "apple".into()), ("qty", 3.into())]))
            .unwrap();
        items
            .insert("b", data(&[("name", "banana".into()), ("qty", "many".into())]))
            .unwrap();
        items
            .insert("c", data(&[("name", "cherry".into()), ("qty", 3.into())]))
            .unwrap();
        items.create_index("qty");

        db.create_collection("empty").unwrap();
        engine.save_database("shop").unwrap();

        let stats = engine.database_stats("shop").unwrap();
        assert_eq!(stats.name, "shop");
        assert_eq!(stats.collections_count, 2);
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.total_indexes, 1);
        assert!(stats.size_on_disk > 0);

        let items_stats = &stats.collection_stats["items"];
        assert_eq!(items_stats.document_count, 3);
        assert_eq!(items_stats.index_count, 1);
        assert!(items_stats.avg_doc_size > 0.0);

        // "qty" holds two ints and one string, so int dominates.
        assert_eq!(items_stats.field_types["qty"], "int");
        assert_eq!(items_stats.field_types["name"], "string");

        // Three documents collapse to two distinct qty values.
        let efficiency = items_stats.index_efficiency["qty"];
        assert!((efficiency - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_collection_has_zeroed_stats() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(dir.path()).unwrap();
        let db = engine.create_database("shop").unwrap();
        db.create_collection("empty").unwrap();

        let stats = engine.database_stats("shop").unwrap();
        let empty = &stats.collection_stats["empty"];
        assert_eq!(empty.document_count, 0);
        assert_eq!(empty.avg_doc_size, 0.0);
        assert!(empty.field_types.is_empty());
        assert!(empty.index_efficiency.is_empty());
    }
}
