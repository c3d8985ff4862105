//! Aggregation pipeline over projected document rows.
//!
//! Documents are first flattened to plain maps carrying the reserved
//! `_id`, `created_at`, and `updated_at` keys beside the user data;
//! stages then transform sequences of those maps.

use crate::collection::Collection;
use crate::error::{EngineError, EngineResult};
use crate::query::Filter;
use crate::value::{Object, Value};
use std::collections::BTreeMap;

/// One stage of an aggregation pipeline.
pub trait AggregationStage: Send + Sync {
    /// Transforms a sequence of rows into the next sequence.
    fn process(&self, rows: Vec<Object>) -> EngineResult<Vec<Object>>;
}

/// Filters rows with the same operator semantics as a query.
pub struct MatchStage {
    /// Conjunction of predicates a row must satisfy.
    pub filters: Vec<Filter>,
}

impl MatchStage {
    /// Creates a match stage from a filter conjunction.
    #[must_use]
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

impl AggregationStage for MatchStage {
    fn process(&self, rows: Vec<Object>) -> EngineResult<Vec<Object>> {
        Ok(rows
            .into_iter()
            .filter(|row| self.filters.iter().all(|f| f.matches(row)))
            .collect())
    }
}

/// A single aggregation over a group's rows.
#[derive(Debug, Clone)]
pub struct AggregateFunc {
    /// Operation name: `count`, `sum`, `avg`, `max`, or `min`. Anything
    /// else fails the stage with
    /// [`EngineError::UnknownAggregation`].
    pub operation: String,
    /// Field the numeric operations read. Only rows whose field parses
    /// as a number contribute.
    pub field: String,
}

impl AggregateFunc {
    /// Creates an aggregation function.
    pub fn new(operation: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            field: field.into(),
        }
    }

    fn evaluate(&self, rows: &[Object]) -> EngineResult<Value> {
        let numbers = || {
            rows.iter()
                .filter_map(|row| row.get(&self.field))
                .filter_map(Value::as_number)
        };

        match self.operation.as_str() {
            "count" => Ok(Value::Int(rows.len() as i64)),
            "sum" => Ok(Value::Float(numbers().sum())),
            "avg" => {
                let mut sum = 0.0;
                let mut count = 0u64;
                for n in numbers() {
                    sum += n;
                    count += 1;
                }
                if count > 0 {
                    Ok(Value::Float(sum / count as f64))
                } else {
                    Ok(Value::Int(0))
                }
            }
            "max" => Ok(numbers()
                .reduce(f64::max)
                .map(Value::Float)
                .unwrap_or(Value::Null)),
            "min" => Ok(numbers()
                .reduce(f64::min)
                .map(Value::Float)
                .unwrap_or(Value::Null)),
            other => Err(EngineError::unknown_aggregation(other)),
        }
    }
}

/// Groups rows and reduces each group.
///
/// When `id` is a string it names the field whose stringified value
/// keys the groups; rows missing the field, and every row when `id` is
/// not a string, land in a single `"null"` group. Each output row
/// carries `_id` (the group key) plus one entry per aggregated field.
pub struct GroupStage {
    /// Grouping key: a field name, or anything else for one group.
    pub id: Value,
    /// Output field name to aggregation function.
    pub fields: BTreeMap<String, AggregateFunc>,
}

impl GroupStage {
    /// Creates a group stage.
    #[must_use]
    pub fn new(id: Value, fields: BTreeMap<String, AggregateFunc>) -> Self {
        Self { id, fields }
    }

    fn group_key(&self, row: &Object) -> String {
        if let Value::String(field) = &self.id {
            if let Some(value) = row.get(field) {
                return value.stringify();
            }
        }
        "null".to_string()
    }
}

impl AggregationStage for GroupStage {
    fn process(&self, rows: Vec<Object>) -> EngineResult<Vec<Object>> {
        let mut groups: BTreeMap<String, Vec<Object>> = BTreeMap::new();
        for row in rows {
            groups.entry(self.group_key(&row)).or_default().push(row);
        }

        let mut result = Vec::with_capacity(groups.len());
        for (key, group_rows) in groups {
            let mut out = Object::new();
            out.insert("_id".to_string(), Value::String(key));
            for (name, func) in &self.fields {
                out.insert(name.clone(), func.evaluate(&group_rows)?);
            }
            result.push(out);
        }

        Ok(result)
    }
}

impl Collection {
    /// Runs an aggregation pipeline over this collection.
    ///
    /// Rows are projected under the read lock (user data plus the
    /// reserved `_id`/`created_at`/`updated_at` keys), then handed
    /// through the stages in order.
    ///
    /// # Errors
    ///
    /// Propagates the first stage failure, e.g.
    /// [`EngineError::UnknownAggregation`].
    pub fn aggregate(&self, pipeline: &[Box<dyn AggregationStage>]) -> EngineResult<Vec<Object>> {
        let mut rows: Vec<Object> = self.with_documents(|docs| {
            docs.values()
                .map(|doc| {
                    let mut row = Object::new();
                    row.insert("_id".to_string(), Value::String(doc.id.clone()));
                    row.insert("created_at".to_string(), Value::Timestamp(doc.created_at));
                    row.insert("updated_at".to_string(), Value::Timestamp(doc.updated_at));
                    for (key, value) in &doc.data {
                        row.insert(key.clone(), value.clone());
                    }
                    row
                })
                .collect()
        });

        for stage in pipeline {
            rows = stage.process(rows)?;
        }

        Ok(rows)
    }
}
