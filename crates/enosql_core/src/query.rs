//! Filter/sort/paginate query evaluation.
//!
//! Queries arrive as structured filter lists, not as a query language:
//! a [`QueryBuilder`] accumulates [`Filter`]s, an optional sort, and
//! skip/limit, then evaluates them conjunctively over the collection.
//! A malformed filter operand (a non-array `$in` list, an uncompilable
//! `$regex` pattern) makes that filter non-matching instead of failing
//! the whole query, so one bad clause cannot poison a dashboard.

use crate::collection::Collection;
use crate::document::Document;
use crate::error::EngineError;
use crate::value::{Object, Value};
use regex::Regex;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Field present and equal to the operand.
    Eq,
    /// Field absent or not equal to the operand.
    Ne,
    /// Field present and greater than the operand.
    Gt,
    /// Field present and greater than or equal to the operand.
    Gte,
    /// Field present and less than the operand.
    Lt,
    /// Field present and less than or equal to the operand.
    Lte,
    /// Field present and equal to some element of the operand array.
    In,
    /// Field absent, or equal to no element of the operand array.
    Nin,
    /// Field present and its stringification matches the operand pattern.
    Regex,
    /// Field presence equals the operand boolean.
    Exists,
    /// Field present and its type tag equals the operand string.
    Type,
    /// Field present and its size equals the operand integer.
    Size,
}

impl Operator {
    /// The operator's `$`-prefixed spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Regex => "$regex",
            Operator::Exists => "$exists",
            Operator::Type => "$type",
            Operator::Size => "$size",
        }
    }
}

impl FromStr for Operator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "$eq" => Ok(Operator::Eq),
            "$ne" => Ok(Operator::Ne),
            "$gt" => Ok(Operator::Gt),
            "$gte" => Ok(Operator::Gte),
            "$lt" => Ok(Operator::Lt),
            "$lte" => Ok(Operator::Lte),
            "$in" => Ok(Operator::In),
            "$nin" => Ok(Operator::Nin),
            "$regex" => Ok(Operator::Regex),
            "$exists" => Ok(Operator::Exists),
            "$type" => Ok(Operator::Type),
            "$size" => Ok(Operator::Size),
            other => Err(EngineError::invalid_argument(format!(
                "unknown operator: {other}"
            ))),
        }
    }
}

/// A single query predicate: `field <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Top-level field the predicate reads.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Operand value.
    pub value: Value,
}

impl Filter {
    /// Creates a filter.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluates the predicate against a data map.
    #[must_use]
    pub fn matches(&self, data: &Object) -> bool {
        let field_value = data.get(&self.field);

        match self.operator {
            Operator::Eq => {
                field_value.is_some_and(|v| v.compare(&self.value) == Ordering::Equal)
            }
            Operator::Ne => {
                field_value.map_or(true, |v| v.compare(&self.value) != Ordering::Equal)
            }
            Operator::Gt => {
                field_value.is_some_and(|v| v.compare(&self.value) == Ordering::Greater)
            }
            Operator::Gte => {
                field_value.is_some_and(|v| v.compare(&self.value) != Ordering::Less)
            }
            Operator::Lt => {
                field_value.is_some_and(|v| v.compare(&self.value) == Ordering::Less)
            }
            Operator::Lte => {
                field_value.is_some_and(|v| v.compare(&self.value) != Ordering::Greater)
            }
            Operator::In => field_value.is_some_and(|v| match &self.value {
                Value::Array(items) => {
                    items.iter().any(|item| v.compare(item) == Ordering::Equal)
                }
                _ => false,
            }),
            Operator::Nin => match field_value {
                None => true,
                Some(v) => match &self.value {
                    Value::Array(items) => {
                        !items.iter().any(|item| v.compare(item) == Ordering::Equal)
                    }
                    _ => true,
                },
            },
            Operator::Regex => field_value.is_some_and(|v| match &self.value {
                Value::String(pattern) => Regex::new(pattern)
                    .map(|re| re.is_match(&v.stringify()))
                    .unwrap_or(false),
                _ => false,
            }),
            Operator::Exists => match &self.value {
                Value::Bool(expected) => field_value.is_some() == *expected,
                _ => false,
            },
            Operator::Type => field_value.is_some_and(|v| match &self.value {
                Value::String(tag) => v.type_tag() == tag,
                _ => false,
            }),
            Operator::Size => field_value.is_some_and(|v| match &self.value {
                Value::Int(n) => *n >= 0 && v.size() as i64 == *n,
                _ => false,
            }),
        }
    }
}

/// A composable query over one collection.
///
/// Filters combine conjunctively. Results are stable-sorted by the sort
/// key (documents missing the key sort last ascending, first
/// descending; ties keep input order), then `skip` documents are
/// dropped and the rest truncated to `limit` (zero means unbounded).
///
/// Running the same builder twice with no intervening mutations yields
/// equal sequences.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    collection: Arc<Collection>,
    filters: Vec<Filter>,
    sort_by: Option<String>,
    ascending: bool,
    skip: usize,
    limit: usize,
}

impl QueryBuilder {
    pub(crate) fn new(collection: Arc<Collection>) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            sort_by: None,
            ascending: true,
            skip: 0,
            limit: 0,
        }
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter::new(field, operator, value));
        self
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Eq, value)
    }

    /// Adds a greater-than filter.
    #[must_use]
    pub fn greater_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Gt, value)
    }

    /// Adds a less-than filter.
    #[must_use]
    pub fn less_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Lt, value)
    }

    /// Adds an `$in` filter over a list of candidate values.
    #[must_use]
    pub fn in_list(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(field, Operator::In, Value::Array(values))
    }

    /// Adds a regex filter on the field's stringification.
    #[must_use]
    pub fn regex(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(field, Operator::Regex, Value::String(pattern.into()))
    }

    /// Adds a field-presence filter.
    #[must_use]
    pub fn exists(self, field: impl Into<String>, exists: bool) -> Self {
        self.filter(field, Operator::Exists, exists)
    }

    /// Sets the sort key and direction.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort_by = Some(field.into());
        self.ascending = ascending;
        self
    }

    /// Sets the number of leading results to drop.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of results. Zero means unbounded.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Runs the query and returns the matching documents.
    #[must_use]
    pub fn execute(&self) -> Vec<Document> {
        let mut results: Vec<Document> = self.collection.with_documents(|docs| {
            docs.values()
                .filter(|doc| self.matches(doc))
                .cloned()
                .collect()
        });

        if let Some(field) = &self.sort_by {
            if self.ascending {
                results.sort_by(|a, b| sort_key_cmp(a, b, field));
            } else {
                results.sort_by(|a, b| sort_key_cmp(b, a, field));
            }
        }

        if self.skip > 0 {
            results = results.split_off(self.skip.min(results.len()));
        }
        if self.limit > 0 {
            results.truncate(self.limit);
        }

        results
    }

    /// Counts the documents matching the filters, ignoring sort, skip,
    /// and limit.
    #[must_use]
    pub fn count(&self) -> usize {
        self.collection
            .with_documents(|docs| docs.values().filter(|doc| self.matches(doc)).count())
    }

    fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(&doc.data))
    }
}

/// Ascending comparison on a sort key; absent keys order last. The
/// descending path calls this with the arguments swapped, which flips
/// absent keys to first.
fn sort_key_cmp(a: &Document, b: &Document, field: &str) -> Ordering {
    match (a.data.get(field), b.data.get(field)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.compare(y),
    }
}
