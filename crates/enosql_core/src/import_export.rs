//! Bulk import and export in textual formats.
//!
//! Three formats are supported: `json`, `csv`, and `sql`. Imports read
//! from a file path or an in-memory buffer and partition per-row
//! failures into [`ImportResult::errors`] while continuing, because
//! partial success is valuable to the caller. The SQL reader only
//! understands the engine's own export shape; it is not a SQL parser.

use crate::collection::Collection;
use crate::document::Document;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::query::Filter;
use crate::value::{Object, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Names reserved for document metadata in tabular formats.
const SYSTEM_COLUMNS: [&str; 3] = ["_id", "created_at", "updated_at"];

/// An import/export data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The engine's JSON export shape.
    Json,
    /// Delimited text with a header row.
    Csv,
    /// `CREATE TABLE` plus one `INSERT` per document.
    Sql,
}

impl Format {
    /// The format's lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Sql => "sql",
        }
    }
}

impl FromStr for Format {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            "sql" => Ok(Format::Sql),
            other => Err(EngineError::unsupported_format(other)),
        }
    }
}

/// Options for an export operation.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Source collection.
    pub collection: String,
    /// Output format.
    pub format: Format,
    /// Output file path. Parent directories are created as needed.
    pub file_path: PathBuf,
    /// Optional filters; when any are set (or sort/skip/limit), the
    /// export writes the query result instead of the whole collection.
    pub filters: Vec<Filter>,
    /// Optional sort key and direction.
    pub sort: Option<(String, bool)>,
    /// Leading matches to drop.
    pub skip: usize,
    /// Maximum documents to export. Zero means unbounded.
    pub limit: usize,
}

impl ExportOptions {
    /// Creates export options for a collection, format, and output path.
    pub fn new(
        collection: impl Into<String>,
        format: Format,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            collection: collection.into(),
            format,
            file_path: file_path.into(),
            filters: Vec::new(),
            sort: None,
            skip: 0,
            limit: 0,
        }
    }

    /// Adds a filter to the export query.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the export query's sort key and direction.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort = Some((field.into(), ascending));
        self
    }

    /// Sets the number of leading matches to drop.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of documents to export.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn is_plain(&self) -> bool {
        self.filters.is_empty() && self.sort.is_none() && self.skip == 0 && self.limit == 0
    }
}

/// Options for an import operation.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Target collection.
    pub collection: String,
    /// Input format.
    pub format: Format,
    /// Input file path.
    pub file_path: PathBuf,
    /// Create the collection if it does not exist. Without this flag a
    /// missing collection is an error.
    pub create_collection: bool,
    /// Remove all existing documents before importing.
    pub overwrite_data: bool,
    /// Field (JSON) or column (CSV) whose stringified value becomes the
    /// document id; the field is stripped from the data.
    pub id_field: Option<String>,
}

impl ImportOptions {
    /// Creates import options for a collection, format, and input path.
    pub fn new(
        collection: impl Into<String>,
        format: Format,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            collection: collection.into(),
            format,
            file_path: file_path.into(),
            create_collection: false,
            overwrite_data: false,
            id_field: None,
        }
    }

    /// Sets whether to create a missing target collection.
    #[must_use]
    pub fn create_collection(mut self, value: bool) -> Self {
        self.create_collection = value;
        self
    }

    /// Sets whether to remove existing documents first.
    #[must_use]
    pub fn overwrite_data(mut self, value: bool) -> Self {
        self.overwrite_data = value;
        self
    }

    /// Sets the id field.
    #[must_use]
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }
}

/// Outcome of an import: per-row failures land in `errors` and count as
/// skipped; the operation itself still succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportResult {
    /// Documents inserted.
    pub imported: usize,
    /// Rows rejected.
    pub skipped: usize,
    /// One message per rejected row.
    pub errors: Vec<String>,
}

impl ImportResult {
    fn reject(&mut self, message: String) {
        warn!(error = %message, "skipping import row");
        self.skipped += 1;
        self.errors.push(message);
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: DateTime<Utc>,
    count: usize,
    documents: &'a [Document],
}

/// Streams documents between collections and files.
pub struct ImportExportManager {
    engine: Arc<Engine>,
}

impl ImportExportManager {
    /// Creates a manager over an engine.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Names of the supported formats.
    #[must_use]
    pub fn supported_formats(&self) -> Vec<&'static str> {
        vec![Format::Json.as_str(), Format::Csv.as_str(), Format::Sql.as_str()]
    }

    /// Exports a collection (or a query over it) to a file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` errors for a missing database or collection,
    /// [`EngineError::InvalidArgument`] for a CSV export of zero
    /// documents, or an I/O error from the write.
    pub fn export(&self, db_name: &str, options: &ExportOptions) -> EngineResult<()> {
        let db = self.engine.get_database(db_name)?;
        let collection = db.get_collection(&options.collection)?;

        let documents = if options.is_plain() {
            collection.get_all()
        } else {
            let mut query = collection.query();
            for filter in &options.filters {
                query = query.filter(filter.field.clone(), filter.operator, filter.value.clone());
            }
            if let Some((field, ascending)) = &options.sort {
                query = query.sort(field.clone(), *ascending);
            }
            query.skip(options.skip).limit(options.limit).execute()
        };

        if let Some(parent) = options.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = match options.format {
            Format::Json => export_json(&documents)?,
            Format::Csv => export_csv(&documents)?,
            Format::Sql => export_sql(&documents, &options.collection),
        };
        fs::write(&options.file_path, body)?;

        info!(
            database = db_name,
            collection = %options.collection,
            format = options.format.as_str(),
            count = documents.len(),
            "exported documents"
        );
        Ok(())
    }

    /// Imports a file into a collection.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing database, or for a missing
    /// collection when `create_collection` is off;
    /// [`EngineError::Malformed`] when the payload as a whole does not
    /// parse. Per-row failures do not fail the operation.
    pub fn import(&self, db_name: &str, options: &ImportOptions) -> EngineResult<ImportResult> {
        let db = self.engine.get_database(db_name)?;
        let collection = self.resolve_collection(&db, &options.collection, options.create_collection)?;

        if options.overwrite_data {
            collection.clear();
        }

        let content = fs::read_to_string(&options.file_path)?;
        let result = match options.format {
            Format::Json => import_json(&collection, &content, options.id_field.as_deref())?,
            Format::Csv => import_csv(&collection, &content, options.id_field.as_deref())?,
            Format::Sql => import_sql(&collection, &content),
        };

        info!(
            database = db_name,
            collection = %options.collection,
            imported = result.imported,
            skipped = result.skipped,
            "import finished"
        );
        Ok(result)
    }

    /// Imports an in-memory buffer into a collection. Supports `json`
    /// and `csv`.
    ///
    /// # Errors
    ///
    /// As for [`import`](Self::import), plus
    /// [`EngineError::UnsupportedFormat`] for `sql` and unknown formats.
    pub fn import_from_content(
        &self,
        db_name: &str,
        collection_name: &str,
        content: &str,
        format: &str,
        create_collection: bool,
    ) -> EngineResult<ImportResult> {
        let db = self.engine.get_database(db_name)?;
        let collection = self.resolve_collection(&db, collection_name, create_collection)?;

        match format.parse::<Format>()? {
            Format::Json => import_json(&collection, content, None),
            Format::Csv => import_csv(&collection, content, None),
            Format::Sql => Err(EngineError::unsupported_format("sql")),
        }
    }

    fn resolve_collection(
        &self,
        db: &crate::database::Database,
        name: &str,
        create: bool,
    ) -> EngineResult<Arc<Collection>> {
        match db.get_collection(name) {
            Ok(collection) => Ok(collection),
            Err(EngineError::CollectionNotFound { .. }) if create => db.create_collection(name),
            Err(e) => Err(e),
        }
    }
}

fn export_json(documents: &[Document]) -> EngineResult<String> {
    let export = JsonExport {
        exported_at: Utc::now(),
        count: documents.len(),
        documents,
    };
    serde_json::to_string_pretty(&export)
        .map_err(|e| EngineError::malformed(format!("failed to encode export: {e}")))
}

fn export_csv(documents: &[Document]) -> EngineResult<String> {
    if documents.is_empty() {
        return Err(EngineError::invalid_argument("no documents to export"));
    }

    // Union of top-level data keys, sorted; system columns lead.
    let mut fields: Vec<&str> = documents
        .iter()
        .flat_map(|doc| doc.data.keys().map(String::as_str))
        .filter(|key| !SYSTEM_COLUMNS.contains(key))
        .collect();
    fields.sort_unstable();
    fields.dedup();

    let mut out = String::new();
    let headers: Vec<&str> = SYSTEM_COLUMNS.iter().copied().chain(fields.iter().copied()).collect();
    out.push_str(&csv_row(headers.iter().copied()));

    for doc in documents {
        let created = doc.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let updated = doc.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut cells = vec![doc.id.clone(), created, updated];
        for field in &fields {
            cells.push(doc.data.get(*field).map(Value::stringify).unwrap_or_default());
        }
        out.push_str(&csv_row(cells.iter().map(String::as_str)));
    }

    Ok(out)
}

fn export_sql(documents: &[Document], table: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("-- SQL export for table: {table}\n"));
    out.push_str(&format!(
        "-- Generated at: {}\n\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    out.push_str(&format!("CREATE TABLE IF NOT EXISTS {table} (\n"));
    out.push_str("    id VARCHAR(255) PRIMARY KEY,\n");
    out.push_str("    data JSON,\n");
    out.push_str("    created_at TIMESTAMP,\n");
    out.push_str("    updated_at TIMESTAMP\n");
    out.push_str(");\n\n");

    for doc in documents {
        let data_json = serde_json::to_string(&doc.data).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!(
            "INSERT INTO {table} (id, data, created_at, updated_at) VALUES ('{}', '{}', '{}', '{}');\n",
            sql_escape(&doc.id),
            sql_escape(&data_json),
            doc.created_at.format("%Y-%m-%d %H:%M:%S"),
            doc.updated_at.format("%Y-%m-%d %H:%M:%S"),
        ));
    }

    out
}

fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn import_json(
    collection: &Collection,
    content: &str,
    id_field: Option<&str>,
) -> EngineResult<ImportResult> {
    let payload: Value = serde_json::from_str(content)
        .map_err(|e| EngineError::malformed(format!("failed to decode JSON: {e}")))?;
    let documents = parse_json_payload(payload)?;

    let mut result = ImportResult::default();
    for (i, mut data) in documents.into_iter().enumerate() {
        let id = match id_field.and_then(|field| data.remove(field)) {
            Some(value) => value.stringify(),
            None => format!(
                "imported_{}_{i}",
                Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ),
        };

        match collection.insert(id.clone(), data) {
            Ok(()) => result.imported += 1,
            Err(e) => result.reject(format!("failed to insert {id}: {e}")),
        }
    }

    Ok(result)
}

/// Accepts the three JSON shapes: an export object with a `documents`
/// array (whose elements may carry a `data` sub-map to unwrap), a bare
/// array of objects, or a single object.
fn parse_json_payload(payload: Value) -> EngineResult<Vec<Object>> {
    match payload {
        Value::Object(mut obj) => match obj.remove("documents") {
            Some(Value::Array(items)) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(mut element) => match element.remove("data") {
                        Some(Value::Object(data)) => Some(data),
                        Some(_) => None,
                        None => Some(element),
                    },
                    _ => None,
                })
                .collect()),
            Some(_) => Err(EngineError::malformed("documents field is not an array")),
            None => Ok(vec![obj]),
        },
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(obj),
                _ => None,
            })
            .collect()),
        _ => Err(EngineError::malformed("unsupported JSON payload")),
    }
}

fn import_csv(
    collection: &Collection,
    content: &str,
    id_field: Option<&str>,
) -> EngineResult<ImportResult> {
    let records = parse_csv(content)?;
    if records.len() < 2 {
        return Err(EngineError::malformed(
            "CSV input must have a header row and at least one data row",
        ));
    }

    let headers = &records[0];
    let id_column = id_field.and_then(|field| headers.iter().position(|h| h == field));

    let mut result = ImportResult::default();
    for (row_index, record) in records[1..].iter().enumerate() {
        if record.len() != headers.len() {
            result.reject(format!("row {}: column count mismatch", row_index + 2));
            continue;
        }

        let mut data = Object::new();
        let mut id = String::new();
        for (i, cell) in record.iter().enumerate() {
            if Some(i) == id_column {
                id = cell.clone();
                continue;
            }
            let header = headers[i].as_str();
            if SYSTEM_COLUMNS.contains(&header) {
                if header == "_id" && id.is_empty() {
                    id = cell.clone();
                }
                continue;
            }
            data.insert(header.to_string(), parse_csv_cell(cell));
        }

        if id.is_empty() {
            id = format!("csv_import_{}_{row_index}", Utc::now().timestamp());
        }

        match collection.insert(id.clone(), data) {
            Ok(()) => result.imported += 1,
            Err(e) => result.reject(format!("failed to insert {id}: {e}")),
        }
    }

    Ok(result)
}

/// Typed reading of a CSV cell: integer, then float, then boolean, then
/// plain string.
fn parse_csv_cell(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::Float(f);
    }
    if let Ok(b) = cell.parse::<bool>() {
        return Value::Bool(b);
    }
    Value::String(cell.to_string())
}

fn import_sql(collection: &Collection, content: &str) -> ImportResult {
    let mut result = ImportResult::default();

    for (line_index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.len() < 6 || !line.as_bytes()[..6].eq_ignore_ascii_case(b"INSERT") {
            continue;
        }

        match parse_insert_line(line) {
            Ok((id, data)) => match collection.insert(id.clone(), data) {
                Ok(()) => result.imported += 1,
                Err(e) => {
                    result.reject(format!("line {}: failed to insert {id}: {e}", line_index + 1));
                }
            },
            Err(e) => result.reject(format!("line {}: {e}", line_index + 1)),
        }
    }

    result
}

/// Parses one `INSERT ... VALUES (...)` line of the engine's own export
/// shape: the tuple splits on `', '` and the first two positions are the
/// id and the JSON-encoded data.
fn parse_insert_line(line: &str) -> EngineResult<(String, Object)> {
    let values_at = line
        .as_bytes()
        .windows(6)
        .position(|w| w.eq_ignore_ascii_case(b"VALUES"))
        .ok_or_else(|| EngineError::malformed("missing VALUES clause"))?;

    let tuple = line[values_at + 6..]
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(';')
        .trim_end_matches(')');

    let parts: Vec<&str> = tuple.split("', '").collect();
    if parts.len() < 4 {
        return Err(EngineError::malformed("insufficient values in INSERT statement"));
    }

    let id = parts[0].trim_matches('\'').replace("''", "'");
    let data_json = parts[1].trim_matches('\'').replace("''", "'");

    let data: Value = serde_json::from_str(&data_json)
        .map_err(|e| EngineError::malformed(format!("bad document JSON: {e}")))?;
    match data {
        Value::Object(obj) => Ok((id, obj)),
        _ => Err(EngineError::malformed("document payload is not an object")),
    }
}

/// Renders one CSV record, quoting fields that need it.
fn csv_row<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let rendered: Vec<String> = fields
        .map(|field| {
            if field.contains(['"', ',', '\n', '\r']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        })
        .collect();
    let mut row = rendered.join(",");
    row.push('\n');
    row
}

/// Splits CSV content into records of fields, honoring quoted fields
/// with doubled-quote escapes. Blank lines are skipped.
fn parse_csv(content: &str) -> EngineResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                if field.is_empty() && record.is_empty() {
                    continue;
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(EngineError::malformed("unterminated quoted CSV field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operator;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<Engine>, ImportExportManager) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(Engine::new(dir.path().join("data")).unwrap());
        let manager = ImportExportManager::new(Arc::clone(&engine));
        (dir, engine, manager)
    }

    fn data(pairs: &[(&str, Value)]) -> Object {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn csv_import_with_id_column() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let result = manager
            .import_from_content(
                "shop",
                "items",
                "_id,name,qty\n1,apple,3\n2,banana,5\n",
                "csv",
                true,
            )
            .unwrap();

        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 0);
        assert!(result.errors.is_empty());

        let items = engine
            .get_database("shop")
            .unwrap()
            .get_collection("items")
            .unwrap();
        let found = items.find("name", &"banana".into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "2");
        assert_eq!(
            found[0].data,
            data(&[("name", "banana".into()), ("qty", 5.into())])
        );
    }

    #[test]
    fn csv_rows_with_wrong_column_count_are_skipped() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let result = manager
            .import_from_content(
                "shop",
                "items",
                "_id,name\n1,apple\n2,banana,extra\n3,cherry\n",
                "csv",
                true,
            )
            .unwrap();

        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("row 3"));
    }

    #[test]
    fn csv_cells_are_typed() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        manager
            .import_from_content(
                "shop",
                "items",
                "_id,count,ratio,flag,label\nx,7,2.5,true,hello\n",
                "csv",
                true,
            )
            .unwrap();

        let doc = engine
            .get_database("shop")
            .unwrap()
            .get_collection("items")
            .unwrap()
            .get("x")
            .unwrap();
        assert_eq!(doc.data.get("count"), Some(&Value::Int(7)));
        assert_eq!(doc.data.get("ratio"), Some(&Value::Float(2.5)));
        assert_eq!(doc.data.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(doc.data.get("label"), Some(&Value::from("hello")));
    }

    #[test]
    fn csv_quoted_fields_round_trip() {
        let records =
            parse_csv("a,b\n\"x,y\",\"he said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], vec!["x,y".to_string(), r#"he said "hi""#.to_string()]);

        let row = csv_row(["x,y", "plain"].into_iter());
        assert_eq!(row, "\"x,y\",plain\n");
    }

    #[test]
    fn csv_without_data_rows_is_malformed() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let err = manager
            .import_from_content("shop", "items", "_id,name\n", "csv", true)
            .unwrap_err();
        assert!(matches!(err, EngineError::Malformed { .. }));
    }

    #[test]
    fn json_import_array_shape() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let result = manager
            .import_from_content(
                "shop",
                "items",
                r#"[{"name":"apple"},{"name":"banana"}]"#,
                "json",
                true,
            )
            .unwrap();

        assert_eq!(result.imported, 2);
        let items = engine
            .get_database("shop")
            .unwrap()
            .get_collection("items")
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.find("name", &"apple".into()).len(), 1);
    }

    #[test]
    fn json_import_single_object_shape() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let result = manager
            .import_from_content("shop", "items", r#"{"name":"apple"}"#, "json", true)
            .unwrap();
        assert_eq!(result.imported, 1);
    }

    #[test]
    fn json_import_export_shape_unwraps_data() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let content = r#"{
            "exported_at": "2026-01-01T00:00:00Z",
            "count": 1,
            "documents": [
                {"_id": "old", "data": {"name": "apple", "qty": 3}}
            ]
        }"#;
        let result = manager
            .import_from_content("shop", "items", content, "json", true)
            .unwrap();

        assert_eq!(result.imported, 1);
        let items = engine
            .get_database("shop")
            .unwrap()
            .get_collection("items")
            .unwrap();
        let found = items.find("name", &"apple".into());
        assert_eq!(found[0].data.get("qty"), Some(&Value::Int(3)));
    }

    #[test]
    fn json_import_honors_id_field() {
        let (dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();
        let path = dir.path().join("in.json");
        fs::write(&path, r#"[{"sku":"A1","name":"apple"}]"#).unwrap();

        let options = ImportOptions::new("items", Format::Json, &path)
            .create_collection(true)
            .id_field("sku");
        let result = manager.import("shop", &options).unwrap();
        assert_eq!(result.imported, 1);

        let doc = engine
            .get_database("shop")
            .unwrap()
            .get_collection("items")
            .unwrap()
            .get("A1")
            .unwrap();
        // The id field is stripped from the data.
        assert!(!doc.data.contains_key("sku"));
    }

    #[test]
    fn missing_collection_without_create_flag_fails() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let err = manager
            .import_from_content("shop", "items", r#"{"a":1}"#, "json", false)
            .unwrap_err();
        assert!(matches!(err, EngineError::CollectionNotFound { .. }));
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let (_dir, engine, manager) = setup();
        engine.create_database("shop").unwrap();

        let err = manager
            .import_from_content("shop", "items", "x", "xml", true)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat { .. }));
        assert_eq!(manager.supported_formats(), vec!["json", "csv", "sql"]);
    }

    #[test]
    fn overwrite_flag_clears_collection() {
        let (dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        let items = db.create_collection("items").unwrap();
        items.insert("old", data(&[("name", "stale".into())])).unwrap();

        let path = dir.path().join("in.json");
        fs::write(&path, r#"[{"name":"fresh"}]"#).unwrap();

        let options = ImportOptions::new("items", Format::Json, &path).overwrite_data(true);
        manager.import("shop", &options).unwrap();

        assert_eq!(items.len(), 1);
        assert!(items.get("old").is_none());
    }

    #[test]
    fn json_export_import_round_trip() {
        let (dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        let items = db.create_collection("items").unwrap();
        items
            .insert("a", data(&[("name", "apple".into()), ("qty", 3.into())]))
            .unwrap();
        items
            .insert("b", data(&[("name", "banana".into()), ("qty", 5.into())]))
            .unwrap();

        let path = dir.path().join("out.json");
        manager
            .export("shop", &ExportOptions::new("items", Format::Json, &path))
            .unwrap();

        let copy_db = engine.create_database("shop2").unwrap();
        copy_db.create_collection("items").unwrap();
        let options = ImportOptions::new("items", Format::Json, &path);
        let result = manager.import("shop2", &options).unwrap();

        assert_eq!(result.imported, 2);
        let copy = copy_db.get_collection("items").unwrap();
        let found = copy.find("name", &"banana".into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data.get("qty"), Some(&Value::Int(5)));
    }

    #[test]
    fn filtered_export_writes_query_result() {
        let (dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        let items = db.create_collection("items").unwrap();
        for n in 0..5i64 {
            items.insert(format!("d{n}"), data(&[("n", n.into())])).unwrap();
        }

        let path = dir.path().join("out.json");
        let options = ExportOptions::new("items", Format::Json, &path)
            .filter(Filter::new("n", Operator::Gte, 3))
            .sort("n", false);
        manager.export("shop", &options).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();
        match parsed {
            Value::Object(obj) => {
                assert_eq!(obj.get("count"), Some(&Value::Int(2)));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn csv_export_has_union_header() {
        let (dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        let items = db.create_collection("items").unwrap();
        items.insert("a", data(&[("name", "apple".into())])).unwrap();
        items.insert("b", data(&[("qty", 5.into())])).unwrap();

        let path = dir.path().join("out.csv");
        manager
            .export("shop", &ExportOptions::new("items", Format::Csv, &path))
            .unwrap();

        let body = fs::read_to_string(&path).unwrap();
        let first_line = body.lines().next().unwrap();
        assert_eq!(first_line, "_id,created_at,updated_at,name,qty");
        assert_eq!(body.lines().count(), 3);
    }

    #[test]
    fn csv_export_of_empty_collection_fails() {
        let (dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        db.create_collection("items").unwrap();

        let path = dir.path().join("out.csv");
        let err = manager
            .export("shop", &ExportOptions::new("items", Format::Csv, &path))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[test]
    fn sql_export_import_round_trip() {
        let (dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        let items = db.create_collection("items").unwrap();
        items
            .insert(
                "a",
                data(&[("name", "o'brien".into()), ("qty", 3.into())]),
            )
            .unwrap();

        let path = dir.path().join("out.sql");
        manager
            .export("shop", &ExportOptions::new("items", Format::Sql, &path))
            .unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("CREATE TABLE IF NOT EXISTS items"));
        assert!(body.contains("INSERT INTO items"));

        let copy_db = engine.create_database("shop2").unwrap();
        copy_db.create_collection("items").unwrap();
        let options = ImportOptions::new("items", Format::Sql, &path);
        let result = manager.import("shop2", &options).unwrap();

        assert_eq!(result.imported, 1);
        assert!(result.errors.is_empty());
        let doc = copy_db
            .get_collection("items")
            .unwrap()
            .get("a")
            .unwrap();
        assert_eq!(doc.data.get("name"), Some(&Value::from("o'brien")));
        assert_eq!(doc.data.get("qty"), Some(&Value::Int(3)));
    }

    #[test]
    fn sql_import_skips_malformed_lines() {
        let (_dir, engine, manager) = setup();
        let db = engine.create_database("shop").unwrap();
        let items = db.create_collection("items").unwrap();

        let content = "-- comment\n\
                       INSERT INTO items VALUES ('a', '{\"n\":1}', '2026-01-01 00:00:00', '2026-01-01 00:00:00');\n\
                       INSERT INTO items garbage\n";
        let result = import_sql(&items, content);

        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert!(result.errors[0].contains("line 3"));
    }
}
