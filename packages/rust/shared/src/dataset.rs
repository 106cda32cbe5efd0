//! `JobDataset`: the named-column table every stage consumes and produces.
//!
//! Columns are stored behind `Arc`, so cloning a dataset is cheap and a stage
//! that adds one column shares every other column with its input. Stages never
//! mutate a dataset they were handed; they build and return a new one.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HonestRolesError, Result};
use crate::schema::{self, CANONICAL_SCHEMA, LogicalType};

/// A JSON object describing one job row.
pub type Record = Map<String, Value>;

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A typed column of nullable values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<Option<String>>),
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    List(Vec<Option<Vec<String>>>),
}

impl Column {
    /// An all-null column of the given type.
    pub fn nulls(ty: LogicalType, len: usize) -> Self {
        match ty {
            LogicalType::Text => Self::Text(vec![None; len]),
            LogicalType::Float => Self::Float(vec![None; len]),
            LogicalType::Int => Self::Int(vec![None; len]),
            LogicalType::Bool => Self::Bool(vec![None; len]),
            LogicalType::List => Self::List(vec![None; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn logical_type(&self) -> LogicalType {
        match self {
            Self::Text(_) => LogicalType::Text,
            Self::Float(_) => LogicalType::Float,
            Self::Int(_) => LogicalType::Int,
            Self::Bool(_) => LogicalType::Bool,
            Self::List(_) => LogicalType::List,
        }
    }

    /// True when the row holds a value. Blank strings and empty lists count as absent.
    pub fn is_present(&self, row: usize) -> bool {
        match self {
            Self::Text(v) => v
                .get(row)
                .and_then(|x| x.as_deref())
                .is_some_and(|s| !s.trim().is_empty()),
            Self::Float(v) => v.get(row).copied().flatten().is_some_and(f64::is_finite),
            Self::Int(v) => v.get(row).copied().flatten().is_some(),
            Self::Bool(v) => v.get(row).copied().flatten().is_some(),
            Self::List(v) => v
                .get(row)
                .and_then(|x| x.as_ref())
                .is_some_and(|items| !items.is_empty()),
        }
    }

    fn select(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| values[i].clone()).collect()
        }
        match self {
            Self::Text(v) => Self::Text(pick(v, indices)),
            Self::Float(v) => Self::Float(pick(v, indices)),
            Self::Int(v) => Self::Int(pick(v, indices)),
            Self::Bool(v) => Self::Bool(pick(v, indices)),
            Self::List(v) => Self::List(pick(v, indices)),
        }
    }

    /// JSON value of one row. Non-finite floats serialize as `null`.
    pub fn value_json(&self, row: usize) -> Value {
        match self {
            Self::Text(v) => v[row].clone().map_or(Value::Null, Value::String),
            Self::Float(v) => v[row]
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
            Self::Int(v) => v[row].map_or(Value::Null, |x| Value::Number(x.into())),
            Self::Bool(v) => v[row].map_or(Value::Null, Value::Bool),
            Self::List(v) => v[row].as_ref().map_or(Value::Null, |items| {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }),
        }
    }

    /// Build a column of type `ty` from JSON values, coercing where sensible.
    pub fn from_json(ty: LogicalType, values: &[Option<&Value>]) -> Self {
        match ty {
            LogicalType::Text => {
                Self::Text(values.iter().map(|v| v.and_then(coerce_text)).collect())
            }
            LogicalType::Float => {
                Self::Float(values.iter().map(|v| v.and_then(coerce_float)).collect())
            }
            LogicalType::Int => Self::Int(values.iter().map(|v| v.and_then(coerce_int)).collect()),
            LogicalType::Bool => {
                Self::Bool(values.iter().map(|v| v.and_then(coerce_bool)).collect())
            }
            LogicalType::List => {
                Self::List(values.iter().map(|v| v.and_then(coerce_list)).collect())
            }
        }
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '$' | ' ')).collect();
            cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
        }
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|x| x.fract() == 0.0).map(|x| x as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|x| x != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "y" => Some(true),
            "false" | "no" | "0" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(coerce_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
        _ => None,
    }
}

/// Infer the logical type of a non-canonical column from its values.
fn infer_type(values: &[Option<&Value>]) -> LogicalType {
    let mut saw_number = false;
    let mut all_integral = true;
    for value in values.iter().flatten() {
        match value {
            Value::Null => continue,
            Value::String(_) | Value::Object(_) => return LogicalType::Text,
            Value::Bool(_) => return LogicalType::Bool,
            Value::Array(_) => return LogicalType::List,
            Value::Number(n) => {
                saw_number = true;
                all_integral &= n.is_i64() || n.is_u64();
            }
        }
    }
    match (saw_number, all_integral) {
        (true, true) => LogicalType::Int,
        (true, false) => LogicalType::Float,
        _ => LogicalType::Text,
    }
}

// ---------------------------------------------------------------------------
// JobDataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Field {
    name: String,
    values: Arc<Column>,
}

/// An immutable-by-convention table of job postings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDataset {
    fields: Vec<Field>,
    rows: usize,
}

impl JobDataset {
    /// Build a dataset from named columns. All columns must have the same length.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        let mut dataset = Self::empty();
        for (name, column) in columns {
            if dataset.has_column(&name) {
                return Err(HonestRolesError::dataset(format!("duplicate column '{name}'")));
            }
            dataset = dataset.with_column(name, column)?;
        }
        Ok(dataset)
    }

    /// A dataset with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.values.as_ref())
    }

    // -- typed column access -------------------------------------------------

    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name)? {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name)? {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<&[Option<i64>]> {
        match self.column(name)? {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<&[Option<bool>]> {
        match self.column(name)? {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[Option<Vec<String>>]> {
        match self.column(name)? {
            Column::List(v) => Some(v),
            _ => None,
        }
    }

    // -- per-row access ------------------------------------------------------

    pub fn text_at(&self, name: &str, row: usize) -> Option<&str> {
        self.text(name)?.get(row)?.as_deref()
    }

    /// Numeric value of a row, reading float or int columns.
    pub fn float_at(&self, name: &str, row: usize) -> Option<f64> {
        match self.column(name)? {
            Column::Float(v) => v.get(row).copied().flatten().filter(|x| x.is_finite()),
            Column::Int(v) => v.get(row).copied().flatten().map(|x| x as f64),
            _ => None,
        }
    }

    pub fn int_at(&self, name: &str, row: usize) -> Option<i64> {
        match self.column(name)? {
            Column::Int(v) => v.get(row).copied().flatten(),
            Column::Float(v) => v.get(row).copied().flatten().map(|x| x as i64),
            _ => None,
        }
    }

    pub fn bool_at(&self, name: &str, row: usize) -> Option<bool> {
        self.bool(name)?.get(row).copied().flatten()
    }

    pub fn list_at(&self, name: &str, row: usize) -> Option<&[String]> {
        self.list(name)?.get(row)?.as_deref()
    }

    // -- transformations -----------------------------------------------------

    /// Add `column`, or replace an existing column of the same name in place.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if self.fields.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(HonestRolesError::dataset(format!(
                "column '{name}' has {} rows, dataset has {}",
                column.len(),
                self.rows
            )));
        }

        let values = Arc::new(column);
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.values = values,
            None => self.fields.push(Field { name, values }),
        }
        Ok(self)
    }

    /// Drop a column. Unknown names are ignored.
    pub fn without_column(mut self, name: &str) -> Self {
        self.fields.retain(|f| f.name != name);
        self
    }

    /// Keep rows whose mask entry is true, preserving order and column set.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.rows {
            return Err(HonestRolesError::dataset(format!(
                "mask has {} entries, dataset has {} rows",
                mask.len(),
                self.rows
            )));
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take(&indices)
    }

    /// Select rows by index, in the given order.
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        if let Some(bad) = indices.iter().find(|&&i| i >= self.rows) {
            return Err(HonestRolesError::dataset(format!(
                "row index {bad} out of range for {} rows",
                self.rows
            )));
        }
        Ok(Self {
            fields: self
                .fields
                .iter()
                .map(|f| Field {
                    name: f.name.clone(),
                    values: Arc::new(f.values.select(indices)),
                })
                .collect(),
            rows: indices.len(),
        })
    }

    // -- validation ----------------------------------------------------------

    /// Check shape and canonical column types.
    pub fn validate(&self) -> Result<()> {
        if !self.has_column(schema::ID) {
            return Err(HonestRolesError::dataset("missing identity column 'id'"));
        }
        for field in &self.fields {
            if field.values.len() != self.rows {
                return Err(HonestRolesError::dataset(format!(
                    "column '{}' has {} rows, dataset has {}",
                    field.name,
                    field.values.len(),
                    self.rows
                )));
            }
            if let Some(expected) = schema::canonical_type(&field.name) {
                let actual = field.values.logical_type();
                if actual != expected {
                    return Err(HonestRolesError::dataset(format!(
                        "column '{}' must be {expected}, found {actual}",
                        field.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// First non-null `id` that appears on more than one row.
    pub fn duplicate_id(&self) -> Option<&str> {
        let ids = self.text(schema::ID)?;
        let mut seen = HashSet::with_capacity(ids.len());
        ids.iter().flatten().map(String::as_str).find(|id| !seen.insert(*id))
    }

    /// True when no two rows share a non-null `id`.
    pub fn has_unique_ids(&self) -> bool {
        self.duplicate_id().is_none()
    }

    /// [`validate`](Self::validate), then require unique non-null ids.
    ///
    /// Raw input may repeat ids until dedup collapses them; every dataset
    /// after the clean stage must pass this check.
    pub fn validate_deduplicated(&self) -> Result<()> {
        self.validate()?;
        match self.duplicate_id() {
            Some(id) => Err(HonestRolesError::dataset(format!("duplicate id '{id}'"))),
            None => Ok(()),
        }
    }

    // -- records -------------------------------------------------------------

    /// One row as a JSON object, in column order.
    pub fn row_json(&self, row: usize) -> Record {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.values.value_json(row)))
            .collect()
    }

    pub fn to_records(&self) -> Vec<Record> {
        (0..self.rows).map(|row| self.row_json(row)).collect()
    }

    /// Build a dataset from JSON objects.
    ///
    /// Canonical columns always exist with their canonical types; other keys
    /// become columns in first-seen order with an inferred type. Rows without
    /// an `id` get a synthetic `row-{index}` key.
    pub fn from_records(records: &[Record]) -> Result<Self> {
        let mut names: Vec<String> = CANONICAL_SCHEMA.iter().map(|(n, _)| n.to_string()).collect();
        for record in records {
            for key in record.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        let mut dataset = Self::empty();
        for name in names {
            let values: Vec<Option<&Value>> = records.iter().map(|r| r.get(&name)).collect();
            let ty = schema::canonical_type(&name).unwrap_or_else(|| infer_type(&values));
            let mut column = Column::from_json(ty, &values);
            if name == schema::ID {
                if let Column::Text(ids) = &mut column {
                    for (i, id) in ids.iter_mut().enumerate() {
                        if id.as_deref().is_none_or(|s| s.trim().is_empty()) {
                            *id = Some(format!("row-{i}"));
                        }
                    }
                }
            }
            dataset = dataset.with_column(name, column)?;
        }
        Ok(dataset)
    }

    // -- file I/O ------------------------------------------------------------

    /// Read newline-delimited JSON objects. Blank lines are skipped.
    pub fn read_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| HonestRolesError::io(path, e))?;
        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| HonestRolesError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line).map_err(|e| {
                HonestRolesError::dataset(format!(
                    "{}:{}: invalid JSON object: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            records.push(record);
        }
        debug!(path = %path.display(), rows = records.len(), "read jsonl");
        Self::from_records(&records)
    }

    /// Read a JSON array of objects.
    pub fn read_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HonestRolesError::io(path, e))?;
        let records: Vec<Record> = serde_json::from_str(&content).map_err(|e| {
            HonestRolesError::dataset(format!("{}: expected array of objects: {e}", path.display()))
        })?;
        Self::from_records(&records)
    }

    /// Write one JSON object per line, creating parent directories as needed.
    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HonestRolesError::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| HonestRolesError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for row in 0..self.rows {
            let line = serde_json::to_string(&self.row_json(row))
                .map_err(|e| HonestRolesError::dataset(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| HonestRolesError::io(path, e))?;
        }
        writer.flush().map_err(|e| HonestRolesError::io(path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().expect("object").clone())
            .collect()
    }

    #[test]
    fn from_records_backfills_canonical_columns() {
        let ds = JobDataset::from_records(&records(vec![
            json!({
                "id": "a", "title": "Data Analyst",
                "skills": "python, sql", "salary_min": "60,000",
            }),
            json!({"title": "Engineer", "team_size": 4}),
        ]))
        .expect("build");

        assert_eq!(ds.row_count(), 2);
        assert!(ds.has_column(schema::POSTED_AT));
        assert_eq!(
            ds.list_at(schema::SKILLS, 0),
            Some(&["python".to_string(), "sql".to_string()][..])
        );
        assert_eq!(ds.float_at(schema::SALARY_MIN, 0), Some(60000.0));
        assert_eq!(ds.text_at(schema::ID, 1), Some("row-1"));
        assert_eq!(ds.int_at("team_size", 1), Some(4));
        ds.validate().expect("valid");
    }

    #[test]
    fn filter_rows_preserves_order_and_columns() {
        let ds = JobDataset::new(vec![
            ("id".into(), Column::Text(vec![Some("a".into()), Some("b".into()), Some("c".into())])),
            ("score".into(), Column::Float(vec![Some(0.1), None, Some(0.3)])),
        ])
        .expect("build");

        let out = ds.filter_rows(&[true, false, true]).expect("filter");
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.column_names().collect::<Vec<_>>(), vec!["id", "score"]);
        assert_eq!(out.text_at("id", 1), Some("c"));
        assert!(ds.filter_rows(&[true]).is_err());
    }

    #[test]
    fn with_column_rejects_length_mismatch_and_replaces_in_place() {
        let ds = JobDataset::new(vec![
            ("id".into(), Column::Text(vec![Some("a".into())])),
            ("x".into(), Column::Int(vec![Some(1)])),
        ])
        .expect("build");

        assert!(ds.clone().with_column("y", Column::Int(vec![])).is_err());

        let replaced = ds
            .clone()
            .with_column("id", Column::Text(vec![Some("z".into())]))
            .expect("replace");
        assert_eq!(replaced.column_names().collect::<Vec<_>>(), vec!["id", "x"]);
        assert_eq!(replaced.text_at("id", 0), Some("z"));
        // The input is untouched.
        assert_eq!(ds.text_at("id", 0), Some("a"));
    }

    #[test]
    fn validate_rejects_wrong_canonical_type() {
        let ds = JobDataset::new(vec![
            ("id".into(), Column::Text(vec![Some("a".into())])),
            ("remote".into(), Column::Text(vec![Some("yes".into())])),
        ])
        .expect("build");
        let err = ds.validate().expect_err("remote must be bool");
        assert!(err.to_string().contains("remote"));

        let no_id =
            JobDataset::new(vec![("title".into(), Column::Text(vec![None]))]).expect("build");
        assert!(no_id.validate().is_err());
    }

    #[test]
    fn unique_id_check() {
        let ds = JobDataset::new(vec![(
            "id".into(),
            Column::Text(vec![Some("a".into()), Some("a".into())]),
        )])
        .expect("build");
        assert!(!ds.has_unique_ids());
        assert_eq!(ds.duplicate_id(), Some("a"));
        ds.validate().expect("raw input may repeat ids");
        let err = ds.validate_deduplicated().expect_err("duplicate id");
        assert!(err.to_string().contains("duplicate id 'a'"));

        let nulls =
            JobDataset::new(vec![("id".into(), Column::Text(vec![None, None]))]).expect("build");
        nulls.validate_deduplicated().expect("null ids are not compared");
    }

    #[test]
    fn jsonl_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("hr-dataset-{}", uuid::Uuid::now_v7()));
        let path = dir.join("jobs.jsonl");
        let ds = JobDataset::from_records(&records(vec![
            json!({"id": "a", "title": "ML Engineer", "remote": true, "salary_max": 150000.5}),
        ]))
        .expect("build");

        ds.write_jsonl(&path).expect("write");
        let back = JobDataset::read_jsonl(&path).expect("read");
        assert_eq!(back.text_at(schema::TITLE, 0), Some("ML Engineer"));
        assert_eq!(back.bool_at(schema::REMOTE, 0), Some(true));
        assert_eq!(back.float_at(schema::SALARY_MAX, 0), Some(150000.5));

        std::fs::remove_dir_all(&dir).ok();
    }
}
