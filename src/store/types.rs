//! Scalar values, input records and the dataset schema.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Text stored for a field a record does not carry.
pub const MISSING_VALUE: &str = "undefined";

// ── Scalar ──────────────────────────────────────────────────────────

/// A single field value: a number or a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    /// The stringified form used as the inverted index key.
    pub fn index_key(&self) -> String {
        match self {
            Scalar::Number(n) => format_number(*n),
            Scalar::Text(s) => s.clone(),
        }
    }

    /// Numeric value, if this scalar is a finite number or numeric-looking text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Number(_) => None,
            Scalar::Text(s) => parse_numeric(s),
        }
    }

    pub fn is_numeric_like(&self) -> bool {
        self.as_number().is_some()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => f.write_str(&format_number(*n)),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<u32> for Scalar {
    fn from(n: u32) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Render a number the way it appears as an index key.
///
/// Integral values drop the fractional part, `-0` renders as `0`,
/// everything else uses the shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Parse numeric-looking text. Empty, whitespace-only and non-finite inputs are text.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

// ── Record ──────────────────────────────────────────────────────────

/// Input record: ordered `(field, value)` pairs as supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert a JSON object into a record, preserving key order.
    ///
    /// Booleans and null are coerced to their text form; nested arrays and
    /// objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(EngineError::invalid_data(0, "record must be a JSON object"));
        };
        let mut record = Record::new();
        for (name, field) in map {
            let scalar = match field {
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(f) => Scalar::Number(f),
                    None => Scalar::Text(n.to_string()),
                },
                serde_json::Value::String(s) => Scalar::Text(s.clone()),
                serde_json::Value::Bool(b) => Scalar::Text(b.to_string()),
                serde_json::Value::Null => Scalar::Text("null".to_string()),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    return Err(EngineError::invalid_data(
                        0,
                        format!("field '{}' is not a scalar", name),
                    ));
                }
            };
            record.push(name.clone(), scalar);
        }
        Ok(record)
    }

    /// Parse a JSON array of objects into records.
    pub fn parse_json_array(json: &str) -> Result<Vec<Record>> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Array(items) = value else {
            return Err(EngineError::invalid_data(0, "expected a JSON array of records"));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                Record::from_json(item).map_err(|e| match e {
                    EngineError::InvalidData { reason, .. } => EngineError::invalid_data(i, reason),
                    other => other,
                })
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.push(k, v);
        }
        record
    }
}

// ── Schema ──────────────────────────────────────────────────────────

/// Inferred scalar kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Text,
}

impl ColumnKind {
    /// Majority vote over a sample: strictly more than 2/3 numeric-looking
    /// values is `Numeric`, anything else (including an empty sample) is `Text`.
    pub fn infer<'a>(sample: impl Iterator<Item = &'a Scalar>) -> Self {
        let mut numeric = 0usize;
        let mut total = 0usize;
        for value in sample {
            total += 1;
            if value.is_numeric_like() {
                numeric += 1;
            }
        }
        if total > 0 && numeric * 3 > total * 2 {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered column list; order comes from the first record of the dataset.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<ColumnMeta>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Schema from a record's field order. Duplicate names are invalid.
    pub fn from_record(record: &Record) -> Result<Self> {
        let mut schema = Schema::default();
        for (name, _) in record.fields() {
            if schema.by_name.contains_key(name) {
                return Err(EngineError::invalid_data(
                    0,
                    format!("duplicate field '{}'", name),
                ));
            }
            schema.by_name.insert(name.to_string(), schema.columns.len());
            schema.columns.push(ColumnMeta {
                name: name.to_string(),
                kind: ColumnKind::Text,
            });
        }
        Ok(schema)
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.position_of(name).map(|i| self.columns[i].kind)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(crate) fn set_kind(&mut self, column: usize, kind: ColumnKind) {
        if let Some(meta) = self.columns.get_mut(column) {
            meta.kind = kind;
        }
    }

    /// Normalize a record into schema order.
    ///
    /// Missing fields become [`MISSING_VALUE`]; unknown or duplicate fields
    /// make the record non-rectangular and are rejected.
    pub fn normalize(&self, record: &Record, record_index: usize) -> Result<Row> {
        let mut slots: Vec<Option<Scalar>> = vec![None; self.columns.len()];
        for (name, value) in record.fields() {
            let Some(col) = self.position_of(name) else {
                return Err(EngineError::invalid_data(
                    record_index,
                    format!("field '{}' is not in the dataset schema", name),
                ));
            };
            if slots[col].is_some() {
                return Err(EngineError::invalid_data(
                    record_index,
                    format!("duplicate field '{}'", name),
                ));
            }
            slots[col] = Some(value.clone());
        }
        let values = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Scalar::Text(MISSING_VALUE.to_string())))
            .collect();
        Ok(Row { values })
    }
}

// ── Row ─────────────────────────────────────────────────────────────

/// A record normalized to schema order: one scalar per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Box<[Scalar]>,
}

impl Row {
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn value(&self, column: usize) -> Option<&Scalar> {
        self.values.get(column)
    }
}

/// A row borrowed from the store together with its position and schema.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    pub position: u32,
    row: &'a Row,
    schema: &'a Schema,
}

impl<'a> RowRef<'a> {
    pub(crate) fn new(position: u32, row: &'a Row, schema: &'a Schema) -> Self {
        Self { position, row, schema }
    }

    pub fn get(&self, column: &str) -> Option<&'a Scalar> {
        self.schema.position_of(column).and_then(|i| self.row.value(i))
    }

    pub fn values(&self) -> &'a [Scalar] {
        self.row.values()
    }

    /// Rebuild the named record (schema order).
    pub fn to_record(&self) -> Record {
        self.schema
            .column_names()
            .zip(self.row.values())
            .map(|(name, value)| (name, value.clone()))
            .collect()
    }
}
