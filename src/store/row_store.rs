//! Row store: the immutable row snapshot behind the indexes.
//!
//! Positions are `u32` (the position-set type is a 32-bit roaring bitmap),
//! so a dataset is capped at `u32::MAX` rows.

use std::ops::Range;

use crate::error::{EngineError, Result};
use crate::store::types::{ColumnKind, Record, Row, RowRef, Schema};

/// Upper bound on positions addressable by the indexes.
pub const MAX_ROWS: usize = u32::MAX as usize;

/// Owns the row array and the schema derived from it.
#[derive(Debug, Default)]
pub struct RowStore {
    schema: Schema,
    rows: Vec<Row>,
    kind_sample_size: usize,
}

impl RowStore {
    pub fn new(kind_sample_size: usize) -> Self {
        Self {
            schema: Schema::default(),
            rows: Vec::new(),
            kind_sample_size,
        }
    }

    /// Replace the whole dataset.
    ///
    /// All records are validated before anything is replaced; on error the
    /// previous dataset stays in place.
    pub fn load(&mut self, records: &[Record]) -> Result<()> {
        let (schema, rows) = normalize_all(records)?;
        self.schema = schema;
        self.rows = rows;
        self.refresh_kinds();
        Ok(())
    }

    /// Validate records against the current schema (or derive one if the
    /// store is empty) without touching the store.
    pub fn prepare(&self, records: &[Record]) -> Result<(Schema, Vec<Row>)> {
        if self.schema.is_empty() && self.rows.is_empty() {
            return normalize_all(records);
        }
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, r)| self.schema.normalize(r, i))
            .collect::<Result<Vec<_>>>()?;
        Ok((self.schema.clone(), rows))
    }

    /// Write records at `[offset, offset + n)`.
    ///
    /// Rows already present are overwritten (placing the same chunk twice is
    /// a no-op); rows past the end extend the store. A gap between the current
    /// end and `offset` is invalid. The first chunk into an empty store
    /// defines the schema.
    pub fn place(&mut self, offset: usize, records: &[Record]) -> Result<Range<u32>> {
        let (schema, rows) = self.prepare(records)?;
        self.check_offset(offset)?;
        if self.schema.is_empty() && self.rows.is_empty() {
            self.schema = schema;
        }
        self.place_rows(offset, rows)
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset > self.rows.len() {
            return Err(EngineError::invalid_data(
                0,
                format!(
                    "chunk offset {} leaves a gap after row {}",
                    offset,
                    self.rows.len()
                ),
            ));
        }
        Ok(())
    }

    /// Write already-normalized rows; see [`RowStore::place`].
    pub(crate) fn place_rows(&mut self, offset: usize, rows: Vec<Row>) -> Result<Range<u32>> {
        self.check_offset(offset)?;
        let end = offset + rows.len();
        if end > MAX_ROWS {
            return Err(EngineError::invalid_data(
                MAX_ROWS - offset,
                format!("dataset exceeds {} rows", MAX_ROWS),
            ));
        }

        for (i, row) in rows.into_iter().enumerate() {
            let position = offset + i;
            if position < self.rows.len() {
                self.rows[position] = row;
            } else {
                self.rows.push(row);
            }
        }
        if offset < self.kind_sample_size {
            self.refresh_kinds();
        }
        Ok(offset as u32..end as u32)
    }

    /// Reset to an empty dataset with the given schema.
    pub(crate) fn reset(&mut self, schema: Schema) {
        self.schema = schema;
        self.rows.clear();
    }

    pub fn get(&self, position: usize) -> Result<RowRef<'_>> {
        match self.rows.get(position) {
            Some(row) => Ok(RowRef::new(position as u32, row, &self.schema)),
            None => Err(EngineError::OutOfRange {
                position,
                count: self.rows.len(),
            }),
        }
    }

    /// Row at a position already known to be valid (evaluator output).
    pub(crate) fn row_ref(&self, position: u32) -> Option<RowRef<'_>> {
        self.rows
            .get(position as usize)
            .map(|row| RowRef::new(position, row, &self.schema))
    }

    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn clear(&mut self) {
        self.schema = Schema::default();
        self.rows.clear();
    }

    /// Re-infer column kinds from the sampled row prefix.
    fn refresh_kinds(&mut self) {
        let sample = &self.rows[..self.rows.len().min(self.kind_sample_size)];
        for col in 0..self.schema.len() {
            let kind = ColumnKind::infer(sample.iter().filter_map(|row| row.value(col)));
            self.schema.set_kind(col, kind);
        }
    }
}

/// Derive a schema from the first record and normalize every record to it.
pub(crate) fn normalize_all(records: &[Record]) -> Result<(Schema, Vec<Row>)> {
    if records.len() > MAX_ROWS {
        return Err(EngineError::invalid_data(
            MAX_ROWS,
            format!("dataset exceeds {} rows", MAX_ROWS),
        ));
    }
    let schema = match records.first() {
        Some(first) => Schema::from_record(first)?,
        None => Schema::default(),
    };
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, r)| schema.normalize(r, i))
        .collect::<Result<Vec<_>>>()?;
    Ok((schema, rows))
}
