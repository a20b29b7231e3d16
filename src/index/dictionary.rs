//! Per-column value dictionary.
//!
//! Interns stringified values into dense 0-based ids so postings can live in
//! a `Vec` indexed by id. Strings are stored once, concatenated, with
//! `(offset, length)` entries for O(1) id → string lookup.

use std::collections::HashMap;

/// Deduplicating string table with O(1) lookup both ways.
#[derive(Debug, Default)]
pub struct ValueDictionary {
    /// Concatenated UTF-8 value bytes.
    data: String,
    /// (offset, length) into `data`, one per interned value.
    entries: Vec<(u32, u32)>,
    index: HashMap<String, u32>,
}

impl ValueDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a value, returning its id. Existing values keep their id.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.index.get(value) {
            return id;
        }

        debug_assert!(
            self.data.len() + value.len() < u32::MAX as usize,
            "value dictionary exceeds u32 range"
        );

        let offset = self.data.len() as u32;
        let id = self.entries.len() as u32;
        self.data.push_str(value);
        self.entries.push((offset, value.len() as u32));
        self.index.insert(value.to_string(), id);
        id
    }

    /// Id of a previously interned value.
    pub fn lookup(&self, value: &str) -> Option<u32> {
        self.index.get(value).copied()
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        let (offset, length) = *self.entries.get(id as usize)?;
        let start = offset as usize;
        self.data.get(start..start + length as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
