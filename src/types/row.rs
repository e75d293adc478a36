use std::collections::VecDeque;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::fetch::RowFetcher;
use crate::types::SqlValue;

/// Driver-agnostic raw result from a database query.
#[derive(Debug, Clone, Default)]
pub struct RawQueryResult {
    /// Column names in order
    pub columns: Vec<String>,
    /// Rows, where each row holds one value per column in column order
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by the statement; equals the row count for SELECT
    pub affected_rows: u64,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let affected_rows = rows.len() as u64;
        Self {
            columns,
            rows,
            affected_rows,
        }
    }

    /// A result with no rows for a statement that changed `affected_rows` rows.
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Row shape requested from the fetch helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Keyed by column name.
    #[default]
    Associative,
    /// Keyed by ordinal position.
    Positional,
    /// Both key forms, index first, for every column.
    Both,
}

/// Key of a single entry in a [`ShapedRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKey {
    Name(String),
    Index(usize),
}

/// A fetched row in the shape chosen by a [`FetchMode`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapedRow {
    entries: Vec<(RowKey, SqlValue)>,
}

impl ShapedRow {
    pub(crate) fn build(columns: &[String], values: Vec<SqlValue>, mode: FetchMode) -> Self {
        let mut entries = Vec::with_capacity(match mode {
            FetchMode::Both => values.len() * 2,
            _ => values.len(),
        });
        for (index, value) in values.into_iter().enumerate() {
            let name = columns
                .get(index)
                .cloned()
                .unwrap_or_else(|| index.to_string());
            match mode {
                FetchMode::Associative => entries.push((RowKey::Name(name), value)),
                FetchMode::Positional => entries.push((RowKey::Index(index), value)),
                FetchMode::Both => {
                    entries.push((RowKey::Index(index), value.clone()));
                    entries.push((RowKey::Name(name), value));
                }
            }
        }
        Self { entries }
    }

    /// Gets a value by column name.
    /// With duplicate column names the last one wins.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| matches!(key, RowKey::Name(name) if name == column))
            .map(|(_, value)| value)
    }

    /// Gets a value by ordinal position.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(key, _)| *key == RowKey::Index(index))
            .map(|(_, value)| value)
    }

    pub fn entries(&self) -> &[(RowKey, SqlValue)] {
        &self.entries
    }

    /// Returns the number of entries (twice the column count in `Both` mode).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if this row has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_positional(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, (key, _))| *key == RowKey::Index(i))
    }
}

impl Serialize for ShapedRow {
    /// Positional rows become JSON arrays, anything keyed by name an object.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_positional() {
            let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
            for (_, value) in &self.entries {
                seq.serialize_element(value)?;
            }
            return seq.end();
        }
        // Repeated column names keep only their last value, as `get` does.
        let kept: Vec<&(RowKey, SqlValue)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, (key, _))| !self.entries[i + 1..].iter().any(|(k, _)| k == key))
            .map(|(_, entry)| entry)
            .collect();
        let mut map = serializer.serialize_map(Some(kept.len()))?;
        for (key, value) in kept {
            match key {
                RowKey::Name(name) => map.serialize_entry(name, value)?,
                RowKey::Index(index) => map.serialize_entry(&index.to_string(), value)?,
            }
        }
        map.end()
    }
}

/// Buffered result of a query execution with a forward-only read cursor.
#[derive(Debug, Default)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: VecDeque<Vec<SqlValue>>,
    num_rows: usize,
    affected_rows: u64,
}

impl QueryResult {
    /// Creates a QueryResult from a RawQueryResult.
    pub fn from_raw(raw: RawQueryResult) -> Self {
        Self {
            num_rows: raw.rows.len(),
            columns: raw.columns,
            rows: raw.rows.into(),
            affected_rows: raw.affected_rows,
        }
    }

    /// Total rows the statement produced, consumed or not.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Rows not yet read through the cursor.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Returns the column names from this result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns true if the statement produced no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Fetch and conversion helpers reading from this result.
    pub fn fetcher(&mut self) -> RowFetcher<'_> {
        RowFetcher::new(self)
    }

    /// Advances the cursor, returning the next row in the requested shape.
    pub fn next_row(&mut self, mode: FetchMode) -> Option<ShapedRow> {
        let values = self.rows.pop_front()?;
        Some(ShapedRow::build(&self.columns, values, mode))
    }
}
