//! File-staged bulk loading.
//!
//! Records are written to a temporary staging file, one line per record,
//! then handed to the driver in a single import call. The staging file is
//! removed when the [`StagedFile`] guard drops, whatever the import outcome.
//!
//! Staged line format: fields joined by [`FIELD_DELIMITER`], each record
//! ended by [`LINE_TERMINATOR`]. Null is written as `\N`, backslashes are
//! doubled and binary values are written as `\x` followed by hex digits.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ExecError, Result};
use crate::types::SqlValue;

pub const FIELD_DELIMITER: &str = ":::,";
pub const LINE_TERMINATOR: &str = "^^^\n";

const NULL_MARKER: &str = "\\N";
const RAMDISK: &str = "/dev/shm";

/// One row to load: column names paired with values, in column order.
///
/// Every record passed to a single load must have the same columns in the
/// same order. This is not checked; the column list is taken from the first
/// record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn encode_into(&self, buf: &mut String) {
        for (i, value) in self.values().enumerate() {
            if i > 0 {
                buf.push_str(FIELD_DELIMITER);
            }
            encode_field(value, buf);
        }
        buf.push_str(LINE_TERMINATOR);
    }

    /// Converts a JSON object; nested arrays and objects are stored as JSON text.
    /// Columns follow the key order of the document (`serde_json` is built
    /// with `preserve_order`).
    fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let fields = object
            .iter()
            .map(|(column, value)| (column.clone(), json_to_sql(value)))
            .collect();
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn json_to_sql(value: &serde_json::Value) -> SqlValue {
    use serde_json::Value;
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Float),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Converts a JSON document into records.
/// Anything other than an array of objects is rejected.
pub fn records_from_json(data: &serde_json::Value) -> Result<Vec<Record>> {
    let items = data.as_array().ok_or_else(|| {
        ExecError::Argument("bulk load data must be an array of records".to_string())
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object().map(Record::from_json).ok_or_else(|| {
                ExecError::Argument(format!("bulk load record {} is not an object", i))
            })
        })
        .collect()
}

/// Options for a single bulk load.
#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Directory for the staging file. Defaults to `/dev/shm` when present,
    /// otherwise the system temp directory.
    pub staging_dir: Option<PathBuf>,
}

impl BulkOptions {
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.staging_dir {
            return dir.clone();
        }
        let ramdisk = Path::new(RAMDISK);
        if ramdisk.is_dir() {
            ramdisk.to_path_buf()
        } else {
            std::env::temp_dir()
        }
    }
}

/// What a bulk load did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkLoadOutcome {
    Loaded { rows: u64 },
    /// No records were given, nothing was staged or sent.
    Skipped,
}

/// The import a driver is asked to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLoadStatement {
    pub file: PathBuf,
    pub table: String,
    pub columns: Vec<String>,
    pub delimiter: &'static str,
    pub terminator: &'static str,
}

impl fmt::Display for BulkLoadStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LOAD DATA INFILE '{}' INTO TABLE {} FIELDS TERMINATED BY '{}' LINES TERMINATED BY '{}' ({})",
            self.file.display(),
            self.table,
            self.delimiter,
            self.terminator.escape_default(),
            self.columns.join(", ")
        )
    }
}

/// A written staging file. Deleted on drop.
pub struct StagedFile {
    file: NamedTempFile,
    statement: BulkLoadStatement,
}

impl StagedFile {
    /// Validates the arguments and writes `records` to a fresh staging file.
    /// Returns `Ok(None)` for an empty record list.
    pub fn write(table: &str, records: &[Record], options: &BulkOptions) -> Result<Option<Self>> {
        if table.is_empty() {
            return Err(ExecError::Argument("no insert table specified".to_string()));
        }
        check_identifier(table)?;
        let Some(first) = records.first() else {
            return Ok(None);
        };
        if first.is_empty() {
            return Err(ExecError::Argument("bulk load records have no columns".to_string()));
        }
        let columns: Vec<String> = first.columns().map(str::to_string).collect();
        for column in &columns {
            check_identifier(column)?;
        }

        let mut buf = String::new();
        for record in records {
            record.encode_into(&mut buf);
        }

        let dir = options.resolve_dir();
        let mut file = tempfile::Builder::new()
            .prefix("bulk")
            .suffix(".txt")
            .tempfile_in(&dir)?;
        file.write_all(buf.as_bytes())?;
        file.flush()?;

        let statement = BulkLoadStatement {
            file: file.path().to_path_buf(),
            table: table.to_string(),
            columns,
            delimiter: FIELD_DELIMITER,
            terminator: LINE_TERMINATOR,
        };
        log::debug!(
            "Staged {} record(s) for {} in {}",
            records.len(),
            table,
            statement.file.display()
        );
        Ok(Some(Self { file, statement }))
    }

    pub fn statement(&self) -> &BulkLoadStatement {
        &self.statement
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Deletes the file now, reporting removal failures.
    pub fn remove(self) -> Result<()> {
        self.file.close()?;
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ExecError::Argument(format!("invalid identifier: {:?}", name)))
    }
}

fn encode_field(value: &SqlValue, buf: &mut String) {
    match value {
        SqlValue::Null => buf.push_str(NULL_MARKER),
        SqlValue::Integer(i) => buf.push_str(&i.to_string()),
        SqlValue::Float(f) => buf.push_str(&f.to_string()),
        SqlValue::Text(s) => buf.push_str(&s.replace('\\', "\\\\")),
        SqlValue::Binary(b) => buf.push_str(&SqlValue::hex_literal(b).replace('\\', "\\\\")),
    }
}

/// Splits staged contents into records of raw (still escaped) fields.
pub fn split_staged(contents: &str) -> impl Iterator<Item = Vec<&str>> {
    contents
        .split(LINE_TERMINATOR)
        .filter(|line| !line.is_empty())
        .map(|line| line.split(FIELD_DELIMITER).collect())
}

/// Decodes one raw staged field. `None` is SQL null.
pub fn decode_field(raw: &str) -> Option<String> {
    if raw == NULL_MARKER {
        return None;
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    Some(out)
}
