use crate::error::{ExecError, Result};
use crate::traits::DatabaseDriver;
use crate::types::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder,
}

#[derive(Clone, Copy)]
enum ScanState {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// A query template split into literal text and `?` placeholders.
///
/// Parsing is a single left-to-right pass. A `?` inside a quoted literal,
/// a quoted identifier or a comment is plain text.
#[derive(Debug, Clone)]
pub struct QueryTemplate<'a> {
    segments: Vec<Segment<'a>>,
}

impl<'a> QueryTemplate<'a> {
    pub fn parse(sql: &'a str) -> Self {
        let bytes = sql.as_bytes();
        let mut segments = Vec::new();
        let mut state = ScanState::Normal;
        let mut start = 0;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            state = match state {
                ScanState::Normal => match (b, next) {
                    (b'?', _) => {
                        if start < i {
                            segments.push(Segment::Text(&sql[start..i]));
                        }
                        segments.push(Segment::Placeholder);
                        start = i + 1;
                        ScanState::Normal
                    }
                    (b'\'', _) => ScanState::SingleQuoted,
                    (b'"', _) => ScanState::DoubleQuoted,
                    (b'-', Some(b'-')) => {
                        i += 1;
                        ScanState::LineComment
                    }
                    (b'/', Some(b'*')) => {
                        i += 1;
                        ScanState::BlockComment
                    }
                    _ => ScanState::Normal,
                },
                ScanState::SingleQuoted if b == b'\'' => ScanState::Normal,
                ScanState::DoubleQuoted if b == b'"' => ScanState::Normal,
                ScanState::LineComment if b == b'\n' => ScanState::Normal,
                ScanState::BlockComment if b == b'*' && next == Some(b'/') => {
                    i += 1;
                    ScanState::Normal
                }
                other => other,
            };
            i += 1;
        }
        if start < bytes.len() {
            segments.push(Segment::Text(&sql[start..]));
        }

        Self { segments }
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder))
            .count()
    }

    /// Fails unless there is exactly one argument per placeholder.
    pub fn check_arity(&self, arguments: usize) -> Result<()> {
        let expected = self.placeholder_count();
        if expected != arguments {
            return Err(ExecError::PlaceholderMismatch {
                expected,
                actual: arguments,
            });
        }
        Ok(())
    }

    /// Replaces each placeholder with the literal form of its argument.
    pub fn render_literal(&self, params: &[SqlValue], driver: &dyn DatabaseDriver) -> Result<String> {
        self.check_arity(params.len())?;
        Ok(self.render(|index| literal(&params[index], driver)))
    }

    /// Replaces each placeholder with the driver's native positional marker.
    /// Markers are numbered from 1.
    pub fn render_markers(&self, driver: &dyn DatabaseDriver) -> String {
        self.render(|index| driver.placeholder(index + 1))
    }

    fn render(&self, mut fill: impl FnMut(usize) -> String) -> String {
        let mut sql = String::new();
        let mut index = 0;
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Placeholder => {
                    sql.push_str(&fill(index));
                    index += 1;
                }
            }
        }
        sql
    }
}

/// SQL literal for a substituted parameter.
///
/// Only `SqlValue::Integer` is emitted bare. Everything else is quoted and
/// escaped by the driver, so the unescaped path is limited to values that
/// are already a checked `i64`. Null and the empty string both become `null`.
pub fn literal(value: &SqlValue, driver: &dyn DatabaseDriver) -> String {
    match value {
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Null => "null".to_string(),
        SqlValue::Text(s) if s.is_empty() => "null".to_string(),
        SqlValue::Text(s) => format!("'{}'", driver.escape_string(s)),
        SqlValue::Float(f) => format!("'{}'", driver.escape_string(&f.to_string())),
        SqlValue::Binary(b) => driver.binary_literal(b),
    }
}
