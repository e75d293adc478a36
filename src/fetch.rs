use crate::types::{FetchMode, QueryResult, ShapedRow};

const EMPTY_JSON_ARRAY: &str = "[]";

/// Fetch and conversion helpers over a [`QueryResult`].
///
/// Every helper reads from the result's cursor, so rows taken by one call
/// are not seen by the next.
pub struct RowFetcher<'r> {
    result: &'r mut QueryResult,
}

impl<'r> RowFetcher<'r> {
    pub fn new(result: &'r mut QueryResult) -> Self {
        Self { result }
    }

    /// Next row in the requested shape, or an empty row when none remain.
    pub fn fetch_one(&mut self, mode: FetchMode) -> ShapedRow {
        self.result.next_row(mode).unwrap_or_default()
    }

    /// All remaining rows. Empty when the result has no rows.
    pub fn fetch_all(&mut self, mode: FetchMode) -> Vec<ShapedRow> {
        self.rows(mode).collect()
    }

    /// Lazily yields the remaining rows.
    pub fn rows(&mut self, mode: FetchMode) -> Rows<'_> {
        Rows {
            result: &mut *self.result,
            mode,
        }
    }

    /// Applies `transform` to each remaining row in `Both` shape, stopping at
    /// the first error. The transform also sees the outputs produced so far.
    pub fn try_map_rows<T, E, F>(&mut self, mut transform: F) -> Result<Vec<T>, E>
    where
        F: FnMut(ShapedRow, &[T]) -> Result<T, E>,
    {
        let mut output = Vec::with_capacity(self.result.remaining());
        while let Some(row) = self.result.next_row(FetchMode::Both) {
            let mapped = transform(row, &output)?;
            output.push(mapped);
        }
        Ok(output)
    }

    /// JSON array of the remaining rows.
    pub fn to_json(&mut self, mode: FetchMode) -> String {
        let rows = self.fetch_all(mode);
        serde_json::to_string(&rows).unwrap_or_else(|e| {
            log::error!("Failed to serialize rows: {}", e);
            EMPTY_JSON_ARRAY.to_string()
        })
    }
}

/// Iterator over the remaining rows of a result.
pub struct Rows<'a> {
    result: &'a mut QueryResult,
    mode: FetchMode,
}

impl Iterator for Rows<'_> {
    type Item = ShapedRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.result.next_row(self.mode)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.result.remaining();
        (remaining, Some(remaining))
    }
}

/// JSON array of the rows of `result`; `[]` when there is no result.
pub fn to_json_or_empty(result: Option<&mut QueryResult>, mode: FetchMode) -> String {
    match result {
        Some(result) => RowFetcher::new(result).to_json(mode),
        None => EMPTY_JSON_ARRAY.to_string(),
    }
}
