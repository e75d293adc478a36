use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::bulk::{self, BulkLoadStatement};
use crate::error::{ExecError, Result};
use crate::traits::{DatabaseDriver, QueryMode};
use crate::types::{RawQueryResult, SqlValue};

/// Which driver entry point a recorded call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query(QueryMode),
    Prepared,
}

/// A recorded query execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub kind: CallKind,
}

/// A bulk import as seen by the driver, with the staged rows it read.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedImport {
    pub statement: BulkLoadStatement,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug)]
struct SessionState {
    autocommit: bool,
    commits: usize,
    closed: bool,
    last_insert_id: Option<i64>,
}

/// An in-memory database driver for testing.
///
/// Allows configuring expected responses and verifying executed queries.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use pgexec::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use pgexec::traits::DatabaseDriver;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(&["1", "Alice"])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestDriver {
    responses: Mutex<VecDeque<Result<RawQueryResult>>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    imports: Mutex<Vec<RecordedImport>>,
    import_error: Mutex<Option<ExecError>>,
    autocommit_error: Mutex<Option<ExecError>>,
    state: Mutex<SessionState>,
    default_response: RawQueryResult,
    placeholder_style: Box<dyn Fn(usize) -> String + Send + Sync>,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            recorded_queries: Mutex::new(Vec::new()),
            imports: Mutex::new(Vec::new()),
            import_error: Mutex::new(None),
            autocommit_error: Mutex::new(None),
            state: Mutex::new(SessionState {
                autocommit: true,
                commits: 0,
                closed: false,
                last_insert_id: None,
            }),
            default_response: RawQueryResult::empty(),
            placeholder_style: Box::new(|_| "?".to_string()),
        }
    }

    /// Add a response to be returned by the next query.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: RawQueryResult) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Add multiple responses to be returned by subsequent queries.
    pub fn with_responses(self, responses: impl IntoIterator<Item = RawQueryResult>) -> Self {
        let mut queue = self.responses.lock().unwrap();
        for response in responses {
            queue.push_back(Ok(response));
        }
        drop(queue);
        self
    }

    /// Make the next query fail with `error` instead of returning a response.
    pub fn with_error(self, error: ExecError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Make the next bulk import fail after reading the staged file.
    pub fn with_import_error(self, error: ExecError) -> Self {
        *self.import_error.lock().unwrap() = Some(error);
        self
    }

    /// Make the next autocommit switch fail, leaving the session unchanged.
    pub fn with_autocommit_error(self, error: ExecError) -> Self {
        *self.autocommit_error.lock().unwrap() = Some(error);
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(mut self, response: RawQueryResult) -> Self {
        self.default_response = response;
        self
    }

    /// Use `style` to render native placeholders instead of `?`.
    pub fn with_placeholder_style(
        mut self,
        style: impl Fn(usize) -> String + Send + Sync + 'static,
    ) -> Self {
        self.placeholder_style = Box::new(style);
        self
    }

    /// Value reported by `last_insert_id`.
    pub fn with_last_insert_id(self, id: i64) -> Self {
        self.state.lock().unwrap().last_insert_id = Some(id);
        self
    }

    /// Get all recorded queries that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.recorded_queries.lock().unwrap().clone()
    }

    /// Get the last recorded query, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.recorded_queries.lock().unwrap().last().cloned()
    }

    /// Clear all recorded queries.
    pub fn clear_recorded_queries(&self) {
        self.recorded_queries.lock().unwrap().clear();
    }

    /// Get all bulk imports that have been performed.
    pub fn imports(&self) -> Vec<RecordedImport> {
        self.imports.lock().unwrap().clone()
    }

    /// Paths of the staged files imports were pointed at.
    pub fn imported_files(&self) -> Vec<PathBuf> {
        self.imports
            .lock()
            .unwrap()
            .iter()
            .map(|import| import.statement.file.clone())
            .collect()
    }

    pub fn autocommit(&self) -> bool {
        self.state.lock().unwrap().autocommit
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Assert that the last query matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n queries were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.recorded_queries.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }

    fn record(&self, sql: &str, params: &[SqlValue], kind: CallKind) -> Result<RawQueryResult> {
        if self.is_closed() {
            return Err(ExecError::Closed);
        }
        self.recorded_queries.lock().unwrap().push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
            kind,
        });

        // Return next queued response or default
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_response.clone()))
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryTestDriver {
    async fn query(&self, sql: &str, mode: QueryMode) -> Result<RawQueryResult> {
        self.record(sql, &[], CallKind::Query(mode))
    }

    async fn execute_prepared(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.record(sql, params, CallKind::Prepared)
    }

    fn placeholder(&self, index: usize) -> String {
        (self.placeholder_style)(index)
    }

    fn escape_string(&self, text: &str) -> String {
        text.replace('\'', "''")
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        Ok(self.state.lock().unwrap().last_insert_id)
    }

    async fn set_autocommit(&self, enabled: bool) -> Result<()> {
        if let Some(error) = self.autocommit_error.lock().unwrap().take() {
            return Err(error);
        }
        self.state.lock().unwrap().autocommit = enabled;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn bulk_import(&self, statement: &BulkLoadStatement) -> Result<u64> {
        let contents = std::fs::read_to_string(&statement.file)?;
        let rows: Vec<Vec<Option<String>>> = bulk::split_staged(&contents)
            .map(|fields| fields.into_iter().map(bulk::decode_field).collect())
            .collect();
        let count = rows.len() as u64;
        self.imports.lock().unwrap().push(RecordedImport {
            statement: statement.clone(),
            rows,
        });
        match self.import_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(count),
        }
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ExecError::Closed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    affected_rows: Option<u64>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
        }
    }

    /// Set the column names for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of text values.
    pub fn row(mut self, values: &[&str]) -> Self {
        self.rows
            .push(values.iter().map(|s| SqlValue::from(*s)).collect());
        self
    }

    /// Add a row of typed values.
    pub fn values(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Override the affected-row count, which otherwise equals the row count.
    pub fn affected_rows(mut self, count: u64) -> Self {
        self.affected_rows = Some(count);
        self
    }

    /// Build the RawQueryResult.
    pub fn build(self) -> RawQueryResult {
        let mut raw = RawQueryResult::new(self.columns, self.rows);
        if let Some(count) = self.affected_rows {
            raw.affected_rows = count;
        }
        raw
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
