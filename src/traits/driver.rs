use async_trait::async_trait;

use crate::bulk::BulkLoadStatement;
use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// How the driver should materialise the rows of a literal query.
///
/// Only a hint: drivers that always buffer treat every mode as `Buffered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Fetch the whole result before returning.
    #[default]
    Buffered,
    /// Stream rows, releasing table locks once the first row is read.
    Unbuffered,
    /// Ask the server for deferred materialisation.
    Async,
}

/// Trait for database driver implementations.
/// Drivers are responsible for:
/// - Connecting to the database
/// - Escaping literals and converting SqlValue parameters to native types
/// - Executing queries and converting results to RawQueryResult
/// - Autocommit, commit and bulk import on the underlying session
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Execute literal SQL text with no bound parameters.
    async fn query(&self, sql: &str, mode: QueryMode) -> Result<RawQueryResult>;

    /// Prepare `sql`, bind `params` positionally and execute.
    /// Placeholders are already in the driver's native form, see [`placeholder`](Self::placeholder).
    /// Fails with `ExecError::Prepare` when preparation fails.
    async fn execute_prepared(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Native marker for the 1-based positional parameter `index`.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Escape `text` for use between single quotes.
    fn escape_string(&self, text: &str) -> String;

    /// Complete quoted literal for binary data.
    fn binary_literal(&self, bytes: &[u8]) -> String {
        format!("'{}'", self.escape_string(&SqlValue::hex_literal(bytes)))
    }

    /// Id generated by the most recent insert on this session, if any.
    async fn last_insert_id(&self) -> Result<Option<i64>>;

    async fn set_autocommit(&self, enabled: bool) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    /// Load a staged file into a table, returning the number of rows imported.
    async fn bulk_import(&self, statement: &BulkLoadStatement) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    /// Release the session. Must be safe to call more than once.
    async fn close(&self) -> Result<()>;
}
