use std::sync::Arc;

use crate::bulk::{self, BulkLoadOutcome, BulkOptions, Record, StagedFile};
use crate::config::ConnectOptions;
use crate::drivers::TokioPostgresDriver;
use crate::error::{ExecError, Result};
use crate::template::QueryTemplate;
use crate::traits::{DatabaseDriver, QueryMode};
use crate::types::{QueryResult, RawQueryResult, SqlValue};

/// Main entry point for pgexec.
/// Owns one database session and runs templated queries against it.
///
/// An executor is not meant for concurrent use: stateful calls take
/// `&mut self`, and sharing one across tasks needs external locking.
/// Dropping it releases the session.
pub struct QueryExecutor {
    driver: Option<Arc<dyn DatabaseDriver>>,
    wait_for_commit: bool,
    affected_rows: u64,
    last_error: Option<String>,
}

impl QueryExecutor {
    /// Connect to a PostgreSQL database.
    ///
    /// # Example
    /// ```ignore
    /// let options = ConnectOptions::new("localhost", "mydb").user("app");
    /// let mut db = QueryExecutor::connect(&options).await?;
    /// ```
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let driver = TokioPostgresDriver::connect(options).await?;
        Ok(Self::with_driver(Arc::new(driver)))
    }

    /// Connect from individual parameters. Unset user, password and port
    /// use the driver defaults.
    pub async fn open(
        host: &str,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self> {
        let options = ConnectOptions {
            host: host.to_string(),
            database: database.to_string(),
            user: user.map(str::to_string),
            password: password.map(str::to_string),
            port,
        };
        Self::connect(&options).await
    }

    /// Create a new executor with a custom driver.
    /// Useful for testing or using alternative database drivers.
    pub fn with_driver(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver: Some(driver),
            wait_for_commit: false,
            affected_rows: 0,
            last_error: None,
        }
    }

    fn driver(&self) -> Result<&dyn DatabaseDriver> {
        self.driver.as_deref().ok_or(ExecError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    /// Release the session. Calling it again does nothing.
    pub async fn close(&mut self) -> Result<()> {
        match self.driver.take() {
            Some(driver) => driver.close().await,
            None => Ok(()),
        }
    }

    /// Substitute `params` into the `?` placeholders of `template` as SQL
    /// literals and execute the resulting text.
    ///
    /// Integers are written bare; every other value is quoted and escaped
    /// by the driver. The argument count must match the placeholder count.
    pub async fn run_query(&mut self, template: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let sql = QueryTemplate::parse(template).render_literal(params, self.driver()?)?;
        self.query(&sql).await
    }

    /// The SQL `run_query` would execute, without executing it.
    pub fn render_query(&self, template: &str, params: &[SqlValue]) -> Result<String> {
        QueryTemplate::parse(template).render_literal(params, self.driver()?)
    }

    /// Prepare `template`, bind `params` by position and execute.
    ///
    /// Bind types follow the values: integers (and booleans) as integer,
    /// binary as binary, floats as double, text and null as text.
    /// With no parameters this is a plain [`query`](Self::query).
    pub async fn run_bound(&mut self, template: &str, params: &[SqlValue]) -> Result<QueryResult> {
        if params.is_empty() {
            return self.query(template).await;
        }
        let parsed = QueryTemplate::parse(template);
        parsed.check_arity(params.len())?;
        let driver = self.driver()?;
        let sql = parsed.render_markers(driver);
        log::debug!("Executing prepared: {} ({} param(s))", sql, params.len());
        let outcome = driver.execute_prepared(&sql, params).await;
        self.track(outcome)
    }

    /// Execute literal SQL text.
    pub async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        self.query_with_mode(sql, QueryMode::Buffered).await
    }

    /// Execute literal SQL asking the driver not to buffer the result.
    pub async fn query_unbuffered(&mut self, sql: &str) -> Result<QueryResult> {
        self.query_with_mode(sql, QueryMode::Unbuffered).await
    }

    /// Execute literal SQL asking for deferred materialisation.
    /// This is a result mode hint, the call still completes the query.
    pub async fn query_async(&mut self, sql: &str) -> Result<QueryResult> {
        self.query_with_mode(sql, QueryMode::Async).await
    }

    pub async fn query_with_mode(&mut self, sql: &str, mode: QueryMode) -> Result<QueryResult> {
        log::debug!("Executing: {}", sql);
        let outcome = self.driver()?.query(sql, mode).await;
        self.track(outcome)
    }

    /// Records the outcome of a statement and reports failures.
    fn track(&mut self, outcome: Result<RawQueryResult>) -> Result<QueryResult> {
        match outcome {
            Ok(raw) => {
                self.affected_rows = raw.affected_rows;
                self.last_error = None;
                Ok(QueryResult::from_raw(raw))
            }
            Err(e) => {
                log::warn!("Statement failed: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Rows changed by the last successful statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Message of the last failed statement, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub async fn last_insert_id(&self) -> Result<Option<i64>> {
        self.driver()?.last_insert_id().await
    }

    /// Escape `text` for use inside a single-quoted SQL literal.
    pub fn escape(&self, text: &str) -> Result<String> {
        Ok(self.driver()?.escape_string(text))
    }

    pub async fn ping(&self) -> Result<()> {
        self.driver()?.ping().await
    }

    pub async fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.driver()?.set_autocommit(enabled).await
    }

    /// Enter (or leave) manual commit mode. While waiting, the next
    /// [`commit`](Self::commit) also turns autocommit back on.
    pub async fn wait_for_commit(&mut self, waiting: bool) -> Result<()> {
        self.driver()?.set_autocommit(!waiting).await?;
        self.wait_for_commit = waiting;
        Ok(())
    }

    pub fn is_waiting_for_commit(&self) -> bool {
        self.wait_for_commit
    }

    /// Commit pending work. Restores autocommit if a
    /// [`wait_for_commit`](Self::wait_for_commit) is pending.
    pub async fn commit(&mut self) -> Result<()> {
        let driver = self.driver()?;
        driver.commit().await?;
        if self.wait_for_commit {
            driver.set_autocommit(true).await?;
            self.wait_for_commit = false;
        }
        Ok(())
    }

    /// Load `records` into `table` through a staged file.
    ///
    /// All records must share the column set and order of the first one.
    /// The staging file is gone when this returns, whatever the outcome.
    /// A server-side failure can still leave part of the rows loaded.
    pub async fn bulk_load(&mut self, table: &str, records: &[Record]) -> Result<BulkLoadOutcome> {
        self.bulk_load_with(table, records, &BulkOptions::default())
            .await
    }

    /// Like [`bulk_load`](Self::bulk_load), taking a JSON array of objects.
    pub async fn bulk_load_json(
        &mut self,
        table: &str,
        data: &serde_json::Value,
    ) -> Result<BulkLoadOutcome> {
        let records = bulk::records_from_json(data)?;
        self.bulk_load(table, &records).await
    }

    pub async fn bulk_load_with(
        &mut self,
        table: &str,
        records: &[Record],
        options: &BulkOptions,
    ) -> Result<BulkLoadOutcome> {
        let driver = self.driver()?;
        let Some(staged) = StagedFile::write(table, records, options)? else {
            return Ok(BulkLoadOutcome::Skipped);
        };
        log::debug!("Bulk import: {}", staged.statement());
        let imported = driver.bulk_import(staged.statement()).await;
        let removed = staged.remove();

        let rows = match imported {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Bulk import into {} failed: {}", table, e);
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        removed?;
        self.affected_rows = rows;
        Ok(BulkLoadOutcome::Loaded { rows })
    }
}

impl Drop for QueryExecutor {
    fn drop(&mut self) {
        if self.driver.take().is_some() {
            log::debug!("Releasing database session");
        }
    }
}
