use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{pin_mut, SinkExt};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{to_sql_checked, Format, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage, Statement};

use crate::bulk::{self, BulkLoadStatement};
use crate::config::ConnectOptions;
use crate::error::{ExecError, Result};
use crate::traits::{DatabaseDriver, QueryMode};
use crate::types::{BindType, RawQueryResult, SqlValue};

/// Session settings applied on connect. Literal escaping only doubles `'`,
/// which is safe only with standard-conforming strings.
const SESSION_SETUP: &str =
    "SET client_encoding TO 'UTF8'; SET standard_conforming_strings = on";

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Literal queries run over the simple protocol and return every value as
/// text. Prepared executions decode results natively.
///
/// PostgreSQL has no session autocommit switch, so turning autocommit off
/// opens a transaction and `commit` immediately opens the next one.
pub struct TokioPostgresDriver {
    client: Client,
    autocommit: AtomicBool,
    closed: AtomicBool,
}

impl TokioPostgresDriver {
    /// Connect to a PostgreSQL database.
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let (client, connection) = options
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| ExecError::Connection(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("PostgreSQL connection error: {}", e);
            }
        });

        client
            .batch_execute(SESSION_SETUP)
            .await
            .map_err(|e| ExecError::Connection(e.to_string()))?;

        log::debug!(
            "Connected to {}:{}/{}",
            options.host,
            options.effective_port(),
            options.database
        );
        Ok(Self {
            client,
            autocommit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.client.is_closed() {
            return Err(ExecError::Closed);
        }
        Ok(())
    }

    async fn run(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<RawQueryResult> {
        if statement.columns().is_empty() {
            let affected = self
                .client
                .execute(statement, params)
                .await
                .map_err(execution_error)?;
            return Ok(RawQueryResult::affected(affected));
        }

        let rows = self
            .client
            .query(statement, params)
            .await
            .map_err(execution_error)?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let result_rows = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| row_value(row, i, col.type_()))
                    .collect::<Result<Vec<SqlValue>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawQueryResult::new(columns, result_rows))
    }
}

#[async_trait]
impl DatabaseDriver for TokioPostgresDriver {
    async fn query(&self, sql: &str, mode: QueryMode) -> Result<RawQueryResult> {
        self.ensure_open()?;
        if mode != QueryMode::Buffered {
            log::debug!("{:?} mode requested, results are buffered", mode);
        }
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(execution_error)?;
        Ok(collect_simple(messages))
    }

    async fn execute_prepared(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.ensure_open()?;
        let types: Vec<Type> = params.iter().map(|v| pg_type(BindType::of(v))).collect();
        let statement = self
            .client
            .prepare_typed(sql, &types)
            .await
            .map_err(|e| ExecError::Prepare(describe(&e)))?;

        let bound: Vec<BoundParam<'_>> = params.iter().map(BoundParam).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        self.run(&statement, &param_refs).await
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    /// Escapes for standard-conforming strings, where only `'` is special.
    fn escape_string(&self, text: &str) -> String {
        escape_literal(text)
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        self.ensure_open()?;
        // lastval() errors until a sequence has been used in this session.
        match self.client.query_one("SELECT lastval()", &[]).await {
            Ok(row) => Ok(row.try_get::<_, i64>(0).ok()),
            Err(e) if e.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE) => Ok(None),
            Err(e) => Err(execution_error(e)),
        }
    }

    async fn set_autocommit(&self, enabled: bool) -> Result<()> {
        self.ensure_open()?;
        let was_enabled = self.autocommit.load(Ordering::Acquire);
        let Some(sql) = autocommit_transition(was_enabled, enabled) else {
            return Ok(());
        };
        log::debug!("autocommit {} -> {}", was_enabled, enabled);
        // The flag only moves once the session has actually switched.
        self.client.batch_execute(sql).await.map_err(execution_error)?;
        self.autocommit.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        if self.autocommit.load(Ordering::Acquire) {
            return Ok(());
        }
        self.client
            .batch_execute("COMMIT; BEGIN")
            .await
            .map_err(execution_error)
    }

    async fn bulk_import(&self, statement: &BulkLoadStatement) -> Result<u64> {
        self.ensure_open()?;
        let contents = tokio::fs::read_to_string(&statement.file).await?;
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN",
            statement.table,
            statement.columns.join(", ")
        );
        log::debug!("{} (staged as: {})", copy_sql, statement);

        let sink = self
            .client
            .copy_in::<_, Bytes>(copy_sql.as_str())
            .await
            .map_err(execution_error)?;
        pin_mut!(sink);
        sink.send(Bytes::from(staged_to_copy_text(&contents)))
            .await
            .map_err(execution_error)?;
        sink.finish().await.map_err(execution_error)
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(execution_error)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // The socket itself closes when the client is dropped.
        log::debug!("PostgreSQL session closed");
        Ok(())
    }
}

fn describe(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => db.message().to_string(),
        None => error.to_string(),
    }
}

fn execution_error(error: tokio_postgres::Error) -> ExecError {
    ExecError::Execution {
        code: error
            .code()
            .map(|c| c.code().to_string())
            .unwrap_or_default(),
        message: describe(&error),
    }
}

/// Doubles single quotes; backslashes are ordinary characters once
/// `standard_conforming_strings` is on.
fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Statement that moves the session from one autocommit state to another.
fn autocommit_transition(was_enabled: bool, enabled: bool) -> Option<&'static str> {
    match (was_enabled, enabled) {
        (true, false) => Some("BEGIN"),
        (false, true) => Some("COMMIT"),
        _ => None,
    }
}

/// Parameter type declared at prepare time. Text and null are left to the
/// server, which infers them from context.
fn pg_type(bind: BindType) -> Type {
    match bind {
        BindType::Integer => Type::INT8,
        BindType::Binary => Type::BYTEA,
        BindType::Double => Type::FLOAT8,
        BindType::Text => Type::UNKNOWN,
    }
}

/// A bound parameter. Text is sent in text format so the server parses it
/// with the input function of whatever type it inferred (dates, numerics,
/// integers). Null binds to any type.
#[derive(Debug)]
struct BoundParam<'a>(&'a SqlValue);

impl ToSql for BoundParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Integer(i) => i.to_sql(ty, out),
            SqlValue::Float(f) => f.to_sql(ty, out),
            SqlValue::Text(s) => {
                out.extend_from_slice(s.as_bytes());
                Ok(IsNull::No)
            }
            SqlValue::Binary(b) => b.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        match self.0 {
            SqlValue::Text(_) => Format::Text,
            _ => Format::Binary,
        }
    }

    to_sql_checked!();
}

/// Text form of column types that have no native `SqlValue`.
struct TextForm(String);

impl<'a> FromSql<'a> for TextForm {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        if *ty == Type::UUID {
            if raw.len() != 16 {
                return Err(format!("uuid has {} bytes", raw.len()).into());
            }
            let h = hex::encode(raw);
            return Ok(TextForm(format!(
                "{}-{}-{}-{}-{}",
                &h[0..8],
                &h[8..12],
                &h[12..16],
                &h[16..20],
                &h[20..32]
            )));
        }
        let body = if *ty == Type::JSONB {
            match raw.split_first() {
                Some((1, body)) => body,
                _ => return Err("unsupported jsonb version".into()),
            }
        } else {
            raw
        };
        Ok(TextForm(std::str::from_utf8(body)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON
            || *ty == Type::JSONB
            || *ty == Type::UUID
            || <String as FromSql>::accepts(ty)
    }
}

/// Folds simple-protocol messages into a result. With several statements
/// in one string, the last statement's result is kept.
fn collect_simple(messages: Vec<SimpleQueryMessage>) -> RawQueryResult {
    let mut last = RawQueryResult::empty();
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<SqlValue>> = Vec::new();
    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(description) => {
                columns = description.iter().map(|c| c.name().to_string()).collect();
            }
            SimpleQueryMessage::Row(row) => {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map_or(SqlValue::Null, SqlValue::from))
                        .collect(),
                );
            }
            SimpleQueryMessage::CommandComplete(affected) => {
                last = RawQueryResult {
                    columns: std::mem::take(&mut columns),
                    rows: std::mem::take(&mut rows),
                    affected_rows: affected,
                };
            }
            _ => {}
        }
    }
    last
}

/// Convert a row value at a given index to a SqlValue.
fn row_value(row: &tokio_postgres::Row, index: usize, type_: &Type) -> Result<SqlValue> {
    let value = match type_ {
        t if *t == Type::BOOL => row.try_get::<_, Option<bool>>(index).map(SqlValue::from),
        t if *t == Type::INT2 => row.try_get::<_, Option<i16>>(index).map(SqlValue::from),
        t if *t == Type::INT4 => row.try_get::<_, Option<i32>>(index).map(SqlValue::from),
        t if *t == Type::INT8 => row.try_get::<_, Option<i64>>(index).map(SqlValue::from),
        t if *t == Type::OID => row.try_get::<_, Option<u32>>(index).map(SqlValue::from),
        t if *t == Type::FLOAT4 => row.try_get::<_, Option<f32>>(index).map(SqlValue::from),
        t if *t == Type::FLOAT8 => row.try_get::<_, Option<f64>>(index).map(SqlValue::from),
        t if *t == Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index).map(SqlValue::from),
        _ => row
            .try_get::<_, Option<TextForm>>(index)
            .map(|v| v.map_or(SqlValue::Null, |t| SqlValue::Text(t.0))),
    };
    value.map_err(|e| {
        ExecError::execution(format!(
            "cannot decode column {} of type {} ({}); cast it to text in the query",
            row.columns()[index].name(),
            type_.name(),
            e
        ))
    })
}

/// Re-encodes staged lines as COPY text format.
///
/// Staged fields already double their backslashes and use `\N` for null,
/// which COPY shares; only tab, newline and carriage return need escaping.
fn staged_to_copy_text(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for fields in bulk::split_staged(contents) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            for c in field.chars() {
                match c {
                    '\t' => out.push_str("\\t"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    other => out.push(other),
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_to_copy_text() {
        let staged = "a:::,b\tc^^^\nline\nbreak:::,\\N^^^\n";
        assert_eq!(
            staged_to_copy_text(staged),
            "a\tb\\tc\nline\\nbreak\t\\N\n"
        );
    }

    #[test]
    fn test_bind_types_map_to_pg_types() {
        assert_eq!(pg_type(BindType::Integer), Type::INT8);
        assert_eq!(pg_type(BindType::Double), Type::FLOAT8);
        assert_eq!(pg_type(BindType::Text), Type::UNKNOWN);
        assert_eq!(pg_type(BindType::Binary), Type::BYTEA);
    }

    #[test]
    fn test_text_params_are_sent_as_text() {
        let value = SqlValue::from("2024-01-02");
        let param = BoundParam(&value);
        let mut buf = BytesMut::new();

        assert!(matches!(param.encode_format(&Type::DATE), Format::Text));
        assert!(matches!(
            param.to_sql_checked(&Type::DATE, &mut buf),
            Ok(IsNull::No)
        ));
        assert_eq!(&buf[..], b"2024-01-02");
    }

    #[test]
    fn test_null_params_bind_to_any_type() {
        let mut buf = BytesMut::new();
        for ty in [Type::INT4, Type::DATE, Type::NUMERIC, Type::TEXT] {
            assert!(matches!(
                BoundParam(&SqlValue::Null).to_sql_checked(&ty, &mut buf),
                Ok(IsNull::Yes)
            ));
        }
        assert!(buf.is_empty());
        assert!(matches!(
            BoundParam(&SqlValue::Integer(5)).encode_format(&Type::INT8),
            Format::Binary
        ));
    }

    #[test]
    fn test_text_form_of_undecoded_types() {
        let uuid = hex::decode("a0eebc999c0b4ef8bb6d6bb9bd380a11").unwrap();
        let text = TextForm::from_sql(&Type::UUID, &uuid).unwrap();
        assert_eq!(text.0, "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11");

        let text = TextForm::from_sql(&Type::JSONB, b"\x01{\"a\": 1}").unwrap();
        assert_eq!(text.0, r#"{"a": 1}"#);

        assert!(TextForm::from_sql(&Type::UUID, &uuid[..4]).is_err());
        assert!(<TextForm as FromSql>::accepts(&Type::VARCHAR));
        assert!(!<TextForm as FromSql>::accepts(&Type::NUMERIC));
    }

    #[test]
    fn test_escape_keeps_backslash_quote_inside_literal() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(
            escape_literal("x\\'; SELECT 1; --"),
            "x\\''; SELECT 1; --"
        );
        assert!(SESSION_SETUP.contains("standard_conforming_strings = on"));
    }

    #[test]
    fn test_autocommit_transitions() {
        assert_eq!(autocommit_transition(true, false), Some("BEGIN"));
        assert_eq!(autocommit_transition(false, true), Some("COMMIT"));
        assert_eq!(autocommit_transition(true, true), None);
        assert_eq!(autocommit_transition(false, false), None);
    }
}
