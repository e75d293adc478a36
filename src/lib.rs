//! pgexec - A small query executor over a single PostgreSQL session
//!
//! # Example
//! ```ignore
//! use pgexec::{params, ConnectOptions, FetchMode, QueryExecutor, Record};
//!
//! // Connect to database
//! let options = ConnectOptions::new("localhost", "mydb").user("app");
//! let mut db = QueryExecutor::connect(&options).await?;
//!
//! // Literal substitution: integers bare, everything else escaped and quoted
//! let mut result = db
//!     .run_query("SELECT id, name FROM users WHERE name = ? LIMIT ?", params!["O'Brien", 10])
//!     .await?;
//! let rows = result.fetcher().fetch_all(FetchMode::Associative);
//!
//! // Prepared statement with bind types taken from the values
//! db.run_bound("UPDATE users SET active = ? WHERE id = ?", params![true, 7])
//!     .await?;
//!
//! // Staged bulk load
//! let records = vec![
//!     Record::new().field("name", "wally").field("location", "whereami"),
//!     Record::new().field("name", "solar system").field("location", "universe"),
//! ];
//! db.bulk_load("entities", &records).await?;
//! ```

pub mod bulk;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fetch;
pub mod template;
pub mod traits;
pub mod types;

mod client;

// Re-export main types for convenient access
pub use bulk::{BulkLoadOutcome, BulkOptions, Record};
pub use client::QueryExecutor;
pub use config::ConnectOptions;
pub use error::{ExecError, Result};
pub use fetch::{to_json_or_empty, RowFetcher};
pub use template::QueryTemplate;
pub use traits::{DatabaseDriver, QueryMode};
pub use types::{BindType, FetchMode, QueryResult, RawQueryResult, RowKey, ShapedRow, SqlValue};
