mod row;
mod sql_value;

pub use row::{FetchMode, QueryResult, RawQueryResult, RowKey, ShapedRow};
pub use sql_value::{BindType, SqlValue};
