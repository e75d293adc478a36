mod in_memory_test;
mod tokio_postgres;

pub use self::in_memory_test::{
    CallKind, InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedImport, RecordedQuery,
};
pub use self::tokio_postgres::TokioPostgresDriver;
