mod driver;

pub use driver::{DatabaseDriver, QueryMode};
