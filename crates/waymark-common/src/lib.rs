pub mod error;
pub mod schema;

pub use error::{Error, Result};
pub use schema::{ColumnSchema, IndexSchema, TableSchema};
