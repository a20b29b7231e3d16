//! Row storage: scalar types, records, schema and the positional row store.

pub mod row_store;
pub mod types;

pub use row_store::{RowStore, MAX_ROWS};
pub use types::{ColumnKind, ColumnMeta, Record, Row, RowRef, Scalar, Schema, MISSING_VALUE};
