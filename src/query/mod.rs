//! SQL rendering and row decoding for topology tables

pub mod builder;
pub mod materialize;

pub use builder::{quote_ident, Column, ColumnValue, ElementRecord, QueryBuilder, SqlText, UpdateMode};
pub use materialize::{ColumnCursor, FromRow};
