//! Tabular data structures.

mod table;

pub use table::{Column, ColumnType, Table, Value};
