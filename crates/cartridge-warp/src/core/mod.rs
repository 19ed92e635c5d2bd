//! Core value types and connector traits.

pub mod schema;
pub mod traits;

pub use schema::{
    ChangeBatch, ColumnDefinition, ColumnType, DatabaseSchema, OperationType, Record, TableSchema,
};
pub use traits::{DestinationConnector, SourceConnector};
