//! Core connector traits.
//!
//! This module defines the boundary between the evolution engine and the
//! databases it observes and mutates:
//!
//! - [`SourceConnector`]: reads schema snapshots and change records
//! - [`DestinationConnector`]: applies DDL-equivalent operations
//!
//! Implementations live behind the factory in [`crate::connectors`]; the
//! engine only ever sees `Arc<dyn SourceConnector>` / `Arc<dyn
//! DestinationConnector>`.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{ChangeBatch, ColumnDefinition, ColumnType, DatabaseSchema, Record, TableSchema};

/// Read schema metadata and data from a source database.
///
/// Each `get_schema` call must return a complete, internally consistent
/// snapshot; the detector validates consistency and treats violations as
/// detection failures.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fetch the current schema definition for a named schema.
    async fn get_schema(&self, schema_name: &str) -> Result<DatabaseSchema>;

    /// Fetch a batch of change records after the given position marker.
    ///
    /// The marker is opaque to the engine; `None` starts from the earliest
    /// available position.
    async fn get_changes(
        &self,
        schema_name: &str,
        marker: Option<serde_json::Value>,
        batch_size: usize,
    ) -> Result<ChangeBatch>;

    /// Fetch a full snapshot of a single table as insert records.
    async fn get_full_snapshot(
        &self,
        schema_name: &str,
        table_name: &str,
        batch_size: usize,
    ) -> Result<Vec<Record>>;

    /// Get the connector type identifier (e.g., "postgres", "memory").
    fn connector_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Apply schema changes to a destination database.
///
/// Each method maps to one DDL-equivalent call with an individual
/// success/failure outcome; the migrator composes them into a run.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    /// Create a schema if it doesn't exist. Idempotent.
    async fn create_schema_if_not_exists(&self, schema_name: &str) -> Result<()>;

    /// Create a table if it doesn't exist. Idempotent.
    async fn create_table_if_not_exists(
        &self,
        schema_name: &str,
        table: &TableSchema,
    ) -> Result<()>;

    /// Add a column to an existing table.
    async fn add_column(
        &self,
        schema_name: &str,
        table_name: &str,
        column: &ColumnDefinition,
    ) -> Result<()>;

    /// Change the type of an existing column.
    async fn alter_column_type(
        &self,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
        new_type: ColumnType,
    ) -> Result<()>;

    /// Change the nullability of an existing column.
    async fn alter_column_nullability(
        &self,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
        nullable: bool,
    ) -> Result<()>;

    /// Drop a column.
    async fn drop_column(&self, schema_name: &str, table_name: &str, column_name: &str)
        -> Result<()>;

    /// Drop a table.
    async fn drop_table(&self, schema_name: &str, table_name: &str) -> Result<()>;

    /// Get the connector type identifier (e.g., "postgres", "memory").
    fn connector_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}
