//! In-memory connectors for tests and embedding.
//!
//! [`MemorySource`] serves settable schema snapshots and record batches;
//! [`MemoryDestination`] records every DDL call it receives and maintains a
//! live table map, so tests can assert on both the call trail and the
//! resulting structure. Both support failure injection.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::{
    ChangeBatch, ColumnDefinition, ColumnType, DatabaseSchema, DestinationConnector, Record,
    SourceConnector, TableSchema,
};
use crate::error::{Result, WarpError};

/// Source connector backed by in-process state.
#[derive(Default)]
pub struct MemorySource {
    schemas: Mutex<HashMap<String, DatabaseSchema>>,
    records: Mutex<HashMap<String, Vec<Record>>>,
    fail_next_fetch: Mutex<Option<String>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the snapshot served for a schema name.
    pub fn set_schema(&self, schema: DatabaseSchema) {
        self.schemas
            .lock()
            .unwrap()
            .insert(schema.name.clone(), schema);
    }

    /// Append a change record for a schema.
    pub fn push_record(&self, schema_name: &str, record: Record) {
        self.records
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default()
            .push(record);
    }

    /// Make the next `get_schema` call fail with the given message.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next_fetch.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    async fn get_schema(&self, schema_name: &str) -> Result<DatabaseSchema> {
        if let Some(message) = self.fail_next_fetch.lock().unwrap().take() {
            return Err(WarpError::detection(schema_name, message));
        }
        self.schemas
            .lock()
            .unwrap()
            .get(schema_name)
            .cloned()
            .ok_or_else(|| WarpError::detection(schema_name, "schema not found"))
    }

    async fn get_changes(
        &self,
        schema_name: &str,
        marker: Option<serde_json::Value>,
        batch_size: usize,
    ) -> Result<ChangeBatch> {
        let records = self.records.lock().unwrap();
        let all = records.get(schema_name).cloned().unwrap_or_default();
        let start = marker
            .as_ref()
            .and_then(|m| m.as_u64())
            .map(|n| n as usize)
            .unwrap_or(0);
        let batch: Vec<Record> = all.iter().skip(start).take(batch_size).cloned().collect();
        let next = start + batch.len();
        Ok(ChangeBatch {
            records: batch,
            position_marker: Some(serde_json::json!(next)),
        })
    }

    async fn get_full_snapshot(
        &self,
        schema_name: &str,
        table_name: &str,
        batch_size: usize,
    ) -> Result<Vec<Record>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(schema_name)
            .map(|rs| {
                rs.iter()
                    .filter(|r| r.table_name == table_name)
                    .take(batch_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn connector_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Destination connector backed by in-process state.
#[derive(Default)]
pub struct MemoryDestination {
    tables: Mutex<HashMap<String, HashMap<String, TableSchema>>>,
    applied: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl MemoryDestination {
    /// Create an empty destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any DDL call whose description contains `needle` fail.
    pub fn fail_on(&self, needle: impl Into<String>) {
        *self.fail_on.lock().unwrap() = Some(needle.into());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    /// The ordered trail of DDL calls received so far.
    pub fn applied_ddl(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// A table's current structure, if it exists.
    pub fn table(&self, schema_name: &str, table_name: &str) -> Option<TableSchema> {
        self.tables
            .lock()
            .unwrap()
            .get(schema_name)
            .and_then(|tables| tables.get(table_name))
            .cloned()
    }

    fn record(&self, table_name: &str, description: String) -> Result<()> {
        if let Some(needle) = self.fail_on.lock().unwrap().as_ref() {
            if description.contains(needle.as_str()) {
                return Err(WarpError::application(
                    table_name,
                    format!("injected failure on '{}'", description),
                ));
            }
        }
        self.applied.lock().unwrap().push(description);
        Ok(())
    }
}

#[async_trait]
impl DestinationConnector for MemoryDestination {
    async fn create_schema_if_not_exists(&self, schema_name: &str) -> Result<()> {
        self.record(schema_name, format!("create schema {}", schema_name))?;
        self.tables
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default();
        Ok(())
    }

    async fn create_table_if_not_exists(
        &self,
        schema_name: &str,
        table: &TableSchema,
    ) -> Result<()> {
        self.record(&table.name, format!("create table {}", table.name))?;
        self.tables
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default()
            .entry(table.name.clone())
            .or_insert_with(|| table.clone());
        Ok(())
    }

    async fn add_column(
        &self,
        schema_name: &str,
        table_name: &str,
        column: &ColumnDefinition,
    ) -> Result<()> {
        self.record(
            table_name,
            format!("add column {}.{}", table_name, column.name),
        )?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(schema_name)
            .and_then(|t| t.get_mut(table_name))
            .ok_or_else(|| WarpError::application(table_name, "table does not exist"))?;
        if table.column(&column.name).is_some() {
            return Err(WarpError::application(
                table_name,
                format!("column '{}' already exists", column.name),
            ));
        }
        table.columns.push(column.clone());
        Ok(())
    }

    async fn alter_column_type(
        &self,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
        new_type: ColumnType,
    ) -> Result<()> {
        self.record(
            table_name,
            format!("alter column type {}.{}", table_name, column_name),
        )?;
        let mut tables = self.tables.lock().unwrap();
        let column = tables
            .get_mut(schema_name)
            .and_then(|t| t.get_mut(table_name))
            .and_then(|t| t.columns.iter_mut().find(|c| c.name == column_name))
            .ok_or_else(|| WarpError::application(table_name, "column does not exist"))?;
        column.r#type = new_type;
        Ok(())
    }

    async fn alter_column_nullability(
        &self,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
        nullable: bool,
    ) -> Result<()> {
        self.record(
            table_name,
            format!("alter column nullability {}.{}", table_name, column_name),
        )?;
        let mut tables = self.tables.lock().unwrap();
        let column = tables
            .get_mut(schema_name)
            .and_then(|t| t.get_mut(table_name))
            .and_then(|t| t.columns.iter_mut().find(|c| c.name == column_name))
            .ok_or_else(|| WarpError::application(table_name, "column does not exist"))?;
        column.nullable = nullable;
        Ok(())
    }

    async fn drop_column(
        &self,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
    ) -> Result<()> {
        self.record(
            table_name,
            format!("drop column {}.{}", table_name, column_name),
        )?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(schema_name)
            .and_then(|t| t.get_mut(table_name))
            .ok_or_else(|| WarpError::application(table_name, "table does not exist"))?;
        let before = table.columns.len();
        table.columns.retain(|c| c.name != column_name);
        if table.columns.len() == before {
            return Err(WarpError::application(
                table_name,
                format!("column '{}' does not exist", column_name),
            ));
        }
        table.primary_keys.retain(|pk| pk != column_name);
        Ok(())
    }

    async fn drop_table(&self, schema_name: &str, table_name: &str) -> Result<()> {
        self.record(table_name, format!("drop table {}", table_name))?;
        let mut tables = self.tables.lock().unwrap();
        let removed = tables
            .get_mut(schema_name)
            .map(|t| t.remove(table_name).is_some())
            .unwrap_or(false);
        if !removed {
            return Err(WarpError::application(table_name, "table does not exist"));
        }
        Ok(())
    }

    fn connector_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Helper for building snapshot/change records in tests and demos.
pub fn insert_record(table_name: &str, data: serde_json::Value) -> Record {
    let map = match data {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => std::iter::once(("value".to_string(), other)).collect(),
    };
    Record {
        table_name: table_name.to_string(),
        data: map,
        operation: crate::core::OperationType::Insert,
        timestamp: Utc::now(),
    }
}
