//! Schema version registry.
//!
//! The registry records every table schema the engine accepts, assigning a
//! monotonically increasing version per (schema, table) pair. Versions are
//! deduplicated by content hash: re-registering an identical schema returns
//! the existing record instead of minting a new version.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::core::TableSchema;
use crate::error::Result;

/// One registered schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersionRecord {
    pub id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    pub version: u64,
    pub previous_version: Option<u64>,
    /// Hex sha-256 over the canonical JSON form of the table schema.
    pub schema_hash: String,
    /// What produced this version ("initial", "evolution", ...).
    pub evolution_type: String,
    pub registered_at: DateTime<Utc>,
}

/// Audit store for accepted table schemas.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Record a table schema, returning the new (or deduplicated) record.
    async fn register_schema(
        &self,
        schema_name: &str,
        table_name: &str,
        schema: &TableSchema,
        evolution_type: &str,
    ) -> Result<SchemaVersionRecord>;

    /// Latest record for a table, if any was registered.
    async fn get_latest(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Option<SchemaVersionRecord>>;

    /// A specific version of a table's schema history.
    async fn get_version(
        &self,
        schema_name: &str,
        table_name: &str,
        version: u64,
    ) -> Result<Option<SchemaVersionRecord>>;
}

/// Canonical content hash of a table schema.
pub fn schema_hash(schema: &TableSchema) -> Result<String> {
    let canonical = serde_json::to_vec(schema)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// In-process registry backed by a map. Suitable for tests and
/// single-process deployments.
#[derive(Default)]
pub struct MemorySchemaRegistry {
    // (schema, table) -> version history, oldest first.
    records: Mutex<HashMap<(String, String), Vec<SchemaVersionRecord>>>,
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaRegistry for MemorySchemaRegistry {
    async fn register_schema(
        &self,
        schema_name: &str,
        table_name: &str,
        schema: &TableSchema,
        evolution_type: &str,
    ) -> Result<SchemaVersionRecord> {
        let hash = schema_hash(schema)?;
        let key = (schema_name.to_string(), table_name.to_string());

        let mut records = self.records.lock().await;
        let history = records.entry(key).or_default();

        if let Some(latest) = history.last() {
            if latest.schema_hash == hash {
                debug!(
                    schema = schema_name,
                    table = table_name,
                    version = latest.version,
                    "Schema unchanged, reusing registered version"
                );
                return Ok(latest.clone());
            }
        }

        let previous_version = history.last().map(|r| r.version);
        let record = SchemaVersionRecord {
            id: Uuid::new_v4(),
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            version: previous_version.map_or(1, |v| v + 1),
            previous_version,
            schema_hash: hash,
            evolution_type: evolution_type.to_string(),
            registered_at: Utc::now(),
        };
        debug!(
            schema = schema_name,
            table = table_name,
            version = record.version,
            "Registered schema version"
        );
        history.push(record.clone());
        Ok(record)
    }

    async fn get_latest(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Option<SchemaVersionRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(schema_name.to_string(), table_name.to_string()))
            .and_then(|history| history.last().cloned()))
    }

    async fn get_version(
        &self,
        schema_name: &str,
        table_name: &str,
        version: u64,
    ) -> Result<Option<SchemaVersionRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(schema_name.to_string(), table_name.to_string()))
            .and_then(|history| history.iter().find(|r| r.version == version).cloned()))
    }
}
