//! Schema change detection against a cached baseline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::{DatabaseSchema, SourceConnector, TableSchema};
use crate::error::{Result, WarpError};

use super::event::{SchemaChangeEvent, SchemaChangeType};

/// Per-schema cache statistics, surfaced through `health_check()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSchemaStats {
    /// Tables in the cached snapshot.
    pub cached_tables: usize,

    /// Columns across all cached tables.
    pub total_columns: usize,

    /// When the last successful detection ran.
    pub last_detection: DateTime<Utc>,
}

struct CacheEntry {
    schema: DatabaseSchema,
    last_detection: DateTime<Utc>,
}

/// Detects structural drift between the live source schema and the cached
/// baseline.
///
/// The detector exclusively owns the per-schema-name cache: the first
/// observation of a name establishes the baseline and is never treated as
/// a change, and each successful detection replaces the cache entry with
/// the observed schema (dry-run included; the cache reflects observed
/// reality, not applied state).
///
/// Exclusion filtering is a policy concern and happens downstream in the
/// classifier; the detector reports every structural difference.
pub struct ChangeDetector {
    source: Arc<dyn SourceConnector>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ChangeDetector {
    /// Create a detector reading from the given source.
    pub fn new(source: Arc<dyn SourceConnector>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the current schema, diff it against the cached baseline, and
    /// return the drift as typed events.
    ///
    /// Fetch or consistency failures propagate as detection errors without
    /// mutating the cache.
    pub async fn detect(&self, schema_name: &str) -> Result<Vec<SchemaChangeEvent>> {
        let current = self.source.get_schema(schema_name).await.map_err(|e| match e {
            err @ WarpError::Detection { .. } => err,
            other => WarpError::detection(schema_name, other.to_string()),
        })?;

        if let Err(reason) = current.check_consistency() {
            return Err(WarpError::detection(
                schema_name,
                format!("malformed schema: {}", reason),
            ));
        }

        let mut cache = self.cache.lock().await;
        let events = match cache.get(schema_name) {
            None => {
                info!(
                    schema = schema_name,
                    tables = current.tables.len(),
                    "Caching initial schema"
                );
                Vec::new()
            }
            Some(entry) => {
                let events = diff_schemas(&entry.schema, &current);
                if !events.is_empty() {
                    info!(
                        schema = schema_name,
                        changes = events.len(),
                        "Schema changes detected"
                    );
                } else {
                    debug!(schema = schema_name, "No schema changes detected");
                }
                events
            }
        };

        cache.insert(
            schema_name.to_string(),
            CacheEntry {
                schema: current,
                last_detection: Utc::now(),
            },
        );

        Ok(events)
    }

    /// The cached baseline for a schema name, if one exists.
    pub async fn cached_schema(&self, schema_name: &str) -> Option<DatabaseSchema> {
        self.cache
            .lock()
            .await
            .get(schema_name)
            .map(|entry| entry.schema.clone())
    }

    /// Drop the cached baseline for one schema name, or all of them.
    pub async fn clear_cache(&self, schema_name: Option<&str>) {
        let mut cache = self.cache.lock().await;
        match schema_name {
            Some(name) => {
                cache.remove(name);
            }
            None => cache.clear(),
        }
    }

    /// Cache statistics per schema name.
    pub async fn stats(&self) -> HashMap<String, DetectorSchemaStats> {
        self.cache
            .lock()
            .await
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    DetectorSchemaStats {
                        cached_tables: entry.schema.tables.len(),
                        total_columns: entry.schema.total_columns(),
                        last_detection: entry.last_detection,
                    },
                )
            })
            .collect()
    }
}

/// Diff two schema snapshots into an ordered event list: table-level events
/// first (sorted by table name), then column-level events sorted by table
/// and column. A column that changes both type and nullability yields two
/// separate events.
pub fn diff_schemas(previous: &DatabaseSchema, current: &DatabaseSchema) -> Vec<SchemaChangeEvent> {
    let previous_tables: HashMap<&str, &TableSchema> =
        previous.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let current_tables: HashMap<&str, &TableSchema> =
        current.tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut table_events = Vec::new();

    for table in &current.tables {
        if !previous_tables.contains_key(table.name.as_str()) {
            table_events.push(SchemaChangeEvent::add_table(table.clone()));
        }
    }
    for table in &previous.tables {
        if !current_tables.contains_key(table.name.as_str()) {
            table_events.push(SchemaChangeEvent::drop_table(table.clone()));
        }
    }
    table_events.sort_by(|a, b| a.table_name.cmp(&b.table_name));

    let mut column_events = Vec::new();

    for table in &current.tables {
        let Some(prev_table) = previous_tables.get(table.name.as_str()) else {
            continue;
        };
        column_events.extend(diff_table_columns(prev_table, table));
    }
    column_events.sort_by(|a, b| {
        (a.table_name.as_str(), a.column_name.as_deref(), change_rank(a.change_type)).cmp(&(
            b.table_name.as_str(),
            b.column_name.as_deref(),
            change_rank(b.change_type),
        ))
    });

    table_events.extend(column_events);
    table_events
}

fn diff_table_columns(previous: &TableSchema, current: &TableSchema) -> Vec<SchemaChangeEvent> {
    let mut events = Vec::new();

    for column in &current.columns {
        match previous.column(&column.name) {
            None => events.push(SchemaChangeEvent::add_column(&current.name, column.clone())),
            Some(prev_column) => {
                if prev_column.r#type != column.r#type {
                    events.push(SchemaChangeEvent::modify_column_type(
                        &current.name,
                        prev_column.clone(),
                        column.clone(),
                    ));
                }
                if prev_column.nullable != column.nullable {
                    events.push(SchemaChangeEvent::modify_column_nullability(
                        &current.name,
                        prev_column.clone(),
                        column.clone(),
                    ));
                }
            }
        }
    }

    for column in &previous.columns {
        if current.column(&column.name).is_none() {
            events.push(SchemaChangeEvent::drop_column(&current.name, column.clone()));
        }
    }

    events
}

fn change_rank(change_type: SchemaChangeType) -> u8 {
    match change_type {
        SchemaChangeType::AddTable => 0,
        SchemaChangeType::DropTable => 1,
        SchemaChangeType::AddColumn => 2,
        SchemaChangeType::DropColumn => 3,
        SchemaChangeType::ModifyColumnType => 4,
        SchemaChangeType::ModifyColumnNullability => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MemorySource;
    use crate::core::{ColumnDefinition, ColumnType};

    fn table(name: &str, columns: Vec<ColumnDefinition>) -> TableSchema {
        TableSchema::new(name, columns)
    }

    fn col(name: &str, r#type: ColumnType) -> ColumnDefinition {
        ColumnDefinition::new(name, r#type)
    }

    fn detector_with(schema: DatabaseSchema) -> (ChangeDetector, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new());
        source.set_schema(schema);
        (ChangeDetector::new(source.clone()), source)
    }

    #[tokio::test]
    async fn test_first_observation_yields_no_events() {
        let schema = DatabaseSchema::new(
            "public",
            vec![table("users", vec![col("id", ColumnType::Integer)])],
        );
        let (detector, _source) = detector_with(schema);

        let events = detector.detect("public").await.unwrap();
        assert!(events.is_empty());
        assert!(detector.cached_schema("public").await.is_some());
    }

    #[tokio::test]
    async fn test_add_column_detected() {
        let v1 = DatabaseSchema::new(
            "public",
            vec![table("users", vec![col("id", ColumnType::Integer)])],
        );
        let (detector, source) = detector_with(v1);
        detector.detect("public").await.unwrap();

        let v2 = DatabaseSchema::new(
            "public",
            vec![table(
                "users",
                vec![col("id", ColumnType::Integer), col("name", ColumnType::String)],
            )],
        );
        source.set_schema(v2);

        let events = detector.detect("public").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, SchemaChangeType::AddColumn);
        assert_eq!(events[0].column_name.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn test_table_add_and_drop_detected() {
        let v1 = DatabaseSchema::new(
            "public",
            vec![table("old_stuff", vec![col("id", ColumnType::Integer)])],
        );
        let (detector, source) = detector_with(v1);
        detector.detect("public").await.unwrap();

        let v2 = DatabaseSchema::new(
            "public",
            vec![table("audit_log", vec![col("id", ColumnType::Bigint)])],
        );
        source.set_schema(v2);

        let events = detector.detect("public").await.unwrap();
        assert_eq!(events.len(), 2);
        // Table-level events sorted by table name.
        assert_eq!(events[0].change_type, SchemaChangeType::AddTable);
        assert_eq!(events[0].table_name, "audit_log");
        assert_eq!(events[1].change_type, SchemaChangeType::DropTable);
        assert_eq!(events[1].table_name, "old_stuff");
    }

    #[tokio::test]
    async fn test_type_and_nullability_change_yield_two_events() {
        let v1 = DatabaseSchema::new(
            "public",
            vec![table("users", vec![col("age", ColumnType::Integer)])],
        );
        let (detector, source) = detector_with(v1);
        detector.detect("public").await.unwrap();

        let v2 = DatabaseSchema::new(
            "public",
            vec![table(
                "users",
                vec![col("age", ColumnType::Bigint).with_nullable(false)],
            )],
        );
        source.set_schema(v2);

        let events = detector.detect("public").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].change_type, SchemaChangeType::ModifyColumnType);
        assert_eq!(
            events[1].change_type,
            SchemaChangeType::ModifyColumnNullability
        );
    }

    #[tokio::test]
    async fn test_deterministic_ordering() {
        let v1 = DatabaseSchema::new(
            "public",
            vec![
                table("b_table", vec![col("id", ColumnType::Integer)]),
                table("a_table", vec![col("id", ColumnType::Integer)]),
            ],
        );
        let (detector, source) = detector_with(v1);
        detector.detect("public").await.unwrap();

        let v2 = DatabaseSchema::new(
            "public",
            vec![
                table(
                    "b_table",
                    vec![col("id", ColumnType::Integer), col("z_col", ColumnType::String)],
                ),
                table(
                    "a_table",
                    vec![col("id", ColumnType::Integer), col("m_col", ColumnType::String)],
                ),
                table("new_table", vec![col("id", ColumnType::Integer)]),
            ],
        );
        source.set_schema(v2);

        let events = detector.detect("public").await.unwrap();
        let summary: Vec<(String, Option<String>)> = events
            .iter()
            .map(|e| (e.table_name.clone(), e.column_name.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("new_table".to_string(), None),
                ("a_table".to_string(), Some("m_col".to_string())),
                ("b_table".to_string(), Some("z_col".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_diff_symmetry() {
        let a = DatabaseSchema::new(
            "public",
            vec![table(
                "users",
                vec![col("id", ColumnType::Integer), col("name", ColumnType::String)],
            )],
        );
        let b = DatabaseSchema::new(
            "public",
            vec![table("users", vec![col("id", ColumnType::Integer)])],
        );

        let forward = diff_schemas(&a, &b);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].change_type, SchemaChangeType::DropColumn);

        let backward = diff_schemas(&b, &a);
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].change_type, SchemaChangeType::AddColumn);
        assert_eq!(backward[0].column_name, forward[0].column_name);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_cache_untouched() {
        let v1 = DatabaseSchema::new(
            "public",
            vec![table("users", vec![col("id", ColumnType::Integer)])],
        );
        let (detector, source) = detector_with(v1.clone());
        detector.detect("public").await.unwrap();

        source.fail_next_fetch("source unreachable");
        let err = detector.detect("public").await.unwrap_err();
        assert!(matches!(err, WarpError::Detection { .. }));

        // Baseline still reflects the last successful observation.
        assert_eq!(detector.cached_schema("public").await.unwrap(), v1);
    }

    #[tokio::test]
    async fn test_malformed_schema_is_detection_error() {
        let mut bad_table = table("users", vec![col("id", ColumnType::Integer)]);
        bad_table.primary_keys.push("ghost".to_string());
        let (detector, _source) =
            detector_with(DatabaseSchema::new("public", vec![bad_table]));

        let err = detector.detect("public").await.unwrap_err();
        assert!(err.to_string().contains("malformed schema"));
        assert!(detector.cached_schema("public").await.is_none());
    }

    #[tokio::test]
    async fn test_stats_reflect_cache() {
        let schema = DatabaseSchema::new(
            "public",
            vec![table(
                "users",
                vec![col("id", ColumnType::Integer), col("name", ColumnType::String)],
            )],
        );
        let (detector, _source) = detector_with(schema);
        detector.detect("public").await.unwrap();

        let stats = detector.stats().await;
        let entry = stats.get("public").unwrap();
        assert_eq!(entry.cached_tables, 1);
        assert_eq!(entry.total_columns, 2);
    }
}
