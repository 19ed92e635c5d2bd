//! Schema and record types shared by connectors and the evolution engine.
//!
//! These types provide a database-agnostic representation of schema metadata.
//! All type comparisons happen in the logical [`ColumnType`] space, never in
//! database-native type strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical column types used for schema comparison.
///
/// Connectors map their native types into this closed set; anything they
/// cannot express maps to [`ColumnType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Bigint,
    Float,
    Double,
    Boolean,
    Timestamp,
    Json,
    Array,
    Unknown,
}

impl ColumnType {
    /// The wire/display name of the type (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Bigint => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
            ColumnType::Array => "array",
            ColumnType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a single column.
///
/// Identity is `name` within a table; a table holds at most one definition
/// per name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,

    /// Logical column type.
    pub r#type: ColumnType,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Default value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    /// Create a nullable column with no default.
    pub fn new(name: impl Into<String>, r#type: ColumnType) -> Self {
        Self {
            name: name.into(),
            r#type,
            nullable: true,
            default: None,
        }
    }

    /// Builder-style nullability override.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Schema definition for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Column definitions. Insertion order is irrelevant for comparison but
    /// stable for output.
    pub columns: Vec<ColumnDefinition>,

    /// Primary key column names. Every entry must reference a column.
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    /// Create a table schema without primary keys.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_keys: Vec::new(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check structural invariants: unique column names and primary keys
    /// referencing existing columns.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(format!(
                    "table '{}' has duplicate column '{}'",
                    self.name, col.name
                ));
            }
        }
        for pk in &self.primary_keys {
            if self.column(pk).is_none() {
                return Err(format!(
                    "table '{}' primary key '{}' references no column",
                    self.name, pk
                ));
            }
        }
        Ok(())
    }
}

/// Schema definition for a whole database (one named schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Schema name. Unique within one engine's cache.
    pub name: String,

    /// Tables in the schema.
    pub tables: Vec<TableSchema>,
}

impl DatabaseSchema {
    /// Create a database schema.
    pub fn new(name: impl Into<String>, tables: Vec<TableSchema>) -> Self {
        Self {
            name: name.into(),
            tables,
        }
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Check structural invariants across all tables.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(format!("duplicate table '{}'", table.name));
            }
            table.check_consistency()?;
        }
        Ok(())
    }

    /// Total column count across all tables.
    pub fn total_columns(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}

/// Row-level operation kind for change records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

/// A row-level record produced by a source connector's change stream or
/// full snapshot. Carried at the interface boundary only; the evolution
/// engine does not interpret record payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Table the record belongs to.
    pub table_name: String,

    /// Column values keyed by column name.
    pub data: BTreeMap<String, serde_json::Value>,

    /// Operation that produced the record.
    pub operation: OperationType,

    /// When the operation occurred.
    pub timestamp: DateTime<Utc>,
}

/// A batch of change records plus the position marker to resume from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Records in source order.
    pub records: Vec<Record>,

    /// Opaque source-specific resume position (LSN, timestamp, etc.).
    pub position_marker: Option<serde_json::Value>,
}
