//! Schema change events and evolution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ColumnDefinition, TableSchema};
use crate::error::Result;

/// Types of structural change the detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaChangeType {
    AddTable,
    DropTable,
    AddColumn,
    DropColumn,
    ModifyColumnType,
    ModifyColumnNullability,
}

impl SchemaChangeType {
    /// The wire/display name of the change type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaChangeType::AddTable => "add_table",
            SchemaChangeType::DropTable => "drop_table",
            SchemaChangeType::AddColumn => "add_column",
            SchemaChangeType::DropColumn => "drop_column",
            SchemaChangeType::ModifyColumnType => "modify_column_type",
            SchemaChangeType::ModifyColumnNullability => "modify_column_nullability",
        }
    }
}

/// Classification of a change's potential for data loss or breakage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Risky,
    Dangerous,
}

impl RiskTier {
    /// The wire/display name of the risk tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Risky => "risky",
            RiskTier::Dangerous => "dangerous",
        }
    }
}

/// The structure a change event refers to: a whole table for table-level
/// events, a single column for column-level events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeDefinition {
    Table(TableSchema),
    Column(ColumnDefinition),
}

impl ChangeDefinition {
    /// The column definition, if this is a column-level payload.
    pub fn as_column(&self) -> Option<&ColumnDefinition> {
        match self {
            ChangeDefinition::Column(col) => Some(col),
            ChangeDefinition::Table(_) => None,
        }
    }

    /// The table definition, if this is a table-level payload.
    pub fn as_table(&self) -> Option<&TableSchema> {
        match self {
            ChangeDefinition::Table(table) => Some(table),
            ChangeDefinition::Column(_) => None,
        }
    }
}

/// A single detected schema change.
///
/// Column-level events always carry `column_name`; table-level events carry
/// `column_name = None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChangeEvent {
    /// Kind of structural change.
    pub change_type: SchemaChangeType,

    /// Table the change applies to.
    pub table_name: String,

    /// Column the change applies to, for column-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,

    /// Definition before the change (drops and modifications).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_definition: Option<ChangeDefinition>,

    /// Definition after the change (additions and modifications).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_definition: Option<ChangeDefinition>,

    /// Risk tier assigned by the classifier. Defaults to safe until
    /// classification runs.
    pub risk_tier: RiskTier,

    /// When the change was detected.
    pub detected_at: DateTime<Utc>,
}

impl SchemaChangeEvent {
    fn table_level(
        change_type: SchemaChangeType,
        table: TableSchema,
        is_drop: bool,
    ) -> Self {
        let definition = ChangeDefinition::Table(table.clone());
        Self {
            change_type,
            table_name: table.name,
            column_name: None,
            old_definition: is_drop.then(|| definition.clone()),
            new_definition: (!is_drop).then_some(definition),
            risk_tier: RiskTier::Safe,
            detected_at: Utc::now(),
        }
    }

    /// A table newly present in the source.
    pub fn add_table(table: TableSchema) -> Self {
        Self::table_level(SchemaChangeType::AddTable, table, false)
    }

    /// A table no longer present in the source.
    pub fn drop_table(table: TableSchema) -> Self {
        Self::table_level(SchemaChangeType::DropTable, table, true)
    }

    /// A column newly present in an existing table.
    pub fn add_column(table_name: impl Into<String>, column: ColumnDefinition) -> Self {
        Self {
            change_type: SchemaChangeType::AddColumn,
            table_name: table_name.into(),
            column_name: Some(column.name.clone()),
            old_definition: None,
            new_definition: Some(ChangeDefinition::Column(column)),
            risk_tier: RiskTier::Safe,
            detected_at: Utc::now(),
        }
    }

    /// A column no longer present in an existing table.
    pub fn drop_column(table_name: impl Into<String>, column: ColumnDefinition) -> Self {
        Self {
            change_type: SchemaChangeType::DropColumn,
            table_name: table_name.into(),
            column_name: Some(column.name.clone()),
            old_definition: Some(ChangeDefinition::Column(column)),
            new_definition: None,
            risk_tier: RiskTier::Safe,
            detected_at: Utc::now(),
        }
    }

    /// A column whose logical type changed.
    pub fn modify_column_type(
        table_name: impl Into<String>,
        old: ColumnDefinition,
        new: ColumnDefinition,
    ) -> Self {
        Self {
            change_type: SchemaChangeType::ModifyColumnType,
            table_name: table_name.into(),
            column_name: Some(new.name.clone()),
            old_definition: Some(ChangeDefinition::Column(old)),
            new_definition: Some(ChangeDefinition::Column(new)),
            risk_tier: RiskTier::Safe,
            detected_at: Utc::now(),
        }
    }

    /// A column whose nullability changed.
    pub fn modify_column_nullability(
        table_name: impl Into<String>,
        old: ColumnDefinition,
        new: ColumnDefinition,
    ) -> Self {
        Self {
            change_type: SchemaChangeType::ModifyColumnNullability,
            table_name: table_name.into(),
            column_name: Some(new.name.clone()),
            old_definition: Some(ChangeDefinition::Column(old)),
            new_definition: Some(ChangeDefinition::Column(new)),
            risk_tier: RiskTier::Safe,
            detected_at: Utc::now(),
        }
    }

    /// The old column definition, when present.
    pub fn old_column(&self) -> Option<&ColumnDefinition> {
        self.old_definition.as_ref().and_then(|d| d.as_column())
    }

    /// The new column definition, when present.
    pub fn new_column(&self) -> Option<&ColumnDefinition> {
        self.new_definition.as_ref().and_then(|d| d.as_column())
    }
}

/// Result of one `evolve_schema` call. Created fresh per call, never
/// mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Whether the run fully applied with nothing blocked or failed.
    pub success: bool,

    /// Events accepted by the policy (post-exclusion, post-gate).
    pub events: Vec<SchemaChangeEvent>,

    /// Human-readable descriptions of applied actions; prefixed with
    /// "DRY RUN: " when dry_run was requested.
    pub applied_changes: Vec<String>,

    /// Non-fatal observations (filtered changes, rollback notes).
    pub warnings: Vec<String>,

    /// Blocked-change explanations and application failures.
    pub errors: Vec<String>,

    /// Whether already-applied actions were rolled back in this run.
    pub rollback_performed: bool,

    /// Wall-clock duration of the call.
    pub processing_time_seconds: f64,
}

impl EvolutionResult {
    /// An empty successful result (no changes detected, or engine disabled).
    pub fn noop() -> Self {
        Self {
            success: true,
            events: Vec::new(),
            applied_changes: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            rollback_performed: false,
            processing_time_seconds: 0.0,
        }
    }

    /// Convert to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
