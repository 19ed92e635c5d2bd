//! Configuration type definitions for the schema evolution policy.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Strategy governing which risk tiers are applied automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStrategy {
    /// Apply everything except dangerous changes gated by approval flags.
    Permissive,
    /// Apply safe changes; risky and dangerous require approval flags off.
    Conservative,
    /// Apply only safe changes.
    Strict,
}

impl EvolutionStrategy {
    /// The wire/display name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionStrategy::Permissive => "permissive",
            EvolutionStrategy::Conservative => "conservative",
            EvolutionStrategy::Strict => "strict",
        }
    }
}

/// Declarative policy for one evolution engine.
///
/// Immutable for the duration of one `evolve_schema` call; the caller may
/// swap the policy between calls by constructing a new engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEvolutionConfig {
    /// Enable schema evolution. When false, `evolve_schema` is a no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Evolution strategy.
    #[serde(default = "default_strategy")]
    pub strategy: EvolutionStrategy,

    /// Treat widening type conversions (integer -> bigint) as safe.
    #[serde(default = "default_true")]
    pub enable_type_widening: bool,

    /// Downgrade narrowing/incompatible conversions from dangerous to risky.
    #[serde(default)]
    pub enable_type_narrowing: bool,

    /// Block risky changes unless explicitly approved.
    #[serde(default = "default_true")]
    pub require_approval_for_risky_changes: bool,

    /// Block dangerous changes unless explicitly approved.
    #[serde(default = "default_true")]
    pub require_approval_for_dangerous_changes: bool,

    /// Tables excluded from evolution entirely.
    #[serde(default)]
    pub excluded_tables: HashSet<String>,

    /// Columns excluded from evolution, keyed by table name.
    #[serde(default)]
    pub excluded_columns: HashMap<String, HashSet<String>>,

    /// Maximum migration actions with overlapping destination I/O.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_migrations: usize,

    /// Schema names the background monitor evolves on each pass. Empty
    /// means no background monitoring; `evolve_schema` is on-demand only.
    #[serde(default)]
    pub monitored_schemas: Vec<String>,

    /// Seconds between background monitoring passes.
    #[serde(default = "default_detection_interval")]
    pub detection_interval_seconds: u64,

    /// Roll back already-applied actions when a later action fails.
    #[serde(default = "default_true")]
    pub enable_rollback: bool,

    /// Enable metrics counters.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_strategy() -> EvolutionStrategy {
    EvolutionStrategy::Conservative
}

fn default_max_concurrent() -> usize {
    1
}

fn default_detection_interval() -> u64 {
    30
}

impl Default for SchemaEvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: EvolutionStrategy::Conservative,
            enable_type_widening: true,
            enable_type_narrowing: false,
            require_approval_for_risky_changes: true,
            require_approval_for_dangerous_changes: true,
            excluded_tables: HashSet::new(),
            excluded_columns: HashMap::new(),
            max_concurrent_migrations: 1,
            monitored_schemas: Vec::new(),
            detection_interval_seconds: 30,
            enable_rollback: true,
            metrics_enabled: true,
        }
    }
}

impl SchemaEvolutionConfig {
    /// Check whether a table is excluded from evolution.
    pub fn is_table_excluded(&self, table_name: &str) -> bool {
        self.excluded_tables.contains(table_name)
    }

    /// Check whether a column is excluded from evolution.
    pub fn is_column_excluded(&self, table_name: &str, column_name: &str) -> bool {
        self.excluded_columns
            .get(table_name)
            .map(|cols| cols.contains(column_name))
            .unwrap_or(false)
    }
}
