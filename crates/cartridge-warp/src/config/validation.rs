//! Configuration validation.

use super::SchemaEvolutionConfig;
use crate::error::{Result, WarpError};

/// Validate the evolution policy.
///
/// Invalid policy is fatal at construction time; the engine never runs
/// with a silently-corrected configuration.
pub fn validate(config: &SchemaEvolutionConfig) -> Result<()> {
    if config.max_concurrent_migrations < 1 {
        return Err(WarpError::Config(
            "max_concurrent_migrations must be at least 1".into(),
        ));
    }

    if config.detection_interval_seconds < 1 {
        return Err(WarpError::Config(
            "detection_interval_seconds must be at least 1".into(),
        ));
    }

    for schema in &config.monitored_schemas {
        if schema.is_empty() {
            return Err(WarpError::Config(
                "monitored_schemas contains an empty schema name".into(),
            ));
        }
    }

    for table in config.excluded_columns.keys() {
        if table.is_empty() {
            return Err(WarpError::Config(
                "excluded_columns contains an empty table name".into(),
            ));
        }
        // A column exclusion for a fully excluded table can never take effect.
        if config.excluded_tables.contains(table) {
            return Err(WarpError::Config(format!(
                "excluded_columns lists table '{}' which is already in excluded_tables",
                table
            )));
        }
    }

    for table in &config.excluded_tables {
        if table.is_empty() {
            return Err(WarpError::Config(
                "excluded_tables contains an empty table name".into(),
            ));
        }
    }

    Ok(())
}
