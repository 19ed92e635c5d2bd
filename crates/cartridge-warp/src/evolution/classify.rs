//! Risk classification of detected schema changes.
//!
//! Classification is pure: a change event plus the active policy maps to a
//! risk tier and a blocked flag. Exclusion filtering happens first and
//! removes events entirely: excluded changes are invisible, not blocked.

use crate::config::{EvolutionStrategy, SchemaEvolutionConfig};
use crate::core::ColumnType;

use super::event::{RiskTier, SchemaChangeEvent, SchemaChangeType};

/// Outcome of classifying one event under a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Assessed risk tier.
    pub tier: RiskTier,

    /// Whether the strategy gate removes the event from the apply set.
    pub blocked: bool,
}

/// Check whether the policy excludes this event's table or column.
pub fn is_excluded(event: &SchemaChangeEvent, config: &SchemaEvolutionConfig) -> bool {
    if config.is_table_excluded(&event.table_name) {
        return true;
    }
    match &event.column_name {
        Some(column) => config.is_column_excluded(&event.table_name, column),
        None => false,
    }
}

/// Classify a change event under the active policy.
///
/// The caller must filter excluded events first; classification assumes
/// the event is in scope.
pub fn classify(event: &SchemaChangeEvent, config: &SchemaEvolutionConfig) -> Classification {
    let tier = risk_tier(event, config);
    Classification {
        tier,
        blocked: is_blocked(tier, config),
    }
}

fn risk_tier(event: &SchemaChangeEvent, config: &SchemaEvolutionConfig) -> RiskTier {
    match event.change_type {
        SchemaChangeType::AddTable | SchemaChangeType::AddColumn => RiskTier::Safe,
        SchemaChangeType::DropTable => RiskTier::Dangerous,
        SchemaChangeType::DropColumn => RiskTier::Risky,
        SchemaChangeType::ModifyColumnNullability => {
            // Tightening nullable -> NOT NULL can fail on existing rows.
            match (event.old_column(), event.new_column()) {
                (Some(old), Some(new)) if old.nullable && !new.nullable => RiskTier::Risky,
                (Some(_), Some(_)) => RiskTier::Safe,
                _ => RiskTier::Risky,
            }
        }
        SchemaChangeType::ModifyColumnType => {
            match (event.old_column(), event.new_column()) {
                (Some(old), Some(new)) => type_change_tier(old.r#type, new.r#type, config),
                // A type change without both definitions cannot be assessed.
                _ => RiskTier::Dangerous,
            }
        }
    }
}

/// Widening conversions never lose information for any existing value.
pub fn is_widening(old: ColumnType, new: ColumnType) -> bool {
    matches!(
        (old, new),
        (ColumnType::Integer, ColumnType::Bigint)
            | (ColumnType::Integer, ColumnType::Float)
            | (ColumnType::Integer, ColumnType::Double)
            | (ColumnType::Float, ColumnType::Double)
    ) || (new == ColumnType::Json && old != ColumnType::Json)
}

fn type_change_tier(old: ColumnType, new: ColumnType, config: &SchemaEvolutionConfig) -> RiskTier {
    if old == new {
        return RiskTier::Safe;
    }
    if is_widening(old, new) {
        if config.enable_type_widening {
            RiskTier::Safe
        } else {
            RiskTier::Risky
        }
    } else if config.enable_type_narrowing {
        RiskTier::Risky
    } else {
        RiskTier::Dangerous
    }
}

fn is_blocked(tier: RiskTier, config: &SchemaEvolutionConfig) -> bool {
    match config.strategy {
        EvolutionStrategy::Strict => tier != RiskTier::Safe,
        EvolutionStrategy::Conservative => match tier {
            RiskTier::Safe => false,
            RiskTier::Risky => config.require_approval_for_risky_changes,
            RiskTier::Dangerous => config.require_approval_for_dangerous_changes,
        },
        EvolutionStrategy::Permissive => {
            tier == RiskTier::Dangerous && config.require_approval_for_dangerous_changes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDefinition, TableSchema};

    fn config(strategy: EvolutionStrategy) -> SchemaEvolutionConfig {
        SchemaEvolutionConfig {
            strategy,
            ..Default::default()
        }
    }

    fn type_change(old: ColumnType, new: ColumnType) -> SchemaChangeEvent {
        SchemaChangeEvent::modify_column_type(
            "users",
            ColumnDefinition::new("age", old),
            ColumnDefinition::new("age", new),
        )
    }

    #[test]
    fn test_add_table_safe_and_unblocked() {
        let event = SchemaChangeEvent::add_table(TableSchema::new(
            "orders",
            vec![ColumnDefinition::new("id", ColumnType::Integer)],
        ));
        let result = classify(&event, &config(EvolutionStrategy::Conservative));
        assert_eq!(result.tier, RiskTier::Safe);
        assert!(!result.blocked);
    }

    #[test]
    fn test_drop_table_dangerous() {
        let event = SchemaChangeEvent::drop_table(TableSchema::new(
            "orders",
            vec![ColumnDefinition::new("id", ColumnType::Integer)],
        ));
        let result = classify(&event, &config(EvolutionStrategy::Conservative));
        assert_eq!(result.tier, RiskTier::Dangerous);
        assert!(result.blocked);
    }

    #[test]
    fn test_drop_column_risky() {
        let event = SchemaChangeEvent::drop_column(
            "users",
            ColumnDefinition::new("name", ColumnType::String),
        );
        let result = classify(&event, &config(EvolutionStrategy::Conservative));
        assert_eq!(result.tier, RiskTier::Risky);
        assert!(result.blocked);
    }

    #[test]
    fn test_widening_safe_when_enabled() {
        let result = classify(
            &type_change(ColumnType::Integer, ColumnType::Bigint),
            &config(EvolutionStrategy::Conservative),
        );
        assert_eq!(result.tier, RiskTier::Safe);
        assert!(!result.blocked);
    }

    #[test]
    fn test_widening_risky_when_disabled() {
        let mut cfg = config(EvolutionStrategy::Conservative);
        cfg.enable_type_widening = false;
        let result = classify(&type_change(ColumnType::Integer, ColumnType::Bigint), &cfg);
        assert_eq!(result.tier, RiskTier::Risky);
    }

    #[test]
    fn test_narrowing_dangerous_by_default() {
        // string -> integer is a narrowing/incompatible transition.
        let result = classify(
            &type_change(ColumnType::String, ColumnType::Integer),
            &config(EvolutionStrategy::Conservative),
        );
        assert_eq!(result.tier, RiskTier::Dangerous);
        assert!(result.blocked);
    }

    #[test]
    fn test_narrowing_downgraded_to_risky_when_enabled() {
        let mut cfg = config(EvolutionStrategy::Conservative);
        cfg.enable_type_narrowing = true;
        let result = classify(&type_change(ColumnType::Bigint, ColumnType::Integer), &cfg);
        assert_eq!(result.tier, RiskTier::Risky);
    }

    #[test]
    fn test_any_to_json_is_widening() {
        assert!(is_widening(ColumnType::String, ColumnType::Json));
        assert!(is_widening(ColumnType::Array, ColumnType::Json));
        assert!(!is_widening(ColumnType::Json, ColumnType::String));
    }

    #[test]
    fn test_reverse_arrows_not_widening() {
        assert!(!is_widening(ColumnType::Bigint, ColumnType::Integer));
        assert!(!is_widening(ColumnType::Double, ColumnType::Float));
        assert!(!is_widening(ColumnType::Boolean, ColumnType::Integer));
    }

    #[test]
    fn test_nullability_tighten_risky_loosen_safe() {
        let tighten = SchemaChangeEvent::modify_column_nullability(
            "users",
            ColumnDefinition::new("email", ColumnType::String),
            ColumnDefinition::new("email", ColumnType::String).with_nullable(false),
        );
        let loosen = SchemaChangeEvent::modify_column_nullability(
            "users",
            ColumnDefinition::new("email", ColumnType::String).with_nullable(false),
            ColumnDefinition::new("email", ColumnType::String),
        );
        let cfg = config(EvolutionStrategy::Conservative);
        assert_eq!(classify(&tighten, &cfg).tier, RiskTier::Risky);
        assert_eq!(classify(&loosen, &cfg).tier, RiskTier::Safe);
    }

    #[test]
    fn test_strict_blocks_everything_except_safe() {
        let cfg = config(EvolutionStrategy::Strict);
        let risky = SchemaChangeEvent::drop_column(
            "users",
            ColumnDefinition::new("name", ColumnType::String),
        );
        assert!(classify(&risky, &cfg).blocked);

        let safe = SchemaChangeEvent::add_column(
            "users",
            ColumnDefinition::new("name", ColumnType::String),
        );
        assert!(!classify(&safe, &cfg).blocked);
    }

    #[test]
    fn test_permissive_allows_risky() {
        let cfg = config(EvolutionStrategy::Permissive);
        let risky = SchemaChangeEvent::drop_column(
            "users",
            ColumnDefinition::new("name", ColumnType::String),
        );
        assert!(!classify(&risky, &cfg).blocked);

        let dangerous = SchemaChangeEvent::drop_table(TableSchema::new(
            "users",
            vec![ColumnDefinition::new("id", ColumnType::Integer)],
        ));
        assert!(classify(&dangerous, &cfg).blocked);
    }

    #[test]
    fn test_approval_flag_false_auto_approves_tier() {
        let mut cfg = config(EvolutionStrategy::Conservative);
        cfg.require_approval_for_risky_changes = false;
        let risky = SchemaChangeEvent::drop_column(
            "users",
            ColumnDefinition::new("name", ColumnType::String),
        );
        assert!(!classify(&risky, &cfg).blocked);

        cfg.require_approval_for_dangerous_changes = false;
        let dangerous = SchemaChangeEvent::drop_table(TableSchema::new(
            "users",
            vec![ColumnDefinition::new("id", ColumnType::Integer)],
        ));
        assert!(!classify(&dangerous, &cfg).blocked);
    }

    #[test]
    fn test_excluded_table_and_column() {
        let mut cfg = config(EvolutionStrategy::Conservative);
        cfg.excluded_tables.insert("temp_data".to_string());
        cfg.excluded_columns.insert(
            "users".to_string(),
            std::collections::HashSet::from(["internal_notes".to_string()]),
        );

        let table_event = SchemaChangeEvent::add_column(
            "temp_data",
            ColumnDefinition::new("x", ColumnType::String),
        );
        assert!(is_excluded(&table_event, &cfg));

        let column_event = SchemaChangeEvent::add_column(
            "users",
            ColumnDefinition::new("internal_notes", ColumnType::String),
        );
        assert!(is_excluded(&column_event, &cfg));

        let visible = SchemaChangeEvent::add_column(
            "users",
            ColumnDefinition::new("name", ColumnType::String),
        );
        assert!(!is_excluded(&visible, &cfg));
    }
}
