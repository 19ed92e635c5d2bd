//! Migration planning and application.
//!
//! The planner turns accepted change events into an ordered action list;
//! the applier executes the list against the destination connector (or only
//! describes it, in dry-run mode) with bounded concurrency, optional
//! rollback of the current run, and cancellation support.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::{ColumnDefinition, ColumnType, DestinationConnector, TableSchema};
use crate::error::Result;

use super::event::{SchemaChangeEvent, SchemaChangeType};

/// One reversible DDL-equivalent action.
///
/// Drop actions retain the old definition so their inverse can recreate
/// the structure (data is not restored; rollback is structural only).
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationAction {
    CreateTable {
        table: TableSchema,
    },
    AddColumn {
        table_name: String,
        column: ColumnDefinition,
    },
    AlterColumnType {
        table_name: String,
        column_name: String,
        old_type: ColumnType,
        new_type: ColumnType,
    },
    AlterColumnNullability {
        table_name: String,
        column_name: String,
        old_nullable: bool,
        nullable: bool,
    },
    DropColumn {
        table_name: String,
        column: ColumnDefinition,
    },
    DropTable {
        table: TableSchema,
    },
}

impl MigrationAction {
    /// Human-readable description used in results and dry-run output.
    pub fn describe(&self) -> String {
        match self {
            MigrationAction::CreateTable { table } => {
                format!("create table {} ({} columns)", table.name, table.columns.len())
            }
            MigrationAction::AddColumn { table_name, column } => {
                format!(
                    "add column {} ({}) to {}",
                    column.name, column.r#type, table_name
                )
            }
            MigrationAction::AlterColumnType {
                table_name,
                column_name,
                old_type,
                new_type,
            } => format!(
                "alter column {}.{} type {} to {}",
                table_name, column_name, old_type, new_type
            ),
            MigrationAction::AlterColumnNullability {
                table_name,
                column_name,
                nullable,
                ..
            } => {
                if *nullable {
                    format!("drop not null on {}.{}", table_name, column_name)
                } else {
                    format!("set {}.{} not null", table_name, column_name)
                }
            }
            MigrationAction::DropColumn { table_name, column } => {
                format!("drop column {}.{}", table_name, column.name)
            }
            MigrationAction::DropTable { table } => format!("drop table {}", table.name),
        }
    }

    /// The action that undoes this one, where one exists.
    pub fn inverse(&self) -> MigrationAction {
        match self {
            MigrationAction::CreateTable { table } => {
                MigrationAction::DropTable { table: table.clone() }
            }
            MigrationAction::AddColumn { table_name, column } => MigrationAction::DropColumn {
                table_name: table_name.clone(),
                column: column.clone(),
            },
            MigrationAction::AlterColumnType {
                table_name,
                column_name,
                old_type,
                new_type,
            } => MigrationAction::AlterColumnType {
                table_name: table_name.clone(),
                column_name: column_name.clone(),
                old_type: *new_type,
                new_type: *old_type,
            },
            MigrationAction::AlterColumnNullability {
                table_name,
                column_name,
                old_nullable,
                nullable,
            } => MigrationAction::AlterColumnNullability {
                table_name: table_name.clone(),
                column_name: column_name.clone(),
                old_nullable: *nullable,
                nullable: *old_nullable,
            },
            MigrationAction::DropColumn { table_name, column } => MigrationAction::AddColumn {
                table_name: table_name.clone(),
                column: column.clone(),
            },
            MigrationAction::DropTable { table } => {
                MigrationAction::CreateTable { table: table.clone() }
            }
        }
    }

    /// Execution rank: creations first, drops last, to minimize transient
    /// inconsistency.
    fn rank(&self) -> u8 {
        match self {
            MigrationAction::CreateTable { .. } => 0,
            MigrationAction::AddColumn { .. } => 1,
            MigrationAction::AlterColumnType { .. } => 2,
            MigrationAction::AlterColumnNullability { .. } => 3,
            MigrationAction::DropColumn { .. } => 4,
            MigrationAction::DropTable { .. } => 5,
        }
    }
}

/// Turn accepted events into an ordered action list.
///
/// Events whose payload is incomplete (e.g. a type change missing one side)
/// are reported in the error list instead of producing an action.
pub fn plan_actions(events: &[SchemaChangeEvent]) -> (Vec<MigrationAction>, Vec<String>) {
    let mut actions = Vec::with_capacity(events.len());
    let mut errors = Vec::new();

    for event in events {
        match plan_action(event) {
            Some(action) => actions.push(action),
            None => errors.push(format!(
                "cannot plan {} for table '{}': incomplete event payload",
                event.change_type.as_str(),
                event.table_name
            )),
        }
    }

    actions.sort_by_key(|a| a.rank());
    (actions, errors)
}

fn plan_action(event: &SchemaChangeEvent) -> Option<MigrationAction> {
    match event.change_type {
        SchemaChangeType::AddTable => {
            let table = event.new_definition.as_ref()?.as_table()?.clone();
            Some(MigrationAction::CreateTable { table })
        }
        SchemaChangeType::DropTable => {
            let table = event.old_definition.as_ref()?.as_table()?.clone();
            Some(MigrationAction::DropTable { table })
        }
        SchemaChangeType::AddColumn => Some(MigrationAction::AddColumn {
            table_name: event.table_name.clone(),
            column: event.new_column()?.clone(),
        }),
        SchemaChangeType::DropColumn => Some(MigrationAction::DropColumn {
            table_name: event.table_name.clone(),
            column: event.old_column()?.clone(),
        }),
        SchemaChangeType::ModifyColumnType => {
            let old = event.old_column()?;
            let new = event.new_column()?;
            Some(MigrationAction::AlterColumnType {
                table_name: event.table_name.clone(),
                column_name: new.name.clone(),
                old_type: old.r#type,
                new_type: new.r#type,
            })
        }
        SchemaChangeType::ModifyColumnNullability => {
            let old = event.old_column()?;
            let new = event.new_column()?;
            Some(MigrationAction::AlterColumnNullability {
                table_name: event.table_name.clone(),
                column_name: new.name.clone(),
                old_nullable: old.nullable,
                nullable: new.nullable,
            })
        }
    }
}

/// Outcome of one apply run.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Descriptions of actions issued (or planned, in dry-run).
    pub applied_changes: Vec<String>,

    /// Per-action failures and cancellation notes.
    pub errors: Vec<String>,

    /// Rollback/partial-failure observations.
    pub warnings: Vec<String>,

    /// Count of actions that executed successfully.
    pub applied_count: usize,

    /// Whether already-applied actions were rolled back.
    pub rollback_performed: bool,
}

/// Executes migration actions against a destination connector.
pub struct MigrationApplier {
    destination: Arc<dyn DestinationConnector>,
    /// Engine-wide cap on concurrently executing DDL actions.
    ddl_permits: Arc<Semaphore>,
    enable_rollback: bool,
}

impl MigrationApplier {
    /// Create an applier sharing the engine-wide DDL permit pool.
    pub fn new(
        destination: Arc<dyn DestinationConnector>,
        ddl_permits: Arc<Semaphore>,
        enable_rollback: bool,
    ) -> Self {
        Self {
            destination,
            ddl_permits,
            enable_rollback,
        }
    }

    /// Apply an ordered action list for one schema.
    ///
    /// Dry-run mode never touches the destination: each action contributes
    /// a `"DRY RUN: "`-prefixed description and nothing else. In real-apply
    /// mode, actions execute in order; a failure stops the run and, when
    /// rollback is enabled, undoes this run's already-applied actions in
    /// reverse order.
    pub async fn apply(
        &self,
        actions: Vec<MigrationAction>,
        schema_name: &str,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        if dry_run {
            for action in &actions {
                outcome
                    .applied_changes
                    .push(format!("DRY RUN: {}", action.describe()));
            }
            return outcome;
        }

        if actions.is_empty() {
            return outcome;
        }

        if let Err(e) = self
            .execute_guarded(|| self.destination.create_schema_if_not_exists(schema_name))
            .await
        {
            outcome
                .errors
                .push(format!("failed to ensure schema '{}': {}", schema_name, e));
            return outcome;
        }

        let mut applied: Vec<MigrationAction> = Vec::new();
        let mut failed = false;

        for action in actions {
            if cancel.is_cancelled() {
                warn!(schema = schema_name, "Apply phase cancelled");
                outcome
                    .errors
                    .push("evolution cancelled during apply phase".to_string());
                failed = true;
                break;
            }

            let description = action.describe();
            debug!(schema = schema_name, action = %description, "Executing migration action");

            match self.execute_action(schema_name, &action).await {
                Ok(()) => {
                    outcome.applied_changes.push(description);
                    outcome.applied_count += 1;
                    applied.push(action);
                }
                Err(e) => {
                    error!(schema = schema_name, action = %description, error = %e,
                        "Migration action failed");
                    outcome
                        .errors
                        .push(format!("failed to {}: {}", description, e));
                    failed = true;
                    break;
                }
            }
        }

        if failed && !applied.is_empty() {
            if self.enable_rollback {
                let undone = self.rollback(schema_name, &applied).await;
                outcome.rollback_performed = true;
                outcome.warnings.push(format!(
                    "rolled back {} of {} applied actions",
                    undone,
                    applied.len()
                ));
            } else {
                outcome.warnings.push(format!(
                    "{} actions were applied before the failure and were not rolled back",
                    applied.len()
                ));
            }
        }

        outcome
    }

    /// Undo already-applied actions in reverse order. Returns how many
    /// inverses executed successfully; individual rollback failures are
    /// logged and skipped so the rest of the rollback still runs.
    async fn rollback(&self, schema_name: &str, applied: &[MigrationAction]) -> usize {
        warn!(
            schema = schema_name,
            actions = applied.len(),
            "Rolling back applied actions"
        );

        let mut undone = 0;
        for action in applied.iter().rev() {
            let inverse = action.inverse();
            match self.execute_action(schema_name, &inverse).await {
                Ok(()) => {
                    debug!(schema = schema_name, action = %inverse.describe(), "Rolled back");
                    undone += 1;
                }
                Err(e) => {
                    error!(schema = schema_name, action = %inverse.describe(), error = %e,
                        "Rollback action failed");
                }
            }
        }
        undone
    }

    async fn execute_action(&self, schema_name: &str, action: &MigrationAction) -> Result<()> {
        self.execute_guarded(|| async {
            match action {
                MigrationAction::CreateTable { table } => {
                    self.destination
                        .create_table_if_not_exists(schema_name, table)
                        .await
                }
                MigrationAction::AddColumn { table_name, column } => {
                    self.destination
                        .add_column(schema_name, table_name, column)
                        .await
                }
                MigrationAction::AlterColumnType {
                    table_name,
                    column_name,
                    new_type,
                    ..
                } => {
                    self.destination
                        .alter_column_type(schema_name, table_name, column_name, *new_type)
                        .await
                }
                MigrationAction::AlterColumnNullability {
                    table_name,
                    column_name,
                    nullable,
                    ..
                } => {
                    self.destination
                        .alter_column_nullability(schema_name, table_name, column_name, *nullable)
                        .await
                }
                MigrationAction::DropColumn { table_name, column } => {
                    self.destination
                        .drop_column(schema_name, table_name, &column.name)
                        .await
                }
                MigrationAction::DropTable { table } => {
                    self.destination.drop_table(schema_name, &table.name).await
                }
            }
        })
        .await
    }

    /// Run one destination call under the engine-wide DDL permit pool.
    async fn execute_guarded<F, Fut>(&self, call: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        // The pool is only closed on engine shutdown.
        let _permit = self
            .ddl_permits
            .acquire()
            .await
            .map_err(|_| crate::error::WarpError::Cancelled)?;
        call().await
    }
}
