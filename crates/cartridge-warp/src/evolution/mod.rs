//! Schema evolution pipeline: detect, classify, plan, apply.

pub mod classify;
pub mod detector;
pub mod engine;
pub mod event;
pub mod migrator;

pub use classify::{classify, is_excluded, is_widening, Classification};
pub use detector::{diff_schemas, ChangeDetector, DetectorSchemaStats};
pub use engine::{HealthStatus, SchemaEvolutionEngine};
pub use event::{
    ChangeDefinition, EvolutionResult, RiskTier, SchemaChangeEvent, SchemaChangeType,
};
pub use migrator::{plan_actions, ApplyOutcome, MigrationAction, MigrationApplier};
