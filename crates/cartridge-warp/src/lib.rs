//! # cartridge-warp
//!
//! Schema evolution engine for streaming replication pipelines.
//!
//! This library detects structural drift between a source database and a
//! cached baseline, classifies each change by risk under a declarative
//! policy, and applies the accepted changes to a destination with:
//!
//! - **Risk tiers** (safe/risky/dangerous) with a strategy gate
//! - **Type widening lattice** for lossless column type upgrades
//! - **Dry-run mode** that describes actions without touching the destination
//! - **Rollback** of a run's already-applied actions on failure
//! - **Schema registry** audit trail with content-hash deduplication
//!
//! ## Example
//!
//! ```rust,no_run
//! use cartridge_warp::{ConnectorRegistry, SchemaEvolutionConfig, SchemaEvolutionEngine};
//!
//! #[tokio::main]
//! async fn main() -> cartridge_warp::Result<()> {
//!     let config = SchemaEvolutionConfig::load("evolution.yaml")?;
//!     let registry = ConnectorRegistry::with_builtins();
//!     let source = registry.create_source("memory")?;
//!     let destination = registry.create_destination("memory")?;
//!
//!     let engine = SchemaEvolutionEngine::new(config, source, destination)?;
//!     engine.start();
//!     let result = engine.evolve_schema("public", false).await?;
//!     println!("{}", result.to_json()?);
//!     engine.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod evolution;
pub mod metrics;
pub mod registry;

// Re-exports for convenient access
pub use config::{EvolutionStrategy, SchemaEvolutionConfig};
pub use connectors::ConnectorRegistry;
pub use core::{
    ColumnDefinition, ColumnType, DatabaseSchema, DestinationConnector, SourceConnector,
    TableSchema,
};
pub use error::{Result, WarpError};
pub use evolution::{
    EvolutionResult, HealthStatus, RiskTier, SchemaChangeEvent, SchemaChangeType,
    SchemaEvolutionEngine,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use registry::{MemorySchemaRegistry, SchemaRegistry, SchemaVersionRecord};
