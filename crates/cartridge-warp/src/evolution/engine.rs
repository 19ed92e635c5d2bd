//! Schema evolution orchestration.
//!
//! The engine owns one detector, one applier, and one metrics struct, and
//! drives the full pipeline for a single call: detect, filter exclusions,
//! classify, gate, plan, apply, record. Calls for the same schema name are
//! serialized; calls for different names run concurrently with the
//! DDL-issuing phase bounded by `max_concurrent_migrations`.
//!
//! `start()` additionally spawns a background monitoring loop that runs
//! `evolve_schema` for every configured `monitored_schemas` entry once per
//! `detection_interval_seconds`; `stop()` cancels the loop and waits for it
//! to exit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{validate, SchemaEvolutionConfig};
use crate::core::{DestinationConnector, SourceConnector};
use crate::error::Result;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::registry::SchemaRegistry;

use super::classify::{classify, is_excluded};
use super::detector::{ChangeDetector, DetectorSchemaStats};
use super::event::{EvolutionResult, RiskTier, SchemaChangeEvent};
use super::migrator::{plan_actions, MigrationApplier};

/// Read-only view returned by [`SchemaEvolutionEngine::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub running: bool,
    pub enabled: bool,
    pub strategy: String,
    pub schemas_monitored: usize,
    pub metrics: MetricsSnapshot,
    pub detector_stats: HashMap<String, DetectorSchemaStats>,
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Orchestrates schema evolution for one source/destination pair.
pub struct SchemaEvolutionEngine {
    inner: Arc<EngineInner>,
    monitor: std::sync::Mutex<Option<MonitorTask>>,
}

struct EngineInner {
    config: SchemaEvolutionConfig,
    detector: ChangeDetector,
    applier: MigrationApplier,
    metrics: Arc<EngineMetrics>,
    registry: Option<Arc<dyn SchemaRegistry>>,
    // One mutex per schema name serializes evolve calls for that name.
    schema_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaEvolutionEngine {
    /// Build an engine after validating the policy. An invalid policy is
    /// rejected here, never silently accepted.
    pub fn new(
        config: SchemaEvolutionConfig,
        source: Arc<dyn SourceConnector>,
        destination: Arc<dyn DestinationConnector>,
    ) -> Result<Self> {
        validate(&config)?;
        let ddl_permits = Arc::new(Semaphore::new(config.max_concurrent_migrations));
        let applier = MigrationApplier::new(destination, ddl_permits, config.enable_rollback);
        Ok(Self {
            inner: Arc::new(EngineInner {
                detector: ChangeDetector::new(source),
                applier,
                metrics: Arc::new(EngineMetrics::new()),
                registry: None,
                schema_locks: Mutex::new(HashMap::new()),
                config,
            }),
            monitor: std::sync::Mutex::new(None),
        })
    }

    /// Attach an audit registry. Registration failures never fail a run;
    /// they are logged and surfaced as warnings. Must be called before
    /// `start()`.
    pub fn with_registry(mut self, registry: Arc<dyn SchemaRegistry>) -> Self {
        // `new` hands out the sole reference, so this succeeds until the
        // monitor task clones the inner state.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.registry = Some(registry);
        }
        self
    }

    /// Mark the engine running and spawn the background monitoring loop.
    ///
    /// Idempotent; a second call while running is a no-op. No task is
    /// spawned when `monitored_schemas` is empty or evolution is disabled.
    pub fn start(&self) {
        if self.inner.metrics.is_running() {
            warn!("Schema evolution engine already running");
            return;
        }
        if !self.inner.config.enabled {
            info!("Schema evolution disabled in configuration");
            return;
        }

        info!(
            strategy = self.inner.config.strategy.as_str(),
            interval = self.inner.config.detection_interval_seconds,
            "Schema evolution engine started"
        );
        self.inner.metrics.set_running(true);

        if self.inner.config.monitored_schemas.is_empty() {
            return;
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move { inner.evolution_loop(loop_cancel).await });
        *self.monitor.lock().unwrap() = Some(MonitorTask { cancel, handle });
    }

    /// Mark the engine stopped, cancel the monitoring loop, and wait for
    /// it to exit. Idempotent.
    pub async fn stop(&self) {
        if !self.inner.metrics.is_running() {
            return;
        }
        self.inner.metrics.set_running(false);

        let task = self.monitor.lock().unwrap().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if task.handle.await.is_err() {
                warn!("Evolution monitor task panicked");
            }
        }
        info!("Schema evolution engine stopped");
    }

    /// Shared counters for this engine instance.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Snapshot of engine state without mutating anything.
    pub async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            running: self.inner.metrics.is_running(),
            enabled: self.inner.config.enabled,
            strategy: self.inner.config.strategy.as_str().to_string(),
            schemas_monitored: self.inner.config.monitored_schemas.len(),
            metrics: self.inner.metrics.snapshot(),
            detector_stats: self.inner.detector.stats().await,
        }
    }

    /// Run one evolution cycle for `schema_name`.
    pub async fn evolve_schema(&self, schema_name: &str, dry_run: bool) -> Result<EvolutionResult> {
        self.inner
            .evolve_schema_with_cancel(schema_name, dry_run, &CancellationToken::new())
            .await
    }

    /// Run one evolution cycle, honoring `cancel` during the apply phase.
    ///
    /// Detection failures propagate as errors with no partial result.
    /// Application failures are converted into `errors` entries on the
    /// returned result instead.
    pub async fn evolve_schema_with_cancel(
        &self,
        schema_name: &str,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<EvolutionResult> {
        self.inner
            .evolve_schema_with_cancel(schema_name, dry_run, cancel)
            .await
    }
}

impl EngineInner {
    /// Background pass: evolve every monitored schema, then sleep until the
    /// next interval or cancellation.
    async fn evolution_loop(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            schemas = self.config.monitored_schemas.len(),
            "Schema evolution monitoring loop started"
        );
        let interval = Duration::from_secs(self.config.detection_interval_seconds);

        loop {
            for schema_name in &self.config.monitored_schemas {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = self
                    .evolve_schema_with_cancel(schema_name, false, &cancel)
                    .await
                {
                    error!(schema = %schema_name, error = %e, "Background evolution failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Schema evolution monitoring loop stopped");
    }

    async fn evolve_schema_with_cancel(
        &self,
        schema_name: &str,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<EvolutionResult> {
        if !self.config.enabled {
            debug!(schema = schema_name, "Schema evolution disabled, skipping");
            return Ok(EvolutionResult::noop());
        }

        let lock = self.schema_lock(schema_name).await;
        let _guard = lock.lock_owned().await;
        let started = Instant::now();

        let raw_events = self.detector.detect(schema_name).await?;
        let events: Vec<SchemaChangeEvent> = raw_events
            .into_iter()
            .filter(|e| !is_excluded(e, &self.config))
            .collect();

        if events.is_empty() {
            debug!(schema = schema_name, "No schema changes detected");
            let mut result = EvolutionResult::noop();
            result.processing_time_seconds = started.elapsed().as_secs_f64();
            return Ok(result);
        }

        let mut accepted: Vec<SchemaChangeEvent> = Vec::new();
        let mut blocked: Vec<SchemaChangeEvent> = Vec::new();
        for mut event in events {
            let classification = classify(&event, &self.config);
            event.risk_tier = classification.tier;
            if classification.blocked {
                blocked.push(event);
            } else {
                accepted.push(event);
            }
        }

        if self.config.metrics_enabled {
            self.metrics
                .record_detected((accepted.len() + blocked.len()) as u64);
            self.metrics.record_blocked(blocked.len() as u64);
        }

        let mut result = EvolutionResult::noop();

        let dangerous_blocked: Vec<&SchemaChangeEvent> = blocked
            .iter()
            .filter(|e| e.risk_tier == RiskTier::Dangerous)
            .collect();
        if !dangerous_blocked.is_empty() {
            // All-or-nothing gate: the run fails safe, applying nothing.
            warn!(
                schema = schema_name,
                count = dangerous_blocked.len(),
                "Dangerous changes blocked, suppressing entire run"
            );
            result.success = false;
            result.errors.push(format!(
                "dangerous changes blocked by {} strategy: {}",
                self.config.strategy.as_str(),
                describe_events(&dangerous_blocked)
            ));
            for event in blocked.iter().filter(|e| e.risk_tier == RiskTier::Risky) {
                result
                    .errors
                    .push(format!("risky change blocked: {}", describe_event(event)));
            }
            result.events = accepted;
            result.processing_time_seconds = started.elapsed().as_secs_f64();
            return Ok(result);
        }

        for event in &blocked {
            result.success = false;
            result
                .errors
                .push(format!("risky change blocked: {}", describe_event(event)));
        }

        let (actions, plan_errors) = plan_actions(&accepted);
        if !plan_errors.is_empty() {
            result.success = false;
            result.errors.extend(plan_errors);
        }

        let outcome = self.applier.apply(actions, schema_name, dry_run, cancel).await;
        if !outcome.errors.is_empty() {
            result.success = false;
            if self.config.metrics_enabled {
                self.metrics.record_failure();
            }
        }
        if !dry_run && self.config.metrics_enabled {
            self.metrics.record_applied(outcome.applied_count as u64);
        }
        result.applied_changes = outcome.applied_changes;
        result.errors.extend(outcome.errors);
        result.warnings.extend(outcome.warnings);
        result.rollback_performed = outcome.rollback_performed;

        if !dry_run && result.success {
            self.register_applied(schema_name, &accepted, &mut result.warnings)
                .await;
        }

        result.events = accepted;
        result.processing_time_seconds = started.elapsed().as_secs_f64();

        info!(
            schema = schema_name,
            events = result.events.len(),
            applied = result.applied_changes.len(),
            blocked = blocked.len(),
            success = result.success,
            dry_run,
            "Evolution cycle complete"
        );
        Ok(result)
    }

    /// Record post-apply table definitions in the audit registry.
    async fn register_applied(
        &self,
        schema_name: &str,
        accepted: &[SchemaChangeEvent],
        warnings: &mut Vec<String>,
    ) {
        let Some(registry) = &self.registry else {
            return;
        };
        let Some(snapshot) = self.detector.cached_schema(schema_name).await else {
            return;
        };

        let mut seen = std::collections::HashSet::new();
        for event in accepted {
            if !seen.insert(event.table_name.clone()) {
                continue;
            }
            // Dropped tables have no current definition to register.
            let Some(table) = snapshot.table(&event.table_name) else {
                continue;
            };
            if let Err(e) = registry
                .register_schema(schema_name, &event.table_name, table, "evolution")
                .await
            {
                warn!(schema = schema_name, table = %event.table_name, error = %e,
                    "Schema registry write failed");
                warnings.push(format!(
                    "failed to register schema version for table '{}': {}",
                    event.table_name, e
                ));
            }
        }
    }

    async fn schema_lock(&self, schema_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.schema_locks.lock().await;
        // Drop entries no evolve call currently holds.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(schema_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

fn describe_event(event: &SchemaChangeEvent) -> String {
    match &event.column_name {
        Some(column) => format!(
            "{} {}.{} ({})",
            event.change_type.as_str(),
            event.table_name,
            column,
            event.risk_tier.as_str()
        ),
        None => format!(
            "{} {} ({})",
            event.change_type.as_str(),
            event.table_name,
            event.risk_tier.as_str()
        ),
    }
}

fn describe_events(events: &[&SchemaChangeEvent]) -> String {
    events
        .iter()
        .map(|e| describe_event(e))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvolutionStrategy;
    use crate::connectors::{MemoryDestination, MemorySource};
    use crate::core::{ColumnDefinition, ColumnType, DatabaseSchema, TableSchema};
    use crate::error::WarpError;

    fn users(columns: Vec<ColumnDefinition>) -> DatabaseSchema {
        DatabaseSchema::new("public", vec![TableSchema::new("users", columns)])
    }

    fn engine(
        config: SchemaEvolutionConfig,
    ) -> (SchemaEvolutionEngine, Arc<MemorySource>, Arc<MemoryDestination>) {
        let source = Arc::new(MemorySource::new());
        let dest = Arc::new(MemoryDestination::new());
        let engine = SchemaEvolutionEngine::new(config, source.clone(), dest.clone()).unwrap();
        (engine, source, dest)
    }

    #[test]
    fn test_invalid_policy_rejected_at_construction() {
        let config = SchemaEvolutionConfig {
            max_concurrent_migrations: 0,
            ..Default::default()
        };
        let source = Arc::new(MemorySource::new());
        let dest = Arc::new(MemoryDestination::new());
        let Err(err) = SchemaEvolutionEngine::new(config, source, dest) else {
            panic!("zero-permit policy must not construct an engine");
        };
        assert!(matches!(err, WarpError::Config(_)));
        assert!(err.to_string().contains("max_concurrent_migrations"));
    }

    #[tokio::test]
    async fn test_disabled_engine_is_noop() {
        let config = SchemaEvolutionConfig {
            enabled: false,
            ..Default::default()
        };
        let (engine, source, _) = engine(config);
        source.set_schema(users(vec![ColumnDefinition::new("id", ColumnType::Integer)]));

        let result = engine.evolve_schema("public", false).await.unwrap();
        assert!(result.success);
        assert!(result.events.is_empty());
        // Detection never ran, so a later first call still baselines.
        assert!(engine.inner.detector.cached_schema("public").await.is_none());
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (engine, _, _) = engine(SchemaEvolutionConfig::default());
        assert!(!engine.health_check().await.running);
        engine.start();
        engine.start();
        assert!(engine.health_check().await.running);
        engine.stop().await;
        engine.stop().await;
        assert!(!engine.health_check().await.running);
    }

    #[tokio::test]
    async fn test_disabled_engine_does_not_start() {
        let config = SchemaEvolutionConfig {
            enabled: false,
            ..Default::default()
        };
        let (engine, _, _) = engine(config);
        engine.start();
        assert!(!engine.health_check().await.running);
    }

    #[tokio::test]
    async fn test_schema_lock_map_prunes_idle_entries() {
        let (engine, source, _) = engine(SchemaEvolutionConfig::default());
        for name in ["alpha", "beta"] {
            source.set_schema(DatabaseSchema::new(
                name,
                vec![TableSchema::new(
                    "users",
                    vec![ColumnDefinition::new("id", ColumnType::Integer)],
                )],
            ));
        }
        engine.evolve_schema("alpha", false).await.unwrap();
        engine.evolve_schema("beta", false).await.unwrap();
        // The next acquisition prunes entries with no outstanding guard.
        engine.evolve_schema("alpha", false).await.unwrap();

        let locks = engine.inner.schema_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("alpha"));
    }

    #[tokio::test]
    async fn test_blocked_risky_still_applies_accepted() {
        let config = SchemaEvolutionConfig {
            strategy: EvolutionStrategy::Conservative,
            ..Default::default()
        };
        let (engine, source, dest) = engine(config);

        let baseline = vec![
            ColumnDefinition::new("id", ColumnType::Integer),
            ColumnDefinition::new("legacy", ColumnType::String),
        ];
        source.set_schema(users(baseline.clone()));
        dest.create_schema_if_not_exists("public").await.unwrap();
        dest.create_table_if_not_exists("public", &TableSchema::new("users", baseline))
            .await
            .unwrap();
        engine.evolve_schema("public", false).await.unwrap();

        // Drop one column (risky, blocked) and add another (safe, accepted).
        source.set_schema(users(vec![
            ColumnDefinition::new("id", ColumnType::Integer),
            ColumnDefinition::new("name", ColumnType::String),
        ]));
        let result = engine.evolve_schema("public", false).await.unwrap();

        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.contains("risky change blocked")));
        assert_eq!(result.events.len(), 1);
        let table = dest.table("public", "users").unwrap();
        assert!(table.column("name").is_some());
        // The blocked drop never reached the destination.
        assert!(table.column("legacy").is_some());

        let snap = engine.metrics().snapshot();
        assert_eq!(snap.total_changes_detected, 2);
        assert_eq!(snap.total_changes_blocked, 1);
        assert_eq!(snap.total_changes_applied, 1);
    }

    #[tokio::test]
    async fn test_dangerous_gate_suppresses_whole_run() {
        let config = SchemaEvolutionConfig {
            strategy: EvolutionStrategy::Conservative,
            ..Default::default()
        };
        let (engine, source, dest) = engine(config);

        source.set_schema(DatabaseSchema::new(
            "public",
            vec![
                TableSchema::new("users", vec![ColumnDefinition::new("id", ColumnType::Integer)]),
                TableSchema::new("orders", vec![ColumnDefinition::new("id", ColumnType::Integer)]),
            ],
        ));
        engine.evolve_schema("public", false).await.unwrap();

        // Drop a whole table (dangerous) and add a safe column in the same cycle.
        source.set_schema(users(vec![
            ColumnDefinition::new("id", ColumnType::Integer),
            ColumnDefinition::new("name", ColumnType::String),
        ]));
        let result = engine.evolve_schema("public", false).await.unwrap();

        assert!(!result.success);
        assert!(result.errors[0].contains("dangerous changes blocked"));
        assert!(result.applied_changes.is_empty());
        // Accepted safe event suppressed together with the dangerous one.
        assert!(dest.table("public", "users").is_none());
        assert_eq!(engine.metrics().snapshot().total_changes_applied, 0);
    }
}
