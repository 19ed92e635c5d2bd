//! Connector implementations and the factory registry.
//!
//! Connectors are resolved through an explicit [`ConnectorRegistry`] built
//! once at process startup and passed by reference to whatever needs to
//! construct connectors. There is no ambient global state and no runtime
//! reflection: factories are plain closures keyed by a string tag.
//!
//! # Adding a connector
//!
//! 1. Implement [`SourceConnector`] and/or [`DestinationConnector`]
//! 2. Register a factory under a tag: `registry.register_source("postgres", ...)`
//! 3. Resolve by tag at startup: `registry.create_source("postgres")?`
//!
//! Unknown tags yield [`WarpError::Unsupported`] so callers can branch
//! without exception-style control flow.

pub mod memory;

pub use memory::{MemoryDestination, MemorySource};

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{DestinationConnector, SourceConnector};
use crate::error::{Result, WarpError};

type SourceFactory = Arc<dyn Fn() -> Arc<dyn SourceConnector> + Send + Sync>;
type DestinationFactory = Arc<dyn Fn() -> Arc<dyn DestinationConnector> + Send + Sync>;

/// Factory registry mapping connector tags to constructors.
///
/// Factories capture their own connection configuration; the registry only
/// resolves tags.
#[derive(Default)]
pub struct ConnectorRegistry {
    sources: HashMap<String, SourceFactory>,
    destinations: HashMap<String, DestinationFactory>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the builtin `memory` connector pair.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_source("memory", || Arc::new(MemorySource::new()));
        registry.register_destination("memory", || Arc::new(MemoryDestination::new()));
        registry
    }

    /// Register a source connector factory under a tag.
    pub fn register_source<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn SourceConnector> + Send + Sync + 'static,
    {
        self.sources.insert(tag.into(), Arc::new(factory));
    }

    /// Register a destination connector factory under a tag.
    pub fn register_destination<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn DestinationConnector> + Send + Sync + 'static,
    {
        self.destinations.insert(tag.into(), Arc::new(factory));
    }

    /// Construct a source connector by tag.
    pub fn create_source(&self, tag: &str) -> Result<Arc<dyn SourceConnector>> {
        self.sources
            .get(tag)
            .map(|factory| factory())
            .ok_or_else(|| WarpError::Unsupported(tag.to_string()))
    }

    /// Construct a destination connector by tag.
    pub fn create_destination(&self, tag: &str) -> Result<Arc<dyn DestinationConnector>> {
        self.destinations
            .get(tag)
            .map(|factory| factory())
            .ok_or_else(|| WarpError::Unsupported(tag.to_string()))
    }

    /// Registered source tags, sorted.
    pub fn source_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.sources.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Registered destination tags, sorted.
    pub fn destination_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.destinations.keys().cloned().collect();
        tags.sort();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_memory_connectors() {
        let registry = ConnectorRegistry::with_builtins();
        let source = registry.create_source("memory").unwrap();
        assert_eq!(source.connector_type(), "memory");
        let dest = registry.create_destination("memory").unwrap();
        assert_eq!(dest.connector_type(), "memory");
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let registry = ConnectorRegistry::with_builtins();
        let Err(err) = registry.create_source("oracle") else {
            panic!("unknown tag must not resolve");
        };
        assert!(matches!(err, WarpError::Unsupported(tag) if tag == "oracle"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ConnectorRegistry::new();
        registry.register_source("custom", || Arc::new(MemorySource::new()));
        assert!(registry.create_source("custom").is_ok());
        assert_eq!(registry.source_tags(), vec!["custom".to_string()]);
        assert!(registry.create_destination("custom").is_err());
    }
}
