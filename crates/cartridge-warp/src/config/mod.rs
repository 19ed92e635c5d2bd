//! Evolution policy configuration: types, loading, and validation.

mod types;
mod validation;

pub use types::{EvolutionStrategy, SchemaEvolutionConfig};
pub use validation::validate;

use crate::error::Result;
use std::path::Path;

impl SchemaEvolutionConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SchemaEvolutionConfig = serde_yaml::from_str(content)?;
        validate(&config)?;
        Ok(config)
    }
}
