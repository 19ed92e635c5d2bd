//! Error types for the schema evolution library.

use thiserror::Error;

/// Main error type for schema evolution operations.
#[derive(Error, Debug)]
pub enum WarpError {
    /// Configuration error (invalid policy, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema detection failed (source unreachable or malformed schema)
    #[error("Schema detection failed for '{schema}': {message}")]
    Detection { schema: String, message: String },

    /// A migration action failed against the destination
    #[error("Migration failed for {table}: {message}")]
    Application { table: String, message: String },

    /// Connector tag not registered with the factory
    #[error("Unsupported connector type '{0}'")]
    Unsupported(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Evolution run was cancelled
    #[error("Evolution cancelled")]
    Cancelled,
}

impl WarpError {
    /// Create a Detection error with schema context.
    pub fn detection(schema: impl Into<String>, message: impl Into<String>) -> Self {
        WarpError::Detection {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// Create an Application error for a specific table.
    pub fn application(table: impl Into<String>, message: impl Into<String>) -> Self {
        WarpError::Application {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for schema evolution operations.
pub type Result<T> = std::result::Result<T, WarpError>;
