//! Error types for tableau-mcp startup.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Variants that refer to the personal access token only ever name the
//! environment variable, never its value.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested `.env` file could not be loaded.
    #[error("failed to load environment file: {path}")]
    EnvFile {
        /// Path to the environment file.
        path: PathBuf,
        /// The underlying dotenv error.
        #[source]
        source: dotenvy::Error,
    },

    /// A required environment variable is unset or empty.
    #[error("missing required environment variable: {name}")]
    MissingVariable {
        /// Name of the environment variable.
        name: &'static str,
    },

    /// An environment variable holds a value that cannot be used.
    #[error("invalid value for {name}: {message}")]
    InvalidVariable {
        /// Name of the environment variable.
        name: &'static str,
        /// Description of what's wrong.
        message: String,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_display() {
        let error = ConfigError::MissingVariable {
            name: "TABLEAU_PAT_SECRET",
        };
        let msg = error.to_string();
        assert!(msg.contains("missing"));
        assert!(msg.contains("TABLEAU_PAT_SECRET"));
    }

    #[test]
    fn invalid_variable_display() {
        let error = ConfigError::InvalidVariable {
            name: "TABLEAU_SERVER",
            message: "URL must include a scheme".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid value for TABLEAU_SERVER: URL must include a scheme"
        );
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }
}
