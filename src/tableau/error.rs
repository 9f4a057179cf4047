//! Error types for conversion and Tableau Server operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Tableau operations.
pub type TableauResult<T> = Result<T, TableauError>;

/// Errors that can occur while converting files or talking to Tableau Server.
#[derive(Debug, Error)]
pub enum TableauError {
    /// No file exists at any of the tried locations.
    #[error("File not found: {}", display_paths(.tried))]
    FileNotFound {
        /// Every path that was checked, in order.
        tried: Vec<PathBuf>,
    },

    /// The file extension is not one this server can handle.
    #[error("Unsupported file format '{extension}': {path}. Supported formats: {supported}")]
    UnsupportedFormat {
        /// Path of the rejected file.
        path: PathBuf,
        /// Extension found on the path (empty if none).
        extension: String,
        /// Human-readable list of accepted extensions.
        supported: String,
    },

    /// The input could not be read or the extract could not be written.
    #[error("Conversion failed for {path}: {message}")]
    Conversion {
        /// File being read or written.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Sign-in was rejected or the server could not be reached.
    #[error("Authentication with Tableau Server failed: {message}")]
    Authentication {
        /// Description of what went wrong.
        message: String,
    },

    /// A named project or datasource does not exist on the server.
    #[error("{kind} '{name}' not found on Tableau Server")]
    NotFound {
        /// What was looked up ("Project", "Datasource").
        kind: &'static str,
        /// The name that did not match.
        name: String,
    },

    /// Tableau Server answered with a non-success status.
    #[error("Tableau Server returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error summary and detail from the response body.
        message: String,
    },

    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local file I/O failed.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl TableauError {
    /// Creates a file-not-found error for a single path.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound {
            tried: vec![path.into()],
        }
    }

    /// Creates a conversion error.
    pub fn conversion(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a not-found error for a project.
    pub fn project_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Project",
            name: name.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_not_found_lists_every_tried_path() {
        let err = TableauError::FileNotFound {
            tried: vec![PathBuf::from("/d/report.xlsx"), PathBuf::from("/d/report.xls")],
        };
        assert_eq!(
            err.to_string(),
            "File not found: /d/report.xlsx, /d/report.xls"
        );
    }

    #[test]
    fn project_not_found_display() {
        let err = TableauError::project_not_found("Sales");
        assert_eq!(
            err.to_string(),
            "Project 'Sales' not found on Tableau Server"
        );
    }
}
