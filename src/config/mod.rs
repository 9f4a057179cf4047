//! Configuration loading from the process environment.
//!
//! All settings come from environment variables, read once at startup.
//! Before reading them, an environment file is loaded:
//!
//! 1. Path specified via the `--env-file` CLI flag (must exist)
//! 2. Otherwise `.env` in the working directory, if present
//!
//! Variables already set in the environment take precedence over the file.
//!
//! # Variables
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `TABLEAU_SERVER` | yes | |
//! | `TABLEAU_SITE_ID` | no | default site |
//! | `TABLEAU_PAT_NAME` | yes | |
//! | `TABLEAU_PAT_SECRET` | yes | |
//! | `TABLEAU_PROJECT_NAME` | no | `Sales` |
//! | `DEFAULT_FILE_DIRECTORY` | no | downloads folder |
//! | `HYPERD_PATH` | no | `hyperd` |
//! | `LOG_LEVEL` | no | `warn` |

mod settings;

pub use settings::{
    Config, LoggingConfig, ENV_FILE_DIRECTORY, ENV_HYPERD_PATH, ENV_LOG_LEVEL, ENV_PAT_NAME,
    ENV_PAT_SECRET, ENV_PROJECT_NAME, ENV_SERVER, ENV_SITE_ID,
};

use std::path::Path;

use crate::error::ConfigError;

/// Loads the optional environment file, then builds the configuration.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given environment file cannot be loaded
/// - A required variable is missing
/// - A value is invalid
pub fn load_config(env_file: Option<&Path>) -> Result<Config, ConfigError> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            })?;
        }
        None => load_default_env_file(Path::new(DEFAULT_ENV_FILE))?,
    }

    Config::from_lookup(|name| std::env::var(name).ok())
}

/// Environment file loaded when none is given on the command line.
const DEFAULT_ENV_FILE: &str = ".env";

/// Loads `path` if it exists; a file that exists but cannot be read or
/// parsed is an error.
fn load_default_env_file(path: &Path) -> Result<(), ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.env");

        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
        assert!(err.to_string().contains("absent.env"));
    }

    #[test]
    fn absent_default_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        load_default_env_file(&dir.path().join(DEFAULT_ENV_FILE)).unwrap();
    }

    #[test]
    fn malformed_default_env_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_ENV_FILE);
        std::fs::write(&path, "TABLEAU_MCP_UNTERMINATED=\"no closing quote\n").unwrap();

        let err = load_default_env_file(&path).unwrap_err();
        let ConfigError::EnvFile { path: reported, source } = &err else {
            panic!("Expected EnvFile error, got {err:?}");
        };
        assert_eq!(reported, &path);
        assert!(matches!(source, dotenvy::Error::LineParse(..)));
    }
}
