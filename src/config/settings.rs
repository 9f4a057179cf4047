//! Configuration structures built from environment variables.
//!
//! Every setting maps to one variable; see the constants below for the names.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::ConfigError;

/// Tableau Server URL, including the scheme.
pub const ENV_SERVER: &str = "TABLEAU_SERVER";
/// Site content URL; empty selects the default site.
pub const ENV_SITE_ID: &str = "TABLEAU_SITE_ID";
/// Personal access token name.
pub const ENV_PAT_NAME: &str = "TABLEAU_PAT_NAME";
/// Personal access token secret.
pub const ENV_PAT_SECRET: &str = "TABLEAU_PAT_SECRET";
/// Project used when a tool call does not name one.
pub const ENV_PROJECT_NAME: &str = "TABLEAU_PROJECT_NAME";
/// Directory that relative file paths are resolved against.
pub const ENV_FILE_DIRECTORY: &str = "DEFAULT_FILE_DIRECTORY";
/// Location of the `hyperd` executable.
pub const ENV_HYPERD_PATH: &str = "HYPERD_PATH";
/// Log level (trace, debug, info, warn, error).
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Root configuration structure.
///
/// Built once at startup and shared read-only for the lifetime of the process.
#[derive(Clone)]
pub struct Config {
    /// Tableau Server base URL.
    pub server_url: Url,

    /// Site content URL (empty for the default site).
    pub site_id: String,

    /// Personal access token name.
    pub token_name: String,

    /// Personal access token secret.
    pub token_secret: String,

    /// Project used when a tool call omits `tableau_project`.
    pub default_project_name: String,

    /// Directory relative paths are resolved against.
    pub default_file_directory: PathBuf,

    /// `hyperd` executable used for Hyper conversions.
    pub hyperd_path: PathBuf,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Builds the configuration from a variable lookup function.
    ///
    /// Values are trimmed; an empty value is treated the same as an unset one.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingVariable { name });

        let server_url = parse_server_url(&require(ENV_SERVER)?)?;
        let token_name = require(ENV_PAT_NAME)?;
        let token_secret = require(ENV_PAT_SECRET)?;

        let config = Self {
            server_url,
            site_id: get(ENV_SITE_ID).unwrap_or_default(),
            token_name,
            token_secret,
            default_project_name: get(ENV_PROJECT_NAME).unwrap_or_else(default_project_name),
            default_file_directory: get(ENV_FILE_DIRECTORY)
                .map_or_else(default_file_directory, PathBuf::from),
            hyperd_path: get(ENV_HYPERD_PATH).map_or_else(default_hyperd_path, PathBuf::from),
            logging: LoggingConfig {
                level: get(ENV_LOG_LEVEL).unwrap_or_else(default_log_level),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.server_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidVariable {
                name: ENV_SERVER,
                message: format!(
                    "unsupported scheme '{}', expected http or https",
                    self.server_url.scheme()
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        Ok(())
    }

    /// Returns the server URL without a trailing slash.
    #[must_use]
    pub fn server_base(&self) -> &str {
        self.server_url.as_str().trim_end_matches('/')
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url.as_str())
            .field("site_id", &self.site_id)
            .field("token_name", &self.token_name)
            .field("token_secret", &"<redacted>")
            .field("default_project_name", &self.default_project_name)
            .field("default_file_directory", &self.default_file_directory)
            .field("hyperd_path", &self.hyperd_path)
            .field("logging", &self.logging)
            .finish()
    }
}

fn parse_server_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidVariable {
        name: ENV_SERVER,
        message: match e {
            url::ParseError::RelativeUrlWithoutBase => {
                "URL must include a scheme (http:// or https://)".to_string()
            }
            other => other.to_string(),
        },
    })
}

fn default_project_name() -> String {
    "Sales".to_string()
}

/// Platform downloads folder, falling back to `~/Downloads` and then `.`.
fn default_file_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_hyperd_path() -> PathBuf {
    PathBuf::from("hyperd")
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
