//! Tool table and dispatch.
//!
//! Every tool is a [`ToolName`] variant with a fixed name and input schema.
//! [`ToolRouter::dispatch`] validates arguments, calls the
//! [`DatasetBackend`], and wraps the outcome in a [`ToolResult`] envelope:
//!
//! ```json
//! {"status": "success", "action": "check_dataset", "result": {...}}
//! {"status": "error", "action": "check_dataset", "message": "..."}
//! ```
//!
//! Dispatch never fails; every error becomes an error envelope.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tableau::{DatasetBackend, TableauError};

/// A tool definition as listed by `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
}

/// The tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// Excel workbook to `.hyper`.
    ConvertExcelToHyper,
    /// CSV file to `.hyper`.
    ConvertCsvToHyper,
    /// Publish a file as a datasource.
    UploadDataset,
    /// Look up a datasource by name.
    CheckDataset,
    /// List the datasources of a project.
    ListDatasets,
}

impl ToolName {
    /// Every tool, in listing order.
    pub const ALL: [Self; 5] = [
        Self::ConvertExcelToHyper,
        Self::UploadDataset,
        Self::CheckDataset,
        Self::ListDatasets,
        Self::ConvertCsvToHyper,
    ];

    /// Looks a tool up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Wire name of the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConvertExcelToHyper => "convert_excel_to_hyper",
            Self::ConvertCsvToHyper => "convert_csv_to_hyper",
            Self::UploadDataset => "upload_dataset",
            Self::CheckDataset => "check_dataset",
            Self::ListDatasets => "list_datasets",
        }
    }

    /// Definition advertised by `tools/list`.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        let (description, input_schema) = match self {
            Self::ConvertExcelToHyper => (
                "Convert an Excel workbook (.xlsx, .xls, .xlsm, .xlsb) to a Tableau Hyper \
                 extract. The first worksheet is read and its first row is used as the \
                 header. Relative paths are resolved against the default file directory, \
                 and a missing extension is filled in.",
                json!({
                    "type": "object",
                    "properties": {
                        "excel_file_path": {
                            "type": "string",
                            "description": "Path to the Excel file, e.g. 'sales.xlsx' or 'sales'"
                        },
                        "hyper_file_path": {
                            "type": "string",
                            "description": "Output .hyper path (default: next to the input, same name)"
                        }
                    },
                    "required": ["excel_file_path"]
                }),
            ),
            Self::ConvertCsvToHyper => (
                "Convert a CSV file with a header row to a Tableau Hyper extract.",
                json!({
                    "type": "object",
                    "properties": {
                        "csv_file_path": {
                            "type": "string",
                            "description": "Path to the CSV file"
                        },
                        "hyper_file_path": {
                            "type": "string",
                            "description": "Output .hyper path (default: next to the input, same name)"
                        }
                    },
                    "required": ["csv_file_path"]
                }),
            ),
            Self::UploadDataset => (
                "Publish a file to Tableau Server as a datasource named after the file. \
                 Excel and CSV files are converted to Hyper first. An existing datasource \
                 with the same name in the project is overwritten.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "File to publish (.hyper, .tds, .tdsx, .tde, .xlsx, .xls, .xlsm, .xlsb, .csv)"
                        },
                        "tableau_project": {
                            "type": "string",
                            "description": "Target project (default: configured project)"
                        }
                    },
                    "required": ["file_path"]
                }),
            ),
            Self::CheckDataset => (
                "Check whether a datasource with the given name exists in a Tableau project.",
                json!({
                    "type": "object",
                    "properties": {
                        "dataset_name": {
                            "type": "string",
                            "description": "Exact datasource name"
                        },
                        "tableau_project": {
                            "type": "string",
                            "description": "Project to search (default: configured project)"
                        }
                    },
                    "required": ["dataset_name"]
                }),
            ),
            Self::ListDatasets => (
                "List the datasources published in a Tableau project.",
                json!({
                    "type": "object",
                    "properties": {
                        "tableau_project": {
                            "type": "string",
                            "description": "Project to list (default: configured project)"
                        }
                    },
                    "required": []
                }),
            ),
        };

        ToolDefinition {
            name: self.as_str().to_string(),
            description: Some(description.to_string()),
            input_schema,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while handling a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool has this name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A required argument is absent, null or empty.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// An argument has the wrong type.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Argument name.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The backend operation failed.
    #[error(transparent)]
    Backend(#[from] TableauError),

    /// The backend result could not be turned into JSON.
    #[error("Failed to serialise result: {0}")]
    Serialisation(#[from] serde_json::Error),
}

/// The envelope returned for every tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    /// The operation succeeded.
    Success {
        /// Tool name.
        action: String,
        /// Operation result.
        result: Value,
    },
    /// The operation failed.
    Error {
        /// Tool name as requested.
        action: String,
        /// Error description.
        message: String,
    },
}

impl ToolResult {
    /// Whether this is an error envelope.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Pretty-printed JSON, as placed in the text content block.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(r#"{{"status": "error", "message": "Failed to serialise result: {e}"}}"#)
        })
    }
}

/// View over the `arguments` object of a tool call.
struct Arguments<'a>(Option<&'a Map<String, Value>>);

impl<'a> Arguments<'a> {
    fn new(value: &'a Value) -> Self {
        Self(value.as_object())
    }

    /// A string argument; absent, null and empty all count as missing.
    fn optional(&self, name: &'static str) -> Result<Option<&'a str>, ToolError> {
        match self.0.and_then(|args| args.get(name)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ToolError::InvalidParameter {
                name,
                message: "expected a string".to_string(),
            }),
        }
    }

    fn required(&self, name: &'static str) -> Result<&'a str, ToolError> {
        self.optional(name)?
            .ok_or(ToolError::MissingParameter(name))
    }
}

/// Routes tool calls to a backend.
#[derive(Clone)]
pub struct ToolRouter {
    backend: Arc<dyn DatasetBackend>,
    default_project: String,
}

impl ToolRouter {
    /// Creates a router; `default_project` fills in an omitted
    /// `tableau_project`.
    pub fn new(backend: Arc<dyn DatasetBackend>, default_project: impl Into<String>) -> Self {
        Self {
            backend,
            default_project: default_project.into(),
        }
    }

    /// Definitions of every tool.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        ToolName::ALL.into_iter().map(ToolName::definition).collect()
    }

    /// Runs a tool call and wraps the outcome in an envelope.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> ToolResult {
        let outcome = match ToolName::from_name(name) {
            Some(tool) => self.call(tool, &Arguments::new(arguments)).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        match outcome {
            Ok(result) => {
                debug!(tool = name, "Tool call succeeded");
                ToolResult::Success {
                    action: name.to_string(),
                    result,
                }
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                ToolResult::Error {
                    action: name.to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn call(&self, tool: ToolName, args: &Arguments<'_>) -> Result<Value, ToolError> {
        let backend = self.backend.as_ref();
        let value = match tool {
            ToolName::ConvertExcelToHyper => {
                let input = args.required("excel_file_path")?;
                let output = args.optional("hyper_file_path")?;
                serde_json::to_value(backend.convert_excel_to_hyper(input, output).await?)?
            }
            ToolName::ConvertCsvToHyper => {
                let input = args.required("csv_file_path")?;
                let output = args.optional("hyper_file_path")?;
                serde_json::to_value(backend.convert_csv_to_hyper(input, output).await?)?
            }
            ToolName::UploadDataset => {
                let file_path = args.required("file_path")?;
                let project = self.project(args)?;
                serde_json::to_value(backend.upload_dataset(file_path, project).await?)?
            }
            ToolName::CheckDataset => {
                let dataset_name = args.required("dataset_name")?;
                let project = self.project(args)?;
                serde_json::to_value(backend.check_dataset(dataset_name, project).await?)?
            }
            ToolName::ListDatasets => {
                let project = self.project(args)?;
                serde_json::to_value(backend.list_datasets(project).await?)?
            }
        };
        Ok(value)
    }

    fn project<'a>(&'a self, args: &Arguments<'a>) -> Result<&'a str, ToolError> {
        Ok(args
            .optional("tableau_project")?
            .unwrap_or(&self.default_project))
    }
}
