//! The operations the tool router calls.
//!
//! [`DatasetBackend`] is the seam between MCP handling and the outside
//! world; [`TableauBackend`] is the production implementation talking to a
//! real Tableau Server and `hyperd`.

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::tableau::client::{TableauClient, PUBLISHABLE_EXTENSIONS};
use crate::tableau::convert::{ConversionSummary, Converter};
use crate::tableau::datasources::{self, DatasetCheck, DatasetListing, PublishedDataset};
use crate::tableau::error::{TableauError, TableauResult};
use crate::tableau::paths::{extension_of, find_upload_file, SPREADSHEET_EXTENSIONS};

/// Operations exposed as MCP tools.
#[async_trait]
pub trait DatasetBackend: Send + Sync {
    /// Converts an Excel workbook to a Hyper extract.
    async fn convert_excel_to_hyper(
        &self,
        excel_file_path: &str,
        hyper_file_path: Option<&str>,
    ) -> TableauResult<ConversionSummary>;

    /// Converts a CSV file to a Hyper extract.
    async fn convert_csv_to_hyper(
        &self,
        csv_file_path: &str,
        hyper_file_path: Option<&str>,
    ) -> TableauResult<ConversionSummary>;

    /// Publishes a file to a project, overwriting a same-named datasource.
    async fn upload_dataset(&self, file_path: &str, project: &str)
        -> TableauResult<PublishedDataset>;

    /// Checks whether a datasource exists in a project.
    async fn check_dataset(&self, dataset_name: &str, project: &str)
        -> TableauResult<DatasetCheck>;

    /// Lists the datasources of a project.
    async fn list_datasets(&self, project: &str) -> TableauResult<DatasetListing>;
}

/// Backend for a live Tableau Server.
///
/// Every remote operation signs in, does its work, and signs out again.
#[derive(Clone)]
pub struct TableauBackend {
    client: TableauClient,
    converter: Converter,
}

impl TableauBackend {
    /// Creates a backend for the configured server, converting through
    /// `converter`.
    #[must_use]
    pub fn new(config: &Config, converter: Converter) -> Self {
        Self {
            client: TableauClient::new(config),
            converter,
        }
    }
}

fn upload_formats() -> String {
    PUBLISHABLE_EXTENSIONS
        .iter()
        .chain(SPREADSHEET_EXTENSIONS.iter())
        .chain(std::iter::once(&"csv"))
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl DatasetBackend for TableauBackend {
    async fn convert_excel_to_hyper(
        &self,
        excel_file_path: &str,
        hyper_file_path: Option<&str>,
    ) -> TableauResult<ConversionSummary> {
        self.converter
            .convert_spreadsheet(excel_file_path, hyper_file_path)
            .await
    }

    async fn convert_csv_to_hyper(
        &self,
        csv_file_path: &str,
        hyper_file_path: Option<&str>,
    ) -> TableauResult<ConversionSummary> {
        self.converter.convert_csv(csv_file_path, hyper_file_path).await
    }

    async fn upload_dataset(
        &self,
        file_path: &str,
        project: &str,
    ) -> TableauResult<PublishedDataset> {
        let path = find_upload_file(file_path, self.converter.default_dir())?;
        let extension = extension_of(&path);

        // Spreadsheets and CSV files are published as Hyper extracts.
        let conversion = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            let input = path.to_string_lossy();
            Some(self.converter.convert_spreadsheet(&input, None).await?)
        } else if extension == "csv" {
            let input = path.to_string_lossy();
            Some(self.converter.convert_csv(&input, None).await?)
        } else if PUBLISHABLE_EXTENSIONS.contains(&extension.as_str()) {
            None
        } else {
            return Err(TableauError::UnsupportedFormat {
                path,
                extension,
                supported: upload_formats(),
            });
        };
        let publish_path = conversion
            .as_ref()
            .map_or_else(|| path.clone(), |summary| summary.output_file.clone());

        info!(
            file = %publish_path.display(),
            project,
            converted = conversion.is_some(),
            "Uploading dataset"
        );
        let session = self.client.connect().await?;
        let outcome = datasources::publish(&session, &publish_path, project).await;
        session.sign_out().await;

        let mut published = outcome?;
        published.conversion = conversion;
        Ok(published)
    }

    async fn check_dataset(
        &self,
        dataset_name: &str,
        project: &str,
    ) -> TableauResult<DatasetCheck> {
        let session = self.client.connect().await?;
        let outcome = datasources::check_dataset(&session, dataset_name, project).await;
        session.sign_out().await;
        outcome
    }

    async fn list_datasets(&self, project: &str) -> TableauResult<DatasetListing> {
        let session = self.client.connect().await?;
        let outcome = datasources::list_datasets(&session, project).await;
        session.sign_out().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::tableau::hyper::ExtractWriter;
    use crate::tableau::table::Table;

    struct NoopWriter;

    #[async_trait]
    impl ExtractWriter for NoopWriter {
        async fn write_extract(&self, _table: &Table, _path: &Path) -> TableauResult<()> {
            Ok(())
        }
    }

    fn backend(dir: &Path) -> TableauBackend {
        let dir = dir.to_string_lossy().into_owned();
        let config = Config::from_lookup(move |key| match key {
            "TABLEAU_SERVER" => Some("http://127.0.0.1:9".to_string()),
            "TABLEAU_PAT_NAME" => Some("mcp-token".to_string()),
            "TABLEAU_PAT_SECRET" => Some("s3cr3t".to_string()),
            "DEFAULT_FILE_DIRECTORY" => Some(dir.clone()),
            _ => None,
        })
        .unwrap();
        let converter = Converter::new(&config.default_file_directory, Arc::new(NoopWriter));
        TableauBackend::new(&config, converter)
    }

    #[tokio::test]
    async fn upload_rejects_unknown_extension_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let err = backend(dir.path())
            .upload_dataset("notes.txt", "Sales")
            .await
            .unwrap_err();
        let TableauError::UnsupportedFormat { extension, supported, .. } = &err else {
            panic!("Expected UnsupportedFormat, got {err:?}");
        };
        assert_eq!(extension, "txt");
        assert!(supported.contains(".hyper"));
        assert!(supported.contains(".csv"));
    }

    #[tokio::test]
    async fn upload_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend(dir.path())
            .upload_dataset("absent", "Sales")
            .await
            .unwrap_err();
        assert!(matches!(err, TableauError::FileNotFound { ref tried } if tried.len() == 6));
    }

    #[test]
    fn upload_formats_lists_everything() {
        assert_eq!(
            upload_formats(),
            ".hyper, .tds, .tdsx, .tde, .xlsx, .xls, .xlsm, .xlsb, .csv"
        );
    }
}
