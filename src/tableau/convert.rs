//! Spreadsheet and CSV conversion to Hyper extracts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::tableau::error::TableauResult;
use crate::tableau::hyper::ExtractWriter;
use crate::tableau::paths::{find_spreadsheet_file, hyper_path_for, resolve_path};
use crate::tableau::reader::{read_csv, read_workbook};
use crate::tableau::table::Table;

/// Outcome of a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    /// The file that was read.
    pub input_file: PathBuf,
    /// The extract that was written.
    pub output_file: PathBuf,
    /// Number of data rows.
    pub rows: usize,
    /// Number of columns.
    pub columns: usize,
    /// Column names, in order.
    pub column_names: Vec<String>,
}

/// Converts local files to Hyper extracts.
#[derive(Clone)]
pub struct Converter {
    default_dir: PathBuf,
    writer: Arc<dyn ExtractWriter>,
}

impl Converter {
    /// Creates a converter resolving relative paths against `default_dir`.
    pub fn new(default_dir: impl Into<PathBuf>, writer: Arc<dyn ExtractWriter>) -> Self {
        Self {
            default_dir: default_dir.into(),
            writer,
        }
    }

    /// Directory relative paths are resolved against.
    #[must_use]
    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    /// Converts an Excel workbook to a Hyper extract.
    ///
    /// The workbook is located with [`find_spreadsheet_file`], so the
    /// extension may be omitted. Without `output`, the extract is written next
    /// to the workbook with a `.hyper` extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the workbook cannot be found or read, or the
    /// extract cannot be written.
    pub async fn convert_spreadsheet(
        &self,
        excel_path: &str,
        output: Option<&str>,
    ) -> TableauResult<ConversionSummary> {
        info!(input = excel_path, "Starting Excel to Hyper conversion");
        let input = find_spreadsheet_file(excel_path, &self.default_dir)?;
        let table = read_workbook(&input)?;
        self.write(input, output, table).await
    }

    /// Converts a CSV file to a Hyper extract.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or the extract
    /// cannot be written.
    pub async fn convert_csv(
        &self,
        csv_path: &str,
        output: Option<&str>,
    ) -> TableauResult<ConversionSummary> {
        info!(input = csv_path, "Starting CSV to Hyper conversion");
        let input = resolve_path(csv_path, &self.default_dir);
        let table = read_csv(&input)?;
        self.write(input, output, table).await
    }

    async fn write(
        &self,
        input: PathBuf,
        output: Option<&str>,
        table: Table,
    ) -> TableauResult<ConversionSummary> {
        let output_file = output.map_or_else(
            || hyper_path_for(&input),
            |path| resolve_path(path, &self.default_dir),
        );
        info!(
            input = %input.display(),
            output = %output_file.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Converting to Hyper format"
        );

        self.writer.write_extract(&table, &output_file).await?;

        Ok(ConversionSummary {
            input_file: input,
            output_file,
            rows: table.row_count(),
            columns: table.column_count(),
            column_names: table.column_names(),
        })
    }
}
