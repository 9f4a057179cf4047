//! Readers turning spreadsheets and CSV files into a [`Table`].
//!
//! Both readers treat the first row as the header row.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use crate::tableau::error::{TableauError, TableauResult};
use crate::tableau::table::{Cell, Table};

/// Largest float that converts to `i64` without loss of integrality.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Reads the first worksheet of an Excel workbook.
///
/// Whole-number floats are stored as integers, matching how spreadsheet
/// numbers are usually meant.
///
/// # Errors
///
/// Returns [`TableauError::Conversion`] if the workbook cannot be opened or
/// has no worksheet.
pub fn read_workbook(path: &Path) -> TableauResult<Table> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| TableauError::conversion(path, format!("cannot open workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TableauError::conversion(path, "workbook has no worksheets"))?
        .map_err(|e| TableauError::conversion(path, format!("cannot read worksheet: {e}")))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|header| {
            header
                .iter()
                .map(|cell| data_to_cell(cell).to_text().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    let data: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(data_to_cell).collect())
        .collect();

    debug!(
        path = %path.display(),
        rows = data.len(),
        "Read worksheet"
    );
    Ok(Table::from_rows(headers, data))
}

/// Reads a comma-separated file with a header row.
///
/// Fields are parsed as integer, float or boolean where possible; empty
/// fields are null and everything else is text.
///
/// # Errors
///
/// Returns [`TableauError::FileNotFound`] if the file is missing and
/// [`TableauError::Conversion`] if it is not valid CSV.
pub fn read_csv(path: &Path) -> TableauResult<Table> {
    if !path.exists() {
        return Err(TableauError::file_not_found(path));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| TableauError::conversion(path, format!("cannot open CSV: {e}")))?;

    let headers = reader
        .headers()
        .map_err(|e| TableauError::conversion(path, format!("cannot read CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut data = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| TableauError::conversion(path, format!("malformed CSV record: {e}")))?;
        data.push(record.iter().map(parse_field).collect());
    }

    debug!(
        path = %path.display(),
        rows = data.len(),
        "Read CSV file"
    );
    Ok(Table::from_rows(headers, data))
}

#[allow(clippy::cast_possible_truncation)] // guarded by the MAX_EXACT_INT bound
fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::Int(v) => Cell::Int(*v),
        Data::Float(v) if v.fract() == 0.0 && v.abs() <= MAX_EXACT_INT => Cell::Int(*v as i64),
        Data::Float(v) => Cell::Float(*v),
        Data::Bool(v) => Cell::Bool(*v),
        Data::String(v) if v.is_empty() => Cell::Null,
        Data::String(v) | Data::DateTimeIso(v) | Data::DurationIso(v) => Cell::Text(v.clone()),
        Data::DateTime(v) => v
            .as_datetime()
            .map_or_else(|| Cell::Float(v.as_f64()), Cell::DateTime),
        Data::Error(e) => Cell::Text(format!("#{e:?}")),
    }
}

fn parse_field(field: &str) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Cell::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Cell::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return Cell::Float(v);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Cell::Bool(true),
        "false" => Cell::Bool(false),
        _ => Cell::Text(field.to_string()),
    }
}
