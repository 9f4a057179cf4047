//! In-memory tabular data passed from the readers to the extract writer.

use chrono::NaiveDateTime;
use serde::Serialize;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Empty cell.
    Null,
    /// Whole number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Date and time without a zone.
    DateTime(NaiveDateTime),
    /// Anything else, as text.
    Text(String),
}

impl Cell {
    /// Renders the cell as text, for columns that fall back to `TEXT`.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
            Self::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S").to_string()),
            Self::Text(v) => Some(v.clone()),
        }
    }
}

/// Column type of an extract table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit integer.
    BigInt,
    /// Double precision float.
    Double,
    /// Boolean.
    Bool,
    /// Timestamp without time zone.
    Timestamp,
    /// Text.
    Text,
}

impl ColumnType {
    /// Infers the narrowest type that holds every non-null cell.
    ///
    /// Integers widen to doubles when mixed with floats; any other mix, and
    /// an all-null column, becomes text.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Self {
        let mut inferred: Option<Self> = None;
        for cell in cells {
            let kind = match cell {
                Cell::Null => continue,
                Cell::Int(_) => Self::BigInt,
                Cell::Float(_) => Self::Double,
                Cell::Bool(_) => Self::Bool,
                Cell::DateTime(_) => Self::Timestamp,
                Cell::Text(_) => return Self::Text,
            };
            inferred = Some(match (inferred, kind) {
                (None, kind) => kind,
                (Some(current), kind) if current == kind => current,
                (Some(Self::BigInt | Self::Double), Self::BigInt | Self::Double) => Self::Double,
                _ => return Self::Text,
            });
        }
        inferred.unwrap_or(Self::Text)
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name as shown in Tableau.
    pub name: String,
    /// Column type.
    pub kind: ColumnType,
}

/// A table read from a spreadsheet or CSV file.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Columns, in source order.
    pub columns: Vec<Column>,
    /// Rows; each row has exactly one cell per column.
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds a table from a header row and data rows.
    ///
    /// Headers are normalised (blank headers become `Unnamed: <index>`,
    /// duplicates get a `.1`, `.2`... suffix), rows are padded or truncated
    /// to the header width, and column types are inferred from the data.
    #[must_use]
    pub fn from_rows(headers: Vec<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let names = normalise_headers(headers);
        let width = names.len();

        for row in &mut rows {
            row.resize(width, Cell::Null);
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Column {
                name,
                kind: ColumnType::infer(rows.iter().map(|row| &row[index])),
            })
            .collect();

        Self { columns, rows }
    }

    /// Number of data rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column names, in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

fn normalise_headers(headers: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(headers.len());
    for (index, header) in headers.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {index}"),
            trimmed => trimmed.to_string(),
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while names.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_integer_column() {
        let cells = [Cell::Int(1), Cell::Null, Cell::Int(3)];
        assert_eq!(ColumnType::infer(&cells), ColumnType::BigInt);
    }

    #[test]
    fn mixed_numbers_widen_to_double() {
        let cells = [Cell::Int(1), Cell::Float(2.5)];
        assert_eq!(ColumnType::infer(&cells), ColumnType::Double);
    }

    #[test]
    fn mixed_kinds_fall_back_to_text() {
        let cells = [Cell::Int(1), Cell::Bool(true)];
        assert_eq!(ColumnType::infer(&cells), ColumnType::Text);
        let cells = [Cell::Float(1.0), Cell::Text("n/a".to_string())];
        assert_eq!(ColumnType::infer(&cells), ColumnType::Text);
    }

    #[test]
    fn empty_column_is_text() {
        assert_eq!(ColumnType::infer(&[Cell::Null, Cell::Null]), ColumnType::Text);
        assert_eq!(ColumnType::infer(&[]), ColumnType::Text);
    }

    #[test]
    fn headers_are_normalised() {
        let table = Table::from_rows(
            vec![
                "Region".to_string(),
                String::new(),
                "Region".to_string(),
                "Region".to_string(),
            ],
            vec![],
        );
        assert_eq!(
            table.column_names(),
            vec!["Region", "Unnamed: 1", "Region.1", "Region.2"]
        );
    }

    #[test]
    fn rows_are_padded_to_header_width() {
        let table = Table::from_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2), Cell::Int(3), Cell::Int(4)]],
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.rows[0], vec![Cell::Int(1), Cell::Null]);
        assert_eq!(table.rows[1], vec![Cell::Int(2), Cell::Int(3)]);
        assert_eq!(table.columns[1].kind, ColumnType::BigInt);
    }

    #[test]
    fn cell_text_rendering() {
        assert_eq!(Cell::Null.to_text(), None);
        assert_eq!(Cell::Int(7).to_text().as_deref(), Some("7"));
        assert_eq!(Cell::Bool(false).to_text().as_deref(), Some("false"));
    }
}
