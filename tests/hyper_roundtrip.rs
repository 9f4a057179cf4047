//! Round trip through a real `hyperd`.
//!
//! Requires Tableau's Hyper API; point `HYPERD_PATH` at its `hyperd`
//! executable and run with `cargo test -- --ignored`.

use std::path::PathBuf;
use std::sync::Arc;

use rust_xlsxwriter::Workbook;

use tableau_mcp::tableau::{Converter, HyperdWriter};

fn hyperd() -> PathBuf {
    std::env::var_os("HYPERD_PATH").map_or_else(|| PathBuf::from("hyperd"), PathBuf::from)
}

#[tokio::test]
#[ignore = "requires a local hyperd"]
async fn spreadsheet_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in ["Region", "Units", "Price", "Shipped"].into_iter().enumerate() {
        sheet.write_string(0, u16::try_from(col).unwrap(), header).unwrap();
    }
    for row in 1..=25_u32 {
        sheet.write_string(row, 0, format!("Region {}", row % 4)).unwrap();
        sheet.write_number(row, 1, f64::from(row * 3)).unwrap();
        sheet.write_number(row, 2, f64::from(row) * 1.25).unwrap();
        sheet.write_boolean(row, 3, row % 2 == 0).unwrap();
    }
    workbook.save(dir.path().join("sales.xlsx")).unwrap();

    let writer = Arc::new(HyperdWriter::new(hyperd()));
    let converter = Converter::new(dir.path(), writer.clone());

    let summary = converter.convert_spreadsheet("sales.xlsx", None).await.unwrap();
    assert_eq!(summary.output_file, dir.path().join("sales.hyper"));
    assert!(summary.output_file.exists());

    let shape = writer.describe_extract(&summary.output_file).await.unwrap();
    assert_eq!(shape.rows, 25);
    assert_eq!(shape.columns, summary.columns);

    // Converting again replaces the file rather than appending
    converter.convert_spreadsheet("sales", None).await.unwrap();
    let shape = writer.describe_extract(&summary.output_file).await.unwrap();
    assert_eq!(shape.rows, 25);
}
