//! File path resolution against the default file directory.
//!
//! Tool callers usually pass bare file names ("sales" or "sales.xlsx") that
//! refer to the configured default directory. These helpers turn such input
//! into concrete paths and, where the extension is missing, try the known ones.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::tableau::error::{TableauError, TableauResult};

/// Spreadsheet extensions, in the order they are tried.
pub const SPREADSHEET_EXTENSIONS: [&str; 4] = ["xlsx", "xls", "xlsm", "xlsb"];

/// Extensions tried, in order, for an upload without an extension.
pub const UPLOAD_EXTENSIONS: [&str; 6] = ["hyper", "xlsx", "xls", "csv", "xlsm", "xlsb"];

/// Extension of Tableau Hyper extracts.
pub const HYPER_EXTENSION: &str = "hyper";

/// Resolves a user-supplied path.
///
/// Absolute paths are returned unchanged; relative paths are joined onto
/// `default_dir`.
#[must_use]
pub fn resolve_path(path: &str, default_dir: &Path) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }

    let resolved = default_dir.join(candidate);
    debug!(
        input = path,
        resolved = %resolved.display(),
        "Resolved relative path"
    );
    resolved
}

/// Locates a spreadsheet, adding a known extension when needed.
///
/// The path is resolved first. If it exists as given it is returned.
/// Otherwise the file stem is combined with each of
/// [`SPREADSHEET_EXTENSIONS`] in order and the first existing candidate wins.
///
/// # Errors
///
/// Returns [`TableauError::FileNotFound`] listing every tried path if no
/// candidate exists.
pub fn find_spreadsheet_file(path: &str, default_dir: &Path) -> TableauResult<PathBuf> {
    try_extensions(&resolve_path(path, default_dir), &SPREADSHEET_EXTENSIONS)
}

/// Locates a file for upload, adding a known extension when needed.
///
/// A path without an extension is tried with [`UPLOAD_EXTENSIONS`]; a path
/// with an extension must exist as given.
///
/// # Errors
///
/// Returns [`TableauError::FileNotFound`] if nothing matches.
pub fn find_upload_file(path: &str, default_dir: &Path) -> TableauResult<PathBuf> {
    let resolved = resolve_path(path, default_dir);
    if resolved.extension().is_some() {
        if resolved.exists() {
            return Ok(resolved);
        }
        return Err(TableauError::file_not_found(resolved));
    }
    try_extensions(&resolved, &UPLOAD_EXTENSIONS)
}

fn try_extensions(resolved: &Path, extensions: &[&str]) -> TableauResult<PathBuf> {
    if resolved.exists() {
        return Ok(resolved.to_path_buf());
    }

    // "report.xlsx" that doesn't exist still tries "report.xls" and friends
    let stem = if resolved.extension().is_some() {
        resolved.file_stem()
    } else {
        resolved.file_name()
    };
    let Some(stem) = stem else {
        return Err(TableauError::file_not_found(resolved));
    };
    let directory = resolved.parent().unwrap_or_else(|| Path::new(""));

    let mut tried = Vec::with_capacity(extensions.len());
    for ext in extensions {
        let mut file_name = stem.to_os_string();
        file_name.push(".");
        file_name.push(ext);
        let candidate = directory.join(file_name);
        if candidate.exists() {
            info!(path = %candidate.display(), "Found file with extension .{ext}");
            return Ok(candidate);
        }
        tried.push(candidate);
    }

    warn!(path = %resolved.display(), "No file found with any known extension");
    Err(TableauError::FileNotFound { tried })
}

/// Returns `path` with its extension replaced by `.hyper`.
#[must_use]
pub fn hyper_path_for(path: &Path) -> PathBuf {
    path.with_extension(HYPER_EXTENSION)
}

/// Returns the lowercase extension of `path`, or an empty string.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn absolute_path_unchanged() {
        let absolute = if cfg!(windows) {
            "C:\\abs\\path.xlsx"
        } else {
            "/abs/path.xlsx"
        };
        assert_eq!(
            resolve_path(absolute, Path::new("/downloads")),
            PathBuf::from(absolute)
        );
    }

    #[test]
    fn relative_path_joined_onto_default_directory() {
        let dir = Path::new("/downloads");
        assert_eq!(resolve_path("data.xlsx", dir), dir.join("data.xlsx"));
        assert_eq!(
            resolve_path("nested/data.xlsx", dir),
            dir.join("nested/data.xlsx")
        );
    }

    #[test]
    fn existing_spreadsheet_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sales.xls"), b"").unwrap();

        let found = find_spreadsheet_file("sales.xls", dir.path()).unwrap();
        assert_eq!(found, dir.path().join("sales.xls"));
    }

    #[test]
    fn tries_extensions_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.xlsm"), b"").unwrap();

        let found = find_spreadsheet_file("report", dir.path()).unwrap();
        assert_eq!(found, dir.path().join("report.xlsm"));
    }

    #[test]
    fn xlsx_is_tried_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.xlsb"), b"").unwrap();
        fs::write(dir.path().join("report.xlsx"), b"").unwrap();

        let found = find_spreadsheet_file("report", dir.path()).unwrap();
        assert_eq!(found, dir.path().join("report.xlsx"));
    }

    #[test]
    fn wrong_extension_falls_back_to_known_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.xls"), b"").unwrap();

        let found = find_spreadsheet_file("report.xlsx", dir.path()).unwrap();
        assert_eq!(found, dir.path().join("report.xls"));
    }

    #[test]
    fn missing_spreadsheet_lists_every_tried_path() {
        let dir = tempfile::tempdir().unwrap();

        let err = find_spreadsheet_file("report", dir.path()).unwrap_err();
        let TableauError::FileNotFound { tried } = &err else {
            panic!("Expected FileNotFound, got {err:?}");
        };
        let expected: Vec<PathBuf> = SPREADSHEET_EXTENSIONS
            .iter()
            .map(|ext| dir.path().join(format!("report.{ext}")))
            .collect();
        assert_eq!(tried, &expected);

        let message = err.to_string();
        for ext in SPREADSHEET_EXTENSIONS {
            assert!(message.contains(&format!("report.{ext}")));
        }
    }

    #[test]
    fn upload_prefers_hyper() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sales.csv"), b"").unwrap();
        fs::write(dir.path().join("sales.hyper"), b"").unwrap();

        let found = find_upload_file("sales", dir.path()).unwrap();
        assert_eq!(found, dir.path().join("sales.hyper"));
    }

    #[test]
    fn upload_with_extension_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sales.csv"), b"").unwrap();

        let err = find_upload_file("sales.hyper", dir.path()).unwrap_err();
        assert!(matches!(err, TableauError::FileNotFound { ref tried } if tried.len() == 1));
    }

    #[test]
    fn hyper_path_replaces_extension() {
        assert_eq!(
            hyper_path_for(Path::new("/data/sales.xlsx")),
            PathBuf::from("/data/sales.hyper")
        );
        assert_eq!(
            hyper_path_for(Path::new("/data/sales")),
            PathBuf::from("/data/sales.hyper")
        );
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("Report.XLSX")), "xlsx");
        assert_eq!(extension_of(Path::new("Report")), "");
    }
}
