//! Folder size scanner.
//!
//! [`scan`] lists the immediate subdirectories of a root and the recursive
//! byte size of each. Problems inside a subtree never abort the scan: an
//! unreadable child is reported with an error text, unreadable files deeper
//! down are skipped.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::format_size;

/// Errors that prevent a scan from starting.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root path does not exist.
    #[error("path does not exist: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The root path is not a directory.
    #[error("path is not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The root directory could not be listed.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The directory that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// One subdirectory of the scanned root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    /// Directory name (not the full path).
    pub name: String,
    /// Recursive size of all files below it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Why the size could not be computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of scanning one root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// The scanned directory.
    pub root: PathBuf,
    /// Subdirectories sorted by name.
    pub entries: Vec<ScanEntry>,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scanned: {}", self.root.display())?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        if self.entries.is_empty() {
            return writeln!(f, "No subfolders found.");
        }
        writeln!(f, "Found {} subfolders:", self.entries.len())?;
        for entry in &self.entries {
            writeln!(f)?;
            writeln!(f, "{}", entry.name)?;
            match (entry.size_bytes, entry.error.as_deref()) {
                (Some(size), _) => writeln!(f, "   Size: {}", format_size(size))?,
                (None, Some(error)) => writeln!(f, "   Error: {error}")?,
                (None, None) => writeln!(f, "   Size: unknown")?,
            }
        }
        Ok(())
    }
}

/// Scans `root` and returns each child directory with its recursive size.
///
/// # Errors
///
/// Returns [`ScanError`] when `root` is missing, is not a directory, or
/// cannot be listed. Failures below `root` are recorded per entry instead.
#[instrument(fields(root = %root.display()))]
pub fn scan(root: &Path) -> Result<ScanReport, ScanError> {
    let meta = fs::metadata(root).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ScanError::NotFound {
                path: root.to_path_buf(),
            }
        } else {
            ScanError::Io {
                path: root.to_path_buf(),
                source,
            }
        }
    })?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let listing = fs::read_dir(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|source| ScanError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => match dir_size(&entry.path()) {
                Ok(size) => entries.push(ScanEntry {
                    name,
                    size_bytes: Some(size),
                    error: None,
                }),
                Err(e) => entries.push(failed_entry(name, &e)),
            },
            Ok(_) => {}
            Err(e) => entries.push(failed_entry(name, &e)),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(subdirectories = entries.len(), "scan complete");
    Ok(ScanReport {
        root: root.to_path_buf(),
        entries,
    })
}

/// Sums file sizes below `dir`. Only a failure to list `dir` itself is an
/// error; anything unreadable further down is skipped.
///
/// Directories wait on the stack as paths, so at most one listing is open.
fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    let mut pending = Vec::new();

    for entry in fs::read_dir(dir)? {
        visit(entry, &mut pending, &mut total);
    }
    while let Some(path) = pending.pop() {
        let Ok(listing) = fs::read_dir(&path) else {
            debug!(path = %path.display(), "skipping unreadable directory");
            continue;
        };
        for entry in listing {
            visit(entry, &mut pending, &mut total);
        }
    }

    Ok(total)
}

fn visit(entry: io::Result<fs::DirEntry>, pending: &mut Vec<PathBuf>, total: &mut u64) {
    let Ok(entry) = entry else {
        return;
    };
    let Ok(kind) = entry.file_type() else {
        return;
    };
    if kind.is_dir() {
        pending.push(entry.path());
    } else if let Ok(meta) = fs::metadata(entry.path())
        && meta.is_file()
    {
        *total = total.saturating_add(meta.len());
    }
}

fn failed_entry(name: String, error: &io::Error) -> ScanEntry {
    debug!(name = %name, error = %error, "cannot size subdirectory");
    ScanEntry {
        name,
        size_bytes: None,
        error: Some(describe_io_error(error)),
    }
}

fn describe_io_error(error: &io::Error) -> String {
    match error.kind() {
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => error.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_scan_sums_nested_files_per_child() {
        let root = TempDir::new().unwrap();
        write_file(&root.path().join("alpha/a.bin"), 100);
        write_file(&root.path().join("alpha/deep/er/b.bin"), 1948);
        write_file(&root.path().join("beta/c.bin"), 10);
        write_file(&root.path().join("loose.bin"), 5000);
        fs::create_dir(root.path().join("empty")).unwrap();

        let report = scan(root.path()).unwrap();
        let sizes: Vec<(&str, Option<u64>)> = report
            .entries
            .iter()
            .map(|e| (e.name.as_str(), e.size_bytes))
            .collect();
        assert_eq!(
            sizes,
            vec![("alpha", Some(2048)), ("beta", Some(10)), ("empty", Some(0))]
        );
    }

    #[test]
    fn test_scan_counts_every_directory_of_a_wide_tree() {
        let root = TempDir::new().unwrap();
        let wide = root.path().join("wide");
        for i in 0..1500 {
            write_file(&wide.join(format!("d{i:04}/f.bin")), 10);
        }

        let report = scan(root.path()).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].size_bytes, Some(15_000));
    }

    #[test]
    fn test_failed_entry_keeps_name_and_reason() {
        let error = io::Error::from(io::ErrorKind::PermissionDenied);
        let entry = failed_entry("locked".to_string(), &error);
        assert_eq!(entry.name, "locked");
        assert_eq!(entry.size_bytes, None);
        assert_eq!(entry.error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn test_scan_missing_root() {
        let root = TempDir::new().unwrap();
        let result = scan(&root.path().join("missing"));
        assert!(matches!(result, Err(ScanError::NotFound { .. })));
    }

    #[test]
    fn test_scan_file_root() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("file.txt");
        write_file(&file, 3);
        assert!(matches!(scan(&file), Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_report_display_lists_sizes() {
        let report = ScanReport {
            root: PathBuf::from("/data"),
            entries: vec![
                ScanEntry {
                    name: "music".to_string(),
                    size_bytes: Some(1536),
                    error: None,
                },
                ScanEntry {
                    name: "secret".to_string(),
                    size_bytes: None,
                    error: Some("permission denied".to_string()),
                },
            ],
        };
        let text = report.to_string();
        assert!(text.starts_with("Scanned: /data\n"));
        assert!(text.contains("Found 2 subfolders:"));
        assert!(text.contains("music\n   Size: 1.50 KB"));
        assert!(text.contains("secret\n   Error: permission denied"));
    }

    #[test]
    fn test_report_display_without_subfolders() {
        let report = ScanReport {
            root: PathBuf::from("/data"),
            entries: Vec::new(),
        };
        assert!(report.to_string().ends_with("No subfolders found.\n"));
    }

    #[test]
    fn test_report_json_omits_missing_fields() {
        let entry = ScanEntry {
            name: "music".to_string(),
            size_bytes: Some(1),
            error: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"name": "music", "size_bytes": 1}));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_reports_unreadable_child() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let locked = root.path().join("locked");
        write_file(&locked.join("x.bin"), 1);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root can read anything; only assert when permissions are enforced
        let enforced = fs::read_dir(&locked).is_err();
        let report = scan(root.path()).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let entry = report.entries.iter().find(|e| e.name == "locked").unwrap();
        if enforced {
            assert_eq!(entry.size_bytes, None);
            assert_eq!(entry.error.as_deref(), Some("permission denied"));
        } else {
            assert_eq!(entry.size_bytes, Some(1));
        }
    }
}
