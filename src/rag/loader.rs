use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::core::errors::ApiError;

/// A document read from the document folder, as plain text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the document folder, `/`-separated.
    pub source: String,
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub documents: Vec<SourceDocument>,
    pub failures: Vec<FetchFailure>,
}

/// Reads every file under `folder`, at any depth, in file-name order.
///
/// `.pdf` files go through text extraction; everything else must be UTF-8
/// text. Files that cannot be read or converted are recorded in
/// `FetchReport::failures` and skipped.
pub fn fetch(folder: &Path) -> Result<FetchReport, ApiError> {
    if !folder.is_dir() {
        return Err(ApiError::SourceNotFound(folder.to_path_buf()));
    }

    let mut report = FetchReport::default();

    for entry in WalkDir::new(folder)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| folder.to_path_buf());
                report.failures.push(FetchFailure {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        match read_text(path) {
            Ok(text) => report.documents.push(SourceDocument {
                source: relative_source(folder, path),
                path: path.to_path_buf(),
                text,
            }),
            Err(reason) => {
                warn!("Skipping document {}: {}", path.display(), reason);
                report.failures.push(FetchFailure {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }

    Ok(report)
}

/// Every file under `folder` as a relative path, in file-name order.
pub fn list_documents(folder: &Path) -> Result<Vec<String>, ApiError> {
    if !folder.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(folder).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(ApiError::internal)?;
        if entry.file_type().is_file() {
            names.push(relative_source(folder, entry.path()));
        }
    }
    Ok(names)
}

fn read_text(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    if is_pdf(path) {
        return extract_pdf(&bytes);
    }
    if bytes.contains(&0) {
        return Err("binary file".to_string());
    }
    String::from_utf8(bytes).map_err(|_| "not valid UTF-8 text".to_string())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    // The extractor panics on some malformed inputs.
    let text = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| "malformed PDF".to_string())?
        .map_err(|e| format!("PDF extraction failed: {e}"))?;
    if text.trim().is_empty() {
        return Err("PDF has no extractable text".to_string());
    }
    Ok(text)
}

fn relative_source(folder: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(folder).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_folder_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(fetch(&missing), Err(ApiError::SourceNotFound(p)) if p == missing));
    }

    #[test]
    fn reads_nested_files_and_reports_binary_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("guides/deep")).unwrap();
        fs::write(dir.path().join("a.md"), "# Alpha").unwrap();
        fs::write(dir.path().join("guides/deep/b.txt"), "beta").unwrap();
        fs::write(dir.path().join("image.bin"), [0xff, 0x00, 0xfe]).unwrap();

        let report = fetch(dir.path()).unwrap();

        let sources: Vec<&str> = report.documents.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "guides/deep/b.txt"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("image.bin"));
    }

    #[test]
    fn pdf_extension_is_matched_case_insensitively() {
        assert!(is_pdf(Path::new("manuals/Guide.PDF")));
        assert!(is_pdf(Path::new("a.pdf")));
        assert!(!is_pdf(Path::new("pdf")));
        assert!(!is_pdf(Path::new("notes.md")));
    }

    #[test]
    fn broken_pdf_is_a_failure_not_an_abort() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\nthis is not a pdf body").unwrap();
        fs::write(dir.path().join("c.txt"), "gamma").unwrap();

        let report = fetch(dir.path()).unwrap();

        let sources: Vec<&str> = report.documents.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "c.txt"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken.pdf"));
    }

    #[test]
    fn listing_a_missing_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_documents(&dir.path().join("missing")).unwrap().is_empty());
    }
}
