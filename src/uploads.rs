//! Uploaded file records and pre-dispatch validation.
//!
//! The upload collaborator stores files and hands the core `FileRecord`s; the
//! core only ever reads them. Planner prompts see a manifest (name, type, size),
//! never raw file content.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::UploadSettings;

// ─── FileRecord ─────────────────────────────────────────────────────────────

/// A stored upload, as handed to the core by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub display_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_path: PathBuf,
}

impl FileRecord {
    /// Build a record for a file already on disk (used by the CLI).
    ///
    /// The MIME type is inferred from the extension; unknown extensions map to
    /// `application/octet-stream`.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            mime_type: mime_for_path(path).to_string(),
            display_name,
            size_bytes: metadata.len(),
            storage_path: path.to_path_buf(),
        })
    }

    /// Manifest entry shown to the planner model.
    pub fn manifest_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.display_name,
            "type": self.mime_type,
            "size": self.size_bytes,
        })
    }
}

/// Render the file manifest for a planner prompt.
pub fn file_manifest(files: &[FileRecord]) -> serde_json::Value {
    serde_json::Value::Array(files.iter().map(FileRecord::manifest_entry).collect())
}

// ─── MIME Matching ──────────────────────────────────────────────────────────

/// Check whether `mime` satisfies a MIME `pattern`.
///
/// Matches on exact equality, on `type/*` wildcards, or when the pattern's
/// subtype appears inside the candidate type (so `application/pdf` also
/// accepts `application/x-pdf`).
pub fn mime_matches(pattern: &str, mime: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime = mime.trim().to_ascii_lowercase();

    if pattern.is_empty() || mime.is_empty() {
        return false;
    }
    if pattern == mime || pattern == "*" || pattern == "*/*" {
        return true;
    }

    let Some((main, sub)) = pattern.split_once('/') else {
        return false;
    };

    if sub == "*" {
        return mime
            .split_once('/')
            .map(|(candidate_main, _)| candidate_main == main)
            .unwrap_or(false);
    }

    !sub.is_empty() && mime.contains(sub)
}

/// Infer a MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

// ─── Validation ─────────────────────────────────────────────────────────────

/// Reasons an upload is rejected before any tool sees it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("file '{name}' is {size_bytes} bytes, above the {limit_bytes} byte limit")]
    TooLarge {
        name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("file '{name}' has unsupported type '{mime_type}'")]
    UnsupportedType { name: String, mime_type: String },
}

/// Reject files that exceed the size limit or fall outside the MIME allowlist.
///
/// An empty allowlist accepts every type.
pub fn validate_files(files: &[FileRecord], settings: &UploadSettings) -> Result<(), UploadError> {
    for file in files {
        if file.size_bytes > settings.max_file_size_bytes {
            return Err(UploadError::TooLarge {
                name: file.display_name.clone(),
                size_bytes: file.size_bytes,
                limit_bytes: settings.max_file_size_bytes,
            });
        }

        let allowed = settings.allowed_mime_types.is_empty()
            || settings
                .allowed_mime_types
                .iter()
                .any(|pattern| mime_matches(pattern, &file.mime_type));
        if !allowed {
            return Err(UploadError::UnsupportedType {
                name: file.display_name.clone(),
                mime_type: file.mime_type.clone(),
            });
        }
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(name: &str, mime: &str) -> FileRecord {
        FileRecord {
            id: format!("id-{name}"),
            display_name: name.to_string(),
            mime_type: mime.to_string(),
            size_bytes: 1_024,
            storage_path: PathBuf::from(format!("/uploads/{name}")),
        }
    }

    #[test]
    fn test_mime_matches_exact_and_wildcard() {
        assert!(mime_matches("application/pdf", "application/pdf"));
        assert!(mime_matches("image/*", "image/png"));
        assert!(!mime_matches("image/*", "video/mp4"));
        assert!(mime_matches("*/*", "audio/wav"));
    }

    #[test]
    fn test_mime_matches_subtype_substring() {
        assert!(mime_matches("application/pdf", "application/x-pdf"));
        assert!(mime_matches("text/csv", "text/csv; charset=utf-8"));
        assert!(!mime_matches("application/pdf", "image/png"));
    }

    #[test]
    fn test_mime_matches_rejects_empty() {
        assert!(!mime_matches("", "image/png"));
        assert!(!mime_matches("image/png", ""));
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("report.PDF")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(
            mime_for_path(Path::new("no_extension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_manifest_never_includes_path() {
        let manifest = file_manifest(&[record("a.pdf", "application/pdf")]);
        let entry = &manifest[0];
        assert_eq!(entry["name"], "a.pdf");
        assert_eq!(entry["type"], "application/pdf");
        assert_eq!(entry["size"], 1_024);
        assert!(entry.get("storagePath").is_none());
        assert!(!manifest.to_string().contains("/uploads/"));
    }

    #[test]
    fn test_validate_files_too_large() {
        let settings = UploadSettings {
            max_file_size_bytes: 100,
            allowed_mime_types: vec![],
        };
        let err = validate_files(&[record("big.pdf", "application/pdf")], &settings).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { limit_bytes: 100, .. }));
    }

    #[test]
    fn test_validate_files_unsupported_type() {
        let settings = UploadSettings {
            max_file_size_bytes: 10_000,
            allowed_mime_types: vec!["application/pdf".into(), "image/*".into()],
        };
        assert!(validate_files(&[record("a.png", "image/png")], &settings).is_ok());
        let err = validate_files(&[record("a.exe", "application/x-msdownload")], &settings)
            .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType { .. }));
    }

    #[test]
    fn test_from_path_reads_size_and_type() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let record = FileRecord::from_path(&path).unwrap();
        assert_eq!(record.display_name, "notes.txt");
        assert_eq!(record.mime_type, "text/plain");
        assert_eq!(record.size_bytes, 5);
    }
}
