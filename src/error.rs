use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for annoconv operations.
#[derive(Debug, Error)]
pub enum AnnoconvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input {path}: {message}")]
    MalformedInput { path: PathBuf, message: String },

    #[error("Missing image metadata for {path}: {message}")]
    MissingImageMetadata { path: PathBuf, message: String },

    #[error("Failed to write COCO JSON to {path}: {source}")]
    CocoJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize report: {0}")]
    ReportWrite(#[source] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion finished with {failed} of {total} input file(s) aborted")]
    ConversionFailed { failed: usize, total: usize },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },
}

impl AnnoconvError {
    pub(crate) fn malformed(path: &Path, message: impl Into<String>) -> Self {
        AnnoconvError::MalformedInput {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn missing_metadata(path: &Path, message: impl Into<String>) -> Self {
        AnnoconvError::MissingImageMetadata {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Returns true for errors that abort a single input file but not the run.
    ///
    /// IO errors are never per-file: an unreadable or unwritable path stops
    /// the whole conversion.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            AnnoconvError::MalformedInput { .. } | AnnoconvError::MissingImageMetadata { .. }
        )
    }
}
