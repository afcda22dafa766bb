//! Conversion report types.
//!
//! A report travels back with every conversion. It holds element counts,
//! the per-file failures, and a warning list for boxes and fields that the
//! target format passes through oddly or cannot carry.

use serde::Serialize;
use std::fmt;

/// A report generated during format conversion.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source format name.
    pub from: String,
    /// Target format name.
    pub to: String,
    /// Counts over every dataset that parsed.
    pub input: ConversionCounts,
    /// Counts as they appear in the emitted files.
    pub output: ConversionCounts,
    pub files: FileCounts,
    /// Input files that were skipped, with the reason.
    pub failed_files: Vec<FailedFile>,
    pub issues: Vec<ConversionIssue>,
}

impl ConversionReport {
    /// Create a new empty report for a conversion between formats.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    pub fn add(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    /// Count of warning-level issues.
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Warning)
            .count()
    }

    /// Count of info-level issues (policy decisions, notes).
    pub fn info_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Info)
            .count()
    }

    /// True if any box or field was flagged.
    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    /// Issues with the given code.
    pub fn with_code(&self, code: ConversionIssueCode) -> impl Iterator<Item = &ConversionIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} images, {} categories, {} annotations",
            self.input.images, self.input.categories, self.input.annotations
        )?;

        if self.output != self.input {
            writeln!(
                f,
                "  output: {} images, {} categories, {} annotations",
                self.output.images, self.output.categories, self.output.annotations
            )?;
        }

        writeln!(
            f,
            "  files: {} read, {} failed, {} written",
            self.files.seen, self.files.failed, self.files.written
        )?;

        if !self.failed_files.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed files ({}):", self.failed_files.len())?;
            for failed in &self.failed_files {
                writeln!(f, "  - {}: {}", failed.path, failed.error)?;
            }
        }

        let warnings = self.warning_count();
        if warnings > 0 {
            writeln!(f)?;
            writeln!(f, "Warnings ({}):", warnings)?;
            for issue in self
                .issues
                .iter()
                .filter(|i| i.severity == ConversionSeverity::Warning)
            {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        let infos = self.info_count();
        if infos > 0 {
            writeln!(f)?;
            writeln!(f, "Notes ({}):", infos)?;
            for issue in self
                .issues
                .iter()
                .filter(|i| i.severity == ConversionSeverity::Info)
            {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        Ok(())
    }
}

/// Counts of dataset elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionCounts {
    pub images: usize,
    pub categories: usize,
    pub annotations: usize,
}

impl ConversionCounts {
    pub(crate) fn accumulate(&mut self, other: &ConversionCounts) {
        self.images += other.images;
        self.categories += other.categories;
        self.annotations += other.annotations;
    }
}

/// Input files considered, skipped, and output files produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub seen: usize,
    pub failed: usize,
    pub written: usize,
}

/// A skipped input file as it appears in the report.
#[derive(Clone, Debug, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// A single note attached to a conversion.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionIssue {
    pub severity: ConversionSeverity,
    pub code: ConversionIssueCode,
    pub message: String,
}

impl ConversionIssue {
    pub fn warning(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn info(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Info,
            code,
            message: message.into(),
        }
    }
}

/// Severity level for conversion issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSeverity {
    /// Data passed through unmodified but suspicious, or dropped by the target.
    Warning,
    /// A policy decision that shaped the output.
    Info,
}

/// Stable issue codes. These appear in the JSON report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionIssueCode {
    /// A box with zero or negative width or height.
    ZeroAreaBox,
    /// A box extending past the image edges.
    BboxOutOfBounds,
    /// Polygon segmentation the target cannot carry.
    SegmentationDropped,
    /// Confidence scores the target cannot carry.
    ConfidenceDropped,
    /// Per-object attributes (pose, truncated, ...) the target cannot carry.
    AttributesDropped,
    /// How category ids or class indices were assigned.
    CategoryOrder,
    /// Decimal places used for YOLO coordinates.
    YoloFloatPrecision,
}
