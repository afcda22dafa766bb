//! Conversion driver.
//!
//! A conversion is parse → validate → emit through the IR. Failures are
//! isolated per input file: a malformed file or one without usable image
//! metadata is recorded in the report and skipped, while IO errors stop the
//! run. Geometric oddities (zero-area or out-of-bounds boxes) never stop a
//! conversion; they are passed through and listed as warnings.

pub mod report;

pub use report::{
    ConversionCounts, ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity,
    FailedFile, FileCounts,
};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use walkdir::WalkDir;

use crate::error::AnnoconvError;
use crate::ir::io_coco_json::{self, read_coco_json, write_coco_json};
use crate::ir::io_voc_xml::{read_voc, write_voc_dir, VocReadOptions};
use crate::ir::io_yolo::{
    read_classes_txt, read_data_yaml_names, read_yolo, write_yolo_dir, YoloReadOptions,
    YoloWriteOptions, DEFAULT_PRECISION,
};
use crate::ir::{BoxConvention, Dataset, FileFailure, LoadedDataset};
use crate::validation::{self, IssueCode, ValidateOptions, ValidationReport};

/// Annotation schemas the converter understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Coco,
    Yolo,
    Voc,
}

impl Format {
    /// Canonical name used in reports and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Coco => "coco",
            Format::Yolo => "yolo",
            Format::Voc => "voc",
        }
    }

    /// How the format writes its four box numbers.
    pub fn box_convention(&self) -> BoxConvention {
        match self {
            Format::Coco => BoxConvention::CornerSizePixel,
            Format::Yolo => BoxConvention::CenterSizeNormalized,
            Format::Voc => BoxConvention::CornerPixel,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = AnnoconvError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "coco" | "coco-json" => Ok(Format::Coco),
            "yolo" | "yolov5" | "ultralytics" => Ok(Format::Yolo),
            "voc" | "pascal-voc" | "voc-xml" => Ok(Format::Voc),
            _ => Err(AnnoconvError::UnsupportedFormat(format!(
                "'{raw}' (supported: coco, yolo, voc)"
            ))),
        }
    }
}

/// Settings shared by `convert` and `validate`.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    /// Class list for YOLO input, or fixed category order for VOC input.
    pub class_names: Option<Vec<String>>,
    /// Where YOLO input images live, when not beside `labels/`.
    pub images_dir: Option<PathBuf>,
    /// Decimal places for YOLO output coordinates.
    pub yolo_precision: usize,
    /// Refuse to emit a dataset whose validation produced warnings.
    pub strict: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            class_names: None,
            images_dir: None,
            yolo_precision: DEFAULT_PRECISION,
            strict: false,
        }
    }
}

/// What a conversion produced.
#[derive(Debug)]
pub struct ConversionOutcome {
    pub report: ConversionReport,
    /// Input files that were skipped.
    pub failures: Vec<FileFailure>,
}

impl ConversionOutcome {
    /// True when every input file was converted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, path: &Path, error: AnnoconvError) -> Result<(), AnnoconvError> {
        if !error.is_per_file() {
            return Err(error);
        }
        log::error!("skipping {}: {}", path.display(), error);
        self.failures.push(FileFailure {
            path: path.to_path_buf(),
            error,
        });
        Ok(())
    }
}

/// One parse/emit unit. COCO directory input yields several.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Job {
    input: PathBuf,
    output: PathBuf,
}

/// Reads a class list from a text file (one name per line) or a YAML file
/// with a `names:` key.
pub fn read_class_list(path: &Path) -> Result<Vec<String>, AnnoconvError> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        read_data_yaml_names(path)
    } else {
        read_classes_txt(path)
    }
}

/// Parses `input` in format `from`.
pub fn read_dataset(
    input: &Path,
    from: Format,
    options: &ConvertOptions,
) -> Result<LoadedDataset, AnnoconvError> {
    match from {
        Format::Coco => Ok(LoadedDataset::single(read_coco_json(input)?)),
        Format::Yolo => read_yolo(
            input,
            &YoloReadOptions {
                class_names: options.class_names.clone(),
                images_dir: options.images_dir.clone(),
            },
        ),
        Format::Voc => read_voc(
            input,
            &VocReadOptions {
                class_names: options.class_names.clone(),
            },
        ),
    }
}

/// Writes `dataset` in format `to`, returning the number of files written.
pub fn write_dataset(
    output: &Path,
    to: Format,
    dataset: &Dataset,
    options: &ConvertOptions,
) -> Result<usize, AnnoconvError> {
    match to {
        Format::Coco => {
            write_coco_json(output, dataset)?;
            Ok(1)
        }
        Format::Yolo => write_yolo_dir(
            output,
            dataset,
            &YoloWriteOptions {
                precision: options.yolo_precision,
            },
        ),
        Format::Voc => write_voc_dir(output, dataset),
    }
}

/// Converts `input` from `from` to `to`, writing under `output`.
///
/// Returns `Err` only for run-level failures (IO). Per-file failures are in
/// [`ConversionOutcome::failures`] and in the report.
pub fn convert(
    input: &Path,
    from: Format,
    to: Format,
    output: &Path,
    options: &ConvertOptions,
) -> Result<ConversionOutcome, AnnoconvError> {
    let mut outcome = ConversionOutcome {
        report: ConversionReport::new(from.name(), to.name()),
        failures: Vec::new(),
    };

    let jobs = plan_jobs(input, from, to, output)?;
    if jobs.is_empty() {
        log::warn!("no {} input found at {}", from, input.display());
    }

    // A later job never writes into an output another job already owns.
    let mut claimed: BTreeMap<&Path, &Path> = BTreeMap::new();
    for job in &jobs {
        if let Some(owner) = claimed.insert(&job.output, &job.input) {
            outcome.report.files.seen += 1;
            let error = AnnoconvError::malformed(
                &job.input,
                format!(
                    "output {} is already written from {}",
                    job.output.display(),
                    owner.display()
                ),
            );
            outcome.absorb(&job.input, error)?;
            continue;
        }
        run_job(job, from, to, options, &mut outcome)?;
    }

    outcome.report.files.failed = outcome.failures.len();
    outcome.report.failed_files = outcome
        .failures
        .iter()
        .map(|failure| FailedFile {
            path: failure.path.display().to_string(),
            error: failure.error.to_string(),
        })
        .collect();

    log::info!(
        "converted {} -> {}: {} file(s) read, {} failed, {} written",
        from,
        to,
        outcome.report.files.seen,
        outcome.report.files.failed,
        outcome.report.files.written
    );
    Ok(outcome)
}

fn run_job(
    job: &Job,
    from: Format,
    to: Format,
    options: &ConvertOptions,
    outcome: &mut ConversionOutcome,
) -> Result<(), AnnoconvError> {
    log::debug!("converting {} -> {}", job.input.display(), job.output.display());

    let loaded = match read_dataset(&job.input, from, options) {
        Ok(loaded) => loaded,
        Err(error) => {
            outcome.report.files.seen += 1;
            return outcome.absorb(&job.input, error);
        }
    };
    outcome.report.files.seen += loaded.files_seen;
    outcome.failures.extend(loaded.failures);
    let dataset = loaded.dataset;

    let validation = validation::validate_dataset(
        &dataset,
        &ValidateOptions {
            strict: options.strict,
        },
    );
    if let Some(error) = validation_gate(&job.input, &validation, options.strict) {
        return outcome.absorb(&job.input, error);
    }

    let mut job_report = ConversionReport::new(from.name(), to.name());
    analyze(&dataset, &validation, from, to, options, &mut job_report);

    match write_dataset(&job.output, to, &dataset, options) {
        Ok(written) => {
            outcome.report.files.written += written;
            outcome.report.input.accumulate(&job_report.input);
            outcome.report.output.accumulate(&job_report.output);
            for issue in job_report.issues {
                // Policy notes repeat for every COCO job; list each once.
                let repeated_note = issue.severity == ConversionSeverity::Info
                    && outcome
                        .report
                        .issues
                        .iter()
                        .any(|existing| existing.message == issue.message);
                if !repeated_note {
                    outcome.report.add(issue);
                }
            }
            Ok(())
        }
        Err(error) => outcome.absorb(&job.input, error),
    }
}

/// Turns a failed validation into a per-file error.
fn validation_gate(
    input: &Path,
    report: &ValidationReport,
    strict: bool,
) -> Option<AnnoconvError> {
    let blocking = if strict {
        report.issues.first()
    } else {
        report
            .issues
            .iter()
            .find(|issue| issue.severity == validation::Severity::Error)
    }?;

    Some(AnnoconvError::malformed(
        input,
        format!(
            "validation found {} error(s) and {} warning(s); first: {:?} in {}: {}",
            report.error_count(),
            report.warning_count(),
            blocking.code,
            blocking.context,
            blocking.message
        ),
    ))
}

/// Fills counts and the warning list for one parsed dataset.
fn analyze(
    dataset: &Dataset,
    validation: &ValidationReport,
    from: Format,
    to: Format,
    options: &ConvertOptions,
    report: &mut ConversionReport,
) {
    report.input = ConversionCounts {
        images: dataset.images.len(),
        categories: dataset.categories.len(),
        annotations: dataset.annotations.len(),
    };
    report.output = report.input.clone();
    if to == Format::Voc {
        // VOC has no category table; only names used by an object survive.
        let used: HashSet<_> = dataset.annotations.iter().map(|a| a.category_id).collect();
        report.output.categories = used.len();
    }

    for issue in &validation.issues {
        let code = match issue.code {
            IssueCode::ZeroAreaBox | IssueCode::InvalidBBoxOrdering => {
                ConversionIssueCode::ZeroAreaBox
            }
            IssueCode::BBoxOutOfBounds => ConversionIssueCode::BboxOutOfBounds,
            _ => continue,
        };
        log::warn!("{}: {}", issue.context, issue.message);
        report.add(ConversionIssue::warning(
            code,
            format!("{}: {} (kept unmodified)", issue.context, issue.message),
        ));
    }

    if to != Format::Coco {
        let with_segmentation = dataset
            .annotations
            .iter()
            .filter(|ann| !ann.segmentation.is_empty())
            .count();
        if with_segmentation > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::SegmentationDropped,
                format!(
                    "{} annotation(s) have polygon segmentation that {} cannot carry; boxes are kept",
                    with_segmentation, to
                ),
            ));
        }

        let with_confidence = dataset
            .annotations
            .iter()
            .filter(|ann| ann.confidence.is_some())
            .count();
        if with_confidence > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::ConfidenceDropped,
                format!(
                    "{} annotation(s) have confidence scores that {} cannot carry",
                    with_confidence, to
                ),
            ));
        }
    }

    if to == Format::Yolo {
        let with_attributes = dataset
            .annotations
            .iter()
            .filter(|ann| !ann.attributes.is_empty())
            .count();
        if with_attributes > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::AttributesDropped,
                format!(
                    "{} annotation(s) have attributes (pose, truncated, iscrowd, ...) that YOLO cannot carry",
                    with_attributes
                ),
            ));
        }
    }

    add_category_order_notes(from, to, options, report);

    if to == Format::Yolo {
        report.add(ConversionIssue::info(
            ConversionIssueCode::YoloFloatPrecision,
            format!(
                "YOLO coordinates are written with {} decimal places",
                options.yolo_precision
            ),
        ));
    }
}

fn add_category_order_notes(
    from: Format,
    to: Format,
    options: &ConvertOptions,
    report: &mut ConversionReport,
) {
    let source_note = match (from, options.class_names.is_some()) {
        (Format::Coco, _) => None,
        (Format::Yolo, true) => Some("category ids follow the supplied class list (class i -> id i+1)"),
        (Format::Yolo, false) => {
            Some("category ids follow the YOLO class list order (class i -> id i+1)")
        }
        (Format::Voc, true) => Some(
            "category ids follow the supplied class list; names not in it are appended alphabetically",
        ),
        (Format::Voc, false) => Some("category ids are assigned in alphabetical order of names"),
    };
    if let Some(note) = source_note {
        report.add(ConversionIssue::info(ConversionIssueCode::CategoryOrder, note));
    }

    if to == Format::Yolo {
        report.add(ConversionIssue::info(
            ConversionIssueCode::CategoryOrder,
            "YOLO class indices follow ascending category id",
        ));
    }
}

/// Works out which files to parse and where each one's output goes.
fn plan_jobs(
    input: &Path,
    from: Format,
    to: Format,
    output: &Path,
) -> Result<Vec<Job>, AnnoconvError> {
    if from != Format::Coco || !input.is_dir() {
        return Ok(vec![Job {
            input: input.to_path_buf(),
            output: job_output(output, to),
        }]);
    }

    // COCO directory mode: `name.json` -> `<out>/name/`,
    // `sub/*.json` -> `<out>/sub/`, or `<out>/sub/<stem>/` when `sub/` holds
    // more than one file for a directory target.
    let mut found = Vec::new();
    for entry in WalkDir::new(input)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| {
            std::io::Error::other(format!(
                "failed while traversing {}: {source}",
                input.display()
            ))
        })?;
        if !entry.file_type().is_file() || !has_json_extension(entry.path()) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let job_dir = if entry.depth() == 1 {
            output.join(&stem)
        } else {
            let sub = path
                .parent()
                .and_then(|parent| parent.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            output.join(sub)
        };
        found.push((path, stem, job_dir));
    }

    let mut per_dir: HashMap<PathBuf, usize> = HashMap::new();
    for (_, _, job_dir) in &found {
        *per_dir.entry(job_dir.clone()).or_default() += 1;
    }

    let jobs = found
        .into_iter()
        .map(|(path, stem, job_dir)| {
            let output = match to {
                Format::Coco => job_dir.join(format!("{stem}.json")),
                Format::Yolo | Format::Voc if per_dir[&job_dir] > 1 => job_dir.join(&stem),
                Format::Yolo | Format::Voc => job_dir,
            };
            Job {
                input: path,
                output,
            }
        })
        .collect();

    Ok(jobs)
}

fn job_output(output: &Path, to: Format) -> PathBuf {
    match to {
        Format::Coco => io_coco_json::output_file(output),
        Format::Yolo | Format::Voc => output.to_path_buf(),
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
