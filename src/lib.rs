//! annoconv: convert object detection annotations between COCO JSON, YOLO
//! text labels and Pascal VOC XML.
//!
//! Every conversion parses the source into a shared intermediate
//! representation, validates it, then emits the target schema.
//!
//! # Modules
//!
//! - [`ir`]: Intermediate representation types and per-format readers/writers
//! - [`validation`]: Dataset checks and the validation report
//! - [`conversion`]: The conversion driver and conversion report
//! - [`error`]: Error types for annoconv operations

pub mod conversion;
pub mod error;
pub mod ir;
pub mod validation;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use conversion::{ConvertOptions, Format};
pub use error::AnnoconvError;

/// Environment variable holding the log filter (env_logger syntax).
pub const LOG_ENV: &str = "ANNOCONV_LOG";

/// The annoconv CLI application.
#[derive(Parser)]
#[command(name = "annoconv")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert annotations from one format to another.
    Convert(ConvertArgs),
    /// Validate a dataset for errors and warnings.
    Validate(ValidateArgs),
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Source format ('coco', 'yolo' or 'voc').
    #[arg(short = 'f', long = "from")]
    from: String,

    /// Target format ('coco', 'yolo' or 'voc').
    #[arg(short = 't', long = "to")]
    to: String,

    /// Source file or directory.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output directory (or `.json` file for COCO output).
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    /// Decimal places for YOLO output coordinates.
    #[arg(long, default_value_t = ir::io_yolo::DEFAULT_PRECISION)]
    yolo_precision: usize,

    /// Treat box warnings as failures for the affected input.
    #[arg(long)]
    strict: bool,

    /// Report format ('text' or 'json').
    #[arg(long, default_value = "text")]
    report: String,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Input file or directory to validate.
    input: PathBuf,

    /// Input format ('coco', 'yolo' or 'voc').
    #[arg(long)]
    format: String,

    #[command(flatten)]
    source: SourceArgs,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Options describing how to read the source dataset.
#[derive(clap::Args)]
struct SourceArgs {
    /// Class list file: one name per line, or YAML with a `names:` key.
    /// Class order for YOLO input; category order for VOC input.
    #[arg(long, value_name = "FILE")]
    classes: Option<PathBuf>,

    /// Images directory for YOLO input (defaults to a sibling `images/`).
    #[arg(long, value_name = "DIR")]
    images: Option<PathBuf>,
}

impl SourceArgs {
    fn to_options(&self) -> Result<ConvertOptions, AnnoconvError> {
        let class_names = self
            .classes
            .as_deref()
            .map(conversion::read_class_list)
            .transpose()?;
        Ok(ConvertOptions {
            class_names,
            images_dir: self.images.clone(),
            ..Default::default()
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
}

fn parse_report_format(raw: &str) -> Result<ReportFormat, AnnoconvError> {
    match raw {
        "text" => Ok(ReportFormat::Text),
        "json" => Ok(ReportFormat::Json),
        other => Err(AnnoconvError::UnsupportedFormat(format!(
            "report format '{other}' (supported: text, json)"
        ))),
    }
}

/// Run the annoconv CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), AnnoconvError> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => {
            println!("annoconv {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Convert object detection annotations between COCO, YOLO and Pascal VOC.");
            println!();
            println!("Run 'annoconv --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::new().filter_or(LOG_ENV, "info");
    // A second init (the library embedded in another binary) keeps the
    // existing logger.
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn run_convert(args: ConvertArgs) -> Result<(), AnnoconvError> {
    let from: Format = args.from.parse()?;
    let to: Format = args.to.parse()?;
    let report_format = parse_report_format(&args.report)?;

    let options = ConvertOptions {
        yolo_precision: args.yolo_precision,
        strict: args.strict,
        ..args.source.to_options()?
    };

    let outcome = conversion::convert(&args.input, from, to, &args.output, &options)?;

    match report_format {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&outcome.report)
                .map_err(AnnoconvError::ReportWrite)?;
            println!("{json}");
        }
        ReportFormat::Text => {
            println!(
                "Converted {} ({}) -> {} ({})",
                args.input.display(),
                from,
                args.output.display(),
                to
            );
            print!("{}", outcome.report);
        }
    }

    if outcome.is_complete() {
        Ok(())
    } else {
        Err(AnnoconvError::ConversionFailed {
            failed: outcome.failures.len(),
            total: outcome.report.files.seen,
        })
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), AnnoconvError> {
    let format: Format = args.format.parse()?;
    let output_format = parse_report_format(&args.output)?;
    let options = ConvertOptions {
        strict: args.strict,
        ..args.source.to_options()?
    };

    let loaded = conversion::read_dataset(&args.input, format, &options)?;
    let report = validation::validate_dataset(
        &loaded.dataset,
        &validation::ValidateOptions {
            strict: args.strict,
        },
    );

    match output_format {
        ReportFormat::Json => {
            let mut json = report.to_json_value();
            json["failed_files"] = loaded
                .failures
                .iter()
                .map(|failure| {
                    serde_json::json!({
                        "path": failure.path.display().to_string(),
                        "error": failure.error.to_string(),
                    })
                })
                .collect();
            println!("{json:#}");
        }
        ReportFormat::Text => {
            for failure in &loaded.failures {
                println!("Skipped {}: {}", failure.path.display(), failure.error);
            }
            print!("{}", report);
        }
    }

    let error_count = report.error_count() + loaded.failures.len();
    let warning_count = report.warning_count();

    if error_count > 0 || (args.strict && warning_count > 0) {
        Err(AnnoconvError::ValidationFailed {
            error_count,
            warning_count,
            report,
        })
    } else {
        Ok(())
    }
}
