//! Cohort CLI - Command-line interface for Synheart Cohort
//!
//! Commands:
//! - evaluate: Classify students and print the cohort report
//! - validate: Report check-in and consult records that fail validation
//! - config: Print the effective engine configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use synheart_cohort::schema::{RawDocument, RecordAdapter, ValidationIssue};
use synheart_cohort::{CohortEngine, EngineConfig, InMemoryRepository, Scope};
use synheart_cohort::{COHORT_VERSION, PRODUCER_NAME};

/// Cohort - Tiered wellbeing screening for student cohorts
#[derive(Parser)]
#[command(name = "cohort")]
#[command(author = "Synheart AI Inc")]
#[command(version = COHORT_VERSION)]
#[command(about = "Classify student check-ins into risk tiers and summarize by class", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify students and print the cohort report
    Evaluate {
        /// Check-in records (use - for stdin)
        #[arg(long)]
        checkins: PathBuf,

        /// Consult messages
        #[arg(long)]
        consults: Option<PathBuf>,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Engine configuration (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Evaluation instant (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<String>,

        /// Restrict to one cohort/group
        #[arg(long)]
        group: Option<String>,

        /// Restrict to one class
        #[arg(long)]
        class: Option<String>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print the report (default when writing to a terminal)
        #[arg(long)]
        pretty: bool,
    },

    /// Report records that fail validation
    Validate {
        /// Check-in records (use - for stdin)
        #[arg(long)]
        checkins: Option<PathBuf>,

        /// Consult messages
        #[arg(long)]
        consults: Option<PathBuf>,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective engine configuration
    Config {
        /// Configuration file to check; defaults are printed when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CohortCliError> {
    match cli.command {
        Commands::Evaluate {
            checkins,
            consults,
            input_format,
            config,
            now,
            group,
            class,
            output,
            pretty,
        } => {
            let scope = Scope {
                group_id: group,
                class_id: class,
            };
            cmd_evaluate(EvaluateArgs {
                checkins: &checkins,
                consults: consults.as_deref(),
                input_format,
                config: config.as_deref(),
                now: now.as_deref(),
                scope,
                output: &output,
                pretty,
            })
        }

        Commands::Validate {
            checkins,
            consults,
            input_format,
            json,
        } => cmd_validate(checkins.as_deref(), consults.as_deref(), input_format, json),

        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

struct EvaluateArgs<'a> {
    checkins: &'a Path,
    consults: Option<&'a Path>,
    input_format: InputFormat,
    config: Option<&'a Path>,
    now: Option<&'a str>,
    scope: Scope,
    output: &'a Path,
    pretty: bool,
}

fn cmd_evaluate(args: EvaluateArgs<'_>) -> Result<(), CohortCliError> {
    let config = load_config(args.config)?;
    let now = parse_now(args.now)?;

    let checkins = read_documents(args.checkins, args.input_format)?;
    let consults = match args.consults {
        Some(path) => read_documents(path, args.input_format)?,
        None => Vec::new(),
    };
    if checkins.is_empty() {
        return Err(CohortCliError::NoRecords);
    }

    let repository = InMemoryRepository::new(checkins, consults);
    let engine = CohortEngine::new(repository, config)?;
    let report = engine.evaluate(&args.scope, now)?;

    let to_stdout = is_stdio(args.output);
    let pretty = args.pretty || (to_stdout && atty::is(atty::Stream::Stdout));
    let rendered = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };

    if to_stdout {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", rendered)?;
    } else {
        fs::write(args.output, format!("{}\n", rendered))?;
    }

    Ok(())
}

fn cmd_validate(
    checkins: Option<&Path>,
    consults: Option<&Path>,
    input_format: InputFormat,
    json: bool,
) -> Result<(), CohortCliError> {
    if checkins.is_none() && consults.is_none() {
        return Err(CohortCliError::NoRecords);
    }

    let config = EngineConfig::default();
    let adapter = RecordAdapter::new(&config);

    let mut sections = Vec::new();
    if let Some(path) = checkins {
        let documents = read_documents(path, input_format)?;
        let issues = adapter.validate_checkins(&documents);
        sections.push(ValidationSection::new("checkins", documents.len(), &issues));
    }
    if let Some(path) = consults {
        let documents = read_documents(path, input_format)?;
        let issues = adapter.validate_consults(&documents);
        sections.push(ValidationSection::new("consults", documents.len(), &issues));
    }

    let invalid: usize = sections.iter().map(|s| s.invalid_records).sum();
    let report = ValidationReport {
        producer: PRODUCER_NAME.to_string(),
        version: COHORT_VERSION.to_string(),
        sections,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        for section in &report.sections {
            println!();
            println!("{}:", section.collection);
            println!("  Total records:   {}", section.total_records);
            println!("  Valid records:   {}", section.valid_records);
            println!("  Invalid records: {}", section.invalid_records);
            for err in &section.errors {
                println!("    - index {}: {}", err.index, err.error);
            }
        }
    }

    if invalid > 0 {
        Err(CohortCliError::ValidationFailed(invalid))
    } else {
        Ok(())
    }
}

fn cmd_config(path: Option<&Path>) -> Result<(), CohortCliError> {
    let config = load_config(path)?;
    println!("{}", config.to_json()?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, CohortCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>, CohortCliError> {
    match now {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CohortCliError::InvalidNow(format!("{}: {}", text, e))),
        None => Ok(Utc::now()),
    }
}

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_documents(path: &Path, format: InputFormat) -> Result<Vec<RawDocument>, CohortCliError> {
    let data = if is_stdio(path) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };

    let documents = match format {
        InputFormat::Ndjson => RecordAdapter::parse_ndjson(&data)?,
        InputFormat::Json => RecordAdapter::parse_array(&data)?,
    };
    Ok(documents)
}

// Error types

enum CohortCliError {
    Io(io::Error),
    Engine(synheart_cohort::EngineError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    InvalidNow(String),
}

impl From<io::Error> for CohortCliError {
    fn from(e: io::Error) -> Self {
        CohortCliError::Io(e)
    }
}

impl From<synheart_cohort::EngineError> for CohortCliError {
    fn from(e: synheart_cohort::EngineError) -> Self {
        CohortCliError::Engine(e)
    }
}

impl From<serde_json::Error> for CohortCliError {
    fn from(e: serde_json::Error) -> Self {
        CohortCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CohortCliError> for CliError {
    fn from(e: CohortCliError) -> Self {
        use synheart_cohort::EngineError;

        match e {
            CohortCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CohortCliError::Engine(EngineError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg,
                hint: Some("Run 'cohort config' to see the defaults".to_string()),
            },
            CohortCliError::Engine(EngineError::Repository(e)) => CliError {
                code: "REPOSITORY_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CohortCliError::Engine(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check input format (--input-format ndjson|json)".to_string()),
            },
            CohortCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CohortCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Pass --checkins with a non-empty file".to_string()),
            },
            CohortCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Invalid records are skipped by 'cohort evaluate'".to_string()),
            },
            CohortCliError::InvalidNow(msg) => CliError {
                code: "INVALID_NOW".to_string(),
                message: msg,
                hint: Some("Use RFC 3339, e.g. 2025-11-14T08:30:00+09:00".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    producer: String,
    version: String,
    sections: Vec<ValidationSection>,
}

#[derive(serde::Serialize)]
struct ValidationSection {
    collection: &'static str,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

impl ValidationSection {
    fn new(collection: &'static str, total: usize, issues: &[ValidationIssue]) -> Self {
        Self {
            collection,
            total_records: total,
            valid_records: total - issues.len(),
            invalid_records: issues.len(),
            errors: issues
                .iter()
                .map(|issue| ValidationErrorDetail {
                    index: issue.index,
                    error: issue.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}
