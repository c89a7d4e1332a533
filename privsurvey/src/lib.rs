//! Library module for the privsurvey CLI.
//!
//! Exposes argument parsing and the command workflows so they can be tested
//! without spawning the binary. The entry point lives in `main.rs`.

pub mod output;
pub mod run;

use clap::{Args, Parser, Subcommand, ValueEnum};
use output::ReportFormat;
use privsurvey_core::logging::LogFormat;
use std::path::PathBuf;

/// Environment variable holding the Gemini API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Parser)]
#[command(name = "privsurvey")]
#[command(about = "Database column privacy classification tool")]
#[command(version)]
#[command(long_about = "
privsurvey - classify database columns into privacy-data categories

Deterministic rules resolve well-known columns first. Everything else is
deduplicated, checked against a local cache and sent in bounded batches to a
remote AI classifier. Only column names, declared types and sample shape
digests leave the host.

CATEGORIES:
  direct_identifier, quasi_identifier, sensitive_attribute, non_personal, unknown

SUPPORTED SOURCES:
- JSON schema files (*.json)
- SQLite (sqlite:// or .db/.sqlite files)
- MySQL (mysql://) [if compiled with --features mysql]

ENVIRONMENT:
  GEMINI_API_KEY   API key for the remote classifier (rules and cache only if unset)
  DATABASE_URL     Default schema source

EXAMPLES:
  privsurvey classify sqlite://./app.db --output report.md
  privsurvey classify schema.json --rules-only
  privsurvey cache stats
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify every column of a schema source
    Classify(ClassifyArgs),
    /// Print the effective ruleset
    Rules,
    /// Inspect or purge the classification cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Read a schema source and print table and column counts
    Test(TestArgs),
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove expired entries, or every entry with --all
    Purge {
        /// Remove every entry
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Schema source
    #[arg(
        env = "DATABASE_URL",
        help = "Schema source: .json file, sqlite: URL or mysql:// URL (credentials are redacted in logs)"
    )]
    pub source: String,

    /// Output file path
    #[arg(short, long, default_value = "privsurvey-report.json")]
    pub output: PathBuf,

    /// Output format (inferred from the output extension if omitted)
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Cache file path
    #[arg(long, value_name = "FILE")]
    pub cache_path: Option<PathBuf>,

    /// Do not read or write the cache file
    #[arg(long)]
    pub no_cache: bool,

    /// Skip the remote classifier; unresolved columns become unknown
    #[arg(long)]
    pub rules_only: bool,

    /// Columns per remote request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Concurrent remote requests
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Sample values read per column (0 disables sampling)
    #[arg(long)]
    pub sample_size: Option<u32>,
}

impl ClassifyArgs {
    /// Arguments for `source` with every option at its default.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: PathBuf::from("privsurvey-report.json"),
            format: None,
            cache_path: None,
            no_cache: false,
            rules_only: false,
            batch_size: None,
            max_concurrency: None,
            sample_size: None,
        }
    }

    /// Explicit format, or the one implied by the output path.
    pub fn report_format(&self) -> ReportFormat {
        self.format
            .unwrap_or_else(|| ReportFormat::from_path(&self.output))
    }
}

#[derive(Debug, Args)]
pub struct TestArgs {
    /// Schema source
    #[arg(env = "DATABASE_URL", help = "Schema source to read")]
    pub source: String,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormatArg,

    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "PRIVSURVEY_CONFIG",
        value_name = "FILE",
        help = "TOML configuration file (defaults apply when omitted)"
    )]
    pub config: Option<PathBuf>,
}

/// Log format as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
