//! Database column privacy classification tool.
//!
//! Reads a schema, resolves what deterministic rules can, classifies the
//! remaining columns through a cached, batched remote classifier and writes a
//! JSON or Markdown report.
//!
//! # Data Handling Guarantees
//! - Schema sources are read-only
//! - Only column names, declared types and sample shape digests leave the host
//! - API keys and database passwords are never logged

use anyhow::Context;
use clap::Parser;
use privsurvey::run;
use privsurvey::{Cli, Command};
use privsurvey_core::logging::init_logging;
use privsurvey_core::{PrivSurveyError, initialize_report_validator};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.log_format.into(),
    )?;

    initialize_report_validator().context("Failed to initialize report validator")?;

    let config = run::load_config(cli.global.config.as_deref()).await?;

    match &cli.command {
        Command::Classify(args) => {
            let config = run::apply_overrides(config, args)?;
            let remote = run::build_classifier(
                &config.classifier,
                run::api_key_from_env(),
                args.rules_only,
            );

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after saving the cache");
                    trigger.cancel();
                }
            });

            match run::classify(args, &config, remote, &cancel).await {
                Ok(report) => {
                    if !cli.global.quiet {
                        run::print_summary(&report, &args.output);
                    }
                    Ok(())
                }
                Err(PrivSurveyError::Cancelled) => {
                    eprintln!("Classification cancelled; completed classifications were cached");
                    std::process::exit(130);
                }
                Err(e) => {
                    error!("Classification failed: {}", e);
                    Err(e.into())
                }
            }
        }
        Command::Rules => {
            for line in run::describe_rules(&config)? {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Cache { action } => {
            for line in run::cache_command(&config, action).await? {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Test(args) => {
            let schema = run::test_source(&args.source, &config)
                .await
                .context("Schema source test failed")?;
            println!("Database: {}", schema.database_name());
            println!("Tables: {}", schema.tables().len());
            println!("Columns: {}", schema.column_count());
            for warning in schema.warnings() {
                println!("Warning: {}", warning);
            }
            Ok(())
        }
    }
}
