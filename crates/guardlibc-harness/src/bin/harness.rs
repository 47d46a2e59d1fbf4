//! CLI entrypoint for the guardlibc conformance harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use guardlibc_harness::structured_log::validate_log_file;
use guardlibc_harness::{HarnessError, SuiteConfig, run_suite, verify_artifacts};

/// Conformance tooling for guardlibc.
#[derive(Debug, Parser)]
#[command(name = "guardlibc-harness")]
#[command(about = "Conformance testing harness for the guardlibc wrappers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the conformance cases against the live C library.
    Conformance {
        /// Structured JSONL log path (appended to).
        #[arg(long, default_value = "target/guardlibc/conformance.jsonl")]
        log: PathBuf,
        /// Output report path (markdown).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Output report path (JSON).
        #[arg(long)]
        json: Option<PathBuf>,
        /// Write a SHA-256 index of the outputs here.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
        /// Only run cases whose name contains this.
        #[arg(long)]
        filter: Option<String>,
        /// Run identifier used as the trace id prefix.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Validate every line of a structured log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
    /// Re-hash the files listed in an artifact index.
    VerifyArtifacts {
        #[arg(long)]
        index: PathBuf,
    },
}

fn main() -> Result<(), HarnessError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Conformance {
            log,
            report,
            json,
            artifact_index,
            filter,
            run_id,
        } => {
            let run_id = run_id.unwrap_or_else(|| format!("conformance-{}", std::process::id()));
            let config = SuiteConfig {
                run_id,
                log,
                report_md: report,
                report_json: json,
                artifact_index,
                filter,
            };
            let report = run_suite(&config)?;
            for r in report.results.iter().filter(|r| !r.passed) {
                eprintln!(
                    "FAIL {}: {}",
                    r.name,
                    r.detail.as_deref().unwrap_or("no detail")
                );
            }
            eprintln!(
                "{}/{} passed, log at {}",
                report.summary.passed,
                report.summary.total,
                config.log.display()
            );
            if report.summary.failed > 0 {
                return Err(HarnessError::CasesFailed {
                    failed: report.summary.failed,
                    total: report.summary.total,
                });
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(HarnessError::InvalidLog {
                    lines,
                    errors: errors.len(),
                });
            }
            eprintln!("{lines} line(s) valid");
        }
        Command::VerifyArtifacts { index } => {
            let count = verify_artifacts(&index)?;
            eprintln!("{count} artifact(s) verified");
        }
    }

    Ok(())
}
