//! CLI entry point for approvalguard.
//!
//! This module is intentionally thin: it handles argument parsing, I/O, and
//! exit codes. Evaluation semantics live in the library crates.

use anyhow::Context;
use approvalguard_domain::BypassActor;
use approvalguard_policy::{parse_policy_file, ParsedPolicies};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

mod evaluate;
mod input;

use input::{MergeRequestInput, SnapshotInput};

#[derive(Parser, Debug)]
#[command(
    name = "approvalguard",
    version,
    about = "Security policy evaluation for merge requests"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate policies against a merge request and emit a JSON report.
    Evaluate {
        /// Path to the policy YAML file.
        #[arg(long)]
        policies: PathBuf,

        /// Path to the merge-request JSON.
        #[arg(long)]
        merge_request: PathBuf,

        /// Path to the scan-snapshot JSON. Omitting it means no scan data
        /// has arrived yet.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Where to write the report (stdout when omitted).
        #[arg(long)]
        report_out: Option<PathBuf>,

        /// Access token id requesting a policy bypass.
        #[arg(long)]
        access_token_id: Option<u64>,

        /// Service account id requesting a policy bypass.
        #[arg(long)]
        service_account_id: Option<u64>,
    },

    /// Parse and validate a policy file without evaluating it.
    Validate {
        /// Path to the policy YAML file.
        #[arg(long)]
        policies: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Evaluate {
            policies,
            merge_request,
            snapshot,
            report_out,
            access_token_id,
            service_account_id,
        } => cmd_evaluate(
            &policies,
            &merge_request,
            snapshot.as_deref(),
            report_out.as_deref(),
            access_token_id,
            service_account_id,
        ),
        Commands::Validate { policies } => cmd_validate(&policies),
    }
}

fn cmd_evaluate(
    policies_path: &Path,
    merge_request_path: &Path,
    snapshot_path: Option<&Path>,
    report_out: Option<&Path>,
    access_token_id: Option<u64>,
    service_account_id: Option<u64>,
) -> anyhow::Result<()> {
    let parsed = load_policies(policies_path)?;
    for entry in &parsed.errors {
        eprintln!(
            "approvalguard: skipping invalid policy {} (section {}, index {}): {}",
            entry.name.as_deref().unwrap_or("<unnamed>"),
            entry.section,
            entry.index,
            entry.error
        );
    }

    let merge_request_text = std::fs::read_to_string(merge_request_path)
        .with_context(|| format!("read merge request: {}", merge_request_path.display()))?;
    let merge_request: MergeRequestInput = serde_json::from_str(&merge_request_text)
        .context("parse merge request json")?;
    let merge_request = merge_request.into();

    let snapshot = match snapshot_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read snapshot: {}", path.display()))?;
            serde_json::from_str::<SnapshotInput>(&text).context("parse snapshot json")?
        }
        None => SnapshotInput::default(),
    };

    let actor = (access_token_id.is_some() || service_account_id.is_some()).then_some(BypassActor {
        access_token_id,
        service_account_id,
    });

    let report = evaluate::evaluate_policies(
        &parsed.policies,
        &merge_request,
        &snapshot.into(),
        actor.as_ref(),
        OffsetDateTime::now_utc(),
    );

    let json = serde_json::to_string_pretty(&report).context("serialize report")?;
    match report_out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create directory: {}", parent.display()))?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("write report: {}", path.display()))?;
        }
        None => println!("{json}"),
    }

    if report.blocked {
        std::process::exit(2);
    }
    Ok(())
}

fn cmd_validate(policies_path: &Path) -> anyhow::Result<()> {
    let parsed = load_policies(policies_path)?;

    for warning in &parsed.warnings {
        eprintln!("approvalguard: warning: {warning:?}");
    }
    for entry in &parsed.errors {
        eprintln!(
            "approvalguard: invalid policy {} (section {}, index {}): {}",
            entry.name.as_deref().unwrap_or("<unnamed>"),
            entry.section,
            entry.index,
            entry.error
        );
    }

    println!(
        "{} policies parsed, {} warnings, {} errors",
        parsed.policies.len(),
        parsed.warnings.len(),
        parsed.errors.len()
    );

    if !parsed.errors.is_empty() {
        std::process::exit(2);
    }
    Ok(())
}

fn load_policies(path: &Path) -> anyhow::Result<ParsedPolicies> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read policy file: {}", path.display()))?;
    parse_policy_file(&text).context("parse policy file")
}
