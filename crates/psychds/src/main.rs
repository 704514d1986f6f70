//! `psychds` — command-line validator for Psych-DS datasets (spec.md §6).

use std::path::PathBuf;
use std::process::ExitCode;

use bpaf::Bpaf;
use psychds_cli_common::{cli_global_options, setup_tracing, CLIGlobalOptions};
use psychds_core::{ValidationResult, ValidatorOptions};
use psychds_diagnostics::IssueOutput;
use psychds_schema::SchemaSource;

const SCHEMA_ENV_VAR: &str = "psychDS_SCHEMA";

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
/// Validate a Psych-DS dataset directory against the Psych-DS schema
struct Cli {
    #[bpaf(external(cli_global_options))]
    global: CLIGlobalOptions,

    /// Print the output payload as JSON instead of a human-readable report
    #[bpaf(long("json"), switch)]
    json: bool,

    /// Schema version (e.g. "0.5.0") or a fully-qualified schema URL
    #[bpaf(short('s'), long("schema"), argument("VERSION_OR_URL"))]
    schema: Option<String>,

    /// Root directory of the dataset to validate
    #[bpaf(positional("dataset_directory"))]
    dataset_directory: PathBuf,
}

fn resolve_schema_source(explicit: Option<String>) -> SchemaSource {
    let raw = explicit
        .or_else(|| std::env::var(SCHEMA_ENV_VAR).ok())
        .unwrap_or_else(|| "latest".to_string());
    SchemaSource::parse(&raw)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli().run();
    setup_tracing(&args.global);

    let options = ValidatorOptions {
        schema_source: resolve_schema_source(args.schema),
    };
    let client = reqwest::Client::new();

    let result = match psychds_core::validate(&args.dataset_directory, &options, &client).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "validation could not run to completion");
            catastrophic_result(&err)
        }
    };

    if args.json {
        print_json(&result);
    } else {
        print_human(&result, args.global.show_warnings, args.global.verbose);
    }

    // Per spec.md §6: validation failure is encoded in the output payload,
    // not the process exit code.
    ExitCode::SUCCESS
}

/// Synthesize a result for a catastrophic failure (spec.md §7 kind 3) so the
/// output payload shape stays uniform even when the walk never started.
fn catastrophic_result(err: &psychds_core::CoreError) -> ValidationResult {
    use psychds_diagnostics::{IssuesOutput, Severity};

    ValidationResult {
        valid: false,
        issues: IssuesOutput {
            errors: vec![IssueOutput {
                key: "CATASTROPHIC_FAILURE".to_string(),
                severity: Severity::Error,
                reason: err.to_string(),
                help_url: None,
                files: Vec::new(),
            }],
            warnings: Vec::new(),
        },
        summary: psychds_core::Summary {
            total_files: 0,
            size: 0,
            data_processed: false,
            data_types: Vec::new(),
            schema_version: "unknown".to_string(),
            suggested_columns: Vec::new(),
        },
    }
}

fn print_json(result: &ValidationResult) {
    match serde_json::to_string_pretty(result) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to serialize output payload: {err}"),
    }
}

fn print_human(result: &ValidationResult, show_warnings: bool, verbose: bool) {
    if result.valid {
        println!("Dataset is valid.");
    } else {
        println!("Dataset is invalid.");
    }

    for issue in &result.issues.errors {
        print_issue(issue, "error");
    }
    if show_warnings {
        for issue in &result.issues.warnings {
            print_issue(issue, "warning");
        }
    }

    if verbose {
        println!();
        println!("Summary:");
        println!("  files scanned: {}", result.summary.total_files);
        println!("  total size:    {} bytes", result.summary.size);
        println!("  schema:        {}", result.summary.schema_version);
        if !result.summary.data_types.is_empty() {
            println!("  data types:    {}", result.summary.data_types.join(", "));
        }
        if !result.summary.suggested_columns.is_empty() {
            println!(
                "  columns seen:  {}",
                result.summary.suggested_columns.join(", ")
            );
        }
    }
}

fn print_issue(issue: &IssueOutput, kind: &str) {
    println!("[{kind}] {}: {}", issue.key, issue.reason);
    for file in &issue.files {
        match &file.evidence {
            Some(evidence) => println!("    {} ({evidence})", file.path),
            None => println!("    {}", file.path),
        }
    }
}
