//! Dataset validation orchestration (spec.md §4.J) and run summary (§4.K).
//!
//! Wires together every engine crate in the order the spec lays out: load
//! the schema, build the file tree, seed the rules record, walk every file
//! running the filename/content checks, reconcile directory rules, then
//! filter and format the accumulated issues. Nothing here re-implements a
//! check already owned by another crate — this crate only sequences them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use psychds_content::{CompiledRule, ContentContext};
use psychds_csv::CsvTable;
use psychds_diagnostics::{IssueStore, IssuesOutput};
use psychds_filename::{FilenameContext, FilenameParts};
use psychds_ignore::IgnoreMatcher;
use psychds_inherit::ResolvedSidecar;
use psychds_schema::{RuleNode, Schema, SchemaOrgVocab, SchemaSource};
use psychds_tree::{build_tree, FileNode, FileTree, StdFs, TreeError};
use serde::Serialize;
use thiserror::Error;

/// Catastrophic validator failures (spec.md §7 kind 3). Everything else —
/// a bad file, a bad sidecar, a network hiccup fetching the schema — is
/// recovered locally and surfaces as an issue, not an `Err`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// What the caller asked for (spec.md §6's CLI surface, minus the parts
/// that only affect how results are displayed).
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    pub schema_source: SchemaSource,
}

/// Root-level dataset facts available before the file walk starts (spec.md
/// §3 "Dataset context").
#[derive(Debug, Clone, Default)]
pub struct DatasetContext {
    pub dataset_description: Option<serde_json::Value>,
    pub base_dirs: Vec<String>,
}

/// The run summary (spec.md §4.K / §6 `summary`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_files: usize,
    pub size: u64,
    /// Always `false`: this validator checks structure and metadata, it
    /// never reads data files for statistical content (spec.md Non-goals).
    pub data_processed: bool,
    pub data_types: Vec<String>,
    pub schema_version: String,
    pub suggested_columns: Vec<String>,
}

/// The full result of a validation run (spec.md §6 output payload).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: IssuesOutput,
    pub summary: Summary,
}

/// Validate the dataset rooted at `root` (spec.md §4.J).
///
/// # Errors
///
/// Returns [`CoreError::Tree`] only if `root` itself cannot be listed —
/// every other recoverable failure is folded into the returned issues.
pub async fn validate(
    root: &Path,
    options: &ValidatorOptions,
    client: &reqwest::Client,
) -> Result<ValidationResult, CoreError> {
    let schema = psychds_schema::load(&options.schema_source, client).await;
    let mut store = IssueStore::new();

    let ignore = build_ignore_matcher(root);
    let tree = build_tree(&StdFs, root, &ignore)?;

    let dataset_ctx = DatasetContext {
        dataset_description: tree
            .files
            .iter()
            .find(|f| f.name == "dataset_description.json")
            .and_then(|f| f.expanded.clone()),
        base_dirs: tree.base_dirs(),
    };

    let mut rules_record = psychds_filename::seed_rules_record(&schema);
    let compiled_rules = psychds_content::compile(&schema);
    let org = schema.org_vocab();

    let mut accum = Accumulator::default();

    for file in tree.walk() {
        promote_deferred_issues(&schema, file, &mut store);
        if file.ignored {
            continue;
        }
        accum.total_files += 1;
        accum.total_size += file.size;
        process_file(
            &schema,
            &org,
            &compiled_rules,
            &tree,
            file,
            &mut rules_record,
            &mut accum,
            &mut store,
        )
        .await;
    }

    psychds_filename::reconcile_directory_rules(&schema, &dataset_ctx.base_dirs, &mut rules_record);
    emit_missing_rule_issues(&schema, &rules_record, &mut store);

    store.filter_issues(&rules_record);

    let summary = Summary {
        total_files: accum.total_files,
        size: accum.total_size,
        data_processed: false,
        data_types: accum.data_types.into_iter().collect(),
        schema_version: schema
            .get("schema_version")
            .as_typed::<String>()
            .unwrap_or_else(|| "unknown".to_string()),
        suggested_columns: accum.suggested_columns.into_iter().collect(),
    };

    Ok(ValidationResult {
        valid: !store.has_errors(),
        issues: store.format_output(),
        summary,
    })
}

/// Running totals accumulated while walking the tree (spec.md §4.K).
#[derive(Debug, Default)]
struct Accumulator {
    total_files: usize,
    total_size: u64,
    data_types: BTreeSet<String>,
    suggested_columns: BTreeSet<String>,
}

/// Read `.psychdsignore` at the dataset root directly (before any tree
/// exists to read it from) and build the matcher. A malformed pattern or
/// unreadable root falls back to the default-only matcher — ignore-list
/// problems are never fatal (spec.md §4.B, §7).
fn build_ignore_matcher(root: &Path) -> IgnoreMatcher {
    let lines = std::fs::read_to_string(root.join(".psychdsignore"))
        .map(|text| text.lines().map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    IgnoreMatcher::new(root, &lines).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "invalid .psychdsignore pattern, using default excludes only");
        IgnoreMatcher::new(root, &[]).unwrap_or_else(|err| {
            panic!("default-only ignore matcher must always build: {err}")
        })
    })
}

fn promote_deferred_issues(schema: &Schema, file: &FileNode, store: &mut IssueStore) {
    for deferred in &file.issue_info {
        let key = match deferred.code.as_str() {
            "InvalidJsonFormatting" => "INVALID_JSON_FORMATTING",
            "InvalidJsonldSyntax" => "INVALID_JSONLD_SYNTAX",
            other => other,
        };
        store.add_schema_issue(
            schema.error_template(key).as_ref(),
            vec![psychds_diagnostics::evidence_for(file.path.as_ref())
                .with_evidence(deferred.detail.clone())],
        );
    }
}

/// The first path segment under the root, or `"/"` for a file directly at
/// the root (spec.md §3 "Per-file context" `baseDir`).
fn base_dir_of(path: &str) -> String {
    match path.trim_start_matches('/').split_once('/') {
        Some((first, _)) => first.to_string(),
        None => "/".to_string(),
    }
}

/// Run the filename identify/validate pair, then the content rule engine,
/// for one file (spec.md §4.J step 4's per-file ordering: empty-file →
/// filename identify → filename validate → content rule engine). The
/// empty-file check only gates the content rule engine: identify/validate
/// still run for a zero-byte file so a required file that happens to be
/// empty correctly flips its `rules_record` entry and isn't reported as
/// missing.
#[allow(clippy::too_many_arguments)]
async fn process_file(
    schema: &Schema,
    org: &SchemaOrgVocab,
    compiled_rules: &[CompiledRule],
    tree: &FileTree,
    file: &FileNode,
    rules_record: &mut BTreeMap<String, bool>,
    accum: &mut Accumulator,
    store: &mut IssueStore,
) {
    let parts = psychds_filename::split_filename(&file.name);
    let base_dir = base_dir_of(&file.path);
    let fctx = FilenameContext {
        path: &file.path,
        name: &file.name,
        base_dir: &base_dir,
        extension: &parts.extension,
        suffix: &parts.suffix,
        keywords: &parts.keywords,
    };

    let matched = psychds_filename::identify(schema, &fctx, rules_record, store);
    psychds_filename::validate(schema, &fctx, &matched, store);

    if matched.iter().any(|p| p == "rules.files.data.Datafile") {
        accum.data_types.insert(parts.extension.clone());
    }

    if file.size == 0 {
        // Nothing to read from an empty file's contents.
        return;
    }

    let (sidecar, (csv_table, csv_issues)) = tokio::join!(
        resolve_sidecar(tree, &file.path),
        read_csv_columns(schema, file, &parts)
    );
    merge_store(store, csv_issues);

    for header in &csv_table.headers {
        accum.suggested_columns.insert(header.clone());
    }

    let content_ctx = ContentContext {
        path: &file.path,
        extension: &parts.extension,
        suffix: &parts.suffix,
        base_dir: &base_dir,
        keywords: &parts.keywords,
        sidecar: &sidecar.expanded,
        provenance: &sidecar.provenance,
        valid_columns: &sidecar.valid_columns,
        columns: &csv_table.columns,
    };
    psychds_content::run(schema, org, compiled_rules, &content_ctx, store);
}

async fn resolve_sidecar(tree: &FileTree, data_file_path: &str) -> ResolvedSidecar {
    psychds_inherit::resolve(tree, data_file_path)
}

async fn read_csv_columns(
    schema: &Schema,
    file: &FileNode,
    parts: &FilenameParts,
) -> (CsvTable, IssueStore) {
    let mut scratch = IssueStore::new();
    if parts.extension != ".csv" {
        return (CsvTable::default(), scratch);
    }
    let Some(text) = &file.text else {
        return (CsvTable::default(), scratch);
    };
    let table = psychds_csv::read(schema, text, &file.path, &mut scratch);
    (table, scratch)
}

/// Fold a scratch store's issues into the main store, preserving code,
/// severity and `requires` (used for the per-file CSV scratch store, spec.md
/// §5's intra-file concurrency model: the CSV read runs alongside sidecar
/// resolution, so its issues land in their own store until the join
/// completes).
fn merge_store(dest: &mut IssueStore, src: IssueStore) {
    for issue in src.iter() {
        dest.add(
            issue.code.clone(),
            issue.reason.clone(),
            issue.severity,
            issue.requires.clone(),
            issue.files().cloned(),
        );
    }
}

/// Emit the schema-defined issue for every rule path that never fired
/// (spec.md §4.J step 6). Rules with no `missingIssue` name an optional
/// file and are silently left unmatched.
fn emit_missing_rule_issues(
    schema: &Schema,
    rules_record: &BTreeMap<String, bool>,
    store: &mut IssueStore,
) {
    let nodes = schema.file_rule_nodes();
    for (path, fired) in rules_record {
        if *fired {
            continue;
        }
        let missing_issue = nodes.iter().find_map(|(p, node)| {
            if p != path {
                return None;
            }
            match node {
                RuleNode::File(rule) => rule.missing_issue.clone(),
                RuleNode::Directory(rule) => rule.missing_issue.clone(),
                RuleNode::Content(_) => None,
            }
        });
        if let Some(code) = missing_issue {
            store.add_schema_issue(schema.error_template(&code).as_ref(), vec![]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[tokio::test]
    async fn well_formed_dataset_is_valid_with_no_errors() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context":{"@vocab":"https://schema.org/"},"@type":"Dataset","name":"x","description":"d","variableMeasured":["a"],"license":"CC0"}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("README.md"), "# hi").unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/sub-01_data.csv"), "a\n1\n").unwrap();

        let options = ValidatorOptions::default();
        let result = validate(tmp.path(), &options, &client()).await.unwrap();

        assert!(result.valid, "unexpected errors: {:?}", result.issues.errors);
        assert_eq!(result.summary.total_files, 3);
        assert!(result.summary.suggested_columns.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn missing_dataset_description_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/sub-01_data.csv"), "a\n1\n").unwrap();

        let options = ValidatorOptions::default();
        let result = validate(tmp.path(), &options, &client()).await.unwrap();

        assert!(!result.valid);
        assert!(result
            .issues
            .errors
            .iter()
            .any(|i| i.key == "MISSING_DATASET_DESCRIPTION"));
    }

    #[tokio::test]
    async fn missing_root_directory_is_fatal() {
        let options = ValidatorOptions::default();
        let result = validate(Path::new("/definitely/not/a/real/path"), &options, &client()).await;
        assert!(matches!(result, Err(CoreError::Tree(_))));
    }

    #[tokio::test]
    async fn unmatched_file_produces_not_included() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context":{"@vocab":"https://schema.org/"},"@type":"Dataset","name":"x","description":"d","variableMeasured":["a"],"license":"CC0"}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("junk.xyz"), "whatever").unwrap();

        let options = ValidatorOptions::default();
        let result = validate(tmp.path(), &options, &client()).await.unwrap();

        assert!(result.issues.errors.iter().any(|i| i.key == "NOT_INCLUDED"));
    }

    #[tokio::test]
    async fn empty_required_file_still_satisfies_its_rule() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context":{"@vocab":"https://schema.org/"},"@type":"Dataset","name":"x","description":"d","variableMeasured":["a"],"license":"CC0"}"#,
        )
        .unwrap();
        // An empty README still names the required file; it must not be
        // reported as missing just because it has no content to check.
        fs::write(tmp.path().join("README.md"), "").unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/sub-01_data.csv"), "a\n1\n").unwrap();

        let options = ValidatorOptions::default();
        let result = validate(tmp.path(), &options, &client()).await.unwrap();

        assert!(!result
            .issues
            .errors
            .iter()
            .any(|i| i.key == "MISSING_README_DOC"));
    }
}
