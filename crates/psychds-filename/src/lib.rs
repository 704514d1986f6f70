//! Filename identification and validation (spec.md §4.E, §4.F).
//!
//! Two passes over the same per-file facts: [`identify`] decides which
//! file-naming rules a file matches, [`validate`] checks the matched
//! rule(s) for extension/keyword problems and collapses ambiguity when more
//! than one rule matched.

use std::collections::BTreeMap;

use psychds_diagnostics::{evidence_for, FileEvidence, IssueStore};
use psychds_schema::{FileRule, RuleNode, Schema};
use regex::Regex;

/// A filename split into its keyword/suffix/extension parts (spec.md §3
/// "Per-file context").
#[derive(Debug, Clone, Default)]
pub struct FilenameParts {
    pub keywords: BTreeMap<String, String>,
    pub suffix: String,
    pub extension: String,
}

/// Split `name` (the base filename, no directory component) into keywords,
/// suffix and extension, per the glossary's `key-value(_key-value)*_suffix.ext`
/// shape. Files with no extension (`README`, `.psychdsignore`) yield `""`.
#[must_use]
pub fn split_filename(name: &str) -> FilenameParts {
    let extension = extract_extension(name);
    let stem = &name[..name.len() - extension.len()];
    let segments: Vec<&str> = stem.split('_').collect();
    let suffix = segments.last().copied().unwrap_or("").to_string();

    let mut keywords = BTreeMap::new();
    for seg in &segments[..segments.len().saturating_sub(1)] {
        if let Some((k, v)) = seg.split_once('-') {
            keywords.insert(k.to_lowercase(), v.to_string());
        }
    }

    FilenameParts {
        keywords,
        suffix,
        extension,
    }
}

/// `path.extname`-style rule: a leading dot with no other dot in the name
/// does not count as an extension (`.psychdsignore` has none).
fn extract_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx..].to_string(),
    }
}

/// The facts a file-naming rule is matched and validated against.
#[derive(Debug, Clone)]
pub struct FilenameContext<'a> {
    /// Root-relative path, e.g. `/data/sub-01_data.csv`.
    pub path: &'a str,
    pub name: &'a str,
    pub base_dir: &'a str,
    pub extension: &'a str,
    pub suffix: &'a str,
    pub keywords: &'a BTreeMap<String, String>,
}

/// Seed the rules record with every file-naming and directory rule path,
/// all starting `false` (spec.md §4.J step 3).
#[must_use]
pub fn seed_rules_record(schema: &Schema) -> BTreeMap<String, bool> {
    schema
        .file_rule_nodes()
        .into_iter()
        .filter(|(_, node)| matches!(node, RuleNode::File(_) | RuleNode::Directory(_)))
        .map(|(path, _)| (path, false))
        .collect()
}

/// Flip directory rules to `true` when their `path` appears among the
/// dataset's top-level directories (spec.md §4.E, post-walk reconciliation).
pub fn reconcile_directory_rules(
    schema: &Schema,
    base_dirs: &[String],
    rules_record: &mut BTreeMap<String, bool>,
) {
    for (path, node) in schema.file_rule_nodes() {
        let RuleNode::Directory(rule) = node else {
            continue;
        };
        if base_dirs.iter().any(|d| d == &rule.path) {
            rules_record.insert(path, true);
        }
    }
}

/// Walk `rules.files`, returning every rule path whose file-naming rule
/// matches `ctx`. Flips each matched path to `true` in `rules_record`, and
/// emits `NotIncluded`/`WrongMetadataLocation` as appropriate (spec.md §4.E).
pub fn identify(
    schema: &Schema,
    ctx: &FilenameContext<'_>,
    rules_record: &mut BTreeMap<String, bool>,
    store: &mut IssueStore,
) -> Vec<String> {
    let mut matched = Vec::new();
    for (path, node) in schema.file_rule_nodes() {
        if let RuleNode::File(rule) = node {
            if file_rule_matches(&rule, ctx) {
                rules_record.insert(path.clone(), true);
                matched.push(path);
            }
        }
    }

    if matched.is_empty() && ctx.name != ".psychdsignore" {
        store.add_schema_issue(
            schema.error_template("NOT_INCLUDED").as_ref(),
            vec![evidence_for_path(ctx.path)],
        );
    }

    if ctx.name == "dataset_description.json" && ctx.path != "/dataset_description.json" {
        store.add_schema_issue(
            schema.error_template("WRONG_METADATA_LOCATION").as_ref(),
            vec![evidence_for_path(ctx.path)],
        );
    }

    matched
}

fn file_rule_matches(rule: &FileRule, ctx: &FilenameContext<'_>) -> bool {
    let base_dir_ok = if rule.arbitrary_nesting {
        ctx.base_dir == rule.base_dir
    } else {
        let expected = if rule.base_dir == "/" {
            format!("/{}", ctx.name)
        } else {
            format!("/{}/{}", rule.base_dir, ctx.name)
        };
        ctx.path == expected
    };
    if !base_dir_ok {
        return false;
    }
    if !rule.extensions.iter().any(|e| e == ctx.extension) {
        return false;
    }
    match (&rule.suffix, &rule.stem) {
        (Some(suffix), _) => ctx.suffix == *suffix,
        (None, Some(stem)) => ctx.name.starts_with(stem.as_str()),
        (None, None) => false,
    }
}

/// Run the extension/keyword checks for `matched_rules`, collapsing
/// ambiguity when more than one rule matched (spec.md §4.F).
pub fn validate(
    schema: &Schema,
    ctx: &FilenameContext<'_>,
    matched_rules: &[String],
    store: &mut IssueStore,
) {
    match matched_rules {
        [] => {}
        [only] => run_checks(schema, ctx, only, store),
        many => {
            let clean = many
                .iter()
                .find(|path| {
                    let mut scratch = IssueStore::new();
                    run_checks(schema, ctx, path, &mut scratch);
                    scratch.is_empty()
                });
            match clean {
                Some(path) => run_checks(schema, ctx, path, store),
                None => {
                    let evidence =
                        evidence_for_path(ctx.path).with_evidence(many.join(", "));
                    store.add_schema_issue(
                        schema.error_template("ALL_FILENAME_RULES_HAVE_ISSUES").as_ref(),
                        vec![evidence],
                    );
                }
            }
        }
    }
}

fn run_checks(schema: &Schema, ctx: &FilenameContext<'_>, rule_path: &str, store: &mut IssueStore) {
    let Some(rule) = schema.get(rule_path).as_typed::<FileRule>() else {
        return;
    };

    if !rule.extensions.iter().any(|e| e == ctx.extension) {
        store.add_schema_issue(
            schema.error_template("EXTENSION_MISMATCH").as_ref(),
            vec![evidence_for_path(ctx.path).with_evidence(rule_path.to_string())],
        );
    }

    if rule.uses_keywords {
        let matches_regex = rule
            .file_regex
            .as_deref()
            .and_then(|pattern| Regex::new(pattern).ok())
            .is_some_and(|re| re.is_match(ctx.name));
        if !matches_regex {
            store.add_schema_issue(
                schema.error_template("KEYWORD_FORMATTING_ERROR").as_ref(),
                vec![evidence_for_path(ctx.path)],
            );
        }

        let official: Vec<String> = schema
            .get("rules.keywords")
            .as_typed::<Vec<String>>()
            .unwrap_or_default();
        for key in ctx.keywords.keys() {
            if !official.iter().any(|k| k == key) {
                store.add_schema_issue(
                    schema.error_template("UNOFFICIAL_KEYWORD_WARNING").as_ref(),
                    vec![evidence_for_path(ctx.path).with_evidence(key.clone())],
                );
            }
        }
    }
}

fn evidence_for_path(path: &str) -> FileEvidence {
    evidence_for(std::path::Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_keywords_suffix_and_extension() {
        let parts = split_filename("sub-01_task-x_data.csv");
        assert_eq!(parts.keywords.get("sub"), Some(&"01".to_string()));
        assert_eq!(parts.keywords.get("task"), Some(&"x".to_string()));
        assert_eq!(parts.suffix, "data");
        assert_eq!(parts.extension, ".csv");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let parts = split_filename(".psychdsignore");
        assert_eq!(parts.extension, "");
        assert_eq!(parts.suffix, ".psychdsignore");
    }

    #[test]
    fn identify_matches_datafile_rule_with_arbitrary_nesting() {
        let schema = Schema::bundled_default().unwrap();
        let keywords = BTreeMap::new();
        let ctx = FilenameContext {
            path: "/data/sub/x_data.csv",
            name: "x_data.csv",
            base_dir: "data",
            extension: ".csv",
            suffix: "data",
            keywords: &keywords,
        };
        let mut rules_record = seed_rules_record(&schema);
        let mut store = IssueStore::new();
        let matched = identify(&schema, &ctx, &mut rules_record, &mut store);
        assert!(matched.contains(&"rules.files.data.Datafile".to_string()));
        assert!(!store.contains("NOT_INCLUDED"));
    }

    #[test]
    fn identify_emits_not_included_when_no_rule_matches() {
        let schema = Schema::bundled_default().unwrap();
        let keywords = BTreeMap::new();
        let ctx = FilenameContext {
            path: "/junk.xyz",
            name: "junk.xyz",
            base_dir: "/",
            extension: ".xyz",
            suffix: "junk",
            keywords: &keywords,
        };
        let mut rules_record = seed_rules_record(&schema);
        let mut store = IssueStore::new();
        identify(&schema, &ctx, &mut rules_record, &mut store);
        assert!(store.contains("NOT_INCLUDED"));
    }

    #[test]
    fn validate_flags_keyword_formatting_error() {
        let schema = Schema::bundled_default().unwrap();
        let keywords = BTreeMap::new();
        let ctx = FilenameContext {
            path: "/data/badname.csv",
            name: "badname.csv",
            base_dir: "data",
            extension: ".csv",
            suffix: "badname",
            keywords: &keywords,
        };
        let mut store = IssueStore::new();
        validate(
            &schema,
            &ctx,
            &["rules.files.data.Datafile".to_string()],
            &mut store,
        );
        assert!(store.contains("KEYWORD_FORMATTING_ERROR"));
    }

    #[test]
    fn ambiguity_picks_first_clean_rule_silently() {
        let schema = Schema::bundled_default().unwrap();
        let keywords = BTreeMap::new();
        let ctx = FilenameContext {
            path: "/README.md",
            name: "README.md",
            base_dir: "/",
            extension: ".md",
            suffix: "README",
            keywords: &keywords,
        };
        let mut store = IssueStore::new();
        validate(
            &schema,
            &ctx,
            &[
                "rules.files.common.core.README".to_string(),
                "rules.files.data.Datafile".to_string(),
            ],
            &mut store,
        );
        assert!(!store.contains("ALL_FILENAME_RULES_HAVE_ISSUES"));
    }

    #[test]
    fn unofficial_keyword_produces_warning() {
        let schema = Schema::bundled_default().unwrap();
        let mut keywords = BTreeMap::new();
        keywords.insert("bogus".to_string(), "1".to_string());
        let ctx = FilenameContext {
            path: "/data/bogus-1_data.csv",
            name: "bogus-1_data.csv",
            base_dir: "data",
            extension: ".csv",
            suffix: "data",
            keywords: &keywords,
        };
        let mut store = IssueStore::new();
        validate(
            &schema,
            &ctx,
            &["rules.files.data.Datafile".to_string()],
            &mut store,
        );
        assert!(store.get("UNOFFICIAL_KEYWORD_WARNING").is_some());
    }
}
