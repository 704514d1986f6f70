//! Content rule evaluation and schema.org vocabulary checks (spec.md §4.I).
//!
//! Walks the schema once (via [`compile`]) to parse every content rule's
//! selectors into an [`expr::Expr`]; [`run`] then re-evaluates the compiled
//! expressions against each file's context, dispatching on whichever of
//! `columnsMatchMetadata`/`fields` the fired rule carries, plus the
//! schema.org term/type walk.

pub mod expr;

use std::collections::BTreeMap;

use expr::{Env, EnvValue, Expr};
use psychds_diagnostics::{evidence_for, IssueStore};
use psychds_schema::{ContentRule, Schema, SchemaOrgVocab};
use serde_json::{Map, Value};

/// A content rule with its selectors pre-parsed (spec.md §9).
pub struct CompiledRule {
    pub path: String,
    pub rule: ContentRule,
    selectors: Vec<Expr>,
}

/// Parse every content rule's selectors once per schema load. A selector
/// that fails to parse is dropped with a warning — the rule then never
/// fires, which is safer than guessing its intent.
#[must_use]
pub fn compile(schema: &Schema) -> Vec<CompiledRule> {
    schema
        .content_rule_nodes()
        .into_iter()
        .map(|(path, rule)| {
            let selectors = rule
                .selectors
                .iter()
                .filter_map(|s| match expr::parse(s) {
                    Ok(e) => Some(e),
                    Err(err) => {
                        tracing::warn!(selector = %s, rule = %path, error = %err, "dropping unparseable selector");
                        None
                    }
                })
                .collect();
            CompiledRule { path, rule, selectors }
        })
        .collect()
}

/// The per-file facts the content rule engine needs (spec.md §3 "Per-file
/// context").
pub struct ContentContext<'a> {
    pub path: &'a str,
    pub extension: &'a str,
    pub suffix: &'a str,
    pub base_dir: &'a str,
    pub keywords: &'a BTreeMap<String, String>,
    pub sidecar: &'a Map<String, Value>,
    pub provenance: &'a BTreeMap<String, String>,
    pub valid_columns: &'a [String],
    pub columns: &'a BTreeMap<String, Vec<String>>,
}

impl ContentContext<'_> {
    fn env(&self) -> Env {
        let mut env = Env::new();
        env.insert("extension".to_string(), EnvValue::Str(self.extension.to_string()));
        env.insert("suffix".to_string(), EnvValue::Str(self.suffix.to_string()));
        env.insert("baseDir".to_string(), EnvValue::Str(self.base_dir.to_string()));
        env.insert(
            "keywords".to_string(),
            EnvValue::Set(self.keywords.keys().cloned().collect()),
        );
        env
    }
}

/// Evaluate every compiled content rule against `ctx`, accumulating issues
/// into `store` (spec.md §4.I).
pub fn run(schema: &Schema, org: &SchemaOrgVocab, compiled: &[CompiledRule], ctx: &ContentContext<'_>, store: &mut IssueStore) {
    let env = ctx.env();
    for compiled_rule in compiled {
        if compiled_rule.selectors.is_empty()
            || !compiled_rule.selectors.iter().all(|s| expr::eval(s, &env))
        {
            continue;
        }

        if compiled_rule.rule.columns_match_metadata {
            if ctx.extension == ".csv" {
                check_columns_match_metadata(schema, ctx, &compiled_rule.path, store);
            }
            check_schema_org(schema, org, ctx, store);
        }

        if !compiled_rule.rule.fields.is_empty() {
            check_fields(schema, &compiled_rule.rule, ctx, store);
        }
    }
}

fn check_columns_match_metadata(schema: &Schema, ctx: &ContentContext<'_>, rule_path: &str, store: &mut IssueStore) {
    let missing: Vec<&str> = ctx
        .columns
        .keys()
        .filter(|h| !ctx.valid_columns.iter().any(|c| c == *h))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return;
    }
    let evidence = evidence_for(ctx.path.as_ref())
        .with_evidence(format!("{} (rule: {rule_path})", missing.join(", ")));
    store.add_schema_issue(schema.error_template("CSV_COLUMN_MISSING").as_ref(), vec![evidence]);
}

fn check_fields(schema: &Schema, rule: &ContentRule, ctx: &ContentContext<'_>, store: &mut IssueStore) {
    let namespace = rule.namespace.clone().unwrap_or_default();
    let mut missing = Vec::new();

    for (key, requirement) in &rule.fields {
        let mut level = requirement.base_level().to_string();
        if let Some((cond_key, cond_value)) = requirement.addendum_condition() {
            if condition_holds(ctx.sidecar, &cond_key, &cond_value) {
                level = "required".to_string();
            }
        }
        if level != "required" {
            continue;
        }
        let full_key = format!("{namespace}{key}");
        if !ctx.sidecar.contains_key(&full_key) {
            missing.push(full_key);
        }
    }

    if !missing.is_empty() {
        let evidence = evidence_for(ctx.path.as_ref()).with_evidence(missing.join(", "));
        store.add_schema_issue(schema.error_template("JSON_KEY_REQUIRED").as_ref(), vec![evidence]);
    }
}

fn condition_holds(sidecar: &Map<String, Value>, key: &str, expected: &str) -> bool {
    if key == "@type" {
        return sidecar
            .get("@type")
            .and_then(Value::as_array)
            .is_some_and(|arr| arr.iter().any(|v| v.as_str().is_some_and(|s| s.ends_with(expected))));
    }
    let full = format!("https://schema.org/{key}");
    sidecar
        .get(&full)
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("@value"))
        .and_then(Value::as_str)
        == Some(expected)
}

#[derive(Default)]
struct Findings {
    unknown_namespace: Vec<String>,
    term_issue: Vec<String>,
    type_missing: Vec<String>,
    type_issue: Vec<String>,
}

fn check_schema_org(schema: &Schema, org: &SchemaOrgVocab, ctx: &ContentContext<'_>, store: &mut IssueStore) {
    match ctx.sidecar.get("@type").and_then(Value::as_array).and_then(|a| a.first()).and_then(Value::as_str) {
        Some(t) if t == "https://schema.org/Dataset" => {}
        Some(_) => {
            store.add_schema_issue(schema.error_template("INCORRECT_DATASET_TYPE").as_ref(), vec![evidence_for(ctx.path.as_ref())]);
        }
        None => {
            store.add_schema_issue(schema.error_template("MISSING_DATASET_TYPE").as_ref(), vec![evidence_for(ctx.path.as_ref())]);
        }
    }

    let mut findings = Findings::default();
    walk_node(org, ctx.sidecar, &mut findings);

    emit_aggregated(schema, ctx, store, "UNKNOWN_NAMESPACE", &findings.unknown_namespace);
    emit_aggregated(schema, ctx, store, "TERM_ISSUE", &findings.term_issue);
    emit_aggregated(schema, ctx, store, "TYPE_MISSING", &findings.type_missing);
    emit_aggregated(schema, ctx, store, "TYPE_ISSUE", &findings.type_issue);
}

fn emit_aggregated(schema: &Schema, ctx: &ContentContext<'_>, store: &mut IssueStore, code: &str, properties: &[String]) {
    if properties.is_empty() {
        return;
    }
    let evidences = properties
        .iter()
        .map(|p| {
            let source = ctx.provenance.get(p).map_or(ctx.path, String::as_str);
            evidence_for(source.as_ref()).with_evidence(p.clone())
        })
        .collect::<Vec<_>>();
    store.add_schema_issue(schema.error_template(code).as_ref(), evidences);
}

fn walk_node(org: &SchemaOrgVocab, node: &Map<String, Value>, findings: &mut Findings) {
    let enclosing_types: Vec<String> = node
        .get("@type")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(strip_namespace).collect())
        .unwrap_or_default();

    for (key, value) in node {
        if key.starts_with('@') {
            continue;
        }
        if !key.starts_with("https://schema.org/") {
            findings.unknown_namespace.push(key.clone());
            continue;
        }
        let property = strip_namespace(key);

        if !enclosing_types.is_empty() && !enclosing_types.iter().any(|t| org.is_slot_of(&property, t)) {
            findings.term_issue.push(property.clone());
        }

        let permitted = org.permitted_range(&property);
        let Some(items) = value.as_array() else {
            continue;
        };
        for item in items {
            let Some(obj) = item.as_object() else {
                continue;
            };
            if is_terminal(obj) {
                continue;
            }
            let item_types: Vec<String> = obj
                .get("@type")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).map(strip_namespace).collect())
                .unwrap_or_default();
            if item_types.is_empty() {
                findings.type_missing.push(property.clone());
            } else if !item_types
                .iter()
                .any(|t| permitted.iter().any(|p| p == t) || t == "Text" || t == "URL")
            {
                findings.type_issue.push(property.clone());
            }
            walk_node(org, obj, findings);
        }
    }
}

fn is_terminal(obj: &Map<String, Value>) -> bool {
    obj.contains_key("@value") || (obj.len() == 1 && obj.contains_key("@id"))
}

fn strip_namespace(iri: &str) -> String {
    iri.rsplit('/').next().unwrap_or(iri).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset_sidecar() -> Map<String, Value> {
        json!({
            "@type": ["https://schema.org/Dataset"],
            "https://schema.org/name": [{"@value": "x"}],
            "https://schema.org/variableMeasured": [{"@value": "a"}]
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn ctx<'a>(
        sidecar: &'a Map<String, Value>,
        provenance: &'a BTreeMap<String, String>,
        keywords: &'a BTreeMap<String, String>,
        columns: &'a BTreeMap<String, Vec<String>>,
        valid_columns: &'a [String],
    ) -> ContentContext<'a> {
        ContentContext {
            path: "/data/x_data.csv",
            extension: ".csv",
            suffix: "data",
            base_dir: "data",
            keywords,
            sidecar,
            provenance,
            valid_columns,
            columns,
        }
    }

    #[test]
    fn columns_match_metadata_flags_undeclared_header() {
        let schema = Schema::bundled_default().unwrap();
        let org = schema.org_vocab();
        let compiled = compile(&schema);
        let sidecar = dataset_sidecar();
        let provenance = BTreeMap::new();
        let keywords = BTreeMap::new();
        let mut columns = BTreeMap::new();
        columns.insert("b".to_string(), vec!["1".to_string()]);
        let valid_columns = vec!["a".to_string()];
        let mut store = IssueStore::new();
        let c = ctx(&sidecar, &provenance, &keywords, &columns, &valid_columns);
        run(&schema, &org, &compiled, &c, &mut store);
        assert!(store.contains("CSV_COLUMN_MISSING"));
    }

    #[test]
    fn declared_columns_produce_no_issue() {
        let schema = Schema::bundled_default().unwrap();
        let org = schema.org_vocab();
        let compiled = compile(&schema);
        let sidecar = dataset_sidecar();
        let provenance = BTreeMap::new();
        let keywords = BTreeMap::new();
        let mut columns = BTreeMap::new();
        columns.insert("a".to_string(), vec!["1".to_string()]);
        let valid_columns = vec!["a".to_string()];
        let mut store = IssueStore::new();
        let c = ctx(&sidecar, &provenance, &keywords, &columns, &valid_columns);
        run(&schema, &org, &compiled, &c, &mut store);
        assert!(!store.contains("CSV_COLUMN_MISSING"));
    }

    #[test]
    fn incorrect_dataset_type_is_flagged() {
        let schema = Schema::bundled_default().unwrap();
        let org = schema.org_vocab();
        let compiled = compile(&schema);
        let sidecar: Map<String, Value> = json!({
            "@type": ["https://schema.org/CreativeWork"],
        })
        .as_object()
        .unwrap()
        .clone();
        let provenance = BTreeMap::new();
        let keywords = BTreeMap::new();
        let columns = BTreeMap::new();
        let valid_columns = Vec::new();
        let mut store = IssueStore::new();
        let c = ctx(&sidecar, &provenance, &keywords, &columns, &valid_columns);
        run(&schema, &org, &compiled, &c, &mut store);
        assert!(store.contains("INCORRECT_DATASET_TYPE"));
    }

    #[test]
    fn unknown_namespace_key_is_flagged() {
        let schema = Schema::bundled_default().unwrap();
        let org = schema.org_vocab();
        let compiled = compile(&schema);
        let sidecar: Map<String, Value> = json!({
            "@type": ["https://schema.org/Dataset"],
            "https://example.com/custom": [{"@value": "x"}],
        })
        .as_object()
        .unwrap()
        .clone();
        let provenance = BTreeMap::new();
        let keywords = BTreeMap::new();
        let columns = BTreeMap::new();
        let valid_columns = Vec::new();
        let mut store = IssueStore::new();
        let c = ctx(&sidecar, &provenance, &keywords, &columns, &valid_columns);
        run(&schema, &org, &compiled, &c, &mut store);
        assert!(store.contains("UNKNOWN_NAMESPACE"));
    }

    #[test]
    fn required_field_missing_emits_json_key_required() {
        let schema = Schema::bundled_default().unwrap();
        let org = schema.org_vocab();
        let compiled = compile(&schema);
        let sidecar: Map<String, Value> = json!({
            "@type": ["https://schema.org/Dataset"],
        })
        .as_object()
        .unwrap()
        .clone();
        let provenance = BTreeMap::new();
        let keywords = BTreeMap::new();
        let columns = BTreeMap::new();
        let valid_columns = Vec::new();
        let mut store = IssueStore::new();
        let mut c = ctx(&sidecar, &provenance, &keywords, &columns, &valid_columns);
        c.path = "/dataset_description.json";
        c.extension = ".json";
        c.base_dir = "/";
        run(&schema, &org, &compiled, &c, &mut store);
        assert!(store.contains("JSON_KEY_REQUIRED"));
    }
}
