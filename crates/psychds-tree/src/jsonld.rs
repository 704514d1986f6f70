//! A minimal in-house JSON-LD-like expander (spec.md §9 design note).
//!
//! A full vocabulary-aware expander is unnecessary for this schema: inline
//! the active `@context` (prefix→IRI map, or a single `@vocab`), rewrite
//! each non-`@`-prefixed key to `<namespace>+key`, and wrap scalars as
//! `{"@value": ...}`. Arrays are preserved; every property value becomes an
//! array of expanded items, matching real JSON-LD expand output shape
//! closely enough for the checks built on top of it (spec.md §4.C, §4.I).

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonLdError {
    #[error("@context must be a string or object, found: {0}")]
    InvalidContext(String),
}

/// An active JSON-LD context: a default vocabulary prefix plus explicit
/// term→IRI overrides.
#[derive(Debug, Clone)]
pub struct Context {
    vocab: String,
    terms: std::collections::HashMap<String, String>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            vocab: "https://schema.org/".to_string(),
            terms: std::collections::HashMap::new(),
        }
    }
}

impl Context {
    /// Parse `doc`'s `@context` key, if present, falling back to the
    /// schema.org default vocabulary otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`JsonLdError::InvalidContext`] if `@context` is present but
    /// neither a string nor an object.
    pub fn from_document(doc: &Value) -> Result<Self, JsonLdError> {
        let Some(ctx_value) = doc.get("@context") else {
            return Ok(Self::default());
        };
        Self::from_value(ctx_value)
    }

    fn from_value(ctx_value: &Value) -> Result<Self, JsonLdError> {
        match ctx_value {
            Value::String(s) => Ok(Self {
                vocab: normalize_vocab(s),
                terms: std::collections::HashMap::new(),
            }),
            Value::Object(obj) => {
                let mut vocab = Self::default().vocab;
                let mut terms = std::collections::HashMap::new();
                for (k, v) in obj {
                    if k == "@vocab" {
                        if let Some(s) = v.as_str() {
                            vocab = normalize_vocab(s);
                        }
                    } else if let Some(s) = v.as_str() {
                        terms.insert(k.clone(), s.to_string());
                    }
                }
                Ok(Self { vocab, terms })
            }
            other => Err(JsonLdError::InvalidContext(other.to_string())),
        }
    }

    fn resolve(&self, key: &str) -> String {
        if key.starts_with("http://") || key.starts_with("https://") {
            key.to_string()
        } else if let Some(iri) = self.terms.get(key) {
            iri.clone()
        } else {
            format!("{}{key}", self.vocab)
        }
    }
}

fn normalize_vocab(raw: &str) -> String {
    let https = raw.replace("http://schema.org", "https://schema.org");
    if https.ends_with('/') {
        https
    } else {
        format!("{https}/")
    }
}

/// Expand `doc` against its own `@context` (falling back to `inherited` when
/// `doc` declares none — the tree reader passes down the root
/// `dataset_description.json`'s context for this purpose, spec.md §4.C).
///
/// # Errors
///
/// Returns [`JsonLdError`] if `@context` is malformed.
pub fn expand(doc: &Value, inherited: Option<&Context>) -> Result<Value, JsonLdError> {
    let ctx = if doc.get("@context").is_some() {
        Context::from_document(doc)?
    } else {
        inherited.cloned().unwrap_or_default()
    };
    Ok(expand_node(doc, &ctx))
}

/// Parse just the context, without expanding — used by the tree reader to
/// capture the root document's context for descendants.
///
/// # Errors
///
/// Returns [`JsonLdError`] if `@context` is malformed.
pub fn parse_context(doc: &Value) -> Result<Context, JsonLdError> {
    Context::from_document(doc)
}

fn expand_node(value: &Value, ctx: &Context) -> Value {
    let Value::Object(obj) = value else {
        return expand_scalar(value);
    };
    let mut out = Map::new();
    if let Some(id) = obj.get("@id") {
        out.insert("@id".to_string(), id.clone());
    }
    if let Some(t) = obj.get("@type") {
        out.insert("@type".to_string(), Value::Array(expand_type(t, ctx)));
    }
    for (key, val) in obj {
        if key == "@id" || key == "@type" || key == "@context" {
            continue;
        }
        let iri = ctx.resolve(key);
        out.insert(iri, Value::Array(expand_value(val, ctx)));
    }
    Value::Object(out)
}

fn expand_type(value: &Value, ctx: &Context) -> Vec<Value> {
    match value {
        Value::String(s) => vec![Value::String(ctx.resolve(s))],
        Value::Array(arr) => arr
            .iter()
            .filter_map(Value::as_str)
            .map(|s| Value::String(ctx.resolve(s)))
            .collect(),
        _ => Vec::new(),
    }
}

fn expand_value(value: &Value, ctx: &Context) -> Vec<Value> {
    match value {
        Value::Array(arr) => arr.iter().flat_map(|item| expand_item(item, ctx)).collect(),
        Value::Null => Vec::new(),
        other => expand_item(other, ctx),
    }
}

fn expand_item(value: &Value, ctx: &Context) -> Vec<Value> {
    match value {
        Value::Object(_) => vec![expand_node(value, ctx)],
        Value::Null => Vec::new(),
        scalar => vec![expand_scalar(scalar)],
    }
}

fn expand_scalar(value: &Value) -> Value {
    let mut m = Map::new();
    m.insert("@value".to_string(), value.clone());
    Value::Object(m)
}
