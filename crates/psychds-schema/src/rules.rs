//! Typed views over schema rule nodes (spec.md §3 "Schema").
//!
//! A rule node has one of three shapes — file-naming, directory, or
//! content — distinguished structurally rather than by an explicit
//! discriminant field, since that is how the source schema documents are
//! written. [`collect_rule_nodes`] walks a subtree once and classifies each
//! leaf, so callers never need to re-derive the shape test.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// A file-naming rule (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
pub struct FileRule {
    #[serde(rename = "baseDir")]
    pub base_dir: String,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub stem: Option<String>,
    #[serde(default, rename = "arbitraryNesting")]
    pub arbitrary_nesting: bool,
    #[serde(default, rename = "usesKeywords")]
    pub uses_keywords: bool,
    #[serde(default, rename = "fileRegex")]
    pub file_regex: Option<String>,
    /// Error template key to emit if this rule never fires anywhere in the
    /// dataset (spec.md §4.J step 6). `None` means the rule names an
    /// optional file.
    #[serde(default, rename = "missingIssue")]
    pub missing_issue: Option<String>,
}

/// A directory-presence rule (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRule {
    pub path: String,
    pub directory: bool,
    #[serde(default)]
    pub requires: Option<String>,
    #[serde(default, rename = "missingIssue")]
    pub missing_issue: Option<String>,
}

/// A single field requirement inside a content rule's `fields` map.
#[derive(Debug, Clone)]
pub enum FieldRequirement {
    Level(String),
    WithAddendum {
        level: String,
        level_addendum: Option<String>,
    },
}

impl<'de> Deserialize<'de> for FieldRequirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Literal(String),
            Object {
                level: String,
                #[serde(default)]
                level_addendum: Option<String>,
            },
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Literal(level) => FieldRequirement::Level(level),
            Repr::Object {
                level,
                level_addendum,
            } => FieldRequirement::WithAddendum {
                level,
                level_addendum,
            },
        })
    }
}

impl FieldRequirement {
    #[must_use]
    pub fn base_level(&self) -> &str {
        match self {
            FieldRequirement::Level(l) | FieldRequirement::WithAddendum { level: l, .. } => l,
        }
    }

    /// Parse a `"required if \`k\` is \`v\`"` addendum into `(key, value)`.
    #[must_use]
    pub fn addendum_condition(&self) -> Option<(String, String)> {
        let FieldRequirement::WithAddendum {
            level_addendum: Some(text),
            ..
        } = self
        else {
            return None;
        };
        // Expected shape: "required if `k` is `v`"
        let parts: Vec<&str> = text.split('`').collect();
        if parts.len() >= 4 {
            Some((parts[1].to_string(), parts[3].to_string()))
        } else {
            None
        }
    }
}

/// A content/selector rule (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
pub struct ContentRule {
    pub selectors: Vec<String>,
    #[serde(default, rename = "columnsMatchMetadata")]
    pub columns_match_metadata: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRequirement>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// The classified shape of a schema rule node.
#[derive(Debug, Clone)]
pub enum RuleNode {
    File(FileRule),
    Directory(DirectoryRule),
    Content(ContentRule),
}

/// Structurally classify a JSON object as a rule node, if it looks like one.
fn classify(value: &Value) -> Option<RuleNode> {
    let obj = value.as_object()?;
    if obj.get("directory").and_then(Value::as_bool) == Some(true) && obj.contains_key("path") {
        return serde_json::from_value(value.clone()).ok().map(RuleNode::Directory);
    }
    if obj.contains_key("selectors") {
        return serde_json::from_value(value.clone()).ok().map(RuleNode::Content);
    }
    if obj.contains_key("baseDir")
        && obj.contains_key("extensions")
        && (obj.contains_key("suffix") || obj.contains_key("stem"))
    {
        return serde_json::from_value(value.clone()).ok().map(RuleNode::File);
    }
    None
}

/// Recursively walk a schema subtree, classifying every leaf that looks
/// like a rule node and descending into every other object branch.
pub(crate) fn collect_rule_nodes(value: &Value, prefix: &str, out: &mut Vec<(String, RuleNode)>) {
    if let Some(node) = classify(value) {
        out.push((prefix.to_string(), node));
        return;
    }
    let Some(obj) = value.as_object() else {
        return;
    };
    for (key, child) in obj {
        collect_rule_nodes(child, &format!("{prefix}.{key}"), out);
    }
}
