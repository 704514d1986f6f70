//! Shared diagnostic types for the Psych-DS validator.
//!
//! Mirrors the role `lintel-diagnostics` plays for `lintel`: a small,
//! dependency-light crate holding the vocabulary every engine reports
//! through, so the orchestrator and the CLI never need to know how an
//! individual check produced a finding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic, as declared on its error template in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Ignore,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Ignore => "ignore",
        }
    }
}

/// An error template as declared at `rules.errors.<key>` in the schema.
///
/// The source data occasionally encodes `requires` as a bare string and
/// elsewhere as a list (spec.md §9, Open Questions); callers are expected to
/// normalize to `Vec<String>` at the JSON deserialization boundary — see
/// [`crate::deserialize_requires`].
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorTemplate {
    pub code: String,
    pub reason: String,
    pub level: Severity,
    #[serde(default, deserialize_with = "deserialize_requires")]
    pub requires: Vec<String>,
    #[serde(default)]
    pub help_url: Option<String>,
}

/// Normalize `requires` whether the schema encodes it as a single string or
/// an array of strings.
///
/// # Errors
///
/// Returns a deserialization error if the field is neither shape.
pub fn deserialize_requires<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        None,
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
        OneOrMany::None => Ok(Vec::new()),
    }
}

/// A single piece of file evidence attached to an issue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileEvidence {
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<usize>,
}

impl FileEvidence {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_string_lossy().into_owned(),
            name,
            evidence: None,
            line: None,
            character: None,
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, line: usize, character: usize) -> Self {
        self.line = Some(line);
        self.character = Some(character);
        self
    }
}

/// A deduplicating diagnostic: one per issue code, with every affected file
/// merged in by path.
#[derive(Debug, Clone)]
pub struct Issue {
    pub code: String,
    pub severity: Severity,
    pub reason: String,
    pub requires: Vec<String>,
    pub help_url: Option<String>,
    files: BTreeMap<String, FileEvidence>,
}

impl Issue {
    fn new(
        code: impl Into<String>,
        reason: impl Into<String>,
        severity: Severity,
        requires: Vec<String>,
        help_url: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            severity,
            requires,
            help_url,
            files: BTreeMap::new(),
        }
    }

    fn merge_files(&mut self, files: impl IntoIterator<Item = FileEvidence>) {
        for f in files {
            self.files.insert(f.path.clone(), f);
        }
    }

    #[must_use]
    pub fn files(&self) -> impl Iterator<Item = &FileEvidence> {
        self.files.values()
    }
}

/// Wire shape for a single issue, matching spec.md §6's `IssueOutput`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutput {
    pub key: String,
    pub severity: Severity,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    pub files: Vec<FileEvidence>,
}

impl From<&Issue> for IssueOutput {
    fn from(issue: &Issue) -> Self {
        Self {
            key: issue.code.clone(),
            severity: issue.severity,
            reason: issue.reason.clone(),
            help_url: issue.help_url.clone(),
            files: issue.files.values().cloned().collect(),
        }
    }
}

/// Partitioned output, matching spec.md §6's `issues` object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssuesOutput {
    pub errors: Vec<IssueOutput>,
    pub warnings: Vec<IssueOutput>,
}

/// A keyed, deduplicating map of diagnostics (spec.md §4.D).
///
/// Exactly one [`Issue`] exists per code; repeated `add` calls for the same
/// code merge their file sets, keyed by path so a file is never duplicated.
#[derive(Debug, Clone, Default)]
pub struct IssueStore {
    issues: BTreeMap<String, Issue>,
}

impl IssueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a diagnostic under `code`.
    pub fn add(
        &mut self,
        code: impl Into<String>,
        reason: impl Into<String>,
        severity: Severity,
        requires: Vec<String>,
        files: impl IntoIterator<Item = FileEvidence>,
    ) {
        let code = code.into();
        self.issues
            .entry(code.clone())
            .or_insert_with(|| Issue::new(code, reason, severity, requires, None))
            .merge_files(files);
    }

    /// Insert or merge a diagnostic from a resolved [`ErrorTemplate`].
    ///
    /// If `template` is `None` (the schema has no error template at that
    /// key) the call is silently dropped — unknown codes are non-fatal, by
    /// design (spec.md §4.D).
    pub fn add_schema_issue(
        &mut self,
        template: Option<&ErrorTemplate>,
        files: impl IntoIterator<Item = FileEvidence>,
    ) {
        let Some(template) = template else {
            return;
        };
        self.issues
            .entry(template.code.clone())
            .or_insert_with(|| {
                Issue::new(
                    template.code.clone(),
                    template.reason.clone(),
                    template.level,
                    template.requires.clone(),
                    template.help_url.clone(),
                )
            })
            .merge_files(files);
    }

    /// Remove every issue whose `requires` list names a rule path that never
    /// fired (spec.md §4.D `filterIssues`).
    pub fn filter_issues(&mut self, rules_record: &BTreeMap<String, bool>) {
        self.issues.retain(|_, issue| {
            issue
                .requires
                .iter()
                .all(|req| rules_record.get(req).copied().unwrap_or(false))
        });
    }

    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.issues.contains_key(code)
    }

    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Issue> {
        self.issues.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Partition every stored issue by severity (`ignore`-level issues are
    /// dropped from the output entirely — they exist only to satisfy
    /// `requires` bookkeeping).
    #[must_use]
    pub fn format_output(&self) -> IssuesOutput {
        let mut out = IssuesOutput::default();
        for issue in self.issues.values() {
            match issue.severity {
                Severity::Error => out.errors.push(issue.into()),
                Severity::Warning => out.warnings.push(issue.into()),
                Severity::Ignore => {}
            }
        }
        out
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues
            .values()
            .any(|i| i.severity == Severity::Error)
    }
}

/// Convenience for building [`FileEvidence`] from a borrowed path.
#[must_use]
pub fn evidence_for(path: &Path) -> FileEvidence {
    FileEvidence::new(path)
}
