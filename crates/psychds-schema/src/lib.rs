//! Schema loading and dotted-path access (spec.md §4.A).
//!
//! Plays the role `lintel-schema`/`lintel-schema-cache` play for `lintel`:
//! fetch (or fall back to a bundled default), then expose the document
//! through one narrow accessor every other engine goes through.

pub mod org;
pub mod rules;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use org::SchemaOrgVocab;
pub use psychds_diagnostics::ErrorTemplate;
pub use rules::{ContentRule, DirectoryRule, FieldRequirement, FileRule, RuleNode};

const DEFAULT_SCHEMA_BYTES: &str = include_str!("../assets/default_schema.json");
const DEFAULT_SCHEMA_ORG_BYTES: &str = include_str!("../assets/schema_org.json");

/// Where a schema document should be resolved from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// A bare version string (e.g. `"latest"`, `"0.5.0"`), resolved to a URL
    /// on the Psych-DS schema releases host.
    Version(String),
    /// A fully-qualified URL supplied by the user, `-s/--schema` or the
    /// `psychDS_SCHEMA` environment variable (spec.md §6).
    Url(String),
}

impl Default for SchemaSource {
    fn default() -> Self {
        SchemaSource::Version("latest".to_string())
    }
}

impl SchemaSource {
    /// Parse a `-s/--schema` argument: anything that looks like a URL is
    /// used verbatim, otherwise it is treated as a version string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SchemaSource::Url(raw.to_string())
        } else {
            SchemaSource::Version(raw.to_string())
        }
    }

    #[must_use]
    pub fn resolve_url(&self) -> String {
        match self {
            SchemaSource::Url(u) => u.clone(),
            SchemaSource::Version(v) => format!(
                "https://raw.githubusercontent.com/psych-ds/psych-DS/main/schema/versions/{v}/schema.json"
            ),
        }
    }
}

/// Catastrophic failures from schema loading. Network and parse failures are
/// *not* catastrophic — they trigger the embedded-default fallback per
/// spec.md §4.A and are only surfaced via `tracing::warn!`.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("embedded default schema is invalid JSON: {0}")]
    Bundled(#[source] serde_json::Error),
}

/// A loaded, merged schema document: the main rule tree plus the
/// schema.org vocabulary under the `schemaOrg` key, accessed only through
/// [`Schema::get`].
#[derive(Debug, Clone)]
pub struct Schema {
    doc: Value,
}

/// Result of a dotted-path lookup (spec.md §9: "schema accessor" design note).
#[derive(Debug, Clone, Copy)]
pub enum Accessor<'a> {
    Present(&'a Value),
    Absent,
}

impl<'a> Accessor<'a> {
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Accessor::Present(_))
    }

    #[must_use]
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Accessor::Present(v) => Some(v),
            Accessor::Absent => None,
        }
    }

    /// Deserialize the resolved value into `T`, if present and well-formed.
    #[must_use]
    pub fn as_typed<T: DeserializeOwned>(&self) -> Option<T> {
        self.value().and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl Schema {
    /// Build a [`Schema`] from an already-merged JSON document (mainly for
    /// tests; production code should go through [`load`]).
    #[must_use]
    pub fn from_value(doc: Value) -> Self {
        Self { doc }
    }

    /// The embedded default, used whenever a network fetch fails or no
    /// network is available. Bundling the schema.org vocabulary as well
    /// keeps the fallback fully self-contained.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Bundled`] only if the embedded assets
    /// themselves are malformed — i.e. never, outside of a packaging bug.
    pub fn bundled_default() -> Result<Self, SchemaError> {
        let mut main: Value =
            serde_json::from_str(DEFAULT_SCHEMA_BYTES).map_err(SchemaError::Bundled)?;
        let org: Value =
            serde_json::from_str(DEFAULT_SCHEMA_ORG_BYTES).map_err(SchemaError::Bundled)?;
        if let Some(obj) = main.as_object_mut() {
            obj.insert("schemaOrg".to_string(), org);
        }
        Ok(Self { doc: main })
    }

    /// Dotted-path accessor: `schema.get("rules.files.data.Datafile")`
    /// splits on `.` and descends object keys, returning [`Accessor::Absent`]
    /// the moment any segment is missing (spec.md §4.A).
    #[must_use]
    pub fn get(&self, path: &str) -> Accessor<'_> {
        let mut current = &self.doc;
        for segment in path.split('.') {
            match current.as_object().and_then(|o| o.get(segment)) {
                Some(v) => current = v,
                None => return Accessor::Absent,
            }
        }
        Accessor::Present(current)
    }

    #[must_use]
    pub fn root(&self) -> &Value {
        &self.doc
    }

    /// Look up an error template at `rules.errors.<key>`.
    #[must_use]
    pub fn error_template(&self, key: &str) -> Option<ErrorTemplate> {
        self.get(&format!("rules.errors.{key}")).as_typed()
    }

    /// Parse the merged schema.org vocabulary under `schemaOrg`.
    #[must_use]
    pub fn org_vocab(&self) -> SchemaOrgVocab {
        self.get("schemaOrg")
            .as_typed()
            .unwrap_or_default()
    }

    /// Walk every rule node under `rules.files`, yielding `(dotted path,
    /// classified node)` pairs. Used to seed the rules record (spec.md
    /// §4.J step 3) and by the Filename Identifier (spec.md §4.E).
    #[must_use]
    pub fn file_rule_nodes(&self) -> Vec<(String, RuleNode)> {
        let mut out = Vec::new();
        if let Accessor::Present(v) = self.get("rules.files") {
            rules::collect_rule_nodes(v, "rules.files", &mut out);
        }
        out
    }

    /// Walk every rule node under `rules.content`, yielding content rules
    /// only (used by the Content Rule Engine, spec.md §4.I).
    #[must_use]
    pub fn content_rule_nodes(&self) -> Vec<(String, ContentRule)> {
        let mut nodes = Vec::new();
        if let Accessor::Present(v) = self.get("rules.content") {
            rules::collect_rule_nodes(v, "rules.content", &mut nodes);
        }
        nodes
            .into_iter()
            .filter_map(|(path, node)| match node {
                RuleNode::Content(c) => Some((path, c)),
                _ => None,
            })
            .collect()
    }
}

/// Fetch the main schema document and merge in the schema.org vocabulary
/// under `schemaOrg`. Falls back to [`Schema::bundled_default`] on any
/// network failure (spec.md §4.A) — this is a recoverable condition, logged
/// at `warn` level, never propagated to the caller.
///
/// The schema.org vocabulary itself is never fetched over the network: the
/// live JSON-LD context document at `schema.org/docs/jsonldcontext.jsonld`
/// has no `{classes, slots}` shape, and translating arbitrary JSON-LD
/// contexts into that shape is out of scope for this validator (spec.md §9
/// sanctions the same simplification for the File Tree Reader's JSON-LD
/// expansion). The bundled copy is used unconditionally.
pub async fn load(source: &SchemaSource, client: &reqwest::Client) -> Schema {
    let url = source.resolve_url();
    tracing::debug!(schema_url = %url, "resolving schema");

    match fetch_json(client, &url).await {
        Ok(mut main) => {
            if let Some(obj) = main.as_object_mut() {
                obj.insert("schemaOrg".to_string(), bundled_schema_org());
            }
            Schema { doc: main }
        }
        Err(_) => {
            tracing::warn!("schema fetch failed, falling back to embedded default");
            Schema::bundled_default().unwrap_or_else(|e| {
                // The embedded asset is controlled at build time; a failure
                // here means the binary itself is broken.
                panic!("embedded default schema is corrupt: {e}")
            })
        }
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value, reqwest::Error> {
    client.get(url).send().await?.error_for_status()?.json().await
}

fn bundled_schema_org() -> Value {
    serde_json::from_str(DEFAULT_SCHEMA_ORG_BYTES).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}
