//! Ancestor-chain metadata inheritance (spec.md §4.G).
//!
//! Composes the root `dataset_description.json`, every `file_metadata.json`
//! encountered while descending to a data file's directory, and a matching
//! sibling sidecar into one namespace-qualified mapping, tracking which file
//! contributed each property so issue reporters can point at the right file.

use std::collections::BTreeMap;

use psychds_tree::{FileNode, FileTree};
use serde_json::{Map, Value};

/// The compiled sidecar for one data file: the merged, namespace-qualified
/// mapping plus per-property provenance (spec.md §3 "Per-file context").
#[derive(Debug, Clone, Default)]
pub struct ResolvedSidecar {
    pub expanded: Map<String, Value>,
    /// Unqualified property name (e.g. `name`, not `https://schema.org/name`)
    /// → path of the file that last contributed it.
    pub provenance: BTreeMap<String, String>,
    pub valid_columns: Vec<String>,
}

/// Walk the ancestor chain for `data_file_path` and compose its sidecar
/// (spec.md §4.G). A missing or unparseable ancestor file simply
/// contributes nothing — recovery is local, per spec.md §7.
#[must_use]
pub fn resolve(tree: &FileTree, data_file_path: &str) -> ResolvedSidecar {
    let mut expanded = Map::new();
    let mut provenance = BTreeMap::new();

    if let Some(root_doc) = tree.files.iter().find(|f| f.name == "dataset_description.json") {
        if let Some(v) = &root_doc.expanded {
            merge_in(&mut expanded, &mut provenance, v, &root_doc.path);
        }
    }

    let trimmed = data_file_path.trim_start_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();

    let mut current = tree;
    let mut dir_path = String::from("/");
    if segments.len() > 1 {
        for seg in &segments[..segments.len() - 1] {
            dir_path = join_path(&dir_path, seg);
            let Some(next) = current.dir_at(&dir_path) else {
                break;
            };
            if let Some(metadata) = next.files.iter().find(|f| f.name == "file_metadata.json") {
                if let Some(v) = &metadata.expanded {
                    merge_in(&mut expanded, &mut provenance, v, &metadata.path);
                }
            }
            current = next;
        }
    }

    let file_name = segments.last().copied().unwrap_or("");
    let stem = file_name.rsplit_once('.').map_or(file_name, |(s, _)| s);
    if let Some(sidecar) = find_exact_match_sidecar(current, &dir_path, stem, data_file_path) {
        if let Some(v) = &sidecar.expanded {
            merge_in(&mut expanded, &mut provenance, v, &sidecar.path);
        }
    }

    let valid_columns = extract_valid_columns(&expanded);

    ResolvedSidecar {
        expanded,
        provenance,
        valid_columns,
    }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn find_exact_match_sidecar<'a>(
    dir: &'a FileTree,
    dir_path: &str,
    stem: &str,
    data_file_path: &str,
) -> Option<&'a FileNode> {
    let candidates: Vec<&FileNode> = dir
        .files
        .iter()
        .filter(|f| f.name.ends_with(".json") && f.name.rsplit_once('.').map(|(s, _)| s) == Some(stem))
        .collect();

    match candidates.as_slice() {
        [] => None,
        [only] => Some(only),
        many => {
            let expected_path = join_path(dir_path, &format!("{stem}.json"));
            many.iter().find(|f| f.path == expected_path).copied().or_else(|| {
                tracing::warn!(
                    data_file = %data_file_path,
                    "multiple candidate sidecars matched this stem, picking the first non-deterministically"
                );
                many.first().copied()
            })
        }
    }
}

/// Shallow key-wise replacement: every key in `doc` overwrites whatever the
/// accumulator already holds, and its provenance entry (keyed by the
/// unqualified property name) is updated to `source_path`.
fn merge_in(expanded: &mut Map<String, Value>, provenance: &mut BTreeMap<String, String>, doc: &Value, source_path: &str) {
    let Some(obj) = doc.as_object() else {
        return;
    };
    for (key, value) in obj {
        expanded.insert(key.clone(), value.clone());
        let base = key.rsplit('/').next().unwrap_or(key).to_string();
        provenance.insert(base, source_path.to_string());
    }
}

fn extract_valid_columns(expanded: &Map<String, Value>) -> Vec<String> {
    let Some(items) = expanded
        .get("https://schema.org/variableMeasured")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            if let Some(v) = item.get("@value").and_then(Value::as_str) {
                return Some(v.to_string());
            }
            item.get("https://schema.org/name")
                .and_then(Value::as_array)
                .and_then(|arr| arr.first())
                .and_then(|v| v.get("@value"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use psychds_ignore::IgnoreMatcher;
    use psychds_tree::{build_tree, StdFs};
    use std::fs;

    #[test]
    fn root_dataset_description_contributes_base_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context":{"@vocab":"https://schema.org/"},"name":"x","variableMeasured":["a"]}"#,
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/x_data.csv"), "a\n1\n").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();
        let sidecar = resolve(&tree, "/data/x_data.csv");

        assert_eq!(sidecar.valid_columns, vec!["a".to_string()]);
        assert_eq!(
            sidecar.provenance.get("variableMeasured"),
            Some(&"/dataset_description.json".to_string())
        );
    }

    #[test]
    fn directory_metadata_overrides_root_and_exact_sidecar_overrides_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context":{"@vocab":"https://schema.org/"},"variableMeasured":["root"]}"#,
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(
            tmp.path().join("data/file_metadata.json"),
            r#"{"variableMeasured":["dir"]}"#,
        )
        .unwrap();
        fs::write(
            tmp.path().join("data/x_data.json"),
            r#"{"variableMeasured":["exact"]}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("data/x_data.csv"), "exact\n1\n").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();
        let sidecar = resolve(&tree, "/data/x_data.csv");

        assert_eq!(sidecar.valid_columns, vec!["exact".to_string()]);
        assert_eq!(
            sidecar.provenance.get("variableMeasured"),
            Some(&"/data/x_data.json".to_string())
        );
    }

    #[test]
    fn missing_ancestors_resolve_to_empty_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/x_data.csv"), "a\n1\n").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();
        let sidecar = resolve(&tree, "/data/x_data.csv");

        assert!(sidecar.valid_columns.is_empty());
        assert!(sidecar.expanded.is_empty());
    }

    #[test]
    fn variable_measured_as_property_value_objects_extracts_nested_name() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context":{"@vocab":"https://schema.org/"},"variableMeasured":[{"@type":"PropertyValue","name":"age"}]}"#,
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/x_data.csv"), "age\n1\n").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();
        let sidecar = resolve(&tree, "/data/x_data.csv");

        assert_eq!(sidecar.valid_columns, vec!["age".to_string()]);
    }
}
