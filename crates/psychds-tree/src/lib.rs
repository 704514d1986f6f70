//! In-memory file tree and JSON/JSON-LD parsing (spec.md §4.C).
//!
//! Mirrors the role `lintel-validate::discover`/`parsers` play for
//! `lintel`: find the files that matter, read them, and hand back
//! structured data rather than raw bytes — except here the whole tree is
//! materialized up front (immutable thereafter) because inheritance
//! resolution (spec.md §4.G) needs to walk ancestor directories repeatedly.

pub mod fs;
pub mod jsonld;

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

pub use fs::{DirEntry, FileSystem, StdFs};
use psychds_ignore::IgnoreMatcher;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("root directory not found or unreadable: {0}")]
    RootUnreadable(#[source] std::io::Error),
}

/// A parse/read failure recorded against a file during tree construction,
/// to be promoted into the Issue Store when the file is visited (spec.md
/// §3 "File", §7 kind 2).
#[derive(Debug, Clone)]
pub struct DeferredIssue {
    pub code: String,
    pub detail: String,
}

/// A single file discovered in the tree (spec.md §3 "File").
#[derive(Debug, Clone)]
pub struct FileNode {
    /// Root-relative path, always starting with `/`.
    pub path: String,
    pub name: String,
    pub size: u64,
    pub ignored: bool,
    pub text: Option<String>,
    pub parsed: Option<Value>,
    pub expanded: Option<Value>,
    pub issue_info: Vec<DeferredIssue>,
}

impl FileNode {
    #[must_use]
    pub fn extension(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => "",
        }
    }
}

/// A directory node (spec.md §3 "FileTree"). Built bottom-up by
/// [`build_tree`] and immutable thereafter; the root's `name` is `"/"`.
#[derive(Debug, Clone)]
pub struct FileTree {
    pub path: String,
    pub name: String,
    pub files: Vec<FileNode>,
    pub directories: Vec<FileTree>,
}

impl FileTree {
    /// Depth-first, in-order walk: files before subdirectories at each
    /// level (spec.md §5), matching the order the Dataset Validator
    /// processes files in.
    #[must_use]
    pub fn walk(&self) -> Vec<&FileNode> {
        let mut out = Vec::new();
        self.walk_into(&mut out);
        out
    }

    fn walk_into<'a>(&'a self, out: &mut Vec<&'a FileNode>) {
        out.extend(self.files.iter());
        for dir in &self.directories {
            dir.walk_into(out);
        }
    }

    /// Top-level directory names directly under the root (spec.md §3
    /// "Dataset context" `baseDirs`).
    #[must_use]
    pub fn base_dirs(&self) -> Vec<String> {
        self.directories.iter().map(|d| d.name.clone()).collect()
    }

    /// Find a subdirectory by root-relative path (e.g. `/data/sub`).
    #[must_use]
    pub fn dir_at(&self, path: &str) -> Option<&FileTree> {
        if self.path == path {
            return Some(self);
        }
        self.directories.iter().find_map(|d| d.dir_at(path))
    }
}

fn normalize_schema_org_scheme(text: String) -> String {
    text.replace("http://schema.org", "https://schema.org")
}

/// Build the in-memory tree rooted at `root`, applying `ignore` to prune
/// the walk (spec.md §4.C). A missing/unreadable root is the one fatal
/// failure (spec.md §7 kind 3); every other I/O or parse failure becomes a
/// deferred issue on the affected file, or is skipped with a warning for a
/// subdirectory that cannot be listed.
///
/// # Errors
///
/// Returns [`TreeError::RootUnreadable`] if `root` cannot be listed.
pub fn build_tree(
    filesystem: &dyn FileSystem,
    root: &Path,
    ignore: &IgnoreMatcher,
) -> Result<FileTree, TreeError> {
    let root_entries = filesystem
        .read_dir(root)
        .map_err(TreeError::RootUnreadable)?;

    let inherited_ctx = root_entries
        .iter()
        .find(|e| !e.is_dir && e.path.file_name().and_then(|n| n.to_str()) == Some("dataset_description.json"))
        .and_then(|e| filesystem.read_to_string(&e.path).ok())
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(|v| jsonld::parse_context(&v).ok());

    Ok(build_dir_from_entries(
        filesystem,
        root_entries,
        "/",
        "/",
        ignore,
        inherited_ctx.as_ref(),
    ))
}

fn build_dir(
    filesystem: &dyn FileSystem,
    abs_path: &Path,
    rel_path: &str,
    name: &str,
    ignore: &IgnoreMatcher,
    ctx: Option<&jsonld::Context>,
) -> FileTree {
    match filesystem.read_dir(abs_path) {
        Ok(entries) => build_dir_from_entries(filesystem, entries, rel_path, name, ignore, ctx),
        Err(err) => {
            tracing::warn!(path = %abs_path.display(), error = %err, "skipping unreadable subdirectory");
            FileTree {
                path: rel_path.to_string(),
                name: name.to_string(),
                files: Vec::new(),
                directories: Vec::new(),
            }
        }
    }
}

fn build_dir_from_entries(
    filesystem: &dyn FileSystem,
    entries: Vec<DirEntry>,
    rel_path: &str,
    name: &str,
    ignore: &IgnoreMatcher,
    ctx: Option<&jsonld::Context>,
) -> FileTree {
    let mut files = Vec::new();
    let mut directories = Vec::new();

    for entry in entries {
        let Some(entry_name) = entry.path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let child_rel = if rel_path == "/" {
            format!("/{entry_name}")
        } else {
            format!("{rel_path}/{entry_name}")
        };
        let ignored = ignore.is_ignored(&entry.path, entry.is_dir);

        if entry.is_dir {
            directories.push(build_dir(
                filesystem,
                &entry.path,
                &child_rel,
                entry_name,
                ignore,
                ctx,
            ));
        } else {
            files.push(build_file(filesystem, &entry.path, &child_rel, entry_name, ignored, ctx));
        }
    }

    FileTree {
        path: rel_path.to_string(),
        name: name.to_string(),
        files,
        directories,
    }
}

fn build_file(
    filesystem: &dyn FileSystem,
    abs_path: &Path,
    rel_path: &str,
    name: &str,
    ignored: bool,
    ctx: Option<&jsonld::Context>,
) -> FileNode {
    let mut issue_info = Vec::new();

    let text = match filesystem.read_to_string(abs_path) {
        Ok(t) => Some(normalize_schema_org_scheme(t)),
        Err(err) => {
            issue_info.push(DeferredIssue {
                code: "IoError".to_string(),
                detail: err.to_string(),
            });
            None
        }
    };

    let size = text.as_ref().map_or(0, |t| t.len() as u64);

    let mut parsed = None;
    let mut expanded = None;

    if name.ends_with(".json") {
        if let Some(t) = &text {
            match serde_json::from_str::<Value>(t) {
                Ok(value) => {
                    match jsonld::expand(&value, ctx) {
                        Ok(e) => expanded = Some(e),
                        Err(err) => issue_info.push(DeferredIssue {
                            code: "InvalidJsonldSyntax".to_string(),
                            detail: err.to_string(),
                        }),
                    }
                    parsed = Some(value);
                }
                Err(err) => issue_info.push(DeferredIssue {
                    code: "InvalidJsonFormatting".to_string(),
                    detail: err.to_string(),
                }),
            }
        }
    }

    FileNode {
        path: rel_path.to_string(),
        name: name.to_string(),
        size,
        ignored,
        text,
        parsed,
        expanded,
        issue_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[test]
    fn builds_tree_with_files_and_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(tmp.path().join("dataset_description.json"), r#"{"name":"x"}"#).unwrap();
        stdfs::create_dir_all(tmp.path().join("data")).unwrap();
        stdfs::write(tmp.path().join("data/a_data.csv"), "a\n1\n").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();

        assert_eq!(tree.files.len(), 1);
        assert_eq!(tree.directories.len(), 1);
        assert_eq!(tree.directories[0].name, "data");
        assert_eq!(tree.base_dirs(), vec!["data".to_string()]);
    }

    #[test]
    fn invalid_json_is_deferred_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(tmp.path().join("dataset_description.json"), "{not json").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();

        let file = &tree.files[0];
        assert!(file.parsed.is_none());
        assert_eq!(file.issue_info[0].code, "InvalidJsonFormatting");
    }

    #[test]
    fn missing_root_is_fatal() {
        let ignore = IgnoreMatcher::new(Path::new("/nonexistent"), &[]).unwrap();
        let result = build_tree(&StdFs, Path::new("/definitely/not/a/real/path"), &ignore);
        assert!(matches!(result, Err(TreeError::RootUnreadable(_))));
    }

    #[test]
    fn walk_visits_files_before_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::create_dir_all(tmp.path().join("data")).unwrap();
        stdfs::write(tmp.path().join("root.json"), "{}").unwrap();
        stdfs::write(tmp.path().join("data/a_data.csv"), "a\n1\n").unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();
        let names: Vec<_> = tree.walk().iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, vec!["root.json".to_string(), "a_data.csv".to_string()]);
    }

    #[test]
    fn root_context_is_inherited_by_descendant_json() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(
            tmp.path().join("dataset_description.json"),
            r#"{"@context": {"@vocab": "https://schema.org/"}, "name": "x"}"#,
        )
        .unwrap();
        stdfs::create_dir_all(tmp.path().join("data")).unwrap();
        stdfs::write(
            tmp.path().join("data/file_metadata.json"),
            r#"{"variableMeasured": ["a"]}"#,
        )
        .unwrap();

        let ignore = IgnoreMatcher::new(tmp.path(), &[]).unwrap();
        let tree = build_tree(&StdFs, tmp.path(), &ignore).unwrap();
        let sidecar = &tree.directories[0].files[0];
        let expanded = sidecar.expanded.as_ref().unwrap();
        assert!(expanded.as_object().unwrap().contains_key("https://schema.org/variableMeasured"));
    }
}
