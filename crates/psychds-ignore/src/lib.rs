//! Gitignore-style path filtering (spec.md §4.B).
//!
//! Built directly on `ignore::gitignore::GitignoreBuilder` — the same crate
//! `lintel-validate`/`lintel-check` use for directory discovery — rather
//! than hand-rolling a glob engine. `add_line` already implements
//! negation, leading-slash anchoring, `*`, `**`, trailing-`/`
//! directory-only matching, and character classes to gitignore semantics,
//! which is exactly what this component needs.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use thiserror::Error;

/// Default excludes applied to every dataset, regardless of
/// `.psychdsignore` contents (spec.md §4.B).
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git*",
    ".DS_Store",
    ".datalad/",
    "sourcedata/",
    "code/",
    "stimuli/",
    "analysis/",
    "documentation/",
    "log/",
    "data/raw/**",
    ".psychdsignore",
];

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
    #[error("failed to build ignore matcher: {0}")]
    Build(#[source] ignore::Error),
}

/// Gitignore-style matcher seeded with [`DEFAULT_EXCLUDES`] plus any
/// user-supplied `.psychdsignore` lines, in priority order (defaults
/// first, so a user negation pattern like `!data/raw/keep.csv` can still
/// override a default exclude — "last matching pattern wins").
pub struct IgnoreMatcher {
    inner: Gitignore,
}

impl IgnoreMatcher {
    /// Build a matcher rooted at `root`, with `user_lines` (the contents of
    /// `.psychdsignore`, already split into lines) appended after the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IgnoreError`] if a pattern is malformed.
    pub fn new(root: &Path, user_lines: &[String]) -> Result<Self, IgnoreError> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in DEFAULT_EXCLUDES {
            builder
                .add_line(None, pattern)
                .map_err(|source| IgnoreError::Pattern {
                    pattern: (*pattern).to_string(),
                    source,
                })?;
        }
        for line in user_lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            builder
                .add_line(None, trimmed)
                .map_err(|source| IgnoreError::Pattern {
                    pattern: trimmed.to_string(),
                    source,
                })?;
        }
        let inner = builder.build().map_err(IgnoreError::Build)?;
        Ok(Self { inner })
    }

    /// Whether `path` (absolute or relative to the matcher's root) should be
    /// excluded from the walk. The last matching pattern decides, with
    /// negated patterns (`!pattern`) un-ignoring a path (gitignore
    /// semantics, spec.md §4.B).
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.inner.matched(path, is_dir).is_ignore()
    }
}
