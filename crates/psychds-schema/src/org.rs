//! schema.org vocabulary traversal (spec.md §4.I).
//!
//! `is_a` chains are acyclic by construction in schema.org's real vocabulary,
//! but spec.md §9 calls out guarding the recursive traversals with a
//! visited-set regardless — cheap and this is the one place a malformed
//! bundled/fetched vocabulary could otherwise hang the walk.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ClassDef {
    #[serde(default)]
    pub is_a: Option<String>,
    #[serde(default)]
    pub slots: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotDef {
    #[serde(default)]
    pub range: Vec<String>,
    #[serde(default)]
    pub any_of: Vec<String>,
}

/// The merged schema.org vocabulary: a class hierarchy (`is_a` chains) and
/// a property→range table (`slots`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaOrgVocab {
    #[serde(default)]
    pub classes: HashMap<String, ClassDef>,
    #[serde(default)]
    pub slots: HashMap<String, SlotDef>,
}

impl SchemaOrgVocab {
    /// `class` plus every ancestor reachable via `is_a`.
    #[must_use]
    pub fn super_classes(&self, class: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(class.to_string());
        while let Some(c) = current {
            if !seen.insert(c.clone()) {
                break;
            }
            out.push(c.clone());
            current = self.classes.get(&c).and_then(|d| d.is_a.clone());
        }
        out
    }

    /// `class` plus every descendant (any class whose `is_a` chain reaches
    /// `class`).
    #[must_use]
    pub fn sub_classes(&self, class: &str) -> Vec<String> {
        let mut out = vec![class.to_string()];
        let mut seen: HashSet<String> = out.iter().cloned().collect();
        let mut frontier = vec![class.to_string()];
        while let Some(current) = frontier.pop() {
            for (name, def) in &self.classes {
                if def.is_a.as_deref() == Some(current.as_str()) && seen.insert(name.clone()) {
                    out.push(name.clone());
                    frontier.push(name.clone());
                }
            }
        }
        out
    }

    /// Whether `property` is a slot of `class`, directly or via any
    /// ancestor in its `is_a` chain.
    #[must_use]
    pub fn is_slot_of(&self, property: &str, class: &str) -> bool {
        self.super_classes(class)
            .iter()
            .any(|c| self.classes.get(c).is_some_and(|d| d.slots.iter().any(|s| s == property)))
    }

    /// The permitted value range for `property`: the union of its declared
    /// `range` and the ranges of its `any_of` variants, each expanded to
    /// include all subclasses recursively (spec.md §4.I).
    #[must_use]
    pub fn permitted_range(&self, property: &str) -> Vec<String> {
        let Some(slot) = self.slots.get(property) else {
            return Vec::new();
        };
        let mut out = HashSet::new();
        for r in slot.range.iter().chain(slot.any_of.iter()) {
            for sub in self.sub_classes(r) {
                out.insert(sub);
            }
        }
        out.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;

    #[test]
    fn super_classes_walks_is_a_chain() {
        let schema = Schema::bundled_default().unwrap();
        let vocab = schema.org_vocab();
        let chain = vocab.super_classes("Dataset");
        assert_eq!(chain, vec!["Dataset", "CreativeWork", "Thing"]);
    }

    #[test]
    fn sub_classes_includes_self_and_descendants() {
        let schema = Schema::bundled_default().unwrap();
        let vocab = schema.org_vocab();
        let subs = vocab.sub_classes("Thing");
        assert!(subs.contains(&"Thing".to_string()));
        assert!(subs.contains(&"Dataset".to_string()));
        assert!(subs.contains(&"Person".to_string()));
    }

    #[test]
    fn is_slot_of_checks_ancestors() {
        let schema = Schema::bundled_default().unwrap();
        let vocab = schema.org_vocab();
        assert!(vocab.is_slot_of("variableMeasured", "Dataset"));
        assert!(vocab.is_slot_of("name", "Dataset")); // inherited from Thing
        assert!(!vocab.is_slot_of("givenName", "Dataset"));
    }

    #[test]
    fn permitted_range_expands_any_of_to_subclasses() {
        let schema = Schema::bundled_default().unwrap();
        let vocab = schema.org_vocab();
        let range = vocab.permitted_range("author");
        assert!(range.contains(&"Person".to_string()));
        assert!(range.contains(&"Organization".to_string()));
    }

    #[test]
    fn permitted_range_unknown_property_is_empty() {
        let schema = Schema::bundled_default().unwrap();
        let vocab = schema.org_vocab();
        assert!(vocab.permitted_range("notAProperty").is_empty());
    }
}
