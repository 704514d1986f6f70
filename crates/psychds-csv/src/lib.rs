//! CSV parsing and structural validation (spec.md §4.H).
//!
//! Deliberately narrow: this is not a general CSV reader, just enough to
//! turn a data file's text into a header→values map and flag the
//! structural problems the schema cares about. Quoting support exists only
//! because real data files quote commas inside free-text fields.

use std::collections::{BTreeMap, HashSet};

use psychds_diagnostics::{evidence_for, IssueStore};
use psychds_schema::Schema;

/// The result of parsing a CSV file: header order plus a column→values map
/// (spec.md §3 "Per-file context" `columns`).
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub columns: BTreeMap<String, Vec<String>>,
}

/// Parse `text` as CSV, recording structural issues against `path` in
/// `store`. Never fails outright — a malformed file yields an empty or
/// partial [`CsvTable`] plus the relevant issue (spec.md §7: a bad CSV
/// disables column checks for that file only).
pub fn read(schema: &Schema, text: &str, path: &str, store: &mut IssueStore) -> CsvTable {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.lines().filter(|l| !l.trim().is_empty()).collect();

    let Some(header_line) = lines.first() else {
        store.add_schema_issue(schema.error_template("NO_HEADER").as_ref(), vec![evidence_for(path.as_ref())]);
        return CsvTable::default();
    };

    let headers = match tokenize_line(header_line) {
        Ok(h) if !(h.len() == 1 && h[0].is_empty()) => h,
        _ => {
            store.add_schema_issue(schema.error_template("NO_HEADER").as_ref(), vec![evidence_for(path.as_ref())]);
            return CsvTable::default();
        }
    };

    let mut columns: BTreeMap<String, Vec<String>> =
        headers.iter().map(|h| (h.clone(), Vec::new())).collect();

    for line in &lines[1..] {
        match tokenize_line(line) {
            Ok(fields) if fields.len() == headers.len() => {
                for (header, value) in headers.iter().zip(fields) {
                    columns.entry(header.clone()).or_default().push(value);
                }
            }
            Ok(_) => {
                store.add_schema_issue(
                    schema.error_template("HEADER_ROW_MISMATCH").as_ref(),
                    vec![evidence_for(path.as_ref())],
                );
            }
            Err(message) => {
                store.add_schema_issue(
                    schema.error_template("CSV_FORMATTING_ERROR").as_ref(),
                    vec![evidence_for(path.as_ref()).with_evidence(message)],
                );
            }
        }
    }

    if let Some(row_id) = columns.get("row_id") {
        let mut seen = HashSet::new();
        if row_id.iter().any(|v| !seen.insert(v.clone())) {
            store.add_schema_issue(
                schema.error_template("ROWID_VALUES_NOT_UNIQUE").as_ref(),
                vec![evidence_for(path.as_ref())],
            );
        }
    }

    CsvTable { headers, columns }
}

/// Split one line on commas, treating a double-quoted segment (with `""`
/// as an escaped quote) as a single field even if it contains commas.
///
/// # Errors
///
/// Returns an error message if a quoted field is never closed.
fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}
