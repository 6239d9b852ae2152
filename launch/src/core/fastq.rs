//! Extraction of sequencing-facility project ids from ticket descriptions.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Five digits with an optional `_<letter>` suffix (e.g. `12345`, `12345_B`).
static PROJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{5}(?:_[a-zA-Z])?)").expect("valid project id regex"));

/// Collect project ids from description lines that start with one of `keywords`.
///
/// Only the text after the first `:` of a matching line is scanned. Ids are
/// de-duplicated and returned sorted.
pub fn extract_project_ids(description: &str, keywords: &[String]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for line in description.lines() {
        if !keywords.iter().any(|keyword| line.starts_with(keyword.as_str())) {
            continue;
        }
        let value = match line.split_once(':') {
            Some((_, value)) => value,
            None => line,
        };
        ids.extend(
            PROJECT_ID
                .find_iter(value.trim())
                .map(|m| m.as_str().to_string()),
        );
    }
    ids
}
