//! Shell-style file lookup relative to a directory.
//!
//! Patterns use `glob` syntax (`*`, `?`, `[...]`, `/`-separated components).
//! A leading `.` must be matched literally. Results are sorted so "exactly one
//! match" checks and argument lists are stable across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use glob::{MatchOptions, Pattern};

/// Return every path under `dir` matching `pattern`, sorted.
///
/// `dir` is matched literally; a missing `dir` yields no matches.
pub fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if pattern.trim_matches('/').is_empty() {
        bail!("empty glob pattern");
    }
    let full = format!(
        "{}/{}",
        Pattern::escape(&dir.to_string_lossy()),
        pattern.trim_start_matches('/')
    );
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let mut matches = Vec::new();
    let paths = glob::glob_with(&full, options)
        .with_context(|| format!("invalid glob pattern {pattern:?}"))?;
    for entry in paths {
        matches.push(entry.context("read glob entry")?);
    }
    matches.sort();
    Ok(matches)
}
