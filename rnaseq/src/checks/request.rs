//! The `key: value` request descriptor in a run's working directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use launch::io::glob::glob_in;
use tracing::debug;

use crate::layout::REQUEST_GLOB;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    entries: BTreeMap<String, String>,
}

impl RequestDescriptor {
    /// Parse `key: value` lines; blank lines, `#` comments and lines without
    /// a colon are ignored. Values keep any further colons.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self { entries }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Value of `key` when present and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Genome the run was requested for (`Build`, else `Species`).
    pub fn genome(&self) -> Option<&str> {
        self.get("Build").or_else(|| self.get("Species"))
    }

    pub fn run_number(&self) -> Result<u32> {
        let raw = self
            .get("RunNumber")
            .ok_or_else(|| anyhow!("request has no RunNumber"))?;
        raw.parse()
            .with_context(|| format!("RunNumber {raw:?} is not a number"))
    }

    /// `<wdir>/r_<RunNumber>` with the run number zero-padded to three digits.
    pub fn output_dir(&self, wdir: &Path) -> Result<PathBuf> {
        Ok(wdir.join(format!("r_{:03}", self.run_number()?)))
    }
}

/// First request descriptor in `wdir`.
pub fn find_request_file(wdir: &Path) -> Result<PathBuf> {
    let matches = glob_in(wdir, REQUEST_GLOB)?;
    if matches.len() > 1 {
        debug!(wdir = %wdir.display(), count = matches.len(), "several request files; using the first");
    }
    matches
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no {REQUEST_GLOB} in {}", wdir.display()))
}
