//! `rnaseq check`: post-run validation of an RNA-seq working directory.
//!
//! Every check runs regardless of earlier failures; the caller gets the full
//! list and decides the exit code.

pub mod counts;
pub mod de;
pub mod genome;
pub mod request;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use launch::io::glob::glob_in;
use serde::Deserialize;
use tracing::{error, info};

use crate::layout::{MERGED_COUNTS, MULTIQC_REPORT};
use crate::table::Table;
use counts::{check_samples, gene_case_failure};
use de::check_de;
use genome::check_genome;
use request::{RequestDescriptor, find_request_file};

/// Contrasts files live beside the request descriptor.
pub const CONTRASTS_FILE_GLOB: &str = "contrasts*.csv";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksConfig {
    /// Requested build → genome name the pipeline records.
    pub genome_map: BTreeMap<String, String>,
    /// Builds whose gene symbols are upper case.
    pub human_builds: Vec<String>,
    pub gene_case_rows: usize,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        let genome_map = [
            ("hg19", "hg19_local"),
            ("hg38", "hg38_local"),
            ("mm10", "mm10_local"),
            ("mm39", "mm39_local"),
        ]
        .into_iter()
        .map(|(build, genome)| (build.to_string(), genome.to_string()))
        .collect();
        Self {
            genome_map,
            human_builds: vec!["hg19".to_string(), "hg38".to_string()],
            gene_case_rows: 20,
        }
    }
}

impl ChecksConfig {
    /// Pipeline genome for a requested build; builds compare case-insensitively.
    pub fn pipeline_genome(&self, build: &str) -> Option<&str> {
        self.genome_map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(build))
            .map(|(_, genome)| genome.as_str())
    }

    pub fn is_human(&self, build: &str) -> bool {
        self.human_builds
            .iter()
            .any(|human| human.eq_ignore_ascii_case(build))
    }
}

/// Load the checks configuration; no path means the built-in defaults.
pub fn load_checks_config(path: Option<&Path>) -> Result<ChecksConfig> {
    let Some(path) = path else {
        return Ok(ChecksConfig::default());
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub check: &'static str,
    pub message: String,
}

/// Failures collected across all checks; each is logged as it is recorded.
#[derive(Debug, Default)]
pub struct Findings {
    pub failures: Vec<Failure>,
}

impl Findings {
    pub fn fail(&mut self, check: &'static str, message: String) {
        error!(check, "{message}");
        self.failures.push(Failure { check, message });
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether any failure came from `check`.
    pub fn failed(&self, check: &str) -> bool {
        self.failures.iter().any(|failure| failure.check == check)
    }
}

/// Run every check against the working directory `wdir`.
///
/// Errors are reserved for a missing or unusable request descriptor and
/// unreadable files; everything else is a recorded failure.
pub fn run_checks(wdir: &Path, config: &ChecksConfig) -> Result<Findings> {
    let request_path = find_request_file(wdir)?;
    let request = RequestDescriptor::read(&request_path)?;
    let output_dir = request.output_dir(wdir)?;
    info!(wdir = %wdir.display(), output_dir = %output_dir.display(), "checking run outputs");

    let mut findings = Findings::default();
    for required in [MULTIQC_REPORT, MERGED_COUNTS] {
        let path = output_dir.join(required);
        if !path.is_file() {
            findings.fail("files", format!("missing {}", path.display()));
        }
    }

    let contrast_files = glob_in(wdir, CONTRASTS_FILE_GLOB)?;
    check_de(&output_dir, &contrast_files, &mut findings)?;
    check_genome(&output_dir, &request, config, &mut findings)?;

    let counts_path = output_dir.join(MERGED_COUNTS);
    let counts = match counts_path.is_file().then(|| Table::read_tsv(&counts_path)) {
        Some(Ok(table)) => Some(table),
        Some(Err(err)) => {
            findings.fail("files", format!("{err:#}"));
            None
        }
        None => None,
    };
    check_samples(&output_dir, counts.as_ref(), &mut findings)?;

    // Independent of the sample check: either one alone fails the run.
    if let Some(counts) = &counts {
        let human = request.genome().is_some_and(|build| config.is_human(build));
        if let Some(message) = gene_case_failure(counts, human, config.gene_case_rows) {
            findings.fail("gene_case", message);
        }
    }

    if findings.passed() {
        info!(output_dir = %output_dir.display(), "all checks passed");
    }
    Ok(findings)
}
