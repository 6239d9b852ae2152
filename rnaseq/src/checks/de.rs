//! Differential-expression outputs for every declared comparison.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use launch::io::glob::glob_in;
use tracing::{debug, warn};

use super::Findings;
use crate::layout::{DE_REPORT_DIR, GSEA_DIR, de_filtered_table, de_full_table};

/// Comparison ids of a contrasts file: the first column of every data row.
pub fn comparisons(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("id"))
        .filter_map(|line| line.split(',').next())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Check the report, tables and GSEA links for each contrasts file.
pub fn check_de(
    output_dir: &Path,
    contrast_files: &[PathBuf],
    findings: &mut Findings,
) -> Result<()> {
    for file in contrast_files {
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let report = output_dir.join(DE_REPORT_DIR).join(format!("{stem}.html"));
        if !report.is_file() {
            findings.fail("de", format!("missing DE report {}", report.display()));
            continue;
        }

        let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
        for comparison in comparisons(&text) {
            check_comparison(output_dir, &comparison, findings)?;
        }
    }
    Ok(())
}

fn check_comparison(output_dir: &Path, comparison: &str, findings: &mut Findings) -> Result<()> {
    let filtered = output_dir.join(de_filtered_table(comparison));
    if !filtered.is_file() {
        findings.fail("de", format!("missing filtered DE table {}", filtered.display()));
    }

    let full = output_dir.join(de_full_table(comparison));
    if full.is_file() {
        let text = fs::read_to_string(&full).with_context(|| format!("read {}", full.display()))?;
        if text.lines().filter(|line| !line.trim().is_empty()).count() <= 1 {
            findings.fail("de", format!("DE table {} has no results", full.display()));
        }
    } else {
        findings.fail("de", format!("missing DE table {}", full.display()));
    }

    let links = glob_in(
        &output_dir.join(GSEA_DIR),
        &format!("{comparison}.*.index.html"),
    )?;
    if links.len() > 1 {
        warn!(comparison, count = links.len(), "several GSEA index links");
    }
    if links.is_empty() {
        findings.fail("de", format!("no GSEA index link for {comparison}"));
    }
    for link in &links {
        // is_file follows the symlink into the per-dataset report.
        if !link.is_file() {
            findings.fail("de", format!("broken GSEA index link {}", link.display()));
        }
    }
    debug!(comparison, "checked comparison");
    Ok(())
}
