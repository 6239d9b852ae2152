//! `rnaseq summary`: the delivery summary of a finished run.
//!
//! Reads the run's sample sheet and contrasts, cross-references the DE and
//! GSEA outputs, snapshots the MultiQC artifacts and writes
//! `project_files/bicdelivery_summary.json`. Any missing required input or
//! inconsistent sample data aborts the command.

pub mod contrasts;
pub mod metrics;
pub mod samples;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use launch::io::glob::glob_in;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::info;

use crate::layout::{CONTRASTS_GLOB, INPUT_FILE, SUMMARY_FILE};
use crate::table::Table;
use contrasts::{ContrastDef, ContrastSummary, gather_contrast_data, parse_contrasts};
use metrics::{ProjectMetrics, gather_project_metrics, load_previous_metrics};
use samples::{SampleGroups, pull_sample_groups};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverySummary {
    pub samples: SampleGroups,
    pub project_metrics: ProjectMetrics,
    pub contrasts: BTreeMap<String, ContrastSummary>,
}

/// Build the summary document for `output_dir` without writing it.
pub fn build_summary(output_dir: &Path) -> Result<DeliverySummary> {
    if !output_dir.is_dir() {
        bail!("output directory {} does not exist", output_dir.display());
    }
    let input_path = output_dir.join(INPUT_FILE);
    if !input_path.is_file() {
        bail!("sample sheet {} does not exist", input_path.display());
    }

    let mut definitions: BTreeMap<String, ContrastDef> = BTreeMap::new();
    for path in glob_in(output_dir, CONTRASTS_GLOB)? {
        parse_contrasts(&path, &mut definitions)
            .with_context(|| format!("parse contrasts {}", path.display()))?;
    }
    let variables: BTreeSet<String> = definitions
        .values()
        .map(|def| def.variable.clone())
        .filter(|variable| !variable.is_empty())
        .collect();

    let input = Table::read_csv(&input_path)?;
    let mut samples = SampleGroups::new();
    pull_sample_groups(&input, &variables, &mut samples)
        .with_context(|| format!("sample groups from {}", input_path.display()))?;

    let contrasts = gather_contrast_data(output_dir, &definitions)?;
    let previous = load_previous_metrics(output_dir)?;
    let project_metrics = gather_project_metrics(output_dir, previous.as_ref())?;

    Ok(DeliverySummary {
        samples,
        project_metrics,
        contrasts,
    })
}

/// Write `summary` as indented JSON to the run's summary file.
pub fn write_summary(output_dir: &Path, summary: &DeliverySummary) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE);
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    summary
        .serialize(&mut serializer)
        .context("serialize delivery summary")?;
    buf.push(b'\n');
    fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Build and write the summary; returns the written path.
pub fn run(output_dir: &Path) -> Result<PathBuf> {
    let summary = build_summary(output_dir)?;
    let path = write_summary(output_dir, &summary)?;
    info!(
        path = %path.display(),
        samples = summary.samples.len(),
        contrasts = summary.contrasts.len(),
        "wrote delivery summary"
    );
    Ok(path)
}
