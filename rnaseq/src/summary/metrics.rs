//! Project-level metrics artifacts and the previous-summary fallback.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use launch::io::glob::glob_in;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::contrasts::relative_matches;
use crate::layout::{
    DE_EXPLORATORY_PLOTS, MULTIQC_DATA_DIR, MULTIQC_PLOT_DIR, SUMMARY_DIR, SUMMARY_FILE,
};

const SUMMARY_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/bicdelivery_summary/v1.schema.json"
));

/// `(summary key, file in the MultiQC data dir)`.
const DATA_ARTIFACTS: &[(&str, &str)] = &[("general", "multiqc_general_stats.txt")];
/// `(summary key, file in the MultiQC plot dir)`.
const PLOT_ARTIFACTS: &[(&str, &str)] = &[("multiqc_alignment", "star_alignment_plot-cnt.png")];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetrics {
    pub data: BTreeMap<String, String>,
    pub plots: BTreeMap<String, String>,
    /// Exploratory plots per contrast variable.
    #[serde(default)]
    pub comparison_set_qc: BTreeMap<String, Vec<String>>,
}

/// Project metrics recorded by an earlier summary of the same output dir.
///
/// A missing file yields `None`. A file that does not parse or fails the
/// summary schema is ignored with a warning.
pub fn load_previous_metrics(output_dir: &Path) -> Result<Option<ProjectMetrics>> {
    let path = output_dir.join(SUMMARY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let value: Value = match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "ignoring unparsable previous summary");
            return Ok(None);
        }
    };
    if let Err(err) = validate_summary(&value) {
        warn!(path = %path.display(), err = %format!("{err:#}"), "ignoring invalid previous summary");
        return Ok(None);
    }
    let metrics = serde_json::from_value(value["project_metrics"].clone())
        .with_context(|| format!("deserialize project_metrics of {}", path.display()))?;
    debug!(path = %path.display(), "loaded previous summary");
    Ok(Some(metrics))
}

/// Validate a summary document against the bundled schema (Draft 2020-12).
pub fn validate_summary(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SUMMARY_SCHEMA).context("parse summary schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile summary schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Copy the MultiQC artifacts into the summary dir and list the QC plots.
pub fn gather_project_metrics(
    output_dir: &Path,
    previous: Option<&ProjectMetrics>,
) -> Result<ProjectMetrics> {
    let summary_dir = output_dir.join(SUMMARY_DIR);
    fs::create_dir_all(&summary_dir)
        .with_context(|| format!("create {}", summary_dir.display()))?;

    let mut metrics = ProjectMetrics::default();
    for (key, file) in DATA_ARTIFACTS {
        let recorded = previous.and_then(|p| p.data.get(*key));
        let path = collect_artifact(output_dir, MULTIQC_DATA_DIR, file, recorded)?;
        metrics.data.insert((*key).to_string(), path);
    }
    for (key, file) in PLOT_ARTIFACTS {
        let recorded = previous.and_then(|p| p.plots.get(*key));
        let path = collect_artifact(output_dir, MULTIQC_PLOT_DIR, file, recorded)?;
        metrics.plots.insert((*key).to_string(), path);
    }

    for variable_dir in glob_in(&output_dir.join(DE_EXPLORATORY_PLOTS), "*")? {
        if !variable_dir.is_dir() {
            continue;
        }
        let Some(variable) = variable_dir.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        let plots = relative_matches(output_dir, &format!("{DE_EXPLORATORY_PLOTS}/{variable}/png/*"))?;
        metrics.comparison_set_qc.insert(variable, plots);
    }
    Ok(metrics)
}

/// Copy `source_dir/file` into the summary dir, or fall back to `recorded`.
///
/// Returns the artifact's path relative to `output_dir`.
fn collect_artifact(
    output_dir: &Path,
    source_dir: &str,
    file: &str,
    recorded: Option<&String>,
) -> Result<String> {
    let source = output_dir.join(source_dir).join(file);
    let relative = format!("{SUMMARY_DIR}/{file}");
    if source.is_file() {
        let dest = output_dir.join(&relative);
        fs::copy(&source, &dest)
            .with_context(|| format!("copy {} to {}", source.display(), dest.display()))?;
        return Ok(relative);
    }

    match recorded {
        Some(path) if output_dir.join(path).is_file() => {
            info!(artifact = file, path = %path, "reusing artifact from previous summary");
            Ok(path.clone())
        }
        _ => bail!(
            "{} is missing and no previous summary records a copy",
            source.display()
        ),
    }
}
