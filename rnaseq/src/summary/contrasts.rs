//! Contrast definitions and the per-contrast DE/GSEA figures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use launch::io::glob::glob_in;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::{debug, warn};

use crate::layout::{DE_COMPARISON_PLOTS, GSEA_DIR, de_filtered_table};
use crate::table::Table;

/// GSEA reports count a pathway as enriched below this FDR.
pub const GSEA_FDR_CUTOFF: f64 = 0.25;

/// One row of a contrasts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContrastDef {
    pub target: String,
    pub reference: String,
    pub variable: String,
}

/// Everything the delivery summary records for one contrast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastSummary {
    pub target: String,
    pub reference: String,
    pub variable: String,
    #[serde(rename = "DE_up")]
    pub de_up: usize,
    #[serde(rename = "DE_down")]
    pub de_down: usize,
    #[serde(rename = "GSEA")]
    pub gsea: BTreeMap<String, GseaDataset>,
    pub plots: Vec<String>,
}

/// Enriched pathway counts for one GSEA gene-set collection.
///
/// Serialized with keys named after the groups, e.g.
/// `{"KO_enriched_pathways": 3, "WT_enriched_pathways": 1, "index": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GseaDataset {
    pub target: String,
    pub target_enriched: usize,
    pub reference: String,
    pub reference_enriched: usize,
    pub index: String,
}

impl Serialize for GseaDataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(
            &format!("{}_enriched_pathways", self.target),
            &self.target_enriched,
        )?;
        map.serialize_entry(
            &format!("{}_enriched_pathways", self.reference),
            &self.reference_enriched,
        )?;
        map.serialize_entry("index", &self.index)?;
        map.end()
    }
}

/// Add the contrasts of one file to `contrasts`, keyed by contrast id.
pub fn parse_contrasts(path: &Path, contrasts: &mut BTreeMap<String, ContrastDef>) -> Result<()> {
    let table = Table::read_csv(path)?;
    let ids = table.column_values("id")?;
    let targets = table.column_values("target")?;
    let references = table.column_values("reference")?;
    let variables = table.column_values("variable")?;

    for (index, id) in ids.iter().enumerate() {
        if id.is_empty() {
            continue;
        }
        let def = ContrastDef {
            target: targets[index].to_string(),
            reference: references[index].to_string(),
            variable: variables[index].to_string(),
        };
        if let Some(previous) = contrasts.insert(id.to_string(), def.clone())
            && previous != def
        {
            warn!(contrast = %id, path = %path.display(), "contrast redefined; keeping the later definition");
        }
    }
    Ok(())
}

/// DE counts, GSEA figures and plots for every contrast.
pub fn gather_contrast_data(
    output_dir: &Path,
    contrasts: &BTreeMap<String, ContrastDef>,
) -> Result<BTreeMap<String, ContrastSummary>> {
    let mut summaries = BTreeMap::new();
    for (id, def) in contrasts {
        let (de_up, de_down) = count_de_genes(&output_dir.join(de_filtered_table(id)))
            .with_context(|| format!("differential expression for contrast {id}"))?;
        let gsea = gather_gsea(output_dir, id, def)
            .with_context(|| format!("GSEA results for contrast {id}"))?;
        let plots = relative_matches(output_dir, &format!("{DE_COMPARISON_PLOTS}/{id}/png/*.png"))?;
        debug!(contrast = %id, de_up, de_down, datasets = gsea.len(), "gathered contrast");
        summaries.insert(
            id.clone(),
            ContrastSummary {
                target: def.target.clone(),
                reference: def.reference.clone(),
                variable: def.variable.clone(),
                de_up,
                de_down,
                gsea,
                plots,
            },
        );
    }
    Ok(summaries)
}

/// `(up, down)` split of a filtered DESeq2 table on the sign of `log2FoldChange`.
fn count_de_genes(path: &Path) -> Result<(usize, usize)> {
    let table = Table::read_tsv(path)?;
    let mut up = 0;
    let mut down = 0;
    for value in table.column_values("log2FoldChange")? {
        match value.parse::<f64>() {
            Ok(change) if change >= 0.0 => up += 1,
            Ok(change) if change < 0.0 => down += 1,
            _ => warn!(path = %path.display(), value, "non-numeric log2FoldChange"),
        }
    }
    Ok((up, down))
}

fn gather_gsea(
    output_dir: &Path,
    id: &str,
    def: &ContrastDef,
) -> Result<BTreeMap<String, GseaDataset>> {
    let contrast_dir = output_dir.join(GSEA_DIR).join(id);
    let mut datasets = BTreeMap::new();
    if !contrast_dir.is_dir() {
        warn!(contrast = %id, path = %contrast_dir.display(), "no GSEA results");
        return Ok(datasets);
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&contrast_dir)
        .with_context(|| format!("read {}", contrast_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    for dataset in names {
        let dir = contrast_dir.join(&dataset);
        let (target_report, reference_report) = report_pair(&dir, id, &dataset, def)?;
        datasets.insert(
            dataset.clone(),
            GseaDataset {
                target: def.target.clone(),
                target_enriched: count_enriched(&target_report)?,
                reference: def.reference.clone(),
                reference_enriched: count_enriched(&reference_report)?,
                index: format!("{GSEA_DIR}/{id}/{dataset}/{id}.{dataset}.index.html"),
            },
        );
    }
    Ok(datasets)
}

/// `(target, reference)` reports of one dataset.
///
/// Reports are named after the groups, or both unnamed (`na_pos` for the
/// target, `na_neg` for the reference) when GSEA could not label the phenotypes.
fn report_pair(dir: &Path, id: &str, dataset: &str, def: &ContrastDef) -> Result<(PathBuf, PathBuf)> {
    let report = |name: &str| dir.join(format!("{id}.{dataset}.gsea_report_for_{name}.tsv"));
    let named = report(&def.target);
    let (target, reference) = if named.is_file() {
        (named, report(&def.reference))
    } else {
        (report("na_pos"), report("na_neg"))
    };
    if !target.is_file() {
        bail!("no GSEA report for target {} in {}", def.target, dir.display());
    }
    if !reference.is_file() {
        bail!(
            "no GSEA report for reference {} in {}",
            def.reference,
            dir.display()
        );
    }
    Ok((target, reference))
}

fn count_enriched(report: &Path) -> Result<usize> {
    let table = Table::read_tsv(report)?;
    Ok(table
        .column_values("FDR q-val")?
        .into_iter()
        .filter_map(|value| value.parse::<f64>().ok())
        .filter(|fdr| *fdr < GSEA_FDR_CUTOFF)
        .count())
}

/// Glob under `output_dir`, returning `/`-joined paths relative to it.
pub(crate) fn relative_matches(output_dir: &Path, pattern: &str) -> Result<Vec<String>> {
    Ok(glob_in(output_dir, pattern)?
        .into_iter()
        .filter_map(|path| {
            path.strip_prefix(output_dir)
                .ok()
                .map(|relative| relative.to_string_lossy().into_owned())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    fn def(target: &str, reference: &str) -> ContrastDef {
        ContrastDef {
            target: target.to_string(),
            reference: reference.to_string(),
            variable: "genotype".to_string(),
        }
    }

    #[test]
    fn later_file_overrides_same_contrast_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = temp.path().join("contrasts.csv");
        let second = temp.path().join("contrasts_extra.csv");
        write(&first, "id,variable,reference,target\nko_vs_wt,genotype,WT,KO\n");
        write(&second, "id,variable,reference,target\nko_vs_wt,genotype,WT,KO2\n");

        let mut contrasts = BTreeMap::new();
        parse_contrasts(&first, &mut contrasts).expect("first");
        parse_contrasts(&second, &mut contrasts).expect("second");

        assert_eq!(contrasts.len(), 1);
        assert_eq!(contrasts["ko_vs_wt"].target, "KO2");
    }

    #[test]
    fn gsea_falls_back_to_unnamed_reports() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(GSEA_DIR).join("c1/hallmark");
        write(
            &dir.join("c1.hallmark.gsea_report_for_na_pos.tsv"),
            "NAME\tFDR q-val\nA\t0.01\nB\t0.3\n",
        );
        write(
            &dir.join("c1.hallmark.gsea_report_for_na_neg.tsv"),
            "NAME\tFDR q-val\nC\t0.2\nD\t0.1\n",
        );

        let gsea = gather_gsea(temp.path(), "c1", &def("KO", "WT")).expect("gsea");

        let dataset = &gsea["hallmark"];
        assert_eq!(dataset.target_enriched, 1);
        assert_eq!(dataset.reference_enriched, 2);
        assert_eq!(
            serde_json::to_value(dataset).expect("json"),
            serde_json::json!({
                "KO_enriched_pathways": 1,
                "WT_enriched_pathways": 2,
                "index": format!("{GSEA_DIR}/c1/hallmark/c1.hallmark.index.html"),
            })
        );
    }

    #[test]
    fn unnamed_target_report_reads_unnamed_reference_too() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(GSEA_DIR).join("c1/hallmark");
        write(
            &dir.join("c1.hallmark.gsea_report_for_na_pos.tsv"),
            "NAME\tFDR q-val\nA\t0.01\n",
        );
        write(
            &dir.join("c1.hallmark.gsea_report_for_na_neg.tsv"),
            "NAME\tFDR q-val\nB\t0.9\n",
        );
        write(
            &dir.join("c1.hallmark.gsea_report_for_WT.tsv"),
            "NAME\tFDR q-val\nC\t0.01\nD\t0.01\n",
        );

        let gsea = gather_gsea(temp.path(), "c1", &def("KO", "WT")).expect("gsea");

        assert_eq!(gsea["hallmark"].target_enriched, 1);
        assert_eq!(gsea["hallmark"].reference_enriched, 0);
    }

    #[test]
    fn named_target_requires_named_reference() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(GSEA_DIR).join("c1/kegg");
        write(&dir.join("c1.kegg.gsea_report_for_KO.tsv"), "NAME\tFDR q-val\n");
        write(&dir.join("c1.kegg.gsea_report_for_na_neg.tsv"), "NAME\tFDR q-val\n");

        let err = gather_gsea(temp.path(), "c1", &def("KO", "WT")).expect_err("fatal");
        assert!(err.to_string().contains("reference WT"));
    }

    #[test]
    fn missing_target_report_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(GSEA_DIR).join("c1/kegg");
        write(
            &dir.join("c1.kegg.gsea_report_for_WT.tsv"),
            "NAME\tFDR q-val\n",
        );

        let err = gather_gsea(temp.path(), "c1", &def("KO", "WT")).expect_err("fatal");
        assert!(err.to_string().contains("target KO"));
    }

    #[test]
    fn missing_gsea_dir_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gsea = gather_gsea(temp.path(), "c1", &def("KO", "WT")).expect("gsea");
        assert!(gsea.is_empty());
    }
}
