//! Fixed locations inside an RNA-seq run's output directory.

pub const INPUT_FILE: &str = "project_files/input.csv";
pub const CONTRASTS_GLOB: &str = "project_files/contrasts*.csv";
pub const SUMMARY_FILE: &str = "project_files/bicdelivery_summary.json";
/// Copies of the metrics artifacts; `pipeline_info` is not rsync'd away.
pub const SUMMARY_DIR: &str = "pipeline_info/bicdelivery_summary";
pub const PARAMS_GLOB: &str = "pipeline_info/params_*.json";

pub const MULTIQC_REPORT: &str = "metrics/multiqc/star_htseq/multiqc_report.html";
pub const MULTIQC_DATA_DIR: &str = "metrics/multiqc/star_htseq/multiqc_report_data";
pub const MULTIQC_PLOT_DIR: &str = "metrics/multiqc/star_htseq/multiqc_report_plots/png";

pub const MERGED_COUNTS: &str = "star_htseq/htseq/htseq.merged.counts.tsv";
pub const ALIGNMENT_DIR: &str = "star_htseq/alignment";

pub const DE_TABLES_DIR: &str = "star_htseq/differentialExpression_gene/tables/differential";
pub const DE_REPORT_DIR: &str = "star_htseq/differentialExpression_gene/report";
pub const GSEA_DIR: &str = "star_htseq/differentialExpression_gene/report/gsea";
pub const DE_EXPLORATORY_PLOTS: &str = "star_htseq/differentialExpression_gene/plots/exploratory";
pub const DE_COMPARISON_PLOTS: &str = "star_htseq/differentialExpression_gene/plots/differential";

/// Request descriptor in a run's working directory.
pub const REQUEST_GLOB: &str = "*_request.txt";

/// Full DESeq2 results of one comparison, relative to the output dir.
pub fn de_full_table(comparison: &str) -> String {
    format!("{DE_TABLES_DIR}/{comparison}.deseq2.results.tsv")
}

/// Filtered DESeq2 results of one comparison, relative to the output dir.
pub fn de_filtered_table(comparison: &str) -> String {
    format!("{DE_TABLES_DIR}/{comparison}.deseq2.results_filtered.tsv")
}
