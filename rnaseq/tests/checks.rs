use std::fs;
use std::path::{Path, PathBuf};

use rnaseq::checks::{ChecksConfig, Findings, run_checks};
use rnaseq::layout::{
    ALIGNMENT_DIR, DE_REPORT_DIR, GSEA_DIR, INPUT_FILE, MERGED_COUNTS, MULTIQC_REPORT,
    de_filtered_table, de_full_table,
};

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}

fn merged_counts(symbols: &[&str]) -> String {
    let mut text = String::from("GeneID\tGeneSymbol\ts1\ts2\n");
    for (index, symbol) in symbols.iter().enumerate() {
        text.push_str(&format!("ENSG{index:05}\t{symbol}\t10\t12\n"));
    }
    text
}

fn upper_symbols() -> Vec<String> {
    (0..25).map(|index| format!("GENE{index}")).collect()
}

/// A complete hg38 run in `<wdir>/r_001`.
fn passing_run(wdir: &Path) -> PathBuf {
    write(
        &wdir.join("Proj_12345_request.txt"),
        "# request\nProjectID: Proj_12345\nBuild: hg38\nRunNumber: 1\n",
    );
    write(
        &wdir.join("contrasts.csv"),
        "id,variable,reference,target\nko_vs_wt,genotype,WT,KO\n",
    );
    let out = wdir.join("r_001");
    write(&out.join(MULTIQC_REPORT), "<html/>");
    let symbols = upper_symbols();
    let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
    write(&out.join(MERGED_COUNTS), &merged_counts(&symbols));
    write(&out.join(DE_REPORT_DIR).join("contrasts.html"), "<html/>");
    write(&out.join(de_full_table("ko_vs_wt")), "gene\tlog2FoldChange\nA\t1.0\n");
    write(&out.join(de_filtered_table("ko_vs_wt")), "gene\tlog2FoldChange\n");
    write(&out.join(GSEA_DIR).join("ko_vs_wt.hallmark.index.html"), "<html/>");
    write(
        &out.join("pipeline_info/params_2024-05-01_10-00-00.json"),
        r#"{"genome": "hg38_local", "outdir": "."}"#,
    );
    write(
        &out.join(INPUT_FILE),
        "sample,fastq_1\ns1,s1_R1.fq.gz\ns2,s2_R1.fq.gz\n",
    );
    for sample in ["s1", "s2"] {
        write(
            &out.join(ALIGNMENT_DIR)
                .join(format!("{sample}.Aligned.sortedByCoord.out.bam")),
            "bam",
        );
    }
    out
}

fn check(wdir: &Path) -> Findings {
    run_checks(wdir, &ChecksConfig::default()).expect("checks ran")
}

fn failed_checks(findings: &Findings) -> Vec<&'static str> {
    let mut checks: Vec<&'static str> = findings.failures.iter().map(|f| f.check).collect();
    checks.dedup();
    checks
}

#[test]
fn complete_run_passes() {
    let temp = tempfile::tempdir().expect("tempdir");
    passing_run(temp.path());

    let findings = check(temp.path());

    assert!(findings.passed(), "{:?}", findings.failures);
}

#[test]
fn lower_case_symbols_fail_gene_case_for_hg38() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = passing_run(temp.path());
    let symbols: Vec<String> = (0..20).map(|index| format!("gene{index}")).collect();
    let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
    write(&out.join(MERGED_COUNTS), &merged_counts(&symbols));

    let findings = check(temp.path());

    assert_eq!(failed_checks(&findings), vec!["gene_case"]);
}

#[test]
fn missing_sample_fails_even_when_gene_case_passes() {
    // Each of these two checks fails the run on its own.
    let temp = tempfile::tempdir().expect("tempdir");
    let out = passing_run(temp.path());
    fs::remove_file(out.join(ALIGNMENT_DIR).join("s2.Aligned.sortedByCoord.out.bam"))
        .expect("rm bam");

    let findings = check(temp.path());

    assert!(!findings.passed());
    assert!(findings.failed("samples"));
    assert!(!findings.failed("gene_case"));
}

#[test]
fn sample_and_gene_case_failures_are_both_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = passing_run(temp.path());
    write(
        &out.join(MERGED_COUNTS),
        "GeneID\tGeneSymbol\ts1\nENSG1\tactb\t1\nENSG2\tgapdh\t2\n",
    );

    let findings = check(temp.path());

    assert!(findings.failed("samples"));
    assert!(findings.failed("gene_case"));
    assert!(
        findings
            .failures
            .iter()
            .any(|f| f.message.contains("s2 missing from merged counts"))
    );
}

#[test]
fn failures_accumulate_across_checks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = passing_run(temp.path());
    fs::remove_file(out.join(MULTIQC_REPORT)).expect("rm report");
    fs::remove_file(out.join(de_filtered_table("ko_vs_wt"))).expect("rm table");
    write(
        &out.join("pipeline_info/params_2024-05-01_10-00-00.json"),
        r#"{"genome": "mm10_local"}"#,
    );

    let findings = check(temp.path());

    assert_eq!(failed_checks(&findings), vec!["files", "de", "genome"]);
}

#[test]
fn missing_de_report_skips_its_comparisons() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = passing_run(temp.path());
    fs::remove_file(out.join(DE_REPORT_DIR).join("contrasts.html")).expect("rm report");
    fs::remove_file(out.join(de_full_table("ko_vs_wt"))).expect("rm table");

    let findings = check(temp.path());

    let de: Vec<_> = findings.failures.iter().filter(|f| f.check == "de").collect();
    assert_eq!(de.len(), 1);
    assert!(de[0].message.contains("missing DE report"));
}

#[test]
fn header_only_full_table_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = passing_run(temp.path());
    write(&out.join(de_full_table("ko_vs_wt")), "gene\tlog2FoldChange\n");

    let findings = check(temp.path());

    assert_eq!(failed_checks(&findings), vec!["de"]);
}

#[test]
fn missing_request_file_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert!(run_checks(temp.path(), &ChecksConfig::default()).is_err());
}
