//! Sample coverage and gene-symbol casing of the merged counts table.

use std::path::Path;

use anyhow::Result;
use launch::io::glob::glob_in;

use super::Findings;
use crate::layout::{ALIGNMENT_DIR, INPUT_FILE};
use crate::summary::samples::SAMPLE_COLUMN;
use crate::table::Table;

pub const GENE_SYMBOL_COLUMN: &str = "GeneSymbol";

/// Every sample in the sample sheet needs an alignment and a counts column.
///
/// `counts` is `None` when the merged counts table could not be read; the
/// alignment half still runs.
pub fn check_samples(output_dir: &Path, counts: Option<&Table>, findings: &mut Findings) -> Result<()> {
    let input_path = output_dir.join(INPUT_FILE);
    let input = match Table::read_csv(&input_path) {
        Ok(input) => input,
        Err(err) => {
            findings.fail("samples", format!("{err:#}"));
            return Ok(());
        }
    };
    let mut samples: Vec<&str> = match input.column_values(SAMPLE_COLUMN) {
        Ok(samples) => samples,
        Err(err) => {
            findings.fail("samples", format!("{}: {err}", input_path.display()));
            return Ok(());
        }
    };
    samples.retain(|sample| !sample.is_empty());
    samples.sort_unstable();
    samples.dedup();

    let alignment_dir = output_dir.join(ALIGNMENT_DIR);
    for sample in samples {
        if glob_in(&alignment_dir, &format!("{sample}.*.bam"))?.is_empty() {
            findings.fail(
                "samples",
                format!("no alignment for {sample} in {}", alignment_dir.display()),
            );
        }
        if let Some(counts) = counts
            && !counts.has_column(sample)
        {
            findings.fail("samples", format!("{sample} missing from merged counts"));
        }
    }
    Ok(())
}

/// Compare the casing of the first `rows` gene symbols with the convention
/// for the genome: mostly upper case for human, otherwise mostly not.
///
/// Returns the failure message, if any.
pub fn gene_case_failure(counts: &Table, human: bool, rows: usize) -> Option<String> {
    let symbols = match counts.column_values(GENE_SYMBOL_COLUMN) {
        Ok(symbols) => symbols,
        Err(err) => return Some(format!("merged counts: {err}")),
    };
    let sampled: Vec<&str> = symbols
        .into_iter()
        .take(rows)
        .filter(|symbol| symbol.chars().any(char::is_alphabetic))
        .collect();
    if sampled.is_empty() {
        return Some("merged counts has no gene symbols".to_string());
    }

    let upper = sampled
        .iter()
        .filter(|symbol| {
            symbol
                .chars()
                .filter(|c| c.is_alphabetic())
                .all(char::is_uppercase)
        })
        .count();
    let mostly_upper = upper * 2 > sampled.len();
    match (human, mostly_upper) {
        (true, false) => Some(format!(
            "{upper} of {} gene symbols are upper case; human genes should be",
            sampled.len()
        )),
        (false, true) => Some(format!(
            "{upper} of {} gene symbols are upper case; expected mixed case for a non-human genome",
            sampled.len()
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(symbols: &[&str]) -> Table {
        let mut text = String::from("GeneID\tGeneSymbol\ts1\n");
        for (index, symbol) in symbols.iter().enumerate() {
            text.push_str(&format!("ENSG{index:05}\t{symbol}\t10\n"));
        }
        Table::parse(&text, '\t').expect("parse")
    }

    #[test]
    fn human_upper_case_passes() {
        assert_eq!(gene_case_failure(&counts(&["ACTB", "GAPDH", "TP53"]), true, 20), None);
    }

    #[test]
    fn mouse_mixed_case_passes_and_upper_fails() {
        assert_eq!(gene_case_failure(&counts(&["Actb", "Gapdh", "Trp53"]), false, 20), None);
        assert!(gene_case_failure(&counts(&["ACTB", "GAPDH", "TRP53"]), false, 20).is_some());
    }

    #[test]
    fn only_first_rows_are_sampled() {
        let mut symbols = vec!["actb"; 3];
        symbols.extend(["ACTB"; 10]);
        assert!(gene_case_failure(&counts(&symbols), true, 3).is_some());
        assert_eq!(gene_case_failure(&counts(&symbols), true, 13), None);
    }

    #[test]
    fn numeric_only_symbols_are_not_counted() {
        assert_eq!(gene_case_failure(&counts(&["7SK", "12345", "ACTB"]), true, 20), None);
        assert!(gene_case_failure(&counts(&["12345"]), true, 20).is_some());
    }
}
