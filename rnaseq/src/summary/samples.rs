//! Per-sample group membership for the variables the contrasts compare.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};

use crate::table::Table;

pub const SAMPLE_COLUMN: &str = "sample";

/// Sample name → (variable → group value).
pub type SampleGroups = BTreeMap<String, BTreeMap<String, String>>;

/// Record each sample's value for every variable in `variables`.
///
/// The same sample may appear on several input rows (one per FASTQ pair);
/// rows must agree on every variable or the input is rejected.
pub fn pull_sample_groups(
    input: &Table,
    variables: &BTreeSet<String>,
    samples: &mut SampleGroups,
) -> Result<()> {
    let names = input.column_values(SAMPLE_COLUMN)?;
    for variable in variables {
        let values = input.column_values(variable)?;
        for (sample, value) in names.iter().zip(values) {
            if sample.is_empty() {
                continue;
            }
            let groups = samples.entry(sample.to_string()).or_default();
            match groups.get(variable) {
                Some(existing) if existing != value => bail!(
                    "sample {sample} has conflicting values for {variable}: {existing:?} and {value:?}"
                ),
                Some(_) => {}
                None => {
                    groups.insert(variable.clone(), value.to_string());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn repeated_rows_collapse_into_one_sample() {
        let input = Table::parse(
            "sample,fastq_1,genotype,batch\n\
             s1,a_R1.fq.gz,KO,b1\n\
             s1,b_R1.fq.gz,KO,b1\n\
             s2,c_R1.fq.gz,WT,b2\n",
            ',',
        )
        .expect("parse");
        let mut samples = SampleGroups::new();

        pull_sample_groups(&input, &variables(&["genotype"]), &mut samples).expect("groups");

        assert_eq!(samples.len(), 2);
        assert_eq!(samples["s1"]["genotype"], "KO");
        assert!(!samples["s1"].contains_key("batch"));
    }

    #[test]
    fn conflicting_values_are_fatal() {
        let input = Table::parse("sample,genotype\ns1,KO\ns1,WT\n", ',').expect("parse");
        let mut samples = SampleGroups::new();

        let err = pull_sample_groups(&input, &variables(&["genotype"]), &mut samples)
            .expect_err("conflict");
        assert!(err.to_string().contains("conflicting values for genotype"));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let input = Table::parse("sample,genotype\ns1,KO\n", ',').expect("parse");
        let mut samples = SampleGroups::new();
        assert!(pull_sample_groups(&input, &variables(&["treatment"]), &mut samples).is_err());
    }
}
