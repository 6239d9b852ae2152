//! The genome the pipeline ran with versus the one requested.

use std::fs;
use std::path::Path;

use anyhow::Result;
use launch::io::glob::glob_in;
use serde_json::Value;

use super::request::RequestDescriptor;
use super::{ChecksConfig, Findings};
use crate::layout::PARAMS_GLOB;

pub fn check_genome(
    output_dir: &Path,
    request: &RequestDescriptor,
    config: &ChecksConfig,
    findings: &mut Findings,
) -> Result<()> {
    let Some(requested) = request.genome() else {
        findings.fail("genome", "request has neither Build nor Species".to_string());
        return Ok(());
    };
    let Some(expected) = config.pipeline_genome(requested) else {
        findings.fail("genome", format!("no pipeline genome configured for {requested}"));
        return Ok(());
    };

    let Some(params) = glob_in(output_dir, PARAMS_GLOB)?.into_iter().next() else {
        findings.fail(
            "genome",
            format!("no {PARAMS_GLOB} under {}", output_dir.display()),
        );
        return Ok(());
    };
    let recorded = fs::read_to_string(&params)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(|value| value.get("genome").and_then(Value::as_str).map(str::to_string));
    match recorded {
        Some(genome) if genome == expected => {}
        Some(genome) => findings.fail(
            "genome",
            format!("pipeline ran with {genome}, request {requested} expects {expected}"),
        ),
        None => findings.fail(
            "genome",
            format!("no genome recorded in {}", params.display()),
        ),
    }
    Ok(())
}
