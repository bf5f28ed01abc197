use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use correlate_core::backends::{ImageFile, ImageReader};
use correlate_core::services::{CorrelationRunner, IngestBundle, RunInputs, RunOutcome, RunRequest};

use crate::commands::{open_project, print_json};
use crate::{canonicalize_or_current, sha256_file};

/// Options of one `correlate` invocation.
#[derive(Debug, Clone, Default)]
pub struct CorrelateArgs {
    pub input: String,
    pub orig_image: Option<String>,
    pub recomp_image: Option<String>,
    pub label: Option<String>,
}

fn open_image(path: &Path) -> Result<ImageFile> {
    ImageFile::open(path).with_context(|| format!("Failed to open image: {}", path.display()))
}

/// Run a full correlation for the project at `root` and record it.
pub fn correlate_command(root: &str, args: &CorrelateArgs, json: bool) -> Result<RunOutcome> {
    let ctx = open_project(root)?;

    let input_path = canonicalize_or_current(&args.input)?;
    let bundle = IngestBundle::load(&input_path)
        .with_context(|| format!("Failed to load ingestion bundle: {}", input_path.display()))?;
    let label = match &args.label {
        Some(label) => label.clone(),
        None => input_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "run".to_string()),
    };

    let orig_path = args.orig_image.as_deref().map(canonicalize_or_current).transpose()?;
    let recomp_path = args.recomp_image.as_deref().map(canonicalize_or_current).transpose()?;
    let orig = orig_path.as_deref().map(open_image).transpose()?;
    let recomp = recomp_path.as_deref().map(open_image).transpose()?;

    let request = RunRequest {
        label,
        input_hash: sha256_file(&input_path)?,
        orig_image_hash: orig_path.as_deref().map(sha256_file).transpose()?,
        recomp_image_hash: recomp_path.as_deref().map(sha256_file).transpose()?,
    };
    let inputs = RunInputs {
        bundle: &bundle,
        orig_image: orig.as_ref().map(|image| image as &dyn ImageReader),
        recomp_image: recomp.as_ref().map(|image| image as &dyn ImageReader),
    };

    let outcome = CorrelationRunner::new(&ctx)
        .run(&request, inputs)
        .with_context(|| format!("Correlation run '{}' failed", request.label))?;

    let report_path = ctx.layout.run_report_path(outcome.run_id);
    fs::create_dir_all(&ctx.layout.reports_dir).with_context(|| {
        format!("Failed to create reports dir: {}", ctx.layout.reports_dir.display())
    })?;
    fs::write(&report_path, serde_json::to_string_pretty(&outcome)?)
        .with_context(|| format!("Failed to write run report: {}", report_path.display()))?;

    if json {
        print_json(&outcome)?;
        return Ok(outcome);
    }

    println!("Correlation run #{} ({})", outcome.run_id, request.label);
    println!("  Entities: {}", outcome.entities);
    println!("  Matched: {}", outcome.matched);
    for pass in &outcome.report.passes {
        let linked = pass.summary.matched + pass.summary.recomp_assigned;
        if linked > 0 || pass.summary.updated > 0 {
            println!("  - {}: {} linked, {} updated", pass.pass, linked, pass.summary.updated);
        }
    }
    println!("  Events: {}", outcome.events.len());
    if !outcome.vtable_warnings.is_empty() {
        println!("  Vtable warnings: {}", outcome.vtable_warnings.len());
        for warning in &outcome.vtable_warnings {
            println!("    {} at {:#x}", warning.name, warning.orig_addr);
        }
    }
    if outcome.string_mismatches > 0 {
        println!("  Code string mismatches: {}", outcome.string_mismatches);
    }
    println!("  Report: {}", report_path.display());

    Ok(outcome)
}
