use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;

use align_core::emit::{emit_aligned, DirectiveFileRewriter};
use align_core::engine::{align_programs, AlignOptions, AlignmentReport};
use binalign::{load_program, require_input_file, sha256_file, InputFormat};

/// Align two related executables for structural diffing.
///
/// This CLI is a thin wrapper around `align-core` (exposed in code as
/// `align_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "binalign",
    version,
    about = "Aligns two related executables so binary diffs show real changes, not layout noise",
    long_about = None
)]
struct Cli {
    /// First executable (side A).
    input1: PathBuf,

    /// Second executable (side B).
    input2: PathBuf,

    /// Output artifact for the first input.
    #[arg(long = "o1")]
    output1: PathBuf,

    /// Output artifact for the second input.
    #[arg(long = "o2")]
    output2: PathBuf,

    /// Architecture hint for the disassembler (e.g. x86_64, arm64, armv7).
    #[arg(long)]
    arch: Option<String>,

    /// Input interpretation. `auto` picks json for `.json` files.
    #[arg(long, value_enum, default_value = "auto")]
    format: InputFormat,

    /// Write a full JSON alignment report to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the run summary as JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Override the fuzzy function-match similarity floor (0.0..=1.0).
    #[arg(long)]
    min_similarity: Option<f64>,
}

/// Report file contents: the engine's report plus provenance stamps.
#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: String,
    input1_sha256: String,
    input2_sha256: String,
    #[serde(flatten)]
    report: &'a AlignmentReport,
}

fn write_report(
    path: &Path,
    report: &AlignmentReport,
    input1: &Path,
    input2: &Path,
) -> Result<()> {
    let document = ReportDocument {
        generated_at: Utc::now().to_rfc3339(),
        input1_sha256: sha256_file(input1)?,
        input2_sha256: sha256_file(input2)?,
        report,
    };
    let encoded = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, encoded)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &AlignmentReport) {
    println!("aligned {} <-> {}", report.program_a, report.program_b);
    println!(
        "- matched functions: {} (exact {}, name {}, fuzzy {})",
        report.matched_functions, report.exact_matches, report.name_matches, report.fuzzy_matches
    );
    println!("- only in A: {}", report.only_in_a.len());
    for unmatched in &report.only_in_a {
        println!(
            "    #{} {}",
            unmatched.function,
            unmatched.name.as_deref().unwrap_or("<anonymous>")
        );
    }
    println!("- only in B: {}", report.only_in_b.len());
    for unmatched in &report.only_in_b {
        println!(
            "    #{} {}",
            unmatched.function,
            unmatched.name.as_deref().unwrap_or("<anonymous>")
        );
    }
    for function in &report.functions {
        if function.removed_blocks > 0 || function.added_blocks > 0 {
            println!(
                "- {} <-> {}: {} blocks matched, {} removed, {} added",
                function.name_a.as_deref().unwrap_or("<anonymous>"),
                function.name_b.as_deref().unwrap_or("<anonymous>"),
                function.matched_blocks,
                function.removed_blocks,
                function.added_blocks
            );
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    require_input_file(&cli.input1)?;
    require_input_file(&cli.input2)?;

    let program_a = load_program(&cli.input1, cli.format, cli.arch.as_deref())?;
    let program_b = load_program(&cli.input2, cli.format, cli.arch.as_deref())?;

    let mut options = AlignOptions::default();
    if let Some(floor) = cli.min_similarity {
        options.matcher.fuzzy_floor = floor;
    }

    let map = align_programs(&program_a, &program_b, &options).with_context(|| {
        format!("alignment of {} against {} failed", program_a.path, program_b.path)
    })?;

    emit_aligned(
        &map,
        &program_a,
        &program_b,
        &DirectiveFileRewriter,
        &cli.output1,
        &cli.output2,
    )
    .with_context(|| {
        format!(
            "failed to materialize outputs {} / {}",
            cli.output1.display(),
            cli.output2.display()
        )
    })?;

    let report = AlignmentReport::from_map(&map, &program_a, &program_b);
    if let Some(path) = &cli.report {
        write_report(path, &report, &cli.input1, &cli.input2)?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}
