//! Shared helpers for the binalign CLI.
//!
//! Kept in the library so the input-handling logic is unit-testable and the
//! binary in `main.rs` stays a thin argument-parsing wrapper.

use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use sha2::{Digest, Sha256};

use align_core::loader::{load_program_binary, load_program_json};
use align_core::model::Program;

/// How an input file should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// Pick `json` for `.json` files, `binary` for everything else.
    Auto,
    /// Pre-disassembled program document.
    Json,
    /// Native executable, disassembled by the capstone loader.
    Binary,
}

impl InputFormat {
    /// Resolve `Auto` against a concrete path.
    pub fn resolve(self, path: &Path) -> InputFormat {
        match self {
            InputFormat::Auto => {
                if path.extension().is_some_and(|ext| ext == "json") {
                    InputFormat::Json
                } else {
                    InputFormat::Binary
                }
            }
            other => other,
        }
    }
}

/// Fail early with a path-naming error if an input does not exist.
pub fn require_input_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("input file not found: {}", path.display());
    }
    Ok(())
}

/// Load one input into a program via the loader matching its format.
pub fn load_program(path: &Path, format: InputFormat, arch: Option<&str>) -> Result<Program> {
    let program = match format.resolve(path) {
        InputFormat::Json => load_program_json(path)
            .with_context(|| format!("failed to load program document {}", path.display()))?,
        InputFormat::Binary | InputFormat::Auto => load_program_binary(path, arch)
            .with_context(|| format!("failed to disassemble {}", path.display()))?,
    };
    Ok(program)
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
///
/// Stamped into reports so a report can be tied back to the exact inputs.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open input for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("failed to read input for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}
