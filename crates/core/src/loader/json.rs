//! JSON program loader.
//!
//! Accepts the serde form of [`Program`] produced by this crate or by an
//! external disassembler that targets the same document shape. Keeps the
//! engine and the CLI testable without machine-code fixtures.

use std::fs;
use std::path::Path;

use crate::loader::LoadError;
use crate::model::Program;

/// Load a pre-disassembled program from a JSON document.
///
/// The document's own `path` field is overridden with the file path it was
/// read from, so a program is always identified by its source file.
pub fn load_program_json(path: &Path) -> Result<Program, LoadError> {
    let bytes = fs::read(path).map_err(|_| LoadError::MissingInput(path.to_path_buf()))?;
    let mut program: Program = serde_json::from_slice(&bytes)
        .map_err(|source| LoadError::MalformedJson { path: path.to_path_buf(), source })?;
    program.path = path.display().to_string();
    Ok(program)
}
