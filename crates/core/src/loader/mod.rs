//! Loaders: turn an on-disk artifact into the [`crate::model`] data model.
//!
//! Two loaders are provided:
//! - `json`: a pre-disassembled program serialized as JSON, always built.
//! - `capstone` (feature `capstone-loader`, default): ELF/PE/Mach-O symbol
//!   extraction with goblin plus capstone disassembly and CFG
//!   reconstruction.
//!
//! Loaders own all file I/O; the alignment engine itself never touches the
//! filesystem.

use std::path::PathBuf;

use thiserror::Error;

pub mod json;

#[cfg(feature = "capstone-loader")]
pub mod capstone;

pub use json::load_program_json;

#[cfg(feature = "capstone-loader")]
pub use capstone::load_program_binary;

/// Failure to produce a program from an input file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found or unreadable: {0}")]
    MissingInput(PathBuf),

    #[error("malformed program document {path}: {source}")]
    MalformedJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported or unparseable object container: {0}")]
    UnparseableObject(String),

    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("disassembler error: {0}")]
    Disassembler(String),
}
