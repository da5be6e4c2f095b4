//! align-core
//!
//! Core library for aligning two related executables at the function and
//! basic-block level, so that downstream binary-diff tooling sees genuine
//! differences instead of layout noise from independent compilation.
//!
//! This crate defines the program/CFG data model, the content digests and
//! matching passes that build a correspondence map, the layout-directive
//! emitter, and the loaders that produce programs from input files.
//!
//! The goal is to keep all substantive logic here so it is fully testable
//! and reusable from multiple frontends (CLI, bindings, etc.).

pub mod aligner;
pub mod correspondence;
pub mod digest;
pub mod emit;
pub mod engine;
pub mod loader;
pub mod matcher;
pub mod model;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
