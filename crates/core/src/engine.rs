//! Pipeline entry point shared by every frontend: validate both programs,
//! match functions, align blocks per matched pair, return the populated
//! correspondence map.
//!
//! The per-pair block alignments are mutually independent (each reads one
//! function pair and writes one block table), so a parallel implementation
//! could fan the loop below out over matched pairs without shared mutable
//! state; the sequential loop is kept deliberately.

use serde::Serialize;

use crate::aligner::align_blocks;
use crate::correspondence::{CorrespondenceMap, MatchConfidence, Side};
use crate::matcher::{match_functions, MatcherConfig};
use crate::model::{ModelError, Program};

/// Options threaded through an alignment run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignOptions {
    pub matcher: MatcherConfig,
}

/// Run the full alignment pipeline over two borrowed programs.
///
/// The programs are read-only for the duration of the run; the returned map
/// holds ids only and outlives them freely.
pub fn align_programs(
    a: &Program,
    b: &Program,
    options: &AlignOptions,
) -> Result<CorrespondenceMap, ModelError> {
    a.validate()?;
    b.validate()?;

    let mut map = CorrespondenceMap::new();
    match_functions(a, b, &options.matcher, &mut map)?;

    let pairs: Vec<_> = map.iter_function_matches().collect();
    for pair in pairs {
        // Matched function ids came out of these programs; indexing is safe
        // post-validate, but stay in Option land anyway.
        let (Some(fa), Some(fb)) = (a.function(pair.a), b.function(pair.b)) else {
            continue;
        };
        let alignment = align_blocks(fa, fb);
        for (block_a, block_b) in alignment.pairs {
            map.insert_block_match(pair.a, block_a, block_b)?;
        }
        for block in alignment.unmatched_a {
            map.record_unmatched_block(pair.a, Side::A, block);
        }
        for block in alignment.unmatched_b {
            map.record_unmatched_block(pair.a, Side::B, block);
        }
    }
    Ok(map)
}

/// One matched function pair as reported to frontends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedFunctionSummary {
    pub function_a: usize,
    pub function_b: usize,
    pub name_a: Option<String>,
    pub name_b: Option<String>,
    pub confidence: MatchConfidence,
    pub matched_blocks: usize,
    pub removed_blocks: usize,
    pub added_blocks: usize,
}

/// Unmatched function as reported to frontends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedFunctionSummary {
    pub function: usize,
    pub name: Option<String>,
}

/// Serializable summary of one alignment run, for reports and `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentReport {
    pub program_a: String,
    pub program_b: String,
    pub matched_functions: usize,
    pub exact_matches: usize,
    pub name_matches: usize,
    pub fuzzy_matches: usize,
    pub functions: Vec<MatchedFunctionSummary>,
    pub only_in_a: Vec<UnmatchedFunctionSummary>,
    pub only_in_b: Vec<UnmatchedFunctionSummary>,
}

impl AlignmentReport {
    pub fn from_map(map: &CorrespondenceMap, a: &Program, b: &Program) -> Self {
        let mut exact = 0;
        let mut name = 0;
        let mut fuzzy = 0;
        let mut functions = Vec::new();
        for pair in map.iter_function_matches() {
            match pair.confidence {
                MatchConfidence::Exact => exact += 1,
                MatchConfidence::Name => name += 1,
                MatchConfidence::Fuzzy => fuzzy += 1,
            }
            let blocks = map.block_correspondence(pair.a);
            functions.push(MatchedFunctionSummary {
                function_a: pair.a.0,
                function_b: pair.b.0,
                name_a: a.function(pair.a).and_then(|f| f.name.clone()),
                name_b: b.function(pair.b).and_then(|f| f.name.clone()),
                confidence: pair.confidence,
                matched_blocks: blocks.map_or(0, |t| t.matched_count()),
                removed_blocks: blocks.map_or(0, |t| t.unmatched(Side::A).len()),
                added_blocks: blocks.map_or(0, |t| t.unmatched(Side::B).len()),
            });
        }

        let summarize = |program: &Program, id: crate::model::FunctionId| UnmatchedFunctionSummary {
            function: id.0,
            name: program.function(id).and_then(|f| f.name.clone()),
        };
        AlignmentReport {
            program_a: a.path.clone(),
            program_b: b.path.clone(),
            matched_functions: map.matched_count(),
            exact_matches: exact,
            name_matches: name,
            fuzzy_matches: fuzzy,
            functions,
            only_in_a: map.unmatched_functions(Side::A).iter().map(|id| summarize(a, *id)).collect(),
            only_in_b: map.unmatched_functions(Side::B).iter().map(|id| summarize(b, *id)).collect(),
        }
    }
}
