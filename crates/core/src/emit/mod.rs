//! Output emitter: turns correspondence facts into layout directives.
//!
//! The emitter does not decide binary layout itself. It derives one
//! [`LayoutPlan`] per side (matched functions first, in an order identical
//! across both outputs, then single-side residue explicitly marked) and
//! hands the plan to a [`Rewriter`], the seam behind which a container
//! rewriter materializes the actual output artifact. Rewriter failures
//! propagate verbatim; output writing is a single attempt.

use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::correspondence::{CorrespondenceMap, MatchConfidence, Side};
use crate::model::{BlockId, FunctionId, Program};

/// Failure while materializing an output artifact.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write output artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode layout directives: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Layout directive for one block within a function entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockDirective {
    pub block: BlockId,
    /// `false` marks a single-side ("added"/"removed") block region.
    pub shared: bool,
}

/// Layout directive for one function of the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDirective {
    pub function: FunctionId,
    pub name: Option<String>,
    /// `false` marks a function present on this side only.
    pub shared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<MatchConfidence>,
    pub blocks: Vec<BlockDirective>,
}

/// Complete layout for one output binary.
///
/// Matched functions appear first, ordered by the A-side function id on
/// *both* sides, each with its matched blocks in A-side block order followed
/// by its side-only blocks. Side-only functions trail in id order. A diff of
/// the two materialized outputs therefore walks matched regions in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutPlan {
    pub source: String,
    pub side: Side,
    pub functions: Vec<FunctionDirective>,
}

impl LayoutPlan {
    /// Derive the layout plan for one side from the correspondence map.
    pub fn for_side(map: &CorrespondenceMap, program: &Program, side: Side) -> Self {
        let mut functions = Vec::new();

        for pair in map.iter_function_matches() {
            let own_id = match side {
                Side::A => pair.a,
                Side::B => pair.b,
            };
            let Some(function) = program.function(own_id) else { continue };

            let mut blocks = Vec::new();
            if let Some(table) = map.block_correspondence(pair.a) {
                for (block_a, block_b) in table.iter_pairs() {
                    let own_block = match side {
                        Side::A => block_a,
                        Side::B => block_b,
                    };
                    blocks.push(BlockDirective { block: own_block, shared: true });
                }
                for block in table.unmatched(side) {
                    blocks.push(BlockDirective { block: *block, shared: false });
                }
            }
            functions.push(FunctionDirective {
                function: own_id,
                name: function.name.clone(),
                shared: true,
                confidence: Some(pair.confidence),
                blocks,
            });
        }

        for id in map.unmatched_functions(side) {
            let Some(function) = program.function(*id) else { continue };
            functions.push(FunctionDirective {
                function: *id,
                name: function.name.clone(),
                shared: false,
                confidence: None,
                blocks: function
                    .block_ids()
                    .map(|block| BlockDirective { block, shared: false })
                    .collect(),
            });
        }

        LayoutPlan { source: program.path.clone(), side, functions }
    }
}

/// Seam for the collaborator that actually materializes an output artifact
/// from a layout plan.
pub trait Rewriter {
    fn materialize(&self, plan: &LayoutPlan, output: &Path) -> Result<(), EmitError>;
}

/// Default rewriter: writes the plan as a JSON directive document at the
/// output path. Container-level rewriting is owned by an external tool that
/// consumes these directives.
pub struct DirectiveFileRewriter;

impl Rewriter for DirectiveFileRewriter {
    fn materialize(&self, plan: &LayoutPlan, output: &Path) -> Result<(), EmitError> {
        let encoded = serde_json::to_string_pretty(plan)?;
        fs::write(output, encoded)?;
        Ok(())
    }
}

/// Emit both outputs: plan per side, then delegate to the rewriter. The
/// first failure propagates; there is no retry.
pub fn emit_aligned(
    map: &CorrespondenceMap,
    a: &Program,
    b: &Program,
    rewriter: &dyn Rewriter,
    output_a: &Path,
    output_b: &Path,
) -> Result<(), EmitError> {
    let plan_a = LayoutPlan::for_side(map, a, Side::A);
    rewriter.materialize(&plan_a, output_a)?;
    let plan_b = LayoutPlan::for_side(map, b, Side::B);
    rewriter.materialize(&plan_b, output_b)?;
    Ok(())
}
