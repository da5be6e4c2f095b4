//! Block aligner: pairs the basic blocks of one matched function pair.
//!
//! Block ids and disassembly order are not stable across two independent
//! disassembly runs, but the control-flow topology reachable from the entry
//! point is. So alignment anchors at the two entry blocks and flood-fills
//! outward along same-kind edges, then mops up the residue with the same
//! greedy bag-of-content assignment the function matcher uses. Quality
//! degrades gracefully with distance from the entry instead of failing
//! globally when one region differs.

use std::collections::VecDeque;

use crate::digest::{block_digest, Fingerprint};
use crate::model::{BlockId, EdgeKind, Function};

/// Propagation accepts a candidate pair whose digests differ as long as
/// their instruction counts differ by at most this many instructions.
pub const PROPAGATION_SLACK: usize = 1;

/// Weight of block digest equality in the residual fuzzy score.
pub const BLOCK_WEIGHT_DIGEST: f64 = 0.75;
/// Weight of successor-count equality in the residual fuzzy score.
pub const BLOCK_WEIGHT_SUCCESSORS: f64 = 0.25;
/// Residual floor. With the weights above, digest equality alone clears it
/// and successor-count equality alone does not: the residual pass re-unites
/// identical content that propagation could not reach, nothing looser.
pub const BLOCK_FUZZY_FLOOR: f64 = 0.5;

/// Result of aligning one matched function pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockAlignment {
    /// Matched pairs in commit order (entry anchor first).
    pub pairs: Vec<(BlockId, BlockId)>,
    /// A-only ("removed") blocks.
    pub unmatched_a: Vec<BlockId>,
    /// B-only ("added") blocks.
    pub unmatched_b: Vec<BlockId>,
}

/// The sole successor of `block` along edges of `kind`, if unambiguous.
/// Multiple same-kind edges (switch tables, indirect fan-out) defer to the
/// residual pass rather than guessing an ordering.
fn sole_edge_target(function: &Function, block: BlockId, kind: EdgeKind) -> Option<BlockId> {
    let block = function.block(block)?;
    let mut targets = block.successors.iter().filter(|e| e.kind == kind);
    let first = targets.next()?;
    if targets.next().is_some() {
        return None;
    }
    Some(first.target)
}

fn tolerated(a_len: usize, b_len: usize) -> bool {
    a_len.abs_diff(b_len) <= PROPAGATION_SLACK
}

const EDGE_KINDS: [EdgeKind; 5] = [
    EdgeKind::Fallthrough,
    EdgeKind::BranchTaken,
    EdgeKind::BranchIndirect,
    EdgeKind::Call,
    EdgeKind::Return,
];

/// Align the blocks of a matched function pair.
///
/// 1. Entry anchor: the two entry blocks always pair first.
/// 2. Propagation to a fixed point along unambiguous same-kind edges whose
///    targets digest equal or sit within [`PROPAGATION_SLACK`].
/// 3. Residual greedy assignment over whatever is left.
pub fn align_blocks(function_a: &Function, function_b: &Function) -> BlockAlignment {
    let digests_a: Vec<Fingerprint> = function_a.blocks.iter().map(block_digest).collect();
    let digests_b: Vec<Fingerprint> = function_b.blocks.iter().map(block_digest).collect();
    let mut matched_a: Vec<Option<BlockId>> = vec![None; function_a.blocks.len()];
    let mut matched_b: Vec<Option<BlockId>> = vec![None; function_b.blocks.len()];
    let mut alignment = BlockAlignment::default();

    let commit = |alignment: &mut BlockAlignment,
                  matched_a: &mut Vec<Option<BlockId>>,
                  matched_b: &mut Vec<Option<BlockId>>,
                  a: BlockId,
                  b: BlockId| {
        matched_a[a.0] = Some(b);
        matched_b[b.0] = Some(a);
        alignment.pairs.push((a, b));
    };

    // Entry anchor: control enters at a single well-defined point on both
    // sides, content notwithstanding.
    let mut worklist: VecDeque<(BlockId, BlockId)> = VecDeque::new();
    commit(&mut alignment, &mut matched_a, &mut matched_b, function_a.entry, function_b.entry);
    worklist.push_back((function_a.entry, function_b.entry));

    // Breadth-first structural flood-fill from the anchor, not a global
    // search; most blocks of a typical function pair align here.
    while let Some((a, b)) = worklist.pop_front() {
        for kind in EDGE_KINDS {
            let Some(next_a) = sole_edge_target(function_a, a, kind) else { continue };
            let Some(next_b) = sole_edge_target(function_b, b, kind) else { continue };
            if matched_a[next_a.0].is_some() || matched_b[next_b.0].is_some() {
                continue;
            }
            let digest_equal = digests_a[next_a.0] == digests_b[next_b.0];
            let near_enough = tolerated(
                function_a.blocks[next_a.0].instructions.len(),
                function_b.blocks[next_b.0].instructions.len(),
            );
            if digest_equal || near_enough {
                commit(&mut alignment, &mut matched_a, &mut matched_b, next_a, next_b);
                worklist.push_back((next_a, next_b));
            }
        }
    }

    // Residual pass: reordered cold paths, handlers, blocks whose
    // predecessors never matched. Same greedy shape as the function
    // matcher's fuzzy pass, floor-thresholded and deterministic.
    let residue_a: Vec<BlockId> = function_a
        .block_ids()
        .filter(|id| matched_a[id.0].is_none())
        .collect();
    let residue_b: Vec<BlockId> = function_b
        .block_ids()
        .filter(|id| matched_b[id.0].is_none())
        .collect();
    let mut candidates: Vec<(f64, BlockId, BlockId)> = Vec::new();
    for &a in &residue_a {
        for &b in &residue_b {
            let mut score = 0.0;
            if digests_a[a.0] == digests_b[b.0] {
                score += BLOCK_WEIGHT_DIGEST;
            }
            if function_a.blocks[a.0].successors.len() == function_b.blocks[b.0].successors.len() {
                score += BLOCK_WEIGHT_SUCCESSORS;
            }
            if score >= BLOCK_FUZZY_FLOOR {
                candidates.push((score, a, b));
            }
        }
    }
    candidates.sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));
    for (_, a, b) in candidates {
        if matched_a[a.0].is_some() || matched_b[b.0].is_some() {
            continue;
        }
        commit(&mut alignment, &mut matched_a, &mut matched_b, a, b);
    }

    alignment.unmatched_a =
        function_a.block_ids().filter(|id| matched_a[id.0].is_none()).collect();
    alignment.unmatched_b =
        function_b.block_ids().filter(|id| matched_b[id.0].is_none()).collect();
    alignment
}
