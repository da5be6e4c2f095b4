//! The correspondence map: the single output artifact of an alignment run.
//!
//! Holds a partial bijection between the two programs' function ids and,
//! nested per matched function pair, a partial bijection between block ids.
//! Populated incrementally by the function matcher and block aligner,
//! consumed read-only by the output emitter. Stores ids only, never
//! references into the programs.
//!
//! Bijection-ness is enforced at insertion: a second match for an id that is
//! already paired is a bookkeeping violation, surfaced as a [`ModelError`]
//! rather than silently overwritten. All internal maps are ordered so that
//! iteration (and therefore everything downstream) is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{BlockId, FunctionId, ModelError};

/// Which input binary an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::A => "A-side",
            Side::B => "B-side",
        }
    }
}

/// Which matching pass produced a function pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    Name,
    Fuzzy,
}

/// Per-function-pair block correspondence plus unmatched residue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockCorrespondence {
    a_to_b: BTreeMap<BlockId, BlockId>,
    b_to_a: BTreeMap<BlockId, BlockId>,
    /// A-only ("removed") blocks.
    unmatched_a: BTreeSet<BlockId>,
    /// B-only ("added") blocks.
    unmatched_b: BTreeSet<BlockId>,
}

impl BlockCorrespondence {
    pub fn match_ab(&self, block: BlockId) -> Option<BlockId> {
        self.a_to_b.get(&block).copied()
    }

    pub fn match_ba(&self, block: BlockId) -> Option<BlockId> {
        self.b_to_a.get(&block).copied()
    }

    /// Matched pairs in A-side block id order.
    pub fn iter_pairs(&self) -> impl Iterator<Item = (BlockId, BlockId)> + '_ {
        self.a_to_b.iter().map(|(a, b)| (*a, *b))
    }

    pub fn unmatched(&self, side: Side) -> &BTreeSet<BlockId> {
        match side {
            Side::A => &self.unmatched_a,
            Side::B => &self.unmatched_b,
        }
    }

    pub fn matched_count(&self) -> usize {
        self.a_to_b.len()
    }
}

/// One matched function pair as recorded in the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FunctionPair {
    pub a: FunctionId,
    pub b: FunctionId,
    pub confidence: MatchConfidence,
}

/// Bidirectional, partial function/block mapping produced by alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrespondenceMap {
    a_to_b: BTreeMap<FunctionId, FunctionId>,
    b_to_a: BTreeMap<FunctionId, FunctionId>,
    confidence: BTreeMap<FunctionId, MatchConfidence>,
    /// Block tables keyed by the A-side function id of the pair.
    blocks: BTreeMap<FunctionId, BlockCorrespondence>,
    unmatched_a: BTreeSet<FunctionId>,
    unmatched_b: BTreeSet<FunctionId>,
}

impl CorrespondenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a matched function pair. Errors if either side is already
    /// paired; the matchers only ever insert once per id, so hitting this
    /// means a caller outside the pipeline misused the map.
    pub fn insert_function_match(
        &mut self,
        a: FunctionId,
        b: FunctionId,
        confidence: MatchConfidence,
    ) -> Result<(), ModelError> {
        if self.a_to_b.contains_key(&a) {
            return Err(ModelError::DuplicateFunctionMatch { side: Side::A.label(), function: a });
        }
        if self.b_to_a.contains_key(&b) {
            return Err(ModelError::DuplicateFunctionMatch { side: Side::B.label(), function: b });
        }
        self.a_to_b.insert(a, b);
        self.b_to_a.insert(b, a);
        self.confidence.insert(a, confidence);
        self.blocks.insert(a, BlockCorrespondence::default());
        Ok(())
    }

    /// Record a matched block pair within the function pair keyed by its
    /// A-side function id. The pair must already exist.
    pub fn insert_block_match(
        &mut self,
        function_a: FunctionId,
        block_a: BlockId,
        block_b: BlockId,
    ) -> Result<(), ModelError> {
        let table = self
            .blocks
            .get_mut(&function_a)
            .ok_or(ModelError::DuplicateFunctionMatch { side: "unpaired", function: function_a })?;
        if table.a_to_b.contains_key(&block_a) {
            return Err(ModelError::DuplicateBlockMatch {
                side: Side::A.label(),
                function: function_a,
                block: block_a,
            });
        }
        if table.b_to_a.contains_key(&block_b) {
            return Err(ModelError::DuplicateBlockMatch {
                side: Side::B.label(),
                function: function_a,
                block: block_b,
            });
        }
        table.a_to_b.insert(block_a, block_b);
        table.b_to_a.insert(block_b, block_a);
        Ok(())
    }

    pub fn record_unmatched_function(&mut self, side: Side, function: FunctionId) {
        match side {
            Side::A => self.unmatched_a.insert(function),
            Side::B => self.unmatched_b.insert(function),
        };
    }

    pub fn record_unmatched_block(&mut self, function_a: FunctionId, side: Side, block: BlockId) {
        if let Some(table) = self.blocks.get_mut(&function_a) {
            match side {
                Side::A => table.unmatched_a.insert(block),
                Side::B => table.unmatched_b.insert(block),
            };
        }
    }

    pub fn function_match_ab(&self, function: FunctionId) -> Option<FunctionId> {
        self.a_to_b.get(&function).copied()
    }

    pub fn function_match_ba(&self, function: FunctionId) -> Option<FunctionId> {
        self.b_to_a.get(&function).copied()
    }

    /// Confidence tag for the pair keyed by its A-side function id.
    pub fn confidence(&self, function_a: FunctionId) -> Option<MatchConfidence> {
        self.confidence.get(&function_a).copied()
    }

    /// Block lookup A -> B within the pair keyed by A-side function id.
    pub fn block_match_ab(&self, function_a: FunctionId, block: BlockId) -> Option<BlockId> {
        self.blocks.get(&function_a)?.match_ab(block)
    }

    /// Block lookup B -> A within the pair keyed by A-side function id.
    pub fn block_match_ba(&self, function_a: FunctionId, block: BlockId) -> Option<BlockId> {
        self.blocks.get(&function_a)?.match_ba(block)
    }

    pub fn block_correspondence(&self, function_a: FunctionId) -> Option<&BlockCorrespondence> {
        self.blocks.get(&function_a)
    }

    /// Matched pairs in A-side function id order.
    pub fn iter_function_matches(&self) -> impl Iterator<Item = FunctionPair> + '_ {
        self.a_to_b.iter().map(|(a, b)| FunctionPair {
            a: *a,
            b: *b,
            confidence: self.confidence[a],
        })
    }

    pub fn unmatched_functions(&self, side: Side) -> &BTreeSet<FunctionId> {
        match side {
            Side::A => &self.unmatched_a,
            Side::B => &self.unmatched_b,
        }
    }

    pub fn matched_count(&self) -> usize {
        self.a_to_b.len()
    }
}
