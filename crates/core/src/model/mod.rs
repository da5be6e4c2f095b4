//! Core data model (IR) for programs, functions, and basic blocks.
//!
//! Programs are produced by a loader (capstone/json) and borrowed read-only
//! by the alignment engine. Relationships are arena-style: functions live in
//! a `Vec` on their `Program` and are addressed by [`FunctionId`] (the index),
//! blocks live in a `Vec` on their `Function` and are addressed by
//! [`BlockId`]. No owning pointer graphs, no back-references.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of a function within its owning [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub usize);

/// Index of a basic block within its owning [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub usize);

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of an outgoing control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Fallthrough,
    BranchTaken,
    BranchIndirect,
    Call,
    Return,
}

/// Normalized operand shape.
///
/// Address-valued operands never carry raw numbers: a resolved branch target
/// is stored as the ordinal of the matching successor edge, a call target as
/// the bare `CallTarget` marker. This is what makes block content comparable
/// across two binaries laid out at different addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    /// Register operand, tagged with the register name/class.
    Register(String),
    /// Non-address immediate, tagged with its width in bytes.
    Immediate(u8),
    /// Memory operand (base/index/displacement shape collapsed).
    Memory,
    /// Control-flow target, abstracted to the ordinal of the successor edge
    /// the branch corresponds to.
    BranchTarget(u8),
    /// Direct call target; callee identity is not block content.
    CallTarget,
    Other,
}

/// One instruction record: opcode class plus normalized operand shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: String,
    pub operands: Vec<OperandKind>,
}

impl Instruction {
    pub fn new(opcode: impl Into<String>, operands: Vec<OperandKind>) -> Self {
        Self { opcode: opcode.into(), operands }
    }
}

/// Outgoing control-flow edge of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub target: BlockId,
    pub kind: EdgeKind,
}

/// A maximal straight-line instruction sequence plus its CFG edges.
///
/// Predecessors are derived data; [`Function::add_edge`] keeps both
/// directions consistent, and [`Program::validate`] rejects asymmetry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub successors: Vec<Edge>,
    #[serde(default)]
    pub predecessors: Vec<BlockId>,
    /// Present but not reachable from the entry block (exception landing
    /// pads, outlined cold paths). Unreachable blocks without this flag are
    /// a structural inconsistency.
    #[serde(default)]
    pub cold: bool,
}

impl BasicBlock {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions, ..Self::default() }
    }
}

/// A named or anonymous unit of code with one entry block and a set of
/// owned basic blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Symbol name if the binary carries one; stripped binaries have `None`.
    pub name: Option<String>,
    pub entry: BlockId,
    /// Total size in bytes as reported by the loader.
    #[serde(default)]
    pub size: u64,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: Option<String>, size: u64) -> Self {
        Self { name, entry: BlockId(0), size, blocks: Vec::new() }
    }

    /// Append a block and return its id.
    pub fn add_block(&mut self, block: BasicBlock) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Add an edge, maintaining the reverse predecessor record.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        if let Some(block) = self.blocks.get_mut(from.0) {
            block.successors.push(Edge { target: to, kind });
        }
        if let Some(block) = self.blocks.get_mut(to.0) {
            if !block.predecessors.contains(&from) {
                block.predecessors.push(from);
            }
        }
    }

    /// Total number of outgoing edges across all blocks.
    pub fn edge_count(&self) -> usize {
        self.blocks.iter().map(|b| b.successors.len()).sum()
    }

    fn reachable_from_entry(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            let Some(block) = self.blocks.get(id.0) else { continue };
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            for edge in &block.successors {
                if edge.target.0 < seen.len() && !seen[edge.target.0] {
                    stack.push(edge.target);
                }
            }
        }
        seen
    }
}

/// The in-memory representation of one input executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Source file path; identifies the program, never mutated by the core.
    pub path: String,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), functions: Vec::new() }
    }

    /// Append a function and return its id.
    pub fn add_function(&mut self, function: Function) -> FunctionId {
        self.functions.push(function);
        FunctionId(self.functions.len() - 1)
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len()).map(FunctionId)
    }

    /// Check the structural invariants every loader must uphold.
    ///
    /// Violations are fatal to an alignment run and are never repaired here:
    /// a loader that produced them is broken, and patching its output would
    /// hide that.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (fidx, function) in self.functions.iter().enumerate() {
            let fid = FunctionId(fidx);
            let entry = function
                .block(function.entry)
                .ok_or(ModelError::BadEntry { function: fid, entry: function.entry })?;
            if entry.instructions.is_empty() {
                return Err(ModelError::EmptyEntry { function: fid, entry: function.entry });
            }

            for (bidx, block) in function.blocks.iter().enumerate() {
                let bid = BlockId(bidx);
                for edge in &block.successors {
                    let target = function.block(edge.target).ok_or(ModelError::DanglingEdge {
                        function: fid,
                        block: bid,
                        target: edge.target,
                    })?;
                    if !target.predecessors.contains(&bid) {
                        return Err(ModelError::AsymmetricEdge {
                            function: fid,
                            from: bid,
                            to: edge.target,
                        });
                    }
                }
                for pred in &block.predecessors {
                    let source = function.block(*pred).ok_or(ModelError::DanglingEdge {
                        function: fid,
                        block: bid,
                        target: *pred,
                    })?;
                    if !source.successors.iter().any(|e| e.target == bid) {
                        return Err(ModelError::AsymmetricEdge {
                            function: fid,
                            from: *pred,
                            to: bid,
                        });
                    }
                }
            }

            let reachable = function.reachable_from_entry();
            for (bidx, block) in function.blocks.iter().enumerate() {
                if !reachable[bidx] && !block.cold {
                    return Err(ModelError::UnreachableBlock {
                        function: fid,
                        block: BlockId(bidx),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Structural inconsistency in a loaded program, or a bookkeeping violation
/// while building a correspondence. Fatal to the run; never repaired.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("function {function}: entry block {entry} does not exist")]
    BadEntry { function: FunctionId, entry: BlockId },

    #[error("function {function}: entry block {entry} has no instructions")]
    EmptyEntry { function: FunctionId, entry: BlockId },

    #[error("function {function}: block {block} references missing block {target}")]
    DanglingEdge { function: FunctionId, block: BlockId, target: BlockId },

    #[error("function {function}: edge {from} -> {to} is not recorded in both directions")]
    AsymmetricEdge { function: FunctionId, from: BlockId, to: BlockId },

    #[error("function {function}: block {block} is unreachable from entry and not marked cold")]
    UnreachableBlock { function: FunctionId, block: BlockId },

    #[error("correspondence already holds a match for {side} function {function}")]
    DuplicateFunctionMatch { side: &'static str, function: FunctionId },

    #[error(
        "correspondence already holds a match for {side} block {block} in function pair {function}"
    )]
    DuplicateBlockMatch { side: &'static str, function: FunctionId, block: BlockId },
}
