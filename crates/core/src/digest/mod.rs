//! Content digests (fingerprints) for basic blocks and functions.
//!
//! Digests are advisory matching hints, not proofs: the matcher still
//! validates shape (block and edge counts) before accepting an exact-digest
//! pairing. They are computed over the *normalized* instruction records of
//! the model, so two structurally identical blocks placed at different
//! addresses digest equal.

use sha2::{Digest, Sha256};

use crate::model::{BasicBlock, EdgeKind, Function, Instruction, OperandKind};

/// A 32-byte content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hash_operand(hasher: &mut Sha256, operand: &OperandKind) {
    match operand {
        OperandKind::Register(class) => {
            hasher.update([1u8]);
            hasher.update(class.as_bytes());
        }
        OperandKind::Immediate(width) => hasher.update([2u8, *width]),
        OperandKind::Memory => hasher.update([3u8]),
        OperandKind::BranchTarget(ordinal) => hasher.update([4u8, *ordinal]),
        OperandKind::CallTarget => hasher.update([5u8]),
        OperandKind::Other => hasher.update([6u8]),
    }
}

fn hash_instruction(hasher: &mut Sha256, instruction: &Instruction) {
    hasher.update(instruction.opcode.as_bytes());
    hasher.update([0u8]); // opcode/operand separator
    for operand in &instruction.operands {
        hash_operand(hasher, operand);
    }
    hasher.update([0xffu8]);
}

fn edge_kind_tag(kind: EdgeKind) -> u8 {
    match kind {
        EdgeKind::Fallthrough => 1,
        EdgeKind::BranchTaken => 2,
        EdgeKind::BranchIndirect => 3,
        EdgeKind::Call => 4,
        EdgeKind::Return => 5,
    }
}

/// Digest of one basic block: instruction sequence (order-sensitive) plus
/// the kinds of its outgoing edges in edge order. Edge *targets* are not
/// hashed; they are position-dependent and already abstracted by the
/// `BranchTarget` operand normalization.
pub fn block_digest(block: &BasicBlock) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((block.instructions.len() as u64).to_le_bytes());
    for instruction in &block.instructions {
        hash_instruction(&mut hasher, instruction);
    }
    for edge in &block.successors {
        hasher.update([edge_kind_tag(edge.kind)]);
    }
    Fingerprint(hasher.finalize().into())
}

/// Digest of a whole function: block count, entry block digest, and the
/// sorted multiset of block digests hashed in order. Block storage order
/// therefore never affects the result; disassembly order is not stable
/// across two independent runs.
///
/// The fold hashes every sorted digest rather than XOR-combining them:
/// an XOR fold cancels duplicated blocks pairwise, which would let two
/// functions with different repeated content digest equal.
pub fn function_digest(function: &Function) -> Fingerprint {
    let mut sorted: Vec<Fingerprint> = function.blocks.iter().map(block_digest).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update((function.blocks.len() as u64).to_le_bytes());
    if let Some(entry) = function.block(function.entry) {
        hasher.update(block_digest(entry).0);
    }
    for digest in &sorted {
        hasher.update(digest.0);
    }
    Fingerprint(hasher.finalize().into())
}
