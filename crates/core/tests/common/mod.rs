//! Shared toy-program builders for the core integration tests.

#![allow(dead_code)]

use align_core::model::{
    BasicBlock, EdgeKind, Function, Instruction, OperandKind, Program,
};

pub fn insn(opcode: &str) -> Instruction {
    Instruction::new(opcode, vec![])
}

pub fn insn_with(opcode: &str, operands: Vec<OperandKind>) -> Instruction {
    Instruction::new(opcode, operands)
}

pub fn block(opcodes: &[&str]) -> BasicBlock {
    BasicBlock::new(opcodes.iter().map(|op| insn(op)).collect())
}

/// Two blocks: entry falls through into an exit block.
pub fn two_block_function(name: Option<&str>) -> Function {
    let mut function = Function::new(name.map(String::from), 16);
    let entry = function.add_block(block(&["push", "mov"]));
    let exit = function.add_block(block(&["pop", "ret"]));
    function.entry = entry;
    function.add_edge(entry, exit, EdgeKind::Fallthrough);
    function
}

/// Diamond: entry branches to left/right, both fall through into a join.
pub fn diamond_function(name: Option<&str>) -> Function {
    let mut function = Function::new(name.map(String::from), 64);
    let entry = function.add_block(block(&["cmp", "jne"]));
    let left = function.add_block(block(&["add", "jmp"]));
    let right = function.add_block(block(&["sub", "sub"]));
    let join = function.add_block(block(&["mov", "ret"]));
    function.entry = entry;
    function.add_edge(entry, right, EdgeKind::BranchTaken);
    function.add_edge(entry, left, EdgeKind::Fallthrough);
    function.add_edge(left, join, EdgeKind::BranchTaken);
    function.add_edge(right, join, EdgeKind::Fallthrough);
    function
}

pub fn program(path: &str, functions: Vec<Function>) -> Program {
    let mut program = Program::new(path);
    for function in functions {
        program.add_function(function);
    }
    program
}
