//! Capstone/goblin loader: lifts a native executable into the data model.
//!
//! goblin parses the container (ELF/PE/Mach-O) for function symbols and
//! their file ranges; capstone disassembles each symbol's bytes; branch
//! targets split the instruction stream into basic blocks and become CFG
//! edges. Operands are normalized at this boundary (§`crate::model`): branch
//! targets turn into successor ordinals, call targets into bare markers, so
//! nothing address-dependent survives into block content.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use capstone::{arch, prelude::*, Capstone, InsnGroupId};
use goblin::{elf, mach, pe, Object};

use crate::loader::LoadError;
use crate::model::{BasicBlock, BlockId, EdgeKind, Function, Instruction, OperandKind, Program};

#[derive(Debug, Clone)]
struct SymbolInfo {
    name: String,
    address: u64,
    file_range: (usize, usize),
}

fn section_range_to_file(
    addr: u64,
    size: Option<u64>,
    sec_addr: u64,
    sec_size: u64,
    sec_offset: u64,
    bytes_len: usize,
) -> Option<(usize, usize)> {
    if addr < sec_addr || addr >= sec_addr.saturating_add(sec_size) {
        return None;
    }
    let offset_in_section = addr - sec_addr;
    let start = sec_offset.saturating_add(offset_in_section);
    if start as usize >= bytes_len {
        return None;
    }
    let available = sec_size - offset_in_section;
    let length = size.unwrap_or(available).min(available);
    let end = start.saturating_add(length).min(bytes_len as u64);
    if end <= start {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

fn elf_symbols(elf: &elf::Elf, bytes_len: usize) -> Vec<SymbolInfo> {
    let mut symbols = Vec::new();
    for sym in &elf.syms {
        if !sym.is_function()
            || sym.st_value == 0
            || sym.st_shndx == elf::section_header::SHN_UNDEF as usize
        {
            continue;
        }
        let name = elf.strtab.get_at(sym.st_name).unwrap_or("").to_string();
        let size = if sym.st_size > 0 { Some(sym.st_size) } else { None };
        let Some(range) = elf.section_headers.get(sym.st_shndx).and_then(|shdr| {
            section_range_to_file(
                sym.st_value,
                size,
                shdr.sh_addr,
                shdr.sh_size,
                shdr.sh_offset,
                bytes_len,
            )
        }) else {
            continue;
        };
        symbols.push(SymbolInfo { name, address: sym.st_value, file_range: range });
    }
    symbols
}

fn mach_symbols(bin: &mach::MachO, bytes_len: usize) -> Vec<SymbolInfo> {
    let mut sections = Vec::new();
    for (sec, _) in bin.segments.sections().flatten().filter_map(Result::ok) {
        sections.push(sec);
    }
    let mut symbols = Vec::new();
    for sym in bin.symbols() {
        let Ok((name, nlist)) = sym else { continue };
        if nlist.n_value == 0 {
            continue;
        }
        let name = name.trim_start_matches('_').to_string();
        for sec in &sections {
            if let Some(range) = section_range_to_file(
                nlist.n_value,
                None,
                sec.addr,
                sec.size,
                sec.offset.into(),
                bytes_len,
            ) {
                symbols.push(SymbolInfo { name, address: nlist.n_value, file_range: range });
                break;
            }
        }
    }
    symbols
}

fn pe_symbols(pe: &pe::PE, bytes_len: usize) -> Vec<SymbolInfo> {
    let mut symbols = Vec::new();
    for exp in &pe.exports {
        if exp.rva == 0 {
            continue;
        }
        let name = exp.name.unwrap_or_default().to_string();
        for sec in &pe.sections {
            let size = if sec.virtual_size == 0 {
                sec.size_of_raw_data as u64
            } else {
                sec.virtual_size as u64
            };
            if let Some(range) = section_range_to_file(
                exp.rva as u64,
                None,
                sec.virtual_address as u64,
                size,
                sec.pointer_to_raw_data as u64,
                bytes_len,
            ) {
                symbols.push(SymbolInfo { name, address: exp.rva as u64, file_range: range });
                break;
            }
        }
    }
    symbols
}

fn arch_from_object(object: &Object) -> Option<&'static str> {
    match object {
        Object::Elf(elf) => match elf.header.e_machine {
            elf::header::EM_X86_64 => Some("x86_64"),
            elf::header::EM_386 => Some("x86"),
            elf::header::EM_AARCH64 => Some("arm64"),
            elf::header::EM_ARM => Some("arm"),
            _ => None,
        },
        Object::PE(pe) => match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Some("x86"),
            pe::header::COFF_MACHINE_X86_64 => Some("x86_64"),
            pe::header::COFF_MACHINE_ARM => Some("arm"),
            pe::header::COFF_MACHINE_ARM64 => Some("arm64"),
            _ => None,
        },
        Object::Mach(mach::Mach::Binary(bin)) => match bin.header.cputype() {
            mach::cputype::CPU_TYPE_X86 => Some("x86"),
            mach::cputype::CPU_TYPE_X86_64 => Some("x86_64"),
            mach::cputype::CPU_TYPE_ARM => Some("arm"),
            mach::cputype::CPU_TYPE_ARM64 => Some("arm64"),
            _ => None,
        },
        _ => None,
    }
}

fn make_cs(arch: &str) -> Result<Capstone, LoadError> {
    let built = match arch {
        "x86_64" | "amd64" => {
            Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).detail(true).build()
        }
        "x86" | "i386" => {
            Capstone::new().x86().mode(arch::x86::ArchMode::Mode32).detail(true).build()
        }
        "arm" | "armv7" => {
            Capstone::new().arm().mode(arch::arm::ArchMode::Arm).detail(true).build()
        }
        "arm64" | "aarch64" => {
            Capstone::new().arm64().mode(arch::arm64::ArchMode::Arm).detail(true).build()
        }
        other => return Err(LoadError::UnsupportedArch(other.to_string())),
    };
    built.map_err(|e| LoadError::Disassembler(format!("capstone init failed: {e}")))
}

fn has_group(detail: &capstone::InsnDetail, group: u32) -> bool {
    detail.groups().iter().any(|g| *g == InsnGroupId(group as u8))
}

/// First immediate operand, the direct branch/call target if there is one.
fn immediate_target(detail: &capstone::InsnDetail) -> Option<u64> {
    detail.arch_detail().operands().iter().find_map(|op| match op {
        capstone::arch::ArchOperand::X86Operand(op) => match &op.op_type {
            capstone::arch::x86::X86OperandType::Imm(imm) => Some(*imm as u64),
            _ => None,
        },
        capstone::arch::ArchOperand::ArmOperand(op) => match &op.op_type {
            capstone::arch::arm::ArmOperandType::Imm(imm) => Some(*imm as u64),
            _ => None,
        },
        capstone::arch::ArchOperand::Arm64Operand(op) => match &op.op_type {
            capstone::arch::arm64::Arm64OperandType::Imm(imm) => Some(*imm as u64),
            _ => None,
        },
        _ => None,
    })
}

/// How an instruction's immediate operands should be abstracted.
#[derive(Clone, Copy, PartialEq)]
enum ImmRole {
    /// Plain data immediate; keep the width.
    Plain,
    /// Target of a direct branch: becomes the taken-edge ordinal.
    BranchTarget,
    /// Target of a call (or an out-of-range tail jump): callee identity is
    /// not block content.
    CallTarget,
}

fn normalize_operands(cs: &Capstone, detail: &capstone::InsnDetail, role: ImmRole) -> Vec<OperandKind> {
    let reg_name = |id| cs.reg_name(id).unwrap_or_default();
    detail
        .arch_detail()
        .operands()
        .iter()
        .map(|op| match op {
            capstone::arch::ArchOperand::X86Operand(op) => match &op.op_type {
                capstone::arch::x86::X86OperandType::Reg(reg) => {
                    OperandKind::Register(reg_name(*reg))
                }
                capstone::arch::x86::X86OperandType::Imm(_) => match role {
                    ImmRole::Plain => OperandKind::Immediate(op.size),
                    ImmRole::BranchTarget => OperandKind::BranchTarget(0),
                    ImmRole::CallTarget => OperandKind::CallTarget,
                },
                capstone::arch::x86::X86OperandType::Mem(_) => OperandKind::Memory,
                _ => OperandKind::Other,
            },
            capstone::arch::ArchOperand::ArmOperand(op) => match &op.op_type {
                capstone::arch::arm::ArmOperandType::Reg(reg) => {
                    OperandKind::Register(reg_name(*reg))
                }
                capstone::arch::arm::ArmOperandType::Imm(_) => match role {
                    ImmRole::Plain => OperandKind::Immediate(4),
                    ImmRole::BranchTarget => OperandKind::BranchTarget(0),
                    ImmRole::CallTarget => OperandKind::CallTarget,
                },
                capstone::arch::arm::ArmOperandType::Mem(_) => OperandKind::Memory,
                _ => OperandKind::Other,
            },
            capstone::arch::ArchOperand::Arm64Operand(op) => match &op.op_type {
                capstone::arch::arm64::Arm64OperandType::Reg(reg) => {
                    OperandKind::Register(reg_name(*reg))
                }
                capstone::arch::arm64::Arm64OperandType::Imm(_) => match role {
                    ImmRole::Plain => OperandKind::Immediate(8),
                    ImmRole::BranchTarget => OperandKind::BranchTarget(0),
                    ImmRole::CallTarget => OperandKind::CallTarget,
                },
                capstone::arch::arm64::Arm64OperandType::Mem(_) => OperandKind::Memory,
                _ => OperandKind::Other,
            },
            _ => OperandKind::Other,
        })
        .collect()
}

/// Block-terminating control flow decoded from one instruction.
#[derive(Debug, Clone, Copy)]
enum Terminator {
    /// Conditional direct branch: taken edge plus fallthrough.
    Conditional(u64),
    /// Unconditional direct branch.
    Jump(u64),
    /// Indirect branch; target occasionally decodable as an immediate.
    Indirect(Option<u64>),
    Return,
}

struct LiftedInsn {
    address: u64,
    record: Instruction,
    terminator: Option<Terminator>,
}

fn conditional_mnemonic(mnemonic: &str) -> bool {
    !matches!(mnemonic, "jmp" | "b" | "br" | "jr" | "ljmp")
}

fn lift_instructions(
    cs: &Capstone,
    code: &[u8],
    address: u64,
    range_end: u64,
) -> Result<Vec<LiftedInsn>, LoadError> {
    let insns = cs
        .disasm_all(code, address)
        .map_err(|e| LoadError::Disassembler(format!("disassembly failed: {e}")))?;

    let mut lifted = Vec::new();
    for insn in insns.iter() {
        let mnemonic = insn.mnemonic().unwrap_or("").to_string();
        let Ok(detail) = cs.insn_detail(insn) else {
            lifted.push(LiftedInsn {
                address: insn.address(),
                record: Instruction::new(mnemonic, vec![]),
                terminator: None,
            });
            continue;
        };

        let is_call = has_group(&detail, capstone::InsnGroupType::CS_GRP_CALL);
        let is_jump = has_group(&detail, capstone::InsnGroupType::CS_GRP_JUMP);
        let is_ret = has_group(&detail, capstone::InsnGroupType::CS_GRP_RET);
        let target = immediate_target(&detail);

        let (role, terminator) = if is_ret {
            (ImmRole::Plain, Some(Terminator::Return))
        } else if is_call {
            (ImmRole::CallTarget, None)
        } else if is_jump {
            match target {
                // Direct branches out of the symbol's range are tail calls,
                // not intra-function edges.
                Some(t) if t >= address && t < range_end => {
                    if conditional_mnemonic(&mnemonic) {
                        (ImmRole::BranchTarget, Some(Terminator::Conditional(t)))
                    } else {
                        (ImmRole::BranchTarget, Some(Terminator::Jump(t)))
                    }
                }
                Some(_) => (ImmRole::CallTarget, Some(Terminator::Indirect(None))),
                None => (ImmRole::Plain, Some(Terminator::Indirect(None))),
            }
        } else {
            (ImmRole::Plain, None)
        };

        lifted.push(LiftedInsn {
            address: insn.address(),
            record: Instruction::new(mnemonic, normalize_operands(cs, &detail, role)),
            terminator,
        });
    }
    Ok(lifted)
}

/// Partition a symbol's instruction stream into basic blocks and wire the
/// CFG edges. Returns `None` for symbols that decode to nothing.
fn build_function(sym: &SymbolInfo, lifted: Vec<LiftedInsn>) -> Option<Function> {
    if lifted.is_empty() {
        return None;
    }

    // Leaders: function start, every direct branch target, and the
    // instruction after every terminator.
    let mut leaders: BTreeSet<u64> = BTreeSet::new();
    leaders.insert(lifted[0].address);
    for (idx, insn) in lifted.iter().enumerate() {
        match insn.terminator {
            Some(Terminator::Conditional(target)) | Some(Terminator::Jump(target)) => {
                leaders.insert(target);
            }
            _ => {}
        }
        if insn.terminator.is_some() {
            if let Some(next) = lifted.get(idx + 1) {
                leaders.insert(next.address);
            }
        }
    }

    let mut function = Function::new(
        if sym.name.is_empty() { None } else { Some(sym.name.clone()) },
        0,
    );
    let mut block_of_leader: BTreeMap<u64, BlockId> = BTreeMap::new();
    let mut terminators: Vec<Option<Terminator>> = Vec::new();
    let mut falls_through: Vec<bool> = Vec::new();

    let mut current: Vec<Instruction> = Vec::new();
    let mut current_leader = lifted[0].address;
    let mut current_terminator: Option<Terminator> = None;
    let mut flush =
        |leader: u64, insns: &mut Vec<Instruction>, term: Option<Terminator>, fallthrough: bool| {
            let id = function.add_block(BasicBlock::new(std::mem::take(insns)));
            block_of_leader.insert(leader, id);
            terminators.push(term);
            falls_through.push(fallthrough);
        };

    for (idx, insn) in lifted.iter().enumerate() {
        if insn.address != current_leader && leaders.contains(&insn.address) {
            // Reached the next leader without a terminator: fallthrough.
            flush(current_leader, &mut current, current_terminator.take(), true);
            current_leader = insn.address;
        }
        current.push(insn.record.clone());
        if insn.terminator.is_some() {
            current_terminator = insn.terminator;
            let next_leader = lifted.get(idx + 1).map(|n| n.address);
            flush(current_leader, &mut current, current_terminator.take(), false);
            if let Some(next) = next_leader {
                current_leader = next;
            }
        }
    }
    if !current.is_empty() {
        flush(current_leader, &mut current, None, false);
    }

    // Wire edges now that every leader has a block id.
    let block_count = function.blocks.len();
    for idx in 0..block_count {
        let from = BlockId(idx);
        let next = if idx + 1 < block_count { Some(BlockId(idx + 1)) } else { None };
        match terminators[idx] {
            Some(Terminator::Conditional(target)) => {
                if let Some(&to) = block_of_leader.get(&target) {
                    function.add_edge(from, to, EdgeKind::BranchTaken);
                }
                if let Some(to) = next {
                    function.add_edge(from, to, EdgeKind::Fallthrough);
                }
            }
            Some(Terminator::Jump(target)) => {
                if let Some(&to) = block_of_leader.get(&target) {
                    function.add_edge(from, to, EdgeKind::BranchTaken);
                }
            }
            Some(Terminator::Indirect(target)) => {
                if let Some(&to) = target.and_then(|t| block_of_leader.get(&t)) {
                    function.add_edge(from, to, EdgeKind::BranchIndirect);
                }
            }
            Some(Terminator::Return) => {}
            None => {
                if falls_through[idx] {
                    if let Some(to) = next {
                        function.add_edge(from, to, EdgeKind::Fallthrough);
                    }
                }
            }
        }
    }

    // Indirect branches leave successors unknown; whatever the flood from
    // the entry cannot reach stays as an explicitly-marked cold block.
    let mut reachable = vec![false; block_count];
    let mut stack = vec![function.entry];
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut reachable[id.0], true) {
            continue;
        }
        for edge in &function.blocks[id.0].successors {
            if !reachable[edge.target.0] {
                stack.push(edge.target);
            }
        }
    }
    for (idx, block) in function.blocks.iter_mut().enumerate() {
        if !reachable[idx] {
            block.cold = true;
        }
    }

    Some(function)
}

/// Load and disassemble a native binary into a program.
///
/// An empty file, or a parseable container with no function symbols, yields
/// a program with zero functions; that is a legitimate input, not an error.
pub fn load_program_binary(path: &Path, arch_hint: Option<&str>) -> Result<Program, LoadError> {
    let bytes = fs::read(path).map_err(|_| LoadError::MissingInput(path.to_path_buf()))?;
    let mut program = Program::new(path.display().to_string());
    if bytes.is_empty() {
        return Ok(program);
    }

    let object = Object::parse(&bytes)
        .map_err(|e| LoadError::UnparseableObject(format!("{}: {e}", path.display())))?;
    let arch = match arch_hint {
        Some(hint) => hint.to_lowercase(),
        None => arch_from_object(&object).unwrap_or("x86_64").to_string(),
    };
    let cs = make_cs(&arch)?;

    let mut symbols = match &object {
        Object::Elf(elf) => elf_symbols(elf, bytes.len()),
        Object::PE(pe) => pe_symbols(pe, bytes.len()),
        Object::Mach(mach::Mach::Binary(bin)) => mach_symbols(bin, bytes.len()),
        _ => Vec::new(),
    };
    // Deterministic function ids: address order, name as tie-break for
    // overlapping symbols.
    symbols.sort_by(|x, y| x.address.cmp(&y.address).then(x.name.cmp(&y.name)));
    symbols.dedup_by(|x, y| x.address == y.address);

    for sym in &symbols {
        let (start, end) = sym.file_range;
        let code = &bytes[start..end];
        let range_end = sym.address + (end - start) as u64;
        let lifted = lift_instructions(&cs, code, sym.address, range_end)?;
        let byte_size: u64 = (end - start) as u64;
        if let Some(mut function) = build_function(sym, lifted) {
            function.size = byte_size;
            program.add_function(function);
        }
    }
    Ok(program)
}
