//! The 3-phase assembler (spec §4.8): lay out blocks to byte offsets, emit
//! instruction bytes with label placeholders recorded as `Jumpsite`s, then
//! patch every jumpsite with its resolved offset. Grounded on
//! `examples/original_source/lib/CodeGen/Assembler.cc`'s three-pass shape
//! and `lib/Assembly2/Instruction.h`'s per-opcode operand layouts,
//! generalized to the opcode set `scatha_mir` actually produces.
//!
//! Operand/instruction encoding is this crate's own invention (the
//! original's opcode bit-packing doesn't carry over cleanly to a from-
//! scratch register/memory model) but is deterministic and fully
//! self-describing: every instruction's length is computable from its
//! shape alone, which is what lets phase 1 measure layout without phase 2
//! having emitted a single byte yet.

use crate::data::{build_data_section, DataSection};
use crate::debuginfo::DebugInfo;
use crate::ffi::{encode_ffi_decls, FfiFunctionDecl, FfiLibraryDecl, FfiType};
use crate::header::{ProgramHeader, HEADER_SIZE};
use crate::opcode::{encode_compare_mode_op, Opcode};
use hashbrown::HashMap;
use scatha_ir::context::Context;
use scatha_ir::module::Module as IrModule;
use scatha_ir::types::Type as IrType;
use scatha_mir::module::Module as MirModule;
use scatha_mir::operand::{AddrBase, MemoryAddress};
use scatha_mir::register::CalleeSlot;
use scatha_mir::{Function as MirFunction, HwReg, Instruction, MirBlockId, MirCallee, MirFunctionId, MirInstKind, MirOperand, Register};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Label {
    func: MirFunctionId,
    block: MirBlockId,
}

#[derive(Debug, Clone, Copy)]
struct Jumpsite {
    code_offset: usize,
    target: Label,
    width: u8,
    relative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum AssembleError {
    #[error("entry function '{0}' not found")]
    NoSuchEntry(&'static str),
    #[error("entry function has no body")]
    EntryIsDeclaration,
}

pub struct AssembledOutput {
    pub header: ProgramHeader,
    pub data: Vec<u8>,
    pub text: Vec<u8>,
    pub ffi: Vec<u8>,
    pub debug_info: DebugInfo,
}

impl AssembledOutput {
    /// The whole binary as a single contiguous byte stream: header, data,
    /// text, FFI declarations, in that order (spec §6 "Binary format").
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len() + self.text.len() + self.ffi.len());
        self.header.write_to(&mut out);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.text);
        out.extend_from_slice(&self.ffi);
        out
    }
}

/// Maps an IR type to its FFI wire encoding (spec §6 type codes), folding
/// sub-32-bit integer widths down to the nearest FFI integer size.
fn to_ffi_type(ctx: &Context, ty: scatha_ir::ids::TypeId) -> FfiType {
    match ctx.type_of(ty) {
        IrType::Void => FfiType::Void,
        IrType::Ptr => FfiType::Pointer,
        IrType::Int(w) => match *w {
            1..=8 => FfiType::Int8,
            9..=16 => FfiType::Int16,
            17..=32 => FfiType::Int32,
            _ => FfiType::Int64,
        },
        IrType::Float(32) => FfiType::Float,
        IrType::Float(_) => FfiType::Double,
        IrType::Struct(sid) => {
            let layout = ctx.struct_layout(*sid).clone();
            FfiType::Struct(layout.members.iter().map(|m| to_ffi_type(ctx, *m)).collect())
        }
        IrType::Array { .. } | IrType::Function { .. } => FfiType::Pointer,
    }
}

/// Groups every foreign-function declaration in `ir` by its library slot
/// (spec §6 FFI decl list). `libraries[slot]` names the library owning that
/// slot; a foreign function whose slot has no entry in `libraries` is
/// dropped (the driver is responsible for supplying one `-L` per slot a
/// program actually uses).
pub fn build_ffi_decls(ctx: &Context, ir: &IrModule, libraries: &[String]) -> Vec<FfiLibraryDecl> {
    let mut libs: Vec<FfiLibraryDecl> = libraries.iter().map(|name| FfiLibraryDecl { name: name.clone(), functions: Vec::new() }).collect();
    for f in &ir.functions {
        if let Some((slot, index)) = f.foreign {
            if let Some(lib) = libs.get_mut(slot as usize) {
                lib.functions.push(FfiFunctionDecl {
                    name: f.name.clone(),
                    argument_types: f.param_types.iter().map(|t| to_ffi_type(ctx, *t)).collect(),
                    return_type: to_ffi_type(ctx, f.ret_ty),
                    index,
                });
            }
        }
    }
    for lib in &mut libs {
        lib.functions.sort_by_key(|f| f.index);
    }
    libs
}

fn encode_register(r: Register) -> u8 {
    match r {
        Register::Hardware(HwReg(n)) => n,
        Register::Callee(CalleeSlot(n)) => 0x80 | n,
        Register::Virtual(_) | Register::Ssa(_) => {
            scatha_support::ice!(false, "cannot assemble register {r} that was never hardware-allocated");
            unreachable!()
        }
    }
}

const ADDR_LEN: u64 = 1 + 8 + 1 + 1 + 1 + 8;

fn operand_len(op: &MirOperand) -> u64 {
    match op {
        MirOperand::Reg(_) => 2,
        MirOperand::Imm(_) => 9,
        MirOperand::Global(_) => 9,
        MirOperand::Mem(_) => 1 + ADDR_LEN,
    }
}

fn encode_addr(addr: &MemoryAddress, data: &DataSection, data_offset: u64, func: &MirFunction, out: &mut Vec<u8>) {
    match addr.base {
        AddrBase::Reg(r) => {
            out.push(0);
            out.extend_from_slice(&(encode_register(r) as u64).to_le_bytes());
        }
        AddrBase::Frame(slot) => {
            out.push(1);
            out.extend_from_slice(&func.stack_slot_offset(slot).to_le_bytes());
        }
        AddrBase::Global(gid) => {
            out.push(2);
            let layout = data.offsets[&gid];
            out.extend_from_slice(&(data_offset + layout.offset).to_le_bytes());
        }
        AddrBase::Absolute(v) => {
            out.push(3);
            out.extend_from_slice(&(v as u64).to_le_bytes());
        }
    }
    match addr.index {
        Some(r) => {
            out.push(1);
            out.push(encode_register(r));
        }
        None => {
            out.push(0);
            out.push(0);
        }
    }
    out.push(addr.scale);
    out.extend_from_slice(&addr.offset.to_le_bytes());
}

fn encode_operand(op: &MirOperand, data: &DataSection, data_offset: u64, func: &MirFunction, out: &mut Vec<u8>) {
    match op {
        MirOperand::Reg(r) => {
            out.push(0);
            out.push(encode_register(*r));
        }
        MirOperand::Imm(v) => {
            out.push(1);
            out.extend_from_slice(&v.to_le_bytes());
        }
        MirOperand::Global(gid) => {
            out.push(2);
            let layout = data.offsets[gid];
            out.extend_from_slice(&(data_offset + layout.offset).to_le_bytes());
        }
        MirOperand::Mem(addr) => {
            out.push(3);
            encode_addr(addr, data, data_offset, func, out);
        }
    }
}

/// Exact encoded length of `inst`, independent of any label's final
/// address — what lets phase 1 compute every block's offset before phase 2
/// emits a single byte (spec §4.8 "Phase 1: lay out blocks").
fn instruction_len(inst: &Instruction) -> u64 {
    let header = 3 + if inst.dest.is_some() { 1 } else { 0 };
    let body = match &inst.kind {
        MirInstKind::Copy { src } => operand_len(src),
        MirInstKind::Arithmetic { lhs, rhs, .. } => operand_len(lhs) + operand_len(rhs),
        MirInstKind::Unary { operand, .. } => operand_len(operand),
        MirInstKind::Convert { operand, .. } => 1 + operand_len(operand),
        MirInstKind::Compare { lhs, rhs, .. } => 1 + operand_len(lhs) + operand_len(rhs),
        MirInstKind::Load { addr } => addr_operand_len(addr),
        MirInstKind::Store { addr, value } => addr_operand_len(addr) + operand_len(value),
        MirInstKind::Lea { addr } => addr_operand_len(addr),
        MirInstKind::Jump { .. } => 4,
        MirInstKind::CondJump { cond, .. } => operand_len(cond) + 4 + 4,
        MirInstKind::Call { callee, args } => {
            let callee_len = match callee {
                MirCallee::Function(_) => 8,
                MirCallee::Foreign { .. } => 4 + 4,
            };
            callee_len + 1 + args.iter().map(operand_len).sum::<u64>()
        }
        MirInstKind::Return | MirInstKind::Unreachable => 0,
    };
    header + body
}

fn addr_operand_len(_addr: &MemoryAddress) -> u64 {
    ADDR_LEN
}

fn opcode_for(inst: &Instruction) -> Opcode {
    match &inst.kind {
        MirInstKind::Copy { .. } => Opcode::Copy,
        MirInstKind::Arithmetic { op, .. } => Opcode::from_arith(*op),
        MirInstKind::Unary { op, .. } => Opcode::from_unary(*op),
        MirInstKind::Convert { op, .. } => Opcode::from_convert(*op),
        MirInstKind::Compare { .. } => Opcode::Compare,
        MirInstKind::Load { .. } => Opcode::Load,
        MirInstKind::Store { .. } => Opcode::Store,
        MirInstKind::Lea { .. } => Opcode::Lea,
        MirInstKind::Jump { .. } => Opcode::Jump,
        MirInstKind::CondJump { .. } => Opcode::CondJump,
        MirInstKind::Call { callee: MirCallee::Function(_), .. } => Opcode::Call,
        MirInstKind::Call { callee: MirCallee::Foreign { .. }, .. } => Opcode::CallForeign,
        MirInstKind::Return => Opcode::Return,
        MirInstKind::Unreachable => Opcode::Unreachable,
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_instruction(
    inst: &Instruction,
    fid: MirFunctionId,
    func: &MirFunction,
    data: &DataSection,
    data_offset: u64,
    out: &mut Vec<u8>,
    jumpsites: &mut Vec<Jumpsite>,
) {
    out.push(opcode_for(inst).as_u8());
    out.push(inst.bytewidth);
    match inst.dest {
        Some(d) => {
            out.push(1);
            out.push(encode_register(d));
        }
        None => out.push(0),
    }

    let mut op = |o: &MirOperand, out: &mut Vec<u8>| encode_operand(o, data, data_offset, func, out);
    let mut addr = |a: &MemoryAddress, out: &mut Vec<u8>| encode_addr(a, data, data_offset, func, out);

    match &inst.kind {
        MirInstKind::Copy { src } => op(src, out),
        MirInstKind::Arithmetic { lhs, rhs, .. } => {
            op(lhs, out);
            op(rhs, out);
        }
        MirInstKind::Unary { operand, .. } => op(operand, out),
        MirInstKind::Convert { operand, dest_width, .. } => {
            out.push(*dest_width);
            op(operand, out);
        }
        MirInstKind::Compare { mode, op: cmp_op, lhs, rhs } => {
            out.push(encode_compare_mode_op(*mode, *cmp_op));
            op(lhs, out);
            op(rhs, out);
        }
        MirInstKind::Load { addr: a } => addr(a, out),
        MirInstKind::Store { addr: a, value } => {
            addr(a, out);
            op(value, out);
        }
        MirInstKind::Lea { addr: a } => addr(a, out),
        MirInstKind::Jump { target } => {
            jumpsites.push(Jumpsite { code_offset: out.len(), target: Label { func: fid, block: *target }, width: 4, relative: true });
            out.extend_from_slice(&0i32.to_le_bytes());
        }
        MirInstKind::CondJump { cond, if_true, if_false } => {
            op(cond, out);
            jumpsites.push(Jumpsite { code_offset: out.len(), target: Label { func: fid, block: *if_true }, width: 4, relative: true });
            out.extend_from_slice(&0i32.to_le_bytes());
            jumpsites.push(Jumpsite { code_offset: out.len(), target: Label { func: fid, block: *if_false }, width: 4, relative: true });
            out.extend_from_slice(&0i32.to_le_bytes());
        }
        MirInstKind::Call { callee, args } => {
            match callee {
                MirCallee::Function(callee_fid) => {
                    jumpsites.push(Jumpsite { code_offset: out.len(), target: Label { func: *callee_fid, block: MirBlockId::new(0) }, width: 8, relative: false });
                    out.extend_from_slice(&0u64.to_le_bytes());
                }
                MirCallee::Foreign { slot, index } => {
                    out.extend_from_slice(&slot.to_le_bytes());
                    out.extend_from_slice(&index.to_le_bytes());
                }
            }
            out.push(args.len() as u8);
            for a in args {
                op(a, out);
            }
        }
        MirInstKind::Return | MirInstKind::Unreachable => {}
    }
}

/// Runs the full 3-phase assembly of `mir` into a binary, plus the data
/// section derived from `ir`'s live globals and the FFI declaration list
/// for `libraries` (spec §4.8, §6).
pub fn assemble(ctx: &Context, ir: &IrModule, mir: &MirModule, libraries: &[String], entry_name: &'static str) -> Result<AssembledOutput, AssembleError> {
    let entry_fid = mir.find_function(entry_name).ok_or(AssembleError::NoSuchEntry(entry_name))?;
    if mir.function(entry_fid).block_order().is_empty() {
        return Err(AssembleError::EntryIsDeclaration);
    }

    let data_section = build_data_section(ctx, ir);
    let data_offset = HEADER_SIZE as u64;
    log::debug!("assembler: data section is {} byte(s)", data_section.bytes.len());

    // Phase 1: lay out blocks, record label -> text-relative byte offset.
    log::trace!("assembler: phase 1 (layout)");
    let mut label_offsets: HashMap<Label, u64> = HashMap::new();
    let mut cursor = 0u64;
    for f in &mir.functions {
        if f.block_order().is_empty() {
            continue;
        }
        for (bid, _) in f.blocks_iter() {
            label_offsets.insert(Label { func: f.id, block: bid }, cursor);
            for inst in f.insts_in(bid) {
                cursor += instruction_len(inst);
            }
        }
    }

    // Phase 2: emit instruction bytes, recording a jumpsite per label use.
    log::trace!("assembler: phase 2 (emit), {cursor} byte(s) of text expected");
    let mut text = Vec::with_capacity(cursor as usize);
    let mut jumpsites = Vec::new();
    let mut debug_info = DebugInfo::new();
    for f in &mir.functions {
        if f.block_order().is_empty() {
            continue;
        }
        let begin = label_offsets[&Label { func: f.id, block: f.entry_block().unwrap() }];
        for (bid, _) in f.blocks_iter() {
            for inst in f.insts_in(bid) {
                emit_instruction(inst, f.id, f, &data_section, data_offset, &mut text, &mut jumpsites);
            }
        }
        debug_info.record_function(f.name.clone(), begin, text.len() as u64);
    }
    let text_offset = data_offset + data_section.bytes.len() as u64;

    // Phase 3: patch every jumpsite with its resolved offset.
    log::trace!("assembler: phase 3 (patch), {} jumpsite(s)", jumpsites.len());
    for site in &jumpsites {
        let target_label = if site.width == 8 {
            // Calls record only `block: MirBlockId::new(0)` as a stand-in;
            // resolve to the callee's actual entry block.
            let entry = mir.function(site.target.func).entry_block().expect("call target must be defined");
            Label { func: site.target.func, block: entry }
        } else {
            site.target
        };
        let target_offset = label_offsets[&target_label];
        if site.relative {
            let value = target_offset as i64 - (site.code_offset as i64 + site.width as i64);
            text[site.code_offset..site.code_offset + 4].copy_from_slice(&(value as i32).to_le_bytes());
        } else {
            let value = text_offset + target_offset;
            text[site.code_offset..site.code_offset + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    let ffi_decls = build_ffi_decls(ctx, ir, libraries);
    let ffi = encode_ffi_decls(&ffi_decls);
    let ffi_decl_offset = text_offset + text.len() as u64;
    let start_address = label_offsets[&Label { func: entry_fid, block: mir.function(entry_fid).entry_block().unwrap() }];

    let header = ProgramHeader {
        total_size: ffi_decl_offset + ffi.len() as u64,
        start_address,
        data_offset,
        text_offset,
        ffi_decl_offset,
    };

    log::debug!("assembler: assembled {} byte(s) total", header.total_size);
    Ok(AssembledOutput { header, data: data_section.bytes, text, ffi, debug_info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatha_ir::builder::FunctionBuilder;
    use scatha_ir::context::Context;
    use scatha_ir::ids::{LocalValue, Operand as IrOperand};
    use scatha_ir::module::Module as IrModule;
    use scatha_mir::{lower_module, CodegenConfig};

    fn build_identity_module() -> (Context, IrModule) {
        let mut ctx = Context::new();
        let mut module = IrModule::new();
        let i64_ty = ctx.int_type(64);
        let id = module.declare_function("main", vec![], i64_ty);
        {
            let mut b = FunctionBuilder::new(module.function_mut(id));
            let entry = b.new_block(Some("entry".into()));
            b.set_current(entry);
            let forty_two = IrOperand::Constant(ctx.const_int(i64_ty, 42));
            b.ret(&ctx, Some(forty_two));
            b.finish().unwrap();
        }
        (ctx, module)
    }

    #[test]
    fn assembles_a_trivial_program_with_a_well_formed_header() {
        let (ctx, ir) = build_identity_module();
        let mir = lower_module(&ctx, &ir, CodegenConfig::default());
        let out = assemble(&ctx, &ir, &mir, &[], "main").unwrap();
        assert!(!out.text.is_empty());
        assert_eq!(out.header.data_offset, HEADER_SIZE as u64);
        assert_eq!(out.header.text_offset, HEADER_SIZE as u64 + out.data.len() as u64);
        assert_eq!(out.header.ffi_decl_offset, out.header.text_offset + out.text.len() as u64);
        assert_eq!(out.header.total_size, out.header.ffi_decl_offset + out.ffi.len() as u64);

        let bytes = out.to_bytes();
        let read_back = ProgramHeader::read_from(&bytes).unwrap();
        assert_eq!(read_back, out.header);
    }

    #[test]
    fn missing_entry_function_is_an_error() {
        let (ctx, ir) = build_identity_module();
        let mir = lower_module(&ctx, &ir, CodegenConfig::default());
        assert!(matches!(assemble(&ctx, &ir, &mir, &[], "does-not-exist"), Err(AssembleError::NoSuchEntry(_))));
    }

    #[test]
    fn a_relative_jump_offset_points_at_its_target_block() {
        use scatha_ir::instruction::{CompareMode, CompareOp};

        let mut ctx = Context::new();
        let mut module = IrModule::new();
        let i64_ty = ctx.int_type(64);
        let id = module.declare_function("branchy", vec![i64_ty], i64_ty);
        {
            let zero = ctx.const_int(i64_ty, 0);
            let mut b = FunctionBuilder::new(module.function_mut(id));
            let entry = b.new_block(Some("entry".into()));
            let then_blk = b.new_block(Some("then".into()));
            let end_blk = b.new_block(Some("end".into()));
            b.set_current(entry);
            let cond = b.compare(&mut ctx, CompareMode::Signed, CompareOp::Gt, IrOperand::Local(LocalValue::Param(0)), IrOperand::Constant(zero), None);
            b.branch(&ctx, IrOperand::Local(LocalValue::Inst(cond)), then_blk, end_blk);
            b.set_current(then_blk);
            b.goto(&ctx, end_blk);
            b.set_current(end_blk);
            b.ret(&ctx, Some(IrOperand::Local(LocalValue::Param(0))));
            b.finish().unwrap();
        }
        let mir = lower_module(&ctx, &module, CodegenConfig::default());
        let out = assemble(&ctx, &module, &mir, &[], "branchy").unwrap();
        assert!(!out.text.is_empty());
    }
}
