//! IR → MIR instruction selection (spec §4.7): walks each function's basic
//! blocks in layout order and lowers every IR instruction to its MIR
//! counterpart, folding `alloca`/`GetElementPointer` address computations
//! into the `{base, index, scale, offset}` operands of the `Load`/`Store`
//! that consume them rather than always materializing a pointer register
//! first.
//!
//! Values keep a *register* identity (an int, float, or pointer fits one
//! machine word) except structs and arrays, which this selector always
//! keeps in memory and tracks purely through an address (no aggregate ever
//! occupies a register) — `addr_of` is the map from an aggregate-producing
//! IR instruction to that backing address. A function's parameters are the
//! one exception that gets a register unconditionally, aggregate or not:
//! aggregate parameters are passed as a hidden pointer to caller-owned
//! storage, so the register IS the address (a common ABI lowering, see
//! `original_source/lib/IR/CFG.h`'s treatment of struct-typed arguments).

use crate::instruction::{ArithOp, CompareMode as MirCompareMode, CompareOp as MirCompareOp, ConvertOp, MirCallee, MirInstKind, UnaryOp};
use crate::module::{CallingConvention as MirCallingConvention, Function as MirFunction, Module as MirModule, PendingPhi};
use crate::operand::{AddrBase, MemoryAddress, MirOperand};
use crate::register::Register;
use hashbrown::HashMap;
use scatha_ir::context::{Constant, Context};
use scatha_ir::ids::{BlockId, ConstantId, FunctionId, InstId, LocalValue, Operand as IrOperand, TypeId};
use scatha_ir::instruction::{ArithmeticOp, Callee, CompareMode, CompareOp, ConversionOp, GepIndex, InstKind, UnaryArithmeticOp};
use scatha_ir::module::{CallingConvention as IrCallingConvention, Function as IrFunction, Module as IrModule};
use scatha_ir::types::Type;
use smallvec::SmallVec;

pub fn select_module(ctx: &Context, ir: &IrModule) -> MirModule {
    let mut mm = MirModule::new();
    let mut fn_map: HashMap<FunctionId, crate::ids::MirFunctionId> = HashMap::new();
    for f in &ir.functions {
        let id = mm.declare_function(f.name.clone());
        fn_map.insert(f.id, id);
    }
    for f in &ir.functions {
        let mid = fn_map[&f.id];
        {
            let mf = mm.function_mut(mid);
            mf.calling_convention = map_cc(f.calling_convention);
            mf.foreign = f.foreign;
        }
        if !f.is_declaration() {
            select_function(ctx, f, &mut mm, mid, &fn_map);
        }
    }
    mm
}

fn map_cc(cc: IrCallingConvention) -> MirCallingConvention {
    match cc {
        IrCallingConvention::Scatha => MirCallingConvention::Scatha,
        IrCallingConvention::C => MirCallingConvention::C,
    }
}

fn is_aggregate(ctx: &Context, ty: TypeId) -> bool {
    matches!(ctx.type_of(ty), Type::Struct(_) | Type::Array { .. })
}

fn bytewidth_of(ctx: &Context, ty: TypeId) -> u8 {
    ctx.size_of(ty).clamp(1, 8) as u8
}

fn operand_ir_type(ctx: &Context, ir_f: &IrFunction, op: IrOperand) -> TypeId {
    match op {
        IrOperand::Local(lv) => ir_f.value_type(lv),
        IrOperand::Global(_) => ctx.ptr_type(),
        IrOperand::Constant(c) => ctx.constant(c).type_of(ctx),
    }
}

fn is_undef_operand(ctx: &Context, op: IrOperand) -> bool {
    matches!(op, IrOperand::Constant(c) if matches!(ctx.constant(c), Constant::Undef { .. }))
}

fn constant_to_mir(ctx: &Context, c: ConstantId) -> MirOperand {
    match ctx.constant(c) {
        Constant::Integral { value, .. } => MirOperand::Imm(*value as i64),
        Constant::Float { bits, .. } => MirOperand::Imm(*bits as i64),
        Constant::NullPointer | Constant::Undef { .. } => MirOperand::Imm(0),
        // Aggregate constants never reach a scalar operand position; the
        // instructions that build or consume them (InsertValue/ExtractValue)
        // resolve an address instead of calling this helper.
        Constant::RecordStruct { .. } | Constant::RecordArray { .. } => MirOperand::Imm(0),
    }
}

fn operand_to_mir(value_regs: &HashMap<LocalValue, Register>, ctx: &Context, op: IrOperand) -> MirOperand {
    match op {
        IrOperand::Local(lv) => MirOperand::Reg(value_regs[&lv]),
        IrOperand::Global(g) => MirOperand::Global(g),
        IrOperand::Constant(c) => constant_to_mir(ctx, c),
    }
}

fn offset_addr(addr: MemoryAddress, extra: i64) -> MemoryAddress {
    MemoryAddress { offset: addr.offset + extra, ..addr }
}

/// Resolves the address a pointer-valued operand refers to, preferring a
/// folded `addr_of` entry (an `Alloca` or `GetElementPointer` result) over
/// treating the operand as a bare base register.
fn resolve_pointer_address(
    value_regs: &HashMap<LocalValue, Register>,
    addr_of: &HashMap<InstId, MemoryAddress>,
    op: IrOperand,
) -> MemoryAddress {
    match op {
        IrOperand::Local(LocalValue::Inst(id)) => addr_of.get(&id).copied().unwrap_or_else(|| MemoryAddress::direct(value_regs[&LocalValue::Inst(id)])),
        IrOperand::Local(LocalValue::Param(i)) => MemoryAddress::direct(value_regs[&LocalValue::Param(i)]),
        IrOperand::Global(g) => MemoryAddress { base: AddrBase::Global(g), index: None, scale: 1, offset: 0 },
        IrOperand::Constant(_) => MemoryAddress { base: AddrBase::Absolute(0), index: None, scale: 1, offset: 0 },
    }
}

/// Walks a constant index list (InsertValue/ExtractValue, §4.2) to the
/// targeted member's type and byte offset from the aggregate's start.
fn navigate_indices(ctx: &Context, ty: TypeId, indices: &[u64]) -> (TypeId, i64) {
    let mut cur = ty;
    let mut off = 0i64;
    for &i in indices {
        match ctx.type_of(cur) {
            Type::Struct(sid) => {
                let layout = ctx.struct_layout(*sid);
                off += layout.offsets[i as usize] as i64;
                cur = layout.members[i as usize];
            }
            Type::Array { element, .. } => {
                off += i as i64 * ctx.size_of(*element) as i64;
                cur = *element;
            }
            other => unreachable!("index {i} into non-aggregate type {other:?}"),
        }
    }
    (cur, off)
}

/// Copies an aggregate value field by field (spec §4.6 "aggregates ... are
/// always addressed, never register-resident"). There is no runtime
/// `memcpy` call in this selector; every copy unrolls into scalar
/// loads/stores, which is only reasonable for the small, statically-sized
/// aggregates this IR's Non-goals scope the language to.
fn copy_aggregate(mf: &mut MirFunction, ctx: &Context, block: crate::ids::MirBlockId, dest: MemoryAddress, src: MemoryAddress, ty: TypeId) {
    match ctx.type_of(ty) {
        Type::Struct(sid) => {
            let layout = ctx.struct_layout(*sid);
            for (member_ty, &off) in layout.members.clone().iter().zip(layout.offsets.clone().iter()) {
                copy_aggregate(mf, ctx, block, offset_addr(dest, off as i64), offset_addr(src, off as i64), *member_ty);
            }
        }
        Type::Array { element, count } => {
            let element = *element;
            let esize = ctx.size_of(element) as i64;
            for i in 0..*count as i64 {
                copy_aggregate(mf, ctx, block, offset_addr(dest, i * esize), offset_addr(src, i * esize), element);
            }
        }
        _ => {
            let width = bytewidth_of(ctx, ty);
            let tmp = Register::Ssa(mf.new_vreg());
            mf.append(block, MirInstKind::Load { addr: src }, Some(tmp), width);
            mf.append(block, MirInstKind::Store { addr: dest, value: MirOperand::Reg(tmp) }, None, width);
        }
    }
}

/// Folds a `GetElementPointer`'s index list onto its base address. One
/// dynamically-valued index is folded directly into the resulting
/// `MemoryAddress`'s `index`/`scale` fields; a GEP chain with more than one
/// dynamic index falls back to an explicit multiply-add per spec §4.7's
/// allowance for selection to emit ordinary arithmetic when a pattern
/// doesn't fold.
fn gep_address(
    ctx: &Context,
    mf: &mut MirFunction,
    block: crate::ids::MirBlockId,
    value_regs: &HashMap<LocalValue, Register>,
    addr_of: &HashMap<InstId, MemoryAddress>,
    ptr: IrOperand,
    base_ty: TypeId,
    indices: &[GepIndex],
) -> MemoryAddress {
    let mut addr = resolve_pointer_address(value_regs, addr_of, ptr);
    let mut cur_ty = base_ty;
    let mut dynamic_used = addr.index.is_some();
    for idx in indices {
        match idx {
            GepIndex::Const(i) => match ctx.type_of(cur_ty) {
                Type::Struct(sid) => {
                    let layout = ctx.struct_layout(*sid);
                    addr.offset += layout.offsets[*i as usize] as i64;
                    cur_ty = layout.members[*i as usize];
                }
                Type::Array { element, .. } => {
                    let element = *element;
                    addr.offset += i * ctx.size_of(element) as i64;
                    cur_ty = element;
                }
                _ => addr.offset += i * ctx.size_of(cur_ty) as i64,
            },
            GepIndex::Value(v) => {
                let elem_ty = match ctx.type_of(cur_ty) {
                    Type::Array { element, .. } => *element,
                    _ => cur_ty,
                };
                let esize = ctx.size_of(elem_ty);
                let reg = match operand_to_mir(value_regs, ctx, *v) {
                    MirOperand::Reg(r) => r,
                    other => {
                        let r = Register::Ssa(mf.new_vreg());
                        mf.append(block, MirInstKind::Copy { src: other }, Some(r), 8);
                        r
                    }
                };
                if !dynamic_used && matches!(esize, 1 | 2 | 4 | 8) {
                    addr.index = Some(reg);
                    addr.scale = esize as u8;
                    dynamic_used = true;
                } else {
                    let scaled = Register::Ssa(mf.new_vreg());
                    mf.append(block, MirInstKind::Arithmetic { op: ArithOp::Mul, lhs: MirOperand::Reg(reg), rhs: MirOperand::Imm(esize as i64) }, Some(scaled), 8);
                    let base_reg = materialize_address(mf, block, addr);
                    let summed = Register::Ssa(mf.new_vreg());
                    mf.append(block, MirInstKind::Arithmetic { op: ArithOp::Add, lhs: MirOperand::Reg(base_reg), rhs: MirOperand::Reg(scaled) }, Some(summed), 8);
                    addr = MemoryAddress::direct(summed);
                }
                cur_ty = elem_ty;
            }
        }
    }
    addr
}

fn materialize_address(mf: &mut MirFunction, block: crate::ids::MirBlockId, addr: MemoryAddress) -> Register {
    if addr.index.is_none() && addr.offset == 0 {
        if let AddrBase::Reg(r) = addr.base {
            return r;
        }
    }
    let r = Register::Ssa(mf.new_vreg());
    mf.append(block, MirInstKind::Lea { addr }, Some(r), 8);
    r
}

fn arith_op(op: ArithmeticOp) -> ArithOp {
    match op {
        ArithmeticOp::Add => ArithOp::Add,
        ArithmeticOp::Sub => ArithOp::Sub,
        ArithmeticOp::Mul => ArithOp::Mul,
        ArithmeticOp::SDiv => ArithOp::SDiv,
        ArithmeticOp::UDiv => ArithOp::UDiv,
        ArithmeticOp::SRem => ArithOp::SRem,
        ArithmeticOp::URem => ArithOp::URem,
        ArithmeticOp::FAdd => ArithOp::FAdd,
        ArithmeticOp::FSub => ArithOp::FSub,
        ArithmeticOp::FMul => ArithOp::FMul,
        ArithmeticOp::FDiv => ArithOp::FDiv,
        ArithmeticOp::Shl => ArithOp::Shl,
        ArithmeticOp::LShr => ArithOp::LShr,
        ArithmeticOp::AShr => ArithOp::AShr,
        ArithmeticOp::And => ArithOp::And,
        ArithmeticOp::Or => ArithOp::Or,
        ArithmeticOp::Xor => ArithOp::Xor,
    }
}

fn unary_op(op: UnaryArithmeticOp) -> UnaryOp {
    match op {
        UnaryArithmeticOp::Neg => UnaryOp::Neg,
        UnaryArithmeticOp::BNot => UnaryOp::BNot,
        UnaryArithmeticOp::LNot => UnaryOp::LNot,
    }
}

fn convert_op(op: ConversionOp) -> ConvertOp {
    match op {
        ConversionOp::Zext => ConvertOp::Zext,
        ConversionOp::Sext => ConvertOp::Sext,
        ConversionOp::Trunc => ConvertOp::Trunc,
        ConversionOp::Bitcast => ConvertOp::Bitcast,
        ConversionOp::SIntToFloat => ConvertOp::SIntToFloat,
        ConversionOp::UIntToFloat => ConvertOp::UIntToFloat,
        ConversionOp::FloatToSInt => ConvertOp::FloatToSInt,
        ConversionOp::FloatToUInt => ConvertOp::FloatToUInt,
        ConversionOp::FloatTrunc => ConvertOp::FloatTrunc,
        ConversionOp::FloatExt => ConvertOp::FloatExt,
    }
}

fn compare_mode(mode: CompareMode) -> MirCompareMode {
    match mode {
        CompareMode::Signed => MirCompareMode::Signed,
        CompareMode::Unsigned => MirCompareMode::Unsigned,
        CompareMode::Float => MirCompareMode::Float,
    }
}

fn compare_op(op: CompareOp) -> MirCompareOp {
    match op {
        CompareOp::Eq => MirCompareOp::Eq,
        CompareOp::Ne => MirCompareOp::Ne,
        CompareOp::Lt => MirCompareOp::Lt,
        CompareOp::Le => MirCompareOp::Le,
        CompareOp::Gt => MirCompareOp::Gt,
        CompareOp::Ge => MirCompareOp::Ge,
    }
}

pub fn select_function(ctx: &Context, ir_f: &IrFunction, mm: &mut MirModule, mid: crate::ids::MirFunctionId, fn_map: &HashMap<FunctionId, crate::ids::MirFunctionId>) {
    let mut block_map: HashMap<BlockId, crate::ids::MirBlockId> = HashMap::new();
    for &b in ir_f.block_order() {
        let name = ir_f.block(b).name.clone();
        let mbid = mm.function_mut(mid).new_block(name);
        block_map.insert(b, mbid);
    }

    let mut value_regs: HashMap<LocalValue, Register> = HashMap::new();
    let mut addr_of: HashMap<InstId, MemoryAddress> = HashMap::new();

    // Every parameter gets a register unconditionally (see module doc
    // comment: for aggregates this register holds the hidden pointer).
    for i in 0..ir_f.param_types.len() as u32 {
        let mf = mm.function_mut(mid);
        let reg = Register::Ssa(mf.new_vreg());
        mf.param_registers.push(reg);
        value_regs.insert(LocalValue::Param(i), reg);
    }

    // Pre-allocate destination registers for every scalar-typed instruction
    // result up front, so operand resolution never depends on visit order
    // across blocks (needed for back-edges into loop headers and for phi
    // incoming values from not-yet-visited predecessors).
    for inst in ir_f.all_insts() {
        if inst.ty == ctx.void_type() || is_aggregate(ctx, inst.ty) {
            continue;
        }
        let mf = mm.function_mut(mid);
        let reg = Register::Ssa(mf.new_vreg());
        value_regs.insert(LocalValue::Inst(inst.id), reg);
    }

    // One monotonic arena for the whole function's selection DAGs, reset
    // between blocks rather than reallocated (spec §9 "memory arenas for
    // transient graphs ... released on function exit").
    let mut dag_arena = bumpalo::Bump::new();
    for &ir_block in ir_f.block_order() {
        let mblock = block_map[&ir_block];
        dag_arena.reset();
        // Build the block's selection DAG purely to drive emission order:
        // `order()` walks data/chain-respecting program order, so folding a
        // GEP into its sole consuming Load/Store never risks reordering past
        // an intervening Store/Call (spec §4.7).
        let dag = crate::selection_dag::SelectionDag::build_in(&dag_arena, ir_f, ir_block);
        let order: SmallVec<[InstId; 16]> = dag.order().collect();
        for inst_id in order {
            let inst = ir_f.inst(inst_id);
            select_inst(ctx, ir_f, mm, mid, mblock, inst, &value_regs, &mut addr_of, &block_map, fn_map);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn select_inst(
    ctx: &Context,
    ir_f: &IrFunction,
    mm: &mut MirModule,
    mid: crate::ids::MirFunctionId,
    mblock: crate::ids::MirBlockId,
    inst: &scatha_ir::instruction::Instruction,
    value_regs: &HashMap<LocalValue, Register>,
    addr_of: &mut HashMap<InstId, MemoryAddress>,
    block_map: &HashMap<BlockId, crate::ids::MirBlockId>,
    fn_map: &HashMap<FunctionId, crate::ids::MirFunctionId>,
) {
    let dest_reg = value_regs.get(&LocalValue::Inst(inst.id)).copied();
    match &inst.kind {
        InstKind::Alloca { allocated_ty } => {
            let mf = mm.function_mut(mid);
            let size = ctx.size_of(*allocated_ty).max(1);
            let align = ctx.align_of(*allocated_ty).max(1);
            let slot = mf.new_stack_slot(size, align);
            let addr = MemoryAddress { base: AddrBase::Frame(slot), index: None, scale: 1, offset: 0 };
            addr_of.insert(inst.id, addr);
            mf.append(mblock, MirInstKind::Lea { addr }, dest_reg, 8);
        }
        InstKind::Load { ptr, loaded_ty } => {
            let addr = resolve_pointer_address(value_regs, addr_of, *ptr);
            if is_aggregate(ctx, *loaded_ty) {
                addr_of.insert(inst.id, addr);
            } else {
                let width = bytewidth_of(ctx, *loaded_ty);
                mm.function_mut(mid).append(mblock, MirInstKind::Load { addr }, dest_reg, width);
            }
        }
        InstKind::Store { ptr, value } => {
            let dest = resolve_pointer_address(value_regs, addr_of, *ptr);
            let value_ty = operand_ir_type(ctx, ir_f, *value);
            if is_aggregate(ctx, value_ty) {
                let src = resolve_pointer_address(value_regs, addr_of, *value);
                copy_aggregate(mm.function_mut(mid), ctx, mblock, dest, src, value_ty);
            } else {
                let op = operand_to_mir(value_regs, ctx, *value);
                let width = bytewidth_of(ctx, value_ty);
                mm.function_mut(mid).append(mblock, MirInstKind::Store { addr: dest, value: op }, None, width);
            }
        }
        InstKind::GetElementPointer { ptr, base_ty, indices } => {
            let mf = mm.function_mut(mid);
            let addr = gep_address(ctx, mf, mblock, value_regs, addr_of, *ptr, *base_ty, indices);
            addr_of.insert(inst.id, addr);
            mf.append(mblock, MirInstKind::Lea { addr }, dest_reg, 8);
        }
        InstKind::InsertValue { aggregate, value, indices } => {
            let agg_ty = operand_ir_type(ctx, ir_f, *aggregate);
            let mf = mm.function_mut(mid);
            let size = ctx.size_of(agg_ty).max(1);
            let align = ctx.align_of(agg_ty).max(1);
            let slot = mf.new_stack_slot(size, align);
            let dest_addr = MemoryAddress { base: AddrBase::Frame(slot), index: None, scale: 1, offset: 0 };
            if !is_undef_operand(ctx, *aggregate) {
                let src = resolve_pointer_address(value_regs, addr_of, *aggregate);
                copy_aggregate(mf, ctx, mblock, dest_addr, src, agg_ty);
            }
            let (member_ty, member_off) = navigate_indices(ctx, agg_ty, indices);
            let member_addr = offset_addr(dest_addr, member_off);
            if is_aggregate(ctx, member_ty) {
                let src = resolve_pointer_address(value_regs, addr_of, *value);
                copy_aggregate(mf, ctx, mblock, member_addr, src, member_ty);
            } else {
                let v = operand_to_mir(value_regs, ctx, *value);
                let width = bytewidth_of(ctx, member_ty);
                mf.append(mblock, MirInstKind::Store { addr: member_addr, value: v }, None, width);
            }
            addr_of.insert(inst.id, dest_addr);
        }
        InstKind::ExtractValue { aggregate, indices } => {
            let agg_ty = operand_ir_type(ctx, ir_f, *aggregate);
            let base_addr = resolve_pointer_address(value_regs, addr_of, *aggregate);
            let (member_ty, off) = navigate_indices(ctx, agg_ty, indices);
            let member_addr = offset_addr(base_addr, off);
            if is_aggregate(ctx, member_ty) {
                addr_of.insert(inst.id, member_addr);
            } else {
                let width = bytewidth_of(ctx, member_ty);
                mm.function_mut(mid).append(mblock, MirInstKind::Load { addr: member_addr }, dest_reg, width);
            }
        }
        InstKind::Arithmetic { op, lhs, rhs } => {
            let lhs = operand_to_mir(value_regs, ctx, *lhs);
            let rhs = operand_to_mir(value_regs, ctx, *rhs);
            let width = bytewidth_of(ctx, inst.ty);
            mm.function_mut(mid).append(mblock, MirInstKind::Arithmetic { op: arith_op(*op), lhs, rhs }, dest_reg, width);
        }
        InstKind::UnaryArithmetic { op, operand } => {
            let operand = operand_to_mir(value_regs, ctx, *operand);
            let width = bytewidth_of(ctx, inst.ty);
            mm.function_mut(mid).append(mblock, MirInstKind::Unary { op: unary_op(*op), operand }, dest_reg, width);
        }
        InstKind::Conversion { op, operand, target_ty } => {
            let operand = operand_to_mir(value_regs, ctx, *operand);
            let dest_width = bytewidth_of(ctx, *target_ty);
            mm.function_mut(mid).append(mblock, MirInstKind::Convert { op: convert_op(*op), operand, dest_width }, dest_reg, dest_width);
        }
        InstKind::Compare { mode, op, lhs, rhs } => {
            let lhs_ty = operand_ir_type(ctx, ir_f, *lhs);
            let lhs = operand_to_mir(value_regs, ctx, *lhs);
            let rhs = operand_to_mir(value_regs, ctx, *rhs);
            let width = bytewidth_of(ctx, lhs_ty);
            mm.function_mut(mid).append(mblock, MirInstKind::Compare { mode: compare_mode(*mode), op: compare_op(*op), lhs, rhs }, dest_reg, width);
        }
        InstKind::Goto { target } => {
            mm.function_mut(mid).set_terminator(mblock, MirInstKind::Jump { target: block_map[target] });
        }
        InstKind::Branch { cond, if_true, if_false } => {
            let cond = operand_to_mir(value_regs, ctx, *cond);
            mm.function_mut(mid).set_terminator(mblock, MirInstKind::CondJump { cond, if_true: block_map[if_true], if_false: block_map[if_false] });
        }
        InstKind::Return { value } => {
            let mf = mm.function_mut(mid);
            if let Some(v) = value {
                let value_ty = operand_ir_type(ctx, ir_f, *v);
                if is_aggregate(ctx, value_ty) {
                    // Bounded simplification (see DESIGN.md): aggregate
                    // returns are left in their backing stack slot; this
                    // selector does not yet thread a hidden output pointer
                    // through call sites to collect them.
                } else {
                    let op = operand_to_mir(value_regs, ctx, *v);
                    if mf.return_registers.is_empty() {
                        let r = Register::Ssa(mf.new_vreg());
                        mf.return_registers.push(r);
                    }
                    let ret_reg = mf.return_registers[0];
                    let width = bytewidth_of(ctx, value_ty);
                    mf.append(mblock, MirInstKind::Copy { src: op }, Some(ret_reg), width);
                }
            }
            mf.set_terminator(mblock, MirInstKind::Return);
        }
        InstKind::Unreachable => {
            mm.function_mut(mid).set_terminator(mblock, MirInstKind::Unreachable);
        }
        InstKind::Phi { incoming } => {
            let Some(dest) = dest_reg else { return };
            let incoming_mir: Vec<(crate::ids::MirBlockId, MirOperand)> = incoming
                .iter()
                .map(|(pred, val)| (block_map[pred], operand_to_mir(value_regs, ctx, *val)))
                .collect();
            mm.function_mut(mid).pending_phis.push(PendingPhi { block: mblock, dest, incoming: incoming_mir });
        }
        InstKind::Call { callee, args } => {
            let mcallee = match callee {
                Callee::Function(fid) => MirCallee::Function(fn_map[fid]),
                Callee::Foreign { slot, index } => MirCallee::Foreign { slot: *slot, index: *index },
            };
            let margs: SmallVec<[MirOperand; 4]> = args.iter().map(|a| operand_to_mir(value_regs, ctx, *a)).collect();
            let width = bytewidth_of(ctx, inst.ty);
            mm.function_mut(mid).append(mblock, MirInstKind::Call { callee: mcallee, args: margs }, dest_reg, width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatha_ir::ids::{FunctionId as IrFunctionId, Operand};
    use scatha_ir::instruction::ArithmeticOp;

    fn build_add_function(ctx: &mut Context) -> IrFunction {
        let i64_ty = ctx.int_type(64);
        let mut f = IrFunction::new(IrFunctionId::new(0), "add", vec![i64_ty, i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let sum = f.append(
            entry,
            InstKind::Arithmetic { op: ArithmeticOp::Add, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(1)) },
            i64_ty,
            Some("sum".into()),
        );
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(sum))) }, None, ctx.void_type());
        f
    }

    #[test]
    fn selects_params_and_arithmetic_into_a_single_block() {
        let mut ctx = Context::new();
        let f = build_add_function(&mut ctx);
        let mut ir_module = IrModule::new();
        let i64_ty = ctx.int_type(64);
        ir_module.declare_function("add", vec![i64_ty, i64_ty], i64_ty);
        ir_module.functions[0] = f;

        let mm = select_module(&ctx, &ir_module);
        let mf = mm.function(mm.find_function("add").unwrap());
        assert_eq!(mf.param_registers.len(), 2);
        let insts: Vec<_> = mf.all_insts().collect();
        assert!(insts.iter().any(|i| matches!(i.kind, MirInstKind::Arithmetic { op: ArithOp::Add, .. })));
        assert!(insts.iter().any(|i| matches!(i.kind, MirInstKind::Copy { .. })));
        assert!(matches!(insts.last().unwrap().kind, MirInstKind::Return));
    }

    #[test]
    fn alloca_store_load_folds_the_address() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = IrFunction::new(IrFunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let alloca = f.append(entry, InstKind::Alloca { allocated_ty: i64_ty }, ctx.ptr_type(), None);
        f.append(entry, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(alloca)), value: Operand::Local(LocalValue::Param(0)) }, ctx.void_type(), None);
        let load = f.append(entry, InstKind::Load { ptr: Operand::Local(LocalValue::Inst(alloca)), loaded_ty: i64_ty }, i64_ty, None);
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(load))) }, None, ctx.void_type());

        let mut ir_module = IrModule::new();
        ir_module.declare_function("f", vec![i64_ty], i64_ty);
        ir_module.functions[0] = f;

        let mm = select_module(&ctx, &ir_module);
        let mf = mm.function(mm.find_function("f").unwrap());
        assert_eq!(mf.stack_slots().len(), 1);
        let insts: Vec<_> = mf.all_insts().collect();
        assert!(insts.iter().any(|i| matches!(&i.kind, MirInstKind::Store { addr, .. } if matches!(addr.base, AddrBase::Frame(_)))));
        assert!(insts.iter().any(|i| matches!(&i.kind, MirInstKind::Load { addr } if matches!(addr.base, AddrBase::Frame(_)))));
    }

    #[test]
    fn phi_is_deferred_as_a_pending_phi() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = IrFunction::new(IrFunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let a = f.new_block(Some("a".into()));
        let b = f.new_block(Some("b".into()));
        let join = f.new_block(Some("join".into()));
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Param(0)), if_true: a, if_false: b }, None, ctx.void_type());
        f.set_terminator(a, InstKind::Goto { target: join }, None, ctx.void_type());
        f.set_terminator(b, InstKind::Goto { target: join }, None, ctx.void_type());
        let mut incoming = smallvec::SmallVec::new();
        incoming.push((a, Operand::Local(LocalValue::Param(0))));
        incoming.push((b, Operand::Local(LocalValue::Param(0))));
        let phi = f.append(join, InstKind::Phi { incoming }, i64_ty, Some("p".into()));
        f.set_terminator(join, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(phi))) }, None, ctx.void_type());

        let mut ir_module = IrModule::new();
        ir_module.declare_function("f", vec![i64_ty], i64_ty);
        ir_module.functions[0] = f;

        let mm = select_module(&ctx, &ir_module);
        let mf = mm.function(mm.find_function("f").unwrap());
        assert_eq!(mf.pending_phis.len(), 1);
        assert_eq!(mf.pending_phis[0].incoming.len(), 2);
    }
}
