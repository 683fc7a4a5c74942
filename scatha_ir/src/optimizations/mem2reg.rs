//! Promotes stack-allocated scalars with only load/store users to SSA
//! registers, per spec §4.5: collect defining blocks, insert phis at the
//! iterated dominance frontier, rename by a pre-order domtree walk with a
//! per-alloca value stack, delete the alloca.

use crate::analysis::DominatorTree;
use crate::context::Context;
use crate::ids::{BlockId, InstId, LocalValue, Operand};
use crate::instruction::InstKind;
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};
use hashbrown::{HashMap, HashSet};

pub struct Mem2Reg;

impl FunctionPass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Optimization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let Some(entry) = func.entry_block() else { return false };
        let candidates = promotable_allocas(func, entry);
        if candidates.is_empty() {
            return false;
        }
        let domtree = DominatorTree::compute(func, entry);
        let df = domtree.dominance_frontiers(func);
        for alloca in candidates {
            promote_one(ctx, func, &domtree, &df, alloca);
        }
        true
    }
}

fn promotable_allocas(func: &Function, entry: BlockId) -> Vec<InstId> {
    func.insts_in(entry)
        .filter(|i| matches!(i.kind, InstKind::Alloca { .. }))
        .map(|i| i.id)
        .filter(|&id| is_promotable(func, id))
        .collect()
}

/// Only load/store of the exact alloca pointer, and never stored as a
/// *value* (which would let its address escape) is promotable. Allocas
/// whose address is taken by a GEP or passed to a call are left to `sroa`
/// or kept in memory.
fn is_promotable(func: &Function, alloca: InstId) -> bool {
    let self_ptr = Operand::Local(LocalValue::Inst(alloca));
    func.users_of(LocalValue::Inst(alloca)).all(|user| match &func.inst(user).kind {
        InstKind::Load { ptr, .. } => *ptr == self_ptr,
        InstKind::Store { ptr, value } => *ptr == self_ptr && *value != self_ptr,
        _ => false,
    })
}

fn promote_one(ctx: &mut Context, func: &mut Function, domtree: &DominatorTree, df: &HashMap<BlockId, HashSet<BlockId>>, alloca: InstId) {
    let allocated_ty = match &func.inst(alloca).kind {
        InstKind::Alloca { allocated_ty } => *allocated_ty,
        _ => unreachable!("candidate is always an alloca"),
    };

    let mut def_blocks: HashSet<BlockId> = HashSet::new();
    for user in func.users_of(LocalValue::Inst(alloca)).collect::<Vec<_>>() {
        if matches!(func.inst(user).kind, InstKind::Store { .. }) {
            def_blocks.insert(func.inst(user).block);
        }
    }

    let mut phi_blocks: HashSet<BlockId> = HashSet::new();
    let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
    while let Some(b) = worklist.pop() {
        if let Some(frontier) = df.get(&b) {
            for &y in frontier {
                if phi_blocks.insert(y) {
                    worklist.push(y);
                }
            }
        }
    }

    let mut phi_insts: HashMap<BlockId, InstId> = HashMap::new();
    for &b in &phi_blocks {
        if let Some(before) = func.block(b).insts.first().copied() {
            let id = func.insert_before(before, InstKind::Phi { incoming: Default::default() }, allocated_ty, None);
            phi_insts.insert(b, id);
        }
    }

    let undef = Operand::Constant(ctx.const_undef(allocated_ty));
    let mut stack = vec![undef];
    rename(func, domtree, alloca, &phi_insts, domtree.entry, &mut stack);

    func.remove(alloca);
}

fn rename(func: &mut Function, domtree: &DominatorTree, alloca: InstId, phi_insts: &HashMap<BlockId, InstId>, block: BlockId, stack: &mut Vec<Operand>) {
    let pushed_phi = if let Some(&phi_id) = phi_insts.get(&block) {
        stack.push(Operand::Local(LocalValue::Inst(phi_id)));
        true
    } else {
        false
    };

    let self_ptr = Operand::Local(LocalValue::Inst(alloca));
    let mut local_pushes = 0u32;
    let insts: Vec<InstId> = func.block(block).insts.clone();
    for inst_id in insts {
        match func.inst(inst_id).kind.clone() {
            InstKind::Load { ptr, .. } if ptr == self_ptr => {
                let current = *stack.last().unwrap();
                func.replace_all_uses_with(LocalValue::Inst(inst_id), current);
                func.remove(inst_id);
            }
            InstKind::Store { ptr, value } if ptr == self_ptr => {
                stack.push(value);
                local_pushes += 1;
                func.remove(inst_id);
            }
            _ => {}
        }
    }

    let succs: Vec<BlockId> = func.succs(block).to_vec();
    for succ in succs {
        if let Some(&phi_id) = phi_insts.get(&succ) {
            let current = *stack.last().unwrap();
            if let InstKind::Phi { incoming } = &mut func.inst_mut(phi_id).kind {
                incoming.push((block, current));
            }
        }
    }

    let children: Vec<BlockId> = domtree.children(block).to_vec();
    for child in children {
        rename(func, domtree, alloca, phi_insts, child, stack);
    }

    for _ in 0..local_pushes {
        stack.pop();
    }
    if pushed_phi {
        stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FunctionId;

    #[test]
    fn straight_line_alloca_promotes_to_direct_value() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let ptr_ty = ctx.ptr_type();
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let slot = f.append(entry, InstKind::Alloca { allocated_ty: i64_ty }, ptr_ty, Some("slot".into()));
        f.append(entry, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(slot)), value: Operand::Local(LocalValue::Param(0)) }, ctx.void_type(), None);
        let load = f.append(entry, InstKind::Load { ptr: Operand::Local(LocalValue::Inst(slot)), loaded_ty: i64_ty }, i64_ty, Some("v".into()));
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(load))) }, None, ctx.void_type());

        let changed = Mem2Reg.run(&mut ctx, &mut f);
        assert!(changed);
        let InstKind::Return { value } = &f.inst(f.block(entry).terminator().unwrap()).kind else { panic!() };
        assert_eq!(*value, Some(Operand::Local(LocalValue::Param(0))));
        assert!(f.insts_in(entry).all(|i| !matches!(i.kind, InstKind::Alloca { .. } | InstKind::Load { .. } | InstKind::Store { .. })));
    }

    #[test]
    fn diamond_merge_inserts_phi() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let ptr_ty = ctx.ptr_type();
        let i1 = ctx.int_type(1);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let then_b = f.new_block(Some("then".into()));
        let els = f.new_block(Some("els".into()));
        let merge = f.new_block(Some("merge".into()));

        let slot = f.append(entry, InstKind::Alloca { allocated_ty: i64_ty }, ptr_ty, Some("slot".into()));
        let cond = f.append(
            entry,
            InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Gt, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) },
            i1,
            None,
        );
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: then_b, if_false: els }, None, ctx.void_type());

        let one = ctx.const_int(i64_ty, 1);
        f.append(then_b, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(slot)), value: Operand::Constant(one) }, ctx.void_type(), None);
        f.set_terminator(then_b, InstKind::Goto { target: merge }, None, ctx.void_type());

        let two = ctx.const_int(i64_ty, 2);
        f.append(els, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(slot)), value: Operand::Constant(two) }, ctx.void_type(), None);
        f.set_terminator(els, InstKind::Goto { target: merge }, None, ctx.void_type());

        let load = f.append(merge, InstKind::Load { ptr: Operand::Local(LocalValue::Inst(slot)), loaded_ty: i64_ty }, i64_ty, Some("v".into()));
        f.set_terminator(merge, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(load))) }, None, ctx.void_type());

        Mem2Reg.run(&mut ctx, &mut f);
        let phi_count = f.insts_in(merge).filter(|i| i.is_phi()).count();
        assert_eq!(phi_count, 1);
        assert!(f.setup_invariants().is_ok());
    }
}
