//! CFG simplification: folds a `branch` whose arms agree into a `goto`,
//! threads jumps through empty forwarding blocks, and deletes blocks with
//! no predecessor (spec §4.5). Blocks with phis are left alone — retargeting
//! through them would require rewriting phi incoming pairs, which `gvn`'s
//! and `mem2reg`'s renaming already keep consistent elsewhere.

use crate::context::Context;
use crate::ids::BlockId;
use crate::instruction::InstKind;
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};

pub struct SimplifyCfg;

impl FunctionPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Canonicalization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let mut changed = false;
        changed |= fold_degenerate_branches(ctx, func);
        changed |= thread_empty_blocks(func);
        changed |= delete_unreachable_blocks(func);
        changed
    }
}

fn fold_degenerate_branches(ctx: &mut Context, func: &mut Function) -> bool {
    let mut changed = false;
    let void_ty = ctx.void_type();
    for &block in func.block_order().to_vec().iter() {
        let Some(term) = func.block(block).terminator() else { continue };
        if let InstKind::Branch { if_true, if_false, .. } = func.inst(term).kind {
            if if_true == if_false {
                func.set_terminator(block, InstKind::Goto { target: if_true }, None, void_ty);
                changed = true;
            }
        }
    }
    changed
}

/// A block is a pure forwarding block if its only instruction is an
/// unconditional `goto` and it has no phis in it (trivially true, since a
/// phi plus a goto is two instructions).
fn is_forwarding_block(func: &Function, block: BlockId, entry: BlockId) -> Option<BlockId> {
    if block == entry {
        return None;
    }
    let insts = &func.block(block).insts;
    if insts.len() != 1 {
        return None;
    }
    match func.inst(insts[0]).kind {
        InstKind::Goto { target } if target != block => Some(target),
        _ => None,
    }
}

fn thread_empty_blocks(func: &mut Function) -> bool {
    let Some(entry) = func.entry_block() else { return false };
    let mut changed = false;
    let blocks = func.block_order().to_vec();
    for &forward in &blocks {
        let Some(target) = is_forwarding_block(func, forward, entry) else { continue };
        if !func.insts_in(target).next().map(|i| i.is_phi()).unwrap_or(false) {
            let preds = func.preds(forward).to_vec();
            for pred in preds {
                if pred == forward {
                    continue;
                }
                func.redirect_successor(pred, forward, target);
                changed = true;
            }
        }
    }
    changed
}

fn delete_unreachable_blocks(func: &mut Function) -> bool {
    let Some(entry) = func.entry_block() else { return false };
    let mut changed = false;
    loop {
        let dead: Vec<BlockId> = func.block_order().iter().copied().filter(|&b| b != entry && func.preds(b).is_empty()).collect();
        if dead.is_empty() {
            break;
        }
        for b in dead {
            func.delete_block(b);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ids::{FunctionId, LocalValue, Operand};

    #[test]
    fn branch_with_identical_arms_becomes_goto() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let i1 = ctx.int_type(1);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let target = f.new_block(Some("target".into()));
        let cond = f.append(entry, InstKind::Arithmetic { op: crate::instruction::ArithmeticOp::And, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: target, if_false: target }, None, ctx.void_type());
        f.set_terminator(target, InstKind::Return { value: Some(Operand::Local(LocalValue::Param(0))) }, None, ctx.void_type());

        let changed = SimplifyCfg.run(&mut ctx, &mut f);
        assert!(changed);
        let term = f.block(entry).terminator().unwrap();
        assert!(matches!(f.inst(term).kind, InstKind::Goto { .. }));
    }

    #[test]
    fn jump_through_empty_forwarding_block_is_threaded() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let forward = f.new_block(Some("forward".into()));
        let real_target = f.new_block(Some("target".into()));
        f.set_terminator(entry, InstKind::Goto { target: forward }, None, ctx.void_type());
        f.set_terminator(forward, InstKind::Goto { target: real_target }, None, ctx.void_type());
        f.set_terminator(real_target, InstKind::Return { value: Some(Operand::Local(LocalValue::Param(0))) }, None, ctx.void_type());

        SimplifyCfg.run(&mut ctx, &mut f);
        let term = f.block(entry).terminator().unwrap();
        assert!(matches!(f.inst(term).kind, InstKind::Goto { target } if target == real_target));
        assert!(!f.block_order().contains(&forward), "the now-unreachable forwarding block is deleted");
    }
}
