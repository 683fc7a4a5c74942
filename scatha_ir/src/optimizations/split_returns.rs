//! The inverse of `unify-returns` (spec §4.5): sinks a shared return block's
//! `return` back into each predecessor that reaches it by an unconditional
//! jump, duplicating a feeding phi's per-predecessor value where present.

use crate::context::Context;
use crate::ids::{BlockId, LocalValue, Operand};
use crate::instruction::InstKind;
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};

pub struct SplitReturns;

impl FunctionPass for SplitReturns {
    fn name(&self) -> &'static str {
        "split-returns"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Canonicalization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let void_ty = ctx.void_type();
        let candidates: Vec<BlockId> = func
            .block_order()
            .iter()
            .copied()
            .filter(|&b| matches!(func.inst(func.block(b).terminator().unwrap()).kind, InstKind::Return { .. }))
            .collect();

        let mut changed = false;
        for ret_block in candidates {
            let unconditional_preds: Vec<BlockId> = func
                .preds(ret_block)
                .iter()
                .copied()
                .filter(|&p| matches!(func.inst(func.block(p).terminator().unwrap()).kind, InstKind::Goto { target } if target == ret_block))
                .collect();
            if unconditional_preds.is_empty() {
                continue;
            }

            let term = func.block(ret_block).terminator().unwrap();
            let InstKind::Return { value } = func.inst(term).kind else { unreachable!() };
            let phi_incoming = value.and_then(|v| match v {
                Operand::Local(LocalValue::Inst(id)) if func.inst(id).block == ret_block => match &func.inst(id).kind {
                    InstKind::Phi { incoming } => Some(incoming.clone()),
                    _ => None,
                },
                _ => None,
            });

            for pred in &unconditional_preds {
                let per_pred_value = match &phi_incoming {
                    Some(incoming) => incoming.iter().find(|(b, _)| b == pred).map(|(_, v)| *v),
                    None => value,
                };
                func.set_terminator(*pred, InstKind::Return { value: per_pred_value }, None, void_ty);
                changed = true;
            }

            if func.preds(ret_block).is_empty() {
                func.delete_block(ret_block);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FunctionId;

    #[test]
    fn shared_return_sinks_into_unconditional_predecessors() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let then_b = f.new_block(Some("then".into()));
        let els = f.new_block(Some("els".into()));
        let exit = f.new_block(Some("exit".into()));
        let i1 = ctx.int_type(1);
        let cond = f.append(entry, InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Gt, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: then_b, if_false: els }, None, ctx.void_type());
        let one = ctx.const_int(i64_ty, 1);
        let two = ctx.const_int(i64_ty, 2);
        f.set_terminator(then_b, InstKind::Goto { target: exit }, None, ctx.void_type());
        f.set_terminator(els, InstKind::Goto { target: exit }, None, ctx.void_type());
        let phi = f.append(exit, InstKind::Phi { incoming: smallvec::smallvec![(then_b, Operand::Constant(one)), (els, Operand::Constant(two))] }, i64_ty, None);
        f.set_terminator(exit, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(phi))) }, None, ctx.void_type());

        let changed = SplitReturns.run(&mut ctx, &mut f);
        assert!(changed);
        assert!(matches!(f.inst(f.block(then_b).terminator().unwrap()).kind, InstKind::Return { value: Some(Operand::Constant(c)) } if c == one));
        assert!(matches!(f.inst(f.block(els).terminator().unwrap()).kind, InstKind::Return { value: Some(Operand::Constant(c)) } if c == two));
        assert!(!f.block_order().contains(&exit));
    }
}
