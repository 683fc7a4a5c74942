//! Introduces a single exit block with a phi of return values when a
//! function has more than one `return` (spec §4.5 `unify-returns`).

use crate::context::Context;
use crate::ids::{BlockId, InstId, LocalValue, Operand};
use crate::instruction::InstKind;
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};
use smallvec::SmallVec;

pub struct UnifyReturns;

impl FunctionPass for UnifyReturns {
    fn name(&self) -> &'static str {
        "unify-returns"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Canonicalization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let returns: Vec<(BlockId, InstId, Option<Operand>)> = func
            .block_order()
            .iter()
            .filter_map(|&b| {
                let term = func.block(b).terminator()?;
                match &func.inst(term).kind {
                    InstKind::Return { value } => Some((b, term, *value)),
                    _ => None,
                }
            })
            .collect();
        if returns.len() <= 1 {
            return false;
        }

        let void_ty = ctx.void_type();
        let ret_ty = func.ret_ty;
        let exit = func.new_block(Some("exit".into()));
        let ret_value = if ret_ty == void_ty {
            None
        } else {
            let incoming: SmallVec<[(BlockId, Operand); 4]> = returns.iter().map(|&(b, _, v)| (b, v.expect("non-void return has a value"))).collect();
            let phi = func.append(exit, InstKind::Phi { incoming }, ret_ty, None);
            Some(Operand::Local(LocalValue::Inst(phi)))
        };

        for (b, _, _) in &returns {
            func.set_terminator(*b, InstKind::Goto { target: exit }, None, void_ty);
        }
        func.set_terminator(exit, InstKind::Return { value: ret_value }, None, void_ty);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FunctionId, Operand};
    use crate::instruction::CompareMode;

    #[test]
    fn two_returns_merge_into_one_exit_block_with_phi() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let i1 = ctx.int_type(1);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let then_b = f.new_block(Some("then".into()));
        let els = f.new_block(Some("els".into()));
        let cond = f.append(entry, InstKind::Compare { mode: CompareMode::Signed, op: crate::instruction::CompareOp::Gt, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: then_b, if_false: els }, None, ctx.void_type());
        let one = ctx.const_int(i64_ty, 1);
        f.set_terminator(then_b, InstKind::Return { value: Some(Operand::Constant(one)) }, None, ctx.void_type());
        let two = ctx.const_int(i64_ty, 2);
        f.set_terminator(els, InstKind::Return { value: Some(Operand::Constant(two)) }, None, ctx.void_type());

        let changed = UnifyReturns.run(&mut ctx, &mut f);
        assert!(changed);
        let return_blocks = f.block_order().iter().filter(|&&b| matches!(f.inst(f.block(b).terminator().unwrap()).kind, InstKind::Return { .. })).count();
        assert_eq!(return_blocks, 1);
        assert!(f.setup_invariants().is_ok());
    }
}
