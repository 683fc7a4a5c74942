//! Dead instruction elimination: repeatedly removes instructions with no
//! side effects and no remaining users, to a fixed point (spec §4.5).

use crate::context::Context;
use crate::ids::{InstId, LocalValue};
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};

pub struct Dce;

impl FunctionPass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Simplification
    }

    fn run(&self, _ctx: &mut Context, func: &mut Function) -> bool {
        let mut changed_ever = false;
        loop {
            let dead: Vec<InstId> = func
                .all_insts()
                .filter(|i| !i.has_side_effects() && !func.has_users(LocalValue::Inst(i.id)))
                .map(|i| i.id)
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                func.remove(id);
            }
            changed_ever = true;
        }
        changed_ever
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ids::{FunctionId, LocalValue, Operand};
    use crate::instruction::{ArithmeticOp, InstKind};

    #[test]
    fn unused_pure_instruction_is_removed() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let p = Operand::Local(LocalValue::Param(0));
        f.append(entry, InstKind::Arithmetic { op: ArithmeticOp::Add, lhs: p, rhs: p }, i64_ty, Some("dead".into()));
        f.set_terminator(entry, InstKind::Return { value: Some(p) }, None, ctx.void_type());

        let changed = Dce.run(&mut ctx, &mut f);
        assert!(changed);
        assert_eq!(f.insts_in(entry).count(), 1, "only the return should remain");
    }

    #[test]
    fn store_is_never_removed_even_with_no_users() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let ptr_ty = ctx.ptr_type();
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let slot = f.append(entry, InstKind::Alloca { allocated_ty: i64_ty }, ptr_ty, None);
        f.append(entry, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(slot)), value: Operand::Local(LocalValue::Param(0)) }, ctx.void_type(), None);
        f.set_terminator(entry, InstKind::Return { value: None }, None, ctx.void_type());

        let changed = Dce.run(&mut ctx, &mut f);
        assert!(!changed);
        assert!(f.insts_in(entry).any(|i| matches!(i.kind, InstKind::Store { .. })));
    }
}
