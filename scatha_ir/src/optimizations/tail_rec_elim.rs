//! Rewrites direct self-recursive tail calls as a jump back to a loop
//! header carrying the call's arguments through phis, turning recursion
//! into iteration (spec §4.5 `tail-rec-elim`). The original entry becomes a
//! preheader that feeds the phis with the function's actual arguments.

use crate::context::Context;
use crate::ids::{BlockId, InstId, LocalValue, Operand};
use crate::instruction::{Callee, InstKind};
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};
use smallvec::smallvec;

pub struct TailRecElim;

impl FunctionPass for TailRecElim {
    fn name(&self) -> &'static str {
        "tail-rec-elim"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Optimization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let Some(entry) = func.entry_block() else { return false };
        let tail_calls = find_tail_calls(func);
        if tail_calls.is_empty() {
            return false;
        }

        let void_ty = ctx.void_type();
        let header = func.new_block(Some("tailrec.header".into()));
        func.move_block_contents(entry, header);

        let n_params = func.param_types.len();
        let header_front = func.block(header).insts.first().copied();
        let mut phis: Vec<InstId> = Vec::with_capacity(n_params);
        for i in 0..n_params {
            let ty = func.param_type(i as u32);
            let phi = match header_front {
                Some(before) => func.insert_before(before, InstKind::Phi { incoming: smallvec![] }, ty, None),
                None => func.append(header, InstKind::Phi { incoming: smallvec![] }, ty, None),
            };
            phis.push(phi);
        }
        for (i, &phi) in phis.iter().enumerate() {
            func.replace_all_uses_with(LocalValue::Param(i as u32), Operand::Local(LocalValue::Inst(phi)));
        }

        func.set_terminator(entry, InstKind::Goto { target: header }, None, void_ty);
        for (i, &phi) in phis.iter().enumerate() {
            if let InstKind::Phi { incoming } = &mut func.inst_mut(phi).kind {
                incoming.push((entry, Operand::Local(LocalValue::Param(i as u32))));
            }
        }

        for (block, call_id, return_id, args) in tail_calls {
            func.remove(return_id);
            func.remove(call_id);
            for (i, &phi) in phis.iter().enumerate() {
                if let InstKind::Phi { incoming } = &mut func.inst_mut(phi).kind {
                    incoming.push((block, args[i]));
                }
            }
            func.set_terminator(block, InstKind::Goto { target: header }, None, void_ty);
        }
        true
    }
}

type TailCall = (BlockId, InstId, InstId, Vec<Operand>);

/// Finds `call self(...); return <call result>` (or, for a void function,
/// `call self(...); return` with the result unused) in every block.
fn find_tail_calls(func: &Function) -> Vec<TailCall> {
    let mut out = Vec::new();
    for &block in func.block_order() {
        let insts = &func.block(block).insts;
        let Some(&term_id) = insts.last() else { continue };
        let InstKind::Return { value } = func.inst(term_id).kind else { continue };
        let Some(&call_id) = insts.iter().rev().nth(1) else { continue };
        let call_kind = func.inst(call_id).kind.clone();
        let InstKind::Call { callee: Callee::Function(callee_id), args } = call_kind else { continue };
        if callee_id != func.id {
            continue;
        }
        let is_tail = match value {
            Some(Operand::Local(LocalValue::Inst(id))) if id == call_id => func.users_of(LocalValue::Inst(call_id)).count() == 1,
            None => !func.has_users(LocalValue::Inst(call_id)),
            _ => false,
        };
        if is_tail {
            out.push((block, call_id, term_id, args));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FunctionId;

    #[test]
    fn self_recursive_tail_call_becomes_a_backedge() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let i1 = ctx.int_type(1);
        let mut f = Function::new(FunctionId::new(0), "countdown", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let rec = f.new_block(Some("rec".into()));
        let base = f.new_block(Some("base".into()));

        let zero = ctx.const_int(i64_ty, 0);
        let cond = f.append(entry, InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Eq, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Constant(zero) }, i1, None);
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: base, if_false: rec }, None, ctx.void_type());

        f.set_terminator(base, InstKind::Return { value: Some(Operand::Constant(zero)) }, None, ctx.void_type());

        let one = ctx.const_int(i64_ty, 1);
        let dec = f.append(rec, InstKind::Arithmetic { op: crate::instruction::ArithmeticOp::Sub, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Constant(one) }, i64_ty, None);
        let call = f.append(rec, InstKind::Call { callee: Callee::Function(f.id), args: vec![Operand::Local(LocalValue::Inst(dec))] }, i64_ty, None);
        f.set_terminator(rec, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(call))) }, None, ctx.void_type());

        let changed = TailRecElim.run(&mut ctx, &mut f);
        assert!(changed);
        assert!(f.all_insts().all(|i| !matches!(i.kind, InstKind::Call { .. })), "the tail call is gone");
        assert!(f.setup_invariants().is_ok());
    }
}
