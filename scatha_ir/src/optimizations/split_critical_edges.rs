//! Inserts an empty block on every critical edge — one whose source has
//! ≥2 successors and whose target has ≥2 predecessors — so later passes
//! (register allocation's copy insertion, `loop-canonicalize`) always have
//! a place to put edge-specific code (spec §4.5, invariant in §8).

use crate::context::Context;
use crate::ids::BlockId;
use crate::instruction::InstKind;
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};

pub struct SplitCriticalEdges;

impl FunctionPass for SplitCriticalEdges {
    fn name(&self) -> &'static str {
        "split-critical-edges"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Canonicalization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let void_ty = ctx.void_type();
        let critical_edges: Vec<(BlockId, BlockId)> = func
            .block_order()
            .iter()
            .filter(|&&b| func.succs(b).len() >= 2)
            .flat_map(|&b| func.succs(b).iter().map(move |&s| (b, s)).collect::<Vec<_>>())
            .filter(|&(_, target)| func.preds(target).len() >= 2)
            .collect();

        for (src, target) in &critical_edges {
            let split = func.new_block(Some("critedge".into()));
            func.set_terminator(split, InstKind::Goto { target: *target }, None, void_ty);
            func.redirect_successor(*src, *target, split);
        }
        !critical_edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FunctionId, LocalValue, Operand};

    #[test]
    fn critical_edge_gets_an_empty_splitter_block() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let i1 = ctx.int_type(1);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let a = f.new_block(Some("a".into()));
        let b = f.new_block(Some("b".into()));
        let merge = f.new_block(Some("merge".into()));
        let cond = f.append(entry, InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Gt, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: a, if_false: b }, None, ctx.void_type());
        // `a` itself branches again, so the edge a->merge is critical: a has
        // 2 successors, merge has 2 predecessors.
        f.set_terminator(a, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: merge, if_false: b }, None, ctx.void_type());
        f.set_terminator(b, InstKind::Goto { target: merge }, None, ctx.void_type());
        f.set_terminator(merge, InstKind::Return { value: Some(Operand::Local(LocalValue::Param(0))) }, None, ctx.void_type());

        let changed = SplitCriticalEdges.run(&mut ctx, &mut f);
        assert!(changed);
        assert!(!f.succs(a).contains(&merge), "the direct a->merge edge is gone, replaced by a->splitter->merge");
        assert!(f.preds(merge).iter().all(|&p| p != a), "merge's predecessor list no longer names a directly");
        assert!(f.setup_invariants().is_ok());
    }
}
