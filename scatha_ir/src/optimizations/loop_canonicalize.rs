//! Inserts a preheader that is the sole external predecessor of each loop
//! header, rewriting incoming phi arguments accordingly (spec §4.5, and the
//! §8 invariant "every loop header has exactly one predecessor outside the
//! loop").

use crate::analysis::{DominatorTree, LoopForest};
use crate::analysis::loop_nest::LoopNode;
use crate::context::Context;
use crate::ids::{BlockId, LocalValue, Operand};
use crate::instruction::InstKind;
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};
use hashbrown::HashSet;
use smallvec::SmallVec;

pub struct LoopCanonicalize;

impl FunctionPass for LoopCanonicalize {
    fn name(&self) -> &'static str {
        "loop-canonicalize"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Canonicalization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let Some(entry) = func.entry_block() else { return false };
        let domtree = DominatorTree::compute(func, entry);
        let forest = LoopForest::compute(func, &domtree);
        let mut headers = Vec::new();
        collect_headers(&forest.top_level, &mut headers);

        let void_ty = ctx.void_type();
        let mut changed = false;
        for (header, body) in headers {
            let external_preds: Vec<BlockId> = func.preds(header).iter().copied().filter(|p| !body.contains(p)).collect();
            if external_preds.len() <= 1 {
                continue;
            }
            insert_preheader(func, header, &body, &external_preds, void_ty);
            changed = true;
        }
        changed
    }
}

fn collect_headers(nodes: &[LoopNode], out: &mut Vec<(BlockId, HashSet<BlockId>)>) {
    for node in nodes {
        out.push((node.header, node.body.clone()));
        collect_headers(&node.children, out);
    }
}

fn insert_preheader(func: &mut Function, header: BlockId, body: &HashSet<BlockId>, external_preds: &[BlockId], void_ty: crate::ids::TypeId) {
    let preheader = func.new_block(Some("preheader".into()));
    func.set_terminator(preheader, InstKind::Goto { target: header }, None, void_ty);

    let header_phis: Vec<crate::ids::InstId> = func.insts_in(header).filter(|i| i.is_phi()).map(|i| i.id).collect();
    for phi_id in header_phis {
        let InstKind::Phi { incoming } = func.inst(phi_id).kind.clone() else { unreachable!() };
        let (external, loop_internal): (SmallVec<[(BlockId, Operand); 4]>, SmallVec<[(BlockId, Operand); 4]>) = incoming.into_iter().partition(|(p, _)| !body.contains(p));
        let ty = func.inst(phi_id).ty;
        let ph_phi = func.append(preheader, InstKind::Phi { incoming: external }, ty, None);
        let mut new_incoming = loop_internal;
        new_incoming.push((preheader, Operand::Local(LocalValue::Inst(ph_phi))));
        func.inst_mut(phi_id).kind = InstKind::Phi { incoming: new_incoming };
    }

    for &pred in external_preds {
        func.redirect_successor(pred, header, preheader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FunctionId;

    /// Two external entries (e1, e2) into `header`, plus a back-edge from
    /// `body`, should collapse to a single preheader predecessor.
    #[test]
    fn header_with_two_external_preds_gets_a_preheader() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty, i64_ty], i64_ty);
        let real_entry = f.new_block(Some("start".into()));
        let e1 = f.new_block(Some("e1".into()));
        let e2 = f.new_block(Some("e2".into()));
        let header = f.new_block(Some("header".into()));
        let body = f.new_block(Some("body".into()));
        let exit = f.new_block(Some("exit".into()));
        let i1 = ctx.int_type(1);

        f.set_terminator(e1, InstKind::Goto { target: header }, None, ctx.void_type());
        let phi = f.append(header, InstKind::Phi { incoming: smallvec::smallvec![] }, i64_ty, None);
        let cond = f.append(header, InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Lt, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(header, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: body, if_false: exit }, None, ctx.void_type());
        f.set_terminator(body, InstKind::Goto { target: header }, None, ctx.void_type());
        f.set_terminator(exit, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(phi))) }, None, ctx.void_type());
        f.set_terminator(e2, InstKind::Goto { target: header }, None, ctx.void_type());
        if let InstKind::Phi { incoming } = &mut f.inst_mut(phi).kind {
            incoming.push((e1, Operand::Local(LocalValue::Param(0))));
            incoming.push((e2, Operand::Local(LocalValue::Param(1))));
            incoming.push((body, Operand::Local(LocalValue::Param(0))));
        }

        let dummy = f.append(real_entry, InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Eq, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(real_entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(dummy)), if_true: e1, if_false: e2 }, None, ctx.void_type());

        let changed = LoopCanonicalize.run(&mut ctx, &mut f);
        assert!(changed);
        assert_eq!(f.preds(header).len(), 2, "header now has exactly the back-edge and the preheader as predecessors");
        assert!(f.setup_invariants().is_ok());
    }
}
