//! Per-block selection DAGs (spec §4.7, grounded on
//! `include/scatha/CodeGen/SelectionDAG.h`): a node per IR instruction in a
//! basic block, with data edges to the instructions defining its operands
//! (within the same block) and a "chain" edge ordering side-effecting
//! instructions relative to each other, so selection never reorders a
//! `Store`/`Call` past another one even though pure arithmetic nodes are
//! free to move.
//!
//! Node storage lives in a caller-owned [`Bump`] arena rather than the
//! heap: selection DAGs are transient, rebuilt once per block and thrown
//! away once that block's instructions have been emitted, which is exactly
//! the monotonic-arena-per-transient-graph shape the design notes call for
//! (§9 "Memory arenas for transient graphs").

use bumpalo::Bump;
use hashbrown::HashMap;
use scatha_ir::ids::BlockId;
use scatha_ir::ids::{InstId, LocalValue};
use scatha_ir::module::Function;
use smallvec::SmallVec;

#[derive(Debug, Clone)]
pub struct SelectionNode {
    pub inst: InstId,
    /// Defining instructions of this node's in-block operands.
    pub data_preds: SmallVec<[InstId; 4]>,
    /// The previous side-effecting instruction in the block, if any.
    pub chain_pred: Option<InstId>,
}

/// A selection DAG for one basic block, arena-allocated in `'a`.
/// Construction never reorders instructions — `order()` yields them in
/// their original program order — but the dependency edges it records are
/// what lets instruction selection safely fold a `GetElementPointer` into a
/// consuming `Load`/`Store` (the GEP's only data user) while still
/// respecting side-effect ordering.
pub struct SelectionDag<'a> {
    pub block: BlockId,
    nodes: &'a [SelectionNode],
    index: HashMap<InstId, usize>,
}

impl<'a> SelectionDag<'a> {
    /// Builds the DAG for `block`, handing its node list to `arena` for
    /// storage. Callers reset (or drop) the arena once they are done
    /// consuming the returned DAG — typically after lowering every
    /// instruction in the block to MIR.
    pub fn build_in(arena: &'a Bump, func: &Function, block: BlockId) -> Self {
        let mut built = Vec::new();
        let mut index = HashMap::new();
        let mut last_chain: Option<InstId> = None;
        for inst in func.insts_in(block) {
            let mut data_preds = SmallVec::new();
            for op in inst.operands() {
                if let scatha_ir::ids::Operand::Local(LocalValue::Inst(def)) = op {
                    if func.inst(def).block == block {
                        data_preds.push(def);
                    }
                }
            }
            let chain_pred = if inst.has_side_effects() { last_chain } else { None };
            index.insert(inst.id, built.len());
            built.push(SelectionNode { inst: inst.id, data_preds, chain_pred });
            if inst.has_side_effects() {
                last_chain = Some(inst.id);
            }
        }
        let len = built.len();
        let nodes = arena.alloc_slice_fill_iter(built);
        debug_assert_eq!(nodes.len(), len);
        Self { block, nodes, index }
    }

    pub fn node(&self, inst: InstId) -> &SelectionNode {
        &self.nodes[self.index[&inst]]
    }

    /// Instructions in this block's original program order — the order
    /// selection walks them in (spec §4.7's cases consume nodes "possibly
    /// folding" rather than rescheduling).
    pub fn order(&self) -> impl Iterator<Item = InstId> + '_ {
        self.nodes.iter().map(|n| n.inst)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatha_ir::context::Context;
    use scatha_ir::ids::{FunctionId, Operand};
    use scatha_ir::instruction::{ArithmeticOp, InstKind};
    use scatha_ir::module::Function as IrFunction;

    #[test]
    fn data_pred_links_add_to_its_defining_alloca_load() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = IrFunction::new(FunctionId::new(0), "f", vec![], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let alloca = f.append(entry, InstKind::Alloca { allocated_ty: i64_ty }, ctx.ptr_type(), None);
        let load = f.append(entry, InstKind::Load { ptr: Operand::Local(LocalValue::Inst(alloca)), loaded_ty: i64_ty }, i64_ty, None);
        let add = f.append(
            entry,
            InstKind::Arithmetic { op: ArithmeticOp::Add, lhs: Operand::Local(LocalValue::Inst(load)), rhs: Operand::Local(LocalValue::Inst(load)) },
            i64_ty,
            None,
        );
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(add))) }, None, ctx.void_type());

        let arena = Bump::new();
        let dag = SelectionDag::build_in(&arena, &f, entry);
        assert_eq!(dag.len(), 4);
        assert!(dag.node(add).data_preds.contains(&load));
        assert!(dag.node(load).chain_pred.is_none());
    }

    #[test]
    fn chain_orders_consecutive_stores() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = IrFunction::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let alloca = f.append(entry, InstKind::Alloca { allocated_ty: i64_ty }, ctx.ptr_type(), None);
        let s1 = f.append(entry, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(alloca)), value: Operand::Local(LocalValue::Param(0)) }, ctx.void_type(), None);
        let s2 = f.append(entry, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(alloca)), value: Operand::Local(LocalValue::Param(0)) }, ctx.void_type(), None);
        f.set_terminator(entry, InstKind::Return { value: None }, None, ctx.void_type());

        let arena = Bump::new();
        let dag = SelectionDag::build_in(&arena, &f, entry);
        assert_eq!(dag.node(s1).chain_pred, None);
        assert_eq!(dag.node(s2).chain_pred, Some(s1));
    }
}
