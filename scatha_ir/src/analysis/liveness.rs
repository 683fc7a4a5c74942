//! Path-sensitive liveness per spec §4.4: a DAG backward-dataflow pass
//! plus a loop-tree merge step so that values live across a whole loop
//! body stay live even along paths the plain backward walk alone might
//! under-approximate.

use crate::analysis::loop_nest::LoopForest;
use crate::ids::{BlockId, LocalValue};
use crate::instruction::InstKind;
use crate::module::Function;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct Liveness {
    pub live_in: HashMap<BlockId, HashSet<LocalValue>>,
    pub live_out: HashMap<BlockId, HashSet<LocalValue>>,
}

impl Liveness {
    pub fn compute(func: &Function, loop_forest: &LoopForest) -> Self {
        let blocks: Vec<BlockId> = func.block_order().to_vec();

        // def/use sets, with phi incoming values attributed to the
        // predecessor edge they actually flow along rather than the
        // block containing the phi.
        let mut def_set: HashMap<BlockId, HashSet<LocalValue>> = HashMap::new();
        let mut use_set: HashMap<BlockId, HashSet<LocalValue>> = HashMap::new();
        let mut phi_edge_use: HashMap<BlockId, HashSet<LocalValue>> = HashMap::new();

        for &b in &blocks {
            let defs = def_set.entry(b).or_default();
            for inst in func.insts_in(b) {
                defs.insert(LocalValue::Inst(inst.id));
            }
        }

        for &b in &blocks {
            let defs = def_set[&b].clone();
            let uses = use_set.entry(b).or_default();
            for inst in func.insts_in(b) {
                if let InstKind::Phi { incoming } = &inst.kind {
                    for (pred, operand) in incoming {
                        if let crate::ids::Operand::Local(lv) = operand {
                            phi_edge_use.entry(*pred).or_default().insert(*lv);
                        }
                    }
                    continue;
                }
                for op in inst.operands() {
                    if let crate::ids::Operand::Local(lv) = op {
                        if !defs.contains(&lv) {
                            uses.insert(lv);
                        }
                    }
                }
            }
        }

        let mut live_in: HashMap<BlockId, HashSet<LocalValue>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();
        let mut live_out: HashMap<BlockId, HashSet<LocalValue>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &b in blocks.iter().rev() {
                let mut out = HashSet::new();
                for &s in func.succs(b) {
                    out.extend(live_in[&s].iter().copied());
                }
                if let Some(extra) = phi_edge_use.get(&b) {
                    out.extend(extra.iter().copied());
                }
                let mut new_in = use_set[&b].clone();
                for v in &out {
                    if !def_set[&b].contains(v) {
                        new_in.insert(*v);
                    }
                }
                if new_in != live_in[&b] {
                    live_in.insert(b, new_in);
                    changed = true;
                }
                if out != live_out[&b] {
                    live_out.insert(b, out);
                    changed = true;
                }
            }
        }

        let mut liveness = Self { live_in, live_out };
        liveness.merge_loop_bodies(func, loop_forest);
        liveness
    }

    /// For each loop header, merges its live-in (minus its own phi defs)
    /// into every block in the loop body's live-in and live-out, so a
    /// value threaded through the loop header stays live across the
    /// whole body regardless of internal control flow (spec §4.4).
    fn merge_loop_bodies(&mut self, func: &Function, forest: &LoopForest) {
        fn visit(node: &crate::analysis::loop_nest::LoopNode, func: &Function, liveness: &mut Liveness) {
            let header_phis: HashSet<LocalValue> = func
                .insts_in(node.header)
                .filter(|i| i.is_phi())
                .map(|i| LocalValue::Inst(i.id))
                .collect();
            let header_live_in: HashSet<LocalValue> = liveness.live_in[&node.header].iter().filter(|v| !header_phis.contains(v)).copied().collect();
            for &body_block in &node.body {
                if body_block == node.header {
                    continue;
                }
                liveness.live_in.entry(body_block).or_default().extend(header_live_in.iter().copied());
                liveness.live_out.entry(body_block).or_default().extend(header_live_in.iter().copied());
            }
            for child in &node.children {
                visit(child, func, liveness);
            }
        }
        for node in &forest.top_level {
            visit(node, func, self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dominance::DominatorTree;
    use crate::context::Context;
    use crate::ids::{FunctionId, Operand};
    use crate::instruction::InstKind;
    use crate::module::Function;

    #[test]
    fn parameter_used_only_at_return_is_live_through_entry() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(crate::ids::LocalValue::Param(0))) }, None, ctx.void_type());
        let domtree = DominatorTree::compute(&f, entry);
        let forest = LoopForest::compute(&f, &domtree);
        let liveness = Liveness::compute(&f, &forest);
        assert!(liveness.live_in[&entry].contains(&crate::ids::LocalValue::Param(0)));
    }
}
