//! Dominance: dominator sets, the dominator tree, and dominance frontiers.
//! Computed by the textbook iterative fixed-point
//! algorithm rather than the faster Cooper/Harvey/Kennedy formulation, so
//! that `idom` is provably derivable from (and testable against) the naive
//! `Dom`-set definition directly.

use crate::ids::BlockId;
use crate::module::Function;
use hashbrown::{HashMap, HashSet};

fn reverse_postorder(func: &Function, entry: BlockId) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, false)];
    while let Some((block, expanded)) = stack.pop() {
        if expanded {
            postorder.push(block);
            continue;
        }
        if !visited.insert(block) {
            continue;
        }
        stack.push((block, true));
        for &succ in func.succs(block) {
            if !visited.contains(&succ) {
                stack.push((succ, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

/// The full dominator set of every block, computed by the fixed-point
/// definition of spec §4.4: `Dom(entry) = {entry}`,
/// `Dom(b) = {b} ∪ ⋂ Dom(p)` over predecessors `p`, to a fixed point in
/// reverse-postorder.
pub fn dominator_sets(func: &Function, entry: BlockId) -> HashMap<BlockId, HashSet<BlockId>> {
    let rpo = reverse_postorder(func, entry);
    let all_blocks: HashSet<BlockId> = func.block_order().iter().copied().collect();
    let mut dom: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &b in func.block_order() {
        if b == entry {
            let mut s = HashSet::new();
            s.insert(entry);
            dom.insert(b, s);
        } else {
            dom.insert(b, all_blocks.clone());
        }
    }
    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            if b == entry {
                continue;
            }
            let preds = func.preds(b);
            let mut new_set: Option<HashSet<BlockId>> = None;
            for &p in preds {
                let pd = &dom[&p];
                new_set = Some(match new_set {
                    None => pd.clone(),
                    Some(acc) => acc.intersection(pd).copied().collect(),
                });
            }
            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(b);
            if &new_set != dom.get(&b).unwrap() {
                dom.insert(b, new_set);
                changed = true;
            }
        }
    }
    dom
}

/// The dominator tree: `idom(b)` is the unique element of `Dom(b)\{b}`
/// with the maximum dominator-set size, which (in a consistent dominator
/// tree) is exactly the element of maximum tree depth. `idom(entry)` is
/// undefined.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    pub entry: BlockId,
    idom: HashMap<BlockId, BlockId>,
    children: HashMap<BlockId, Vec<BlockId>>,
    dom_sets: HashMap<BlockId, HashSet<BlockId>>,
}

impl DominatorTree {
    pub fn compute(func: &Function, entry: BlockId) -> Self {
        let dom_sets = dominator_sets(func, entry);
        let mut idom = HashMap::new();
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in func.block_order() {
            if b == entry {
                continue;
            }
            let candidates = &dom_sets[&b];
            let chosen = candidates
                .iter()
                .filter(|&&x| x != b)
                .max_by_key(|&&x| dom_sets[&x].len())
                .copied();
            if let Some(parent) = chosen {
                idom.insert(b, parent);
                children.entry(parent).or_default().push(b);
            }
        }
        Self { entry, idom, children, dom_sets }
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dom_sets.get(&b).is_some_and(|set| set.contains(&a))
    }

    pub fn dom_set(&self, block: BlockId) -> &HashSet<BlockId> {
        &self.dom_sets[&block]
    }

    /// Pre-order walk of the dominator tree starting at the entry, the
    /// traversal `mem2reg`'s renaming pass uses.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(b) = stack.pop() {
            out.push(b);
            let mut kids = self.children(b).to_vec();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Dominance frontier of every block: `DF(b) = {y : ∃ p ∈ preds(y),
    /// b dominates p ∧ b ≠ idom(y)}`, computed by the standard bottom-up
    /// domtree walk (spec §4.4).
    pub fn dominance_frontiers(&self, func: &Function) -> HashMap<BlockId, HashSet<BlockId>> {
        let mut df: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
        for &b in func.block_order() {
            df.entry(b).or_default();
        }
        for &b in func.block_order() {
            let preds = func.preds(b);
            if preds.len() < 2 {
                continue;
            }
            for &p in preds {
                let mut runner = p;
                while Some(runner) != self.idom(b) {
                    df.entry(runner).or_default().insert(b);
                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        df
    }
}

/// Whether `a` dominates `n` by the path definition of spec §4.4 directly
/// (every path from `entry` to `n` passes through `a`), computed by
/// reachability with `a` masked out rather than the fixed-point `Dom`-set
/// recurrence `dominator_sets` uses. Used only to cross-check that
/// recurrence in tests; real callers want `DominatorTree::dominates`.
#[cfg(test)]
fn dominates_by_reachability(
    succs: &hashbrown::HashMap<BlockId, Vec<BlockId>>,
    entry: BlockId,
    a: BlockId,
    n: BlockId,
) -> bool {
    if a == n {
        return true;
    }
    let mut seen = HashSet::new();
    let mut stack = vec![entry];
    while let Some(b) = stack.pop() {
        if b == a || !seen.insert(b) {
            continue;
        }
        if b == n {
            return false;
        }
        if let Some(next) = succs.get(&b) {
            stack.extend(next.iter().copied());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ids::{FunctionId, LocalValue, Operand};
    use crate::instruction::InstKind;
    use crate::module::Function;
    use proptest::prelude::*;

    /// entry -> {then, els} -> merge
    fn diamond(ctx: &mut Context) -> Function {
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let then_b = f.new_block(Some("then".into()));
        let els = f.new_block(Some("els".into()));
        let merge = f.new_block(Some("merge".into()));
        let i1 = ctx.int_type(1);
        let cond = f.append(entry, InstKind::Compare { mode: crate::instruction::CompareMode::Signed, op: crate::instruction::CompareOp::Gt, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i1, None);
        f.set_terminator(entry, InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: then_b, if_false: els }, None, ctx.void_type());
        f.set_terminator(then_b, InstKind::Goto { target: merge }, None, ctx.void_type());
        f.set_terminator(els, InstKind::Goto { target: merge }, None, ctx.void_type());
        f.set_terminator(merge, InstKind::Return { value: Some(Operand::Local(LocalValue::Param(0))) }, None, ctx.void_type());
        f
    }

    #[test]
    fn idom_of_merge_is_entry_in_diamond_cfg() {
        let mut ctx = Context::new();
        let f = diamond(&mut ctx);
        let entry = f.entry_block().unwrap();
        let tree = DominatorTree::compute(&f, entry);
        let merge = f.block_order()[3];
        assert_eq!(tree.idom(merge), Some(entry));
    }

    #[test]
    fn entry_dominates_every_block() {
        let mut ctx = Context::new();
        let f = diamond(&mut ctx);
        let entry = f.entry_block().unwrap();
        let tree = DominatorTree::compute(&f, entry);
        for &b in f.block_order() {
            assert!(tree.dominates(entry, b));
        }
    }

    #[test]
    fn dominance_frontier_of_branches_is_merge_block() {
        let mut ctx = Context::new();
        let f = diamond(&mut ctx);
        let entry = f.entry_block().unwrap();
        let tree = DominatorTree::compute(&f, entry);
        let merge = f.block_order()[3];
        let then_b = f.block_order()[1];
        let df = tree.dominance_frontiers(&f);
        assert!(df[&then_b].contains(&merge));
    }

    /// Builds a single-entry CFG (block 0 is the entry) from a successor
    /// list: `succs[i]` names block 0's targets by index, truncated to the
    /// first two entries (a block has at most one `Goto` or `Branch` edge
    /// pair). Dangling terminators aren't possible here: every block gets
    /// exactly the terminator its successor count calls for.
    fn build_cfg(ctx: &mut Context, succs: &[Vec<usize>]) -> (Function, Vec<BlockId>) {
        let i64_ty = ctx.int_type(64);
        let i1 = ctx.int_type(1);
        let void = ctx.void_type();
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let ids: Vec<BlockId> = (0..succs.len()).map(|i| f.new_block(Some(format!("b{i}")))).collect();
        for (i, targets) in succs.iter().enumerate() {
            let block = ids[i];
            match targets.len() {
                0 => {
                    f.set_terminator(block, InstKind::Return { value: Some(Operand::Local(LocalValue::Param(0))) }, None, void);
                }
                1 => {
                    f.set_terminator(block, InstKind::Goto { target: ids[targets[0]] }, None, void);
                }
                _ => {
                    let cond = f.append(
                        block,
                        InstKind::Compare {
                            mode: crate::instruction::CompareMode::Signed,
                            op: crate::instruction::CompareOp::Gt,
                            lhs: Operand::Local(LocalValue::Param(0)),
                            rhs: Operand::Local(LocalValue::Param(0)),
                        },
                        i1,
                        None,
                    );
                    f.set_terminator(
                        block,
                        InstKind::Branch { cond: Operand::Local(LocalValue::Inst(cond)), if_true: ids[targets[0]], if_false: ids[targets[1]] },
                        None,
                        void,
                    );
                }
            }
        }
        (f, ids)
    }

    proptest! {
        /// For any random single-entry CFG, `DominatorTree::dominates` must
        /// agree, for every pair of blocks, with the direct path definition
        /// of dominance (every path from entry passes through the
        /// dominator), checked against an independent reachability-based
        /// oracle rather than re-deriving `Dom` the same way
        /// `dominator_sets` does.
        #[test]
        fn dominates_matches_path_reachability_oracle(
            succs in prop::collection::vec(prop::collection::vec(0usize..6, 0..=2), 2..6)
        ) {
            let n = succs.len();
            let succs: Vec<Vec<usize>> = succs.into_iter().map(|v| v.into_iter().filter(|&t| t < n).collect()).collect();
            let mut ctx = Context::new();
            let (f, ids) = build_cfg(&mut ctx, &succs);
            let entry = ids[0];
            let tree = DominatorTree::compute(&f, entry);

            let mut succ_map: hashbrown::HashMap<BlockId, Vec<BlockId>> = hashbrown::HashMap::new();
            for (i, targets) in succs.iter().enumerate() {
                succ_map.insert(ids[i], targets.iter().map(|&t| ids[t]).collect());
            }

            // Blocks with no path from entry have an empty, vacuously-true
            // path set under the direct definition, but `Dom(b) = {b}` under
            // the fixed-point recurrence — the two conventions only agree on
            // blocks actually reachable from entry, which is all a pass ever
            // queries `idom`/`dominates` for.
            let mut reachable = HashSet::new();
            let mut stack = vec![entry];
            while let Some(b) = stack.pop() {
                if reachable.insert(b) {
                    if let Some(next) = succ_map.get(&b) {
                        stack.extend(next.iter().copied());
                    }
                }
            }

            for &a in &ids {
                for &b in &ids {
                    if !reachable.contains(&b) {
                        continue;
                    }
                    let expected = dominates_by_reachability(&succ_map, entry, a, b);
                    let actual = tree.dominates(a, b);
                    prop_assert_eq!(expected, actual, "dominates({:?}, {:?})", a, b);
                }
            }
        }
    }
}
