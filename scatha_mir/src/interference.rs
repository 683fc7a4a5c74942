//! Register-interference graph construction and greedy coloring (spec
//! §4.7), grounded on `original_source/lib/CodeGen/InterferenceGraph.cc`:
//! a backward liveness walk builds the graph (two virtual registers
//! interfere if one is live when the other is defined), then a
//! maximum-cardinality-search elimination order approximates the original's
//! lexicographic/chordality-driven coloring — nodes are greedily assigned
//! the lowest hardware register not already taken by a neighbor, in reverse
//! visiting order. Registers that run out of colors are reported as spills
//! rather than recursively rebuilt, left to a later spill-and-retry driver.

use crate::liveness::Liveness;
use crate::module::Function;
use crate::register::{HwReg, Register};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    adjacency: HashMap<Register, HashSet<Register>>,
}

impl InterferenceGraph {
    pub fn build(func: &Function, liveness: &Liveness) -> Self {
        let mut adjacency: HashMap<Register, HashSet<Register>> = HashMap::new();
        for &block in func.block_order() {
            let mut live: HashSet<Register> = liveness.live_out[&block].iter().copied().filter(|r| r.is_virtual()).collect();
            let insts: Vec<_> = func.insts_in(block).collect();
            for inst in insts.into_iter().rev() {
                if let Some(d) = inst.dest {
                    if d.is_virtual() {
                        adjacency.entry(d).or_default();
                        for &l in &live {
                            if l != d {
                                adjacency.entry(d).or_default().insert(l);
                                adjacency.entry(l).or_default().insert(d);
                            }
                        }
                        live.remove(&d);
                    }
                }
                for u in inst.used_registers() {
                    if u.is_virtual() {
                        live.insert(u);
                    }
                }
            }
        }
        Self { adjacency }
    }

    pub fn nodes(&self) -> impl Iterator<Item = Register> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbors(&self, r: Register) -> impl Iterator<Item = Register> + '_ {
        self.adjacency.get(&r).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn degree(&self, r: Register) -> usize {
        self.adjacency.get(&r).map_or(0, |s| s.len())
    }
}

fn maximum_cardinality_order(graph: &InterferenceGraph) -> Vec<Register> {
    let mut nodes: Vec<Register> = graph.nodes().collect();
    nodes.sort();
    let mut weight: HashMap<Register, u32> = nodes.iter().map(|&n| (n, 0)).collect();
    let mut remaining: HashSet<Register> = nodes.iter().copied().collect();
    let mut order = Vec::with_capacity(nodes.len());
    while !remaining.is_empty() {
        let mut best: Option<Register> = None;
        let mut best_weight = 0u32;
        for &n in &nodes {
            if !remaining.contains(&n) {
                continue;
            }
            let w = weight[&n];
            if best.is_none() || w > best_weight {
                best = Some(n);
                best_weight = w;
            }
        }
        let next = best.expect("remaining is non-empty");
        remaining.remove(&next);
        order.push(next);
        for nb in graph.neighbors(next) {
            if remaining.contains(&nb) {
                *weight.get_mut(&nb).expect("nb came from the node set") += 1;
            }
        }
    }
    order
}

#[derive(Debug, Clone, Default)]
pub struct Coloring {
    pub assignment: HashMap<Register, HwReg>,
    pub spilled: Vec<Register>,
}

/// Colors `graph`'s virtual registers with `num_registers` hardware slots.
/// `precolored` seeds registers the calling convention already pinned (spec
/// §4.7 "argument and return slots are pre-colored") — they keep their
/// forced color and still constrain their neighbors', but are never
/// revisited or spilled by the greedy pass itself.
pub fn color(graph: &InterferenceGraph, num_registers: u8, precolored: &HashMap<Register, HwReg>) -> Coloring {
    let order = maximum_cardinality_order(graph);
    let mut assignment: HashMap<Register, HwReg> = precolored.clone();
    let mut spilled = Vec::new();
    for &r in order.iter().rev() {
        if assignment.contains_key(&r) {
            continue;
        }
        let used: HashSet<u8> = graph.neighbors(r).filter_map(|n| assignment.get(&n).map(|h| h.0)).collect();
        match (0..num_registers).find(|c| !used.contains(c)) {
            Some(c) => {
                assignment.insert(r, HwReg(c));
            }
            None => spilled.push(r),
        }
    }
    Coloring { assignment, spilled }
}

/// Rewrites every register in `func` according to `coloring`, turning
/// virtual registers into hardware ones post-allocation.
pub fn apply(func: &mut Function, coloring: &Coloring) {
    let ids: Vec<crate::ids::MirInstId> = func.all_insts().map(|i| i.id).collect();
    for id in ids {
        let inst = func.inst_mut(id);
        if let Some(d) = inst.dest {
            if let Some(&hw) = coloring.assignment.get(&d) {
                inst.dest = Some(Register::Hardware(hw));
            }
        }
        for used in inst.used_registers() {
            if let Some(&hw) = coloring.assignment.get(&used) {
                inst.kind.replace_used_register(used, Register::Hardware(hw));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{MirFunctionId, VRegId};
    use crate::instruction::MirInstKind;
    use crate::operand::MirOperand;

    #[test]
    fn interfering_live_ranges_get_distinct_colors() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let a = Register::Ssa(VRegId::new(0));
        let b = Register::Ssa(VRegId::new(1));
        f.append(entry, MirInstKind::Copy { src: MirOperand::Imm(1) }, Some(a), 8);
        f.append(entry, MirInstKind::Copy { src: MirOperand::Imm(2) }, Some(b), 8);
        let sum = Register::Ssa(VRegId::new(2));
        f.append(entry, MirInstKind::Arithmetic { op: crate::instruction::ArithOp::Add, lhs: MirOperand::Reg(a), rhs: MirOperand::Reg(b) }, Some(sum), 8);
        f.set_terminator(entry, MirInstKind::Return);

        let liveness = Liveness::compute(&f);
        let graph = InterferenceGraph::build(&f, &liveness);
        assert!(graph.neighbors(a).any(|r| r == b));

        let coloring = color(&graph, 4, &HashMap::new());
        assert_ne!(coloring.assignment[&a], coloring.assignment[&b]);
        assert!(coloring.spilled.is_empty());
    }

    #[test]
    fn insufficient_registers_produce_spills_instead_of_panicking() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let regs: Vec<Register> = (0..4).map(|i| Register::Ssa(VRegId::new(i))).collect();
        for &r in &regs {
            f.append(entry, MirInstKind::Copy { src: MirOperand::Imm(1) }, Some(r), 8);
        }
        let mut args = smallvec::SmallVec::new();
        for &r in &regs {
            args.push(MirOperand::Reg(r));
        }
        f.append(entry, MirInstKind::Call { callee: crate::instruction::MirCallee::Foreign { slot: 0, index: 0 }, args }, None, 8);
        f.set_terminator(entry, MirInstKind::Return);

        let liveness = Liveness::compute(&f);
        let graph = InterferenceGraph::build(&f, &liveness);
        let coloring = color(&graph, 2, &HashMap::new());
        assert!(!coloring.spilled.is_empty());
    }

    /// Four registers simultaneously live (a clique in the interference
    /// graph) need exactly as many spills as the hardware register budget
    /// falls short, whatever that budget is.
    #[test_case::test_case(4 => 0; "enough registers for every live range")]
    #[test_case::test_case(3 => 1; "one short")]
    #[test_case::test_case(2 => 2; "two short")]
    #[test_case::test_case(1 => 3; "one register for four live ranges")]
    fn spill_count_tracks_register_shortfall(num_registers: u8) -> usize {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let regs: Vec<Register> = (0..4).map(|i| Register::Ssa(VRegId::new(i))).collect();
        for &r in &regs {
            f.append(entry, MirInstKind::Copy { src: MirOperand::Imm(1) }, Some(r), 8);
        }
        let mut args = smallvec::SmallVec::new();
        for &r in &regs {
            args.push(MirOperand::Reg(r));
        }
        f.append(entry, MirInstKind::Call { callee: crate::instruction::MirCallee::Foreign { slot: 0, index: 0 }, args }, None, 8);
        f.set_terminator(entry, MirInstKind::Return);

        let liveness = Liveness::compute(&f);
        let graph = InterferenceGraph::build(&f, &liveness);
        let coloring = color(&graph, num_registers, &HashMap::new());
        coloring.spilled.len()
    }
}
