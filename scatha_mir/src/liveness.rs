//! MIR register liveness (spec §4.7, feeding interference graph
//! construction): standard iterative backward dataflow over def/use sets
//! per block. Unlike `scatha_ir::analysis::liveness`, there is no phi
//! special-case here — `ssa_destruction::destroy` has already turned every
//! phi into an ordinary `copy` before this runs, so every register read is
//! an in-block or cross-edge "use" in the usual sense.

use crate::ids::MirBlockId;
use crate::module::Function;
use crate::register::Register;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct Liveness {
    pub live_in: HashMap<MirBlockId, HashSet<Register>>,
    pub live_out: HashMap<MirBlockId, HashSet<Register>>,
}

impl Liveness {
    pub fn compute(func: &Function) -> Self {
        let blocks: Vec<MirBlockId> = func.block_order().to_vec();

        let mut def_set: HashMap<MirBlockId, HashSet<Register>> = HashMap::new();
        let mut use_set: HashMap<MirBlockId, HashSet<Register>> = HashMap::new();

        for &b in &blocks {
            let mut defs = HashSet::new();
            let mut uses = HashSet::new();
            for inst in func.insts_in(b) {
                for reg in inst.used_registers() {
                    if !defs.contains(&reg) {
                        uses.insert(reg);
                    }
                }
                if let Some(d) = inst.dest {
                    defs.insert(d);
                }
            }
            def_set.insert(b, defs);
            use_set.insert(b, uses);
        }

        let mut live_in: HashMap<MirBlockId, HashSet<Register>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();
        let mut live_out: HashMap<MirBlockId, HashSet<Register>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &b in blocks.iter().rev() {
                let mut out = HashSet::new();
                for &s in func.succs(b) {
                    out.extend(live_in[&s].iter().copied());
                }
                let mut new_in = use_set[&b].clone();
                for r in &out {
                    if !def_set[&b].contains(r) {
                        new_in.insert(*r);
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

        Self { live_in, live_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MirFunctionId;
    use crate::instruction::MirInstKind;
    use crate::operand::MirOperand;

    #[test]
    fn value_defined_in_entry_and_used_after_jump_is_live_out() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let next = f.new_block(Some("next".into()));
        let r = Register::Ssa(crate::ids::VRegId::new(0));
        f.append(entry, MirInstKind::Copy { src: MirOperand::Imm(1) }, Some(r), 8);
        f.set_terminator(entry, MirInstKind::Jump { target: next });
        f.append(next, MirInstKind::Copy { src: MirOperand::Reg(r) }, Some(Register::Ssa(crate::ids::VRegId::new(1))), 8);
        f.set_terminator(next, MirInstKind::Return);

        let liveness = Liveness::compute(&f);
        assert!(liveness.live_out[&entry].contains(&r));
        assert!(liveness.live_in[&next].contains(&r));
    }
}
