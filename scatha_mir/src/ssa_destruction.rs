//! SSA destruction (spec §4.7): every phi becomes a `copy` appended to the
//! end of each predecessor block, immediately before its terminator, moving
//! the incoming value into the phi's destination register on that edge.
//! `select::select_function` leaves every phi as a [`crate::module::PendingPhi`]
//! rather than lowering it in place, since (unlike every other MIR
//! instruction) a phi's "position" is really a set of positions — one per
//! incoming edge — that only exist once every predecessor block has already
//! been selected.

use crate::instruction::MirInstKind;
use crate::module::Module;

/// Destroys every pending phi in every function of `module`, in place.
pub fn destroy(module: &mut Module) {
    for func in &mut module.functions {
        let pending = std::mem::take(&mut func.pending_phis);
        for phi in pending {
            for (pred, value) in phi.incoming {
                func.append_before_terminator(pred, MirInstKind::Copy { src: value }, Some(phi.dest), 8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{MirFunctionId, VRegId};
    use crate::module::{Function, PendingPhi};
    use crate::operand::MirOperand;
    use crate::register::Register;

    #[test]
    fn destroy_inserts_a_copy_before_each_predecessor_terminator() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let a = f.new_block(Some("a".into()));
        let b = f.new_block(Some("b".into()));
        let join = f.new_block(Some("join".into()));
        f.set_terminator(a, MirInstKind::Jump { target: join });
        f.set_terminator(b, MirInstKind::Jump { target: join });
        let dest = Register::Ssa(VRegId::new(0));
        f.pending_phis.push(PendingPhi {
            block: join,
            dest,
            incoming: vec![(a, MirOperand::Imm(1)), (b, MirOperand::Imm(2))],
        });

        let mut module = Module::new();
        module.functions.push(f);
        destroy(&mut module);

        let f = &module.functions[0];
        assert!(f.pending_phis.is_empty());
        let a_insts: Vec<_> = f.insts_in(a).collect();
        assert_eq!(a_insts.len(), 2);
        assert!(matches!(a_insts[0].kind, MirInstKind::Copy { src: MirOperand::Imm(1) }));
        assert!(matches!(a_insts[1].kind, MirInstKind::Jump { .. }));
    }
}
