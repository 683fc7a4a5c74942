//! Copy coalescing (spec §4.7): eliminates a `copy d <- s` once `d` and
//! `s` can safely be treated as one storage location.
//!
//! This runs in two passes either side of register allocation rather than
//! a single post-coloring sweep, because a *virtual* register merge
//! changes what the interference graph
//! looks like (fewer, longer live ranges), while a merge discovered only
//! after coloring can no longer change anyone's color. `codegen::lower_module`
//! runs [`coalesce_virtual`] before allocation (so the colorer never even
//! sees the eliminated copies) and [`sweep_trivial_copies`] after (spec's
//! own "after coloring a first pass sweeps copy ... instructions", for the
//! copies coloring left redundant by accident).

use crate::interference::InterferenceGraph;
use crate::liveness::Liveness;
use crate::module::Function;
use crate::operand::MirOperand;
use crate::register::Register;

/// A `copy d <- s` whose registers are both still virtual and whose live
/// ranges never interfere is merged by renaming every use of `d` to `s`
/// and deleting the copy (spec: "disjoint live ranges ... can be merged by
/// replacing all uses of one with the other and deleting the copy").
/// Neither side may be pinned — a pinned (calling-convention) register
/// cannot be renamed away from its forced slot.
pub fn coalesce_virtual(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let liveness = Liveness::compute(func);
        let graph = InterferenceGraph::build(func, &liveness);
        let candidate = func.all_insts().find_map(|inst| {
            let MirOperand::Reg(s) = (match &inst.kind {
                crate::instruction::MirInstKind::Copy { src } => *src,
                _ => return None,
            }) else {
                return None;
            };
            let d = inst.dest?;
            if !d.is_virtual() || !s.is_virtual() || d == s {
                return None;
            }
            if graph.neighbors(d).any(|n| n == s) {
                return None;
            }
            Some((inst.id, d, s))
        });
        let Some((copy_id, d, s)) = candidate else { break };
        rename_register(func, d, s);
        func.remove(copy_id);
        changed = true;
    }
    changed
}

fn rename_register(func: &mut Function, from: Register, to: Register) {
    let ids: Vec<_> = func.all_insts().map(|i| i.id).collect();
    for id in ids {
        let inst = func.inst_mut(id);
        if inst.dest == Some(from) {
            inst.dest = Some(to);
        }
        inst.kind.replace_used_register(from, to);
    }
}

/// Post-allocation sweep (spec §4.7): drops a `copy d <- s` where coloring
/// assigned `d` and `s` the identical hardware register — trivially
/// redundant once both sides name the same physical location.
pub fn sweep_trivial_copies(func: &mut Function) -> bool {
    let dead: Vec<_> = func
        .all_insts()
        .filter_map(|inst| {
            let MirOperand::Reg(s) = (match &inst.kind {
                crate::instruction::MirInstKind::Copy { src } => *src,
                _ => return None,
            }) else {
                return None;
            };
            let d = inst.dest?;
            (d == s).then_some(inst.id)
        })
        .collect();
    let changed = !dead.is_empty();
    for id in dead {
        func.remove(id);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{MirFunctionId, VRegId};
    use crate::instruction::MirInstKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, true)]
    #[case(3, 3, true)]
    #[case(1, 2, false)]
    fn sweep_trivial_copies_only_drops_same_register_copies(#[case] dst: u32, #[case] src: u32, #[case] expect_swept: bool) {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let d = Register::Hardware(crate::register::HwReg(dst));
        let s = Register::Hardware(crate::register::HwReg(src));
        f.append(entry, MirInstKind::Copy { src: MirOperand::Reg(s) }, Some(d), 8);
        f.set_terminator(entry, MirInstKind::Return);

        let changed = sweep_trivial_copies(&mut f);
        assert_eq!(changed, expect_swept);
        let remaining_copies = f.all_insts().filter(|i| matches!(i.kind, MirInstKind::Copy { .. })).count();
        assert_eq!(remaining_copies, if expect_swept { 0 } else { 1 });
    }

    #[test]
    fn non_interfering_copy_is_merged_away() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let s = Register::Ssa(VRegId::new(0));
        let d = Register::Ssa(VRegId::new(1));
        f.append(entry, MirInstKind::Copy { src: MirOperand::Imm(1) }, Some(s), 8);
        f.append(entry, MirInstKind::Copy { src: MirOperand::Reg(s) }, Some(d), 8);
        f.append(entry, MirInstKind::Unary { op: crate::instruction::UnaryOp::Neg, operand: MirOperand::Reg(d) }, Some(Register::Ssa(VRegId::new(2))), 8);
        f.set_terminator(entry, MirInstKind::Return);

        let changed = coalesce_virtual(&mut f);
        assert!(changed);
        assert_eq!(f.insts_in(entry).count(), 2, "the copy from s into d should be gone");
        assert!(f.all_insts().all(|i| !matches!(i.kind, MirInstKind::Copy { .. }) || i.dest == Some(s)));
    }

    #[test]
    fn identical_hardware_registers_post_color_are_swept() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let r = Register::Hardware(crate::register::HwReg(0));
        f.append(entry, MirInstKind::Copy { src: MirOperand::Reg(r) }, Some(r), 8);
        f.set_terminator(entry, MirInstKind::Return);

        let changed = sweep_trivial_copies(&mut f);
        assert!(changed);
        assert_eq!(f.insts_in(entry).count(), 1, "only the return should remain");
    }
}
