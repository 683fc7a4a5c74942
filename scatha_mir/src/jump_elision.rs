//! Block-layout jump elision (spec §4.7): once register allocation is done
//! and blocks are laid out into one linear stream, a `Jump` to the block
//! immediately following it in that layout is a no-op and is dropped.
//!
//! Layout is a greedy DFS from the entry block that always visits a
//! `Jump`'s target, or a `CondJump`'s `if_true` target, directly after its
//! source — the "fall through to the likely successor" heuristic the
//! reference assembler's block ordering relies on.

use crate::ids::MirBlockId;
use crate::instruction::MirInstKind;
use crate::module::Function;
use hashbrown::HashSet;

/// Recomputes `func`'s block order and drops every `Jump` whose target is
/// now the next block in that order. Returns whether anything changed.
pub fn run(func: &mut Function) -> bool {
    let order = layout_order(func);
    func.set_block_order(order);
    elide_redundant_jumps(func)
}

fn layout_order(func: &Function) -> Vec<MirBlockId> {
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(func.block_order().len());
    if let Some(entry) = func.entry_block() {
        let mut stack = vec![entry];
        while let Some(block) = stack.pop() {
            if !visited.insert(block) {
                continue;
            }
            order.push(block);
            if let Some(term) = func.block(block).terminator() {
                match &func.inst(term).kind {
                    MirInstKind::Jump { target } => stack.push(*target),
                    MirInstKind::CondJump { if_true, if_false, .. } => {
                        stack.push(*if_false);
                        stack.push(*if_true);
                    }
                    _ => {}
                }
            }
        }
    }
    for &block in func.block_order() {
        if visited.insert(block) {
            order.push(block);
        }
    }
    order
}

fn elide_redundant_jumps(func: &mut Function) -> bool {
    let mut changed = false;
    let order = func.block_order().to_vec();
    for window in order.windows(2) {
        let (block, next) = (window[0], window[1]);
        if let Some(term) = func.block(block).terminator() {
            if let MirInstKind::Jump { target } = func.inst(term).kind {
                if target == next {
                    func.remove(term);
                    changed = true;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MirFunctionId;

    #[test]
    fn jump_to_the_next_block_in_layout_is_dropped() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let next = f.new_block(Some("next".into()));
        f.set_terminator(entry, MirInstKind::Jump { target: next });
        f.set_terminator(next, MirInstKind::Return);

        let changed = run(&mut f);
        assert!(changed);
        assert!(f.block(entry).terminator().is_none());
        assert_eq!(f.block_order(), &[entry, next]);
    }

    #[test]
    fn cond_jump_true_target_is_placed_immediately_after_its_source() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let on_true = f.new_block(Some("on_true".into()));
        let on_false = f.new_block(Some("on_false".into()));
        f.set_terminator(entry, MirInstKind::CondJump { cond: crate::operand::MirOperand::Imm(1), if_true: on_true, if_false: on_false });
        f.set_terminator(on_true, MirInstKind::Return);
        f.set_terminator(on_false, MirInstKind::Return);

        run(&mut f);
        assert_eq!(f.block_order(), &[entry, on_true, on_false]);
    }

    #[test]
    fn jump_to_a_non_adjacent_block_survives() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let entry = f.new_block(Some("entry".into()));
        let a = f.new_block(Some("a".into()));
        let b = f.new_block(Some("b".into()));
        f.set_terminator(entry, MirInstKind::CondJump { cond: crate::operand::MirOperand::Imm(1), if_true: a, if_false: b });
        f.set_terminator(a, MirInstKind::Jump { target: b });
        f.set_terminator(b, MirInstKind::Jump { target: a });

        run(&mut f);
        assert_eq!(f.block_order(), &[entry, a, b]);
        assert!(f.block(a).terminator().is_none(), "a's jump to b is adjacent in layout and gets elided");
        assert!(f.block(b).terminator().is_some(), "b's jump back to a is not adjacent and must survive");
    }
}
