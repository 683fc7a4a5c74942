//! MIR module: functions, basic blocks, and the register/stack-slot arenas
//! that back a function's instructions (spec §3 "MIR mirrors").

use crate::ids::{MirBlockId, MirFunctionId, MirInstId, StackSlotId, VRegId};
use crate::instruction::{Instruction, MirInstKind};
use crate::operand::MirOperand;
use crate::register::Register;
use hashbrown::HashMap;

/// A phi still awaiting SSA destruction (spec §4.7): its value is not yet
/// represented by any MIR instruction. `select::select_function` records
/// one of these per IR `Phi`; `ssa_destruction::destroy` consumes and
/// clears the list, turning each into a `Copy` appended to every
/// predecessor block.
#[derive(Debug, Clone)]
pub struct PendingPhi {
    pub block: MirBlockId,
    pub dest: Register,
    pub incoming: Vec<(MirBlockId, MirOperand)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    Scatha,
    C,
}

/// A stack slot reserved for an `Alloca` that survived selection (every
/// `Alloca` becomes one, per spec §4.6: aggregates over the register
/// threshold and dynamically-sized arrays live in memory end to end).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    pub id: StackSlotId,
    pub size: u64,
    pub align: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub name: Option<String>,
    pub insts: Vec<MirInstId>,
    pub preds: Vec<MirBlockId>,
    pub succs: Vec<MirBlockId>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<MirInstId> {
        self.insts.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: MirFunctionId,
    pub name: String,
    pub calling_convention: CallingConvention,
    pub foreign: Option<(u32, u32)>,
    block_order: Vec<MirBlockId>,
    blocks: Vec<BasicBlock>,
    insts: Vec<Instruction>,
    next_vreg: u32,
    stack_slots: Vec<StackSlot>,
    /// Virtual registers that back the function's incoming parameters, in
    /// calling-convention order — used to pre-color argument slots when
    /// building the interference graph (spec §4.7).
    pub param_registers: Vec<Register>,
    /// Virtual registers that back the function's return value(s), if any.
    pub return_registers: Vec<Register>,
    /// Phis not yet destroyed into copies; see [`PendingPhi`].
    pub pending_phis: Vec<PendingPhi>,
}

impl Function {
    pub fn new(id: MirFunctionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            calling_convention: CallingConvention::Scatha,
            foreign: None,
            block_order: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            next_vreg: 0,
            stack_slots: Vec::new(),
            param_registers: Vec::new(),
            return_registers: Vec::new(),
            pending_phis: Vec::new(),
        }
    }

    pub fn new_vreg(&mut self) -> VRegId {
        let id = VRegId::new(self.next_vreg);
        self.next_vreg += 1;
        id
    }

    pub fn vreg_count(&self) -> u32 {
        self.next_vreg
    }

    pub fn new_stack_slot(&mut self, size: u64, align: u64) -> StackSlotId {
        let id = StackSlotId::new(self.stack_slots.len() as u32);
        self.stack_slots.push(StackSlot { id, size, align });
        id
    }

    pub fn stack_slots(&self) -> &[StackSlot] {
        &self.stack_slots
    }

    /// Total stack frame size with each slot naturally aligned, in layout
    /// order (spec §4.6/§4.7 memory-form aggregates and dynamic arrays).
    pub fn frame_size(&self) -> u64 {
        let mut offset = 0u64;
        for slot in &self.stack_slots {
            offset = round_up(offset, slot.align.max(1));
            offset += slot.size;
        }
        offset
    }

    pub fn stack_slot_offset(&self, id: StackSlotId) -> u64 {
        let mut offset = 0u64;
        for slot in &self.stack_slots {
            offset = round_up(offset, slot.align.max(1));
            if slot.id == id {
                return offset;
            }
            offset += slot.size;
        }
        panic!("stack slot {id} not found in function {}", self.name)
    }

    pub fn new_block(&mut self, name: impl Into<Option<String>>) -> MirBlockId {
        let id = MirBlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { name: name.into(), ..Default::default() });
        self.block_order.push(id);
        id
    }

    pub fn entry_block(&self) -> Option<MirBlockId> {
        self.block_order.first().copied()
    }

    pub fn block_order(&self) -> &[MirBlockId] {
        &self.block_order
    }

    pub fn block(&self, id: MirBlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: MirBlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn inst(&self, id: MirInstId) -> &Instruction {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: MirInstId) -> &mut Instruction {
        &mut self.insts[id.index()]
    }

    fn update_cfg_links(&mut self, block: MirBlockId, old_succs: &[MirBlockId], new_succs: &[MirBlockId]) {
        for &s in old_succs {
            self.block_mut(s).preds.retain(|&p| p != block);
        }
        for &s in new_succs {
            let preds = &mut self.block_mut(s).preds;
            if !preds.contains(&block) {
                preds.push(block);
            }
        }
        self.block_mut(block).succs = new_succs.to_vec();
    }

    pub fn append(&mut self, block: MirBlockId, kind: MirInstKind, dest: Option<Register>, bytewidth: u8) -> MirInstId {
        let id = MirInstId::new(self.insts.len() as u32);
        let is_term = kind.is_terminator();
        let succs: Vec<MirBlockId> = kind.successors().into_iter().collect();
        self.insts.push(Instruction { id, block, kind, dest, bytewidth });
        self.block_mut(block).insts.push(id);
        if is_term {
            self.update_cfg_links(block, &[], &succs);
        }
        id
    }

    pub fn insert_before(&mut self, before: MirInstId, kind: MirInstKind, dest: Option<Register>, bytewidth: u8) -> MirInstId {
        let block = self.inst(before).block;
        let id = MirInstId::new(self.insts.len() as u32);
        self.insts.push(Instruction { id, block, kind, dest, bytewidth });
        let blk = self.block_mut(block);
        let pos = blk.insts.iter().position(|&i| i == before).expect("before must live in block");
        blk.insts.insert(pos, id);
        id
    }

    /// Appends `kind` at the end of `block`'s instruction list, *before* its
    /// terminator. Used to insert SSA-destruction copies (spec §4.7).
    pub fn append_before_terminator(&mut self, block: MirBlockId, kind: MirInstKind, dest: Option<Register>, bytewidth: u8) -> MirInstId {
        match self.block(block).terminator() {
            Some(term) if self.inst(term).is_terminator() => self.insert_before(term, kind, dest, bytewidth),
            _ => self.append(block, kind, dest, bytewidth),
        }
    }

    pub fn remove(&mut self, id: MirInstId) {
        let block = self.inst(id).block;
        self.block_mut(block).insts.retain(|&i| i != id);
    }

    pub fn preds(&self, block: MirBlockId) -> &[MirBlockId] {
        &self.block(block).preds
    }

    pub fn succs(&self, block: MirBlockId) -> &[MirBlockId] {
        &self.block(block).succs
    }

    pub fn blocks_iter(&self) -> impl Iterator<Item = (MirBlockId, &BasicBlock)> {
        self.block_order.iter().map(move |&id| (id, self.block(id)))
    }

    pub fn insts_in(&self, block: MirBlockId) -> impl Iterator<Item = &Instruction> {
        self.block(block).insts.iter().map(move |&id| self.inst(id))
    }

    pub fn all_insts(&self) -> impl Iterator<Item = &Instruction> {
        self.block_order.iter().flat_map(move |&b| self.insts_in(b))
    }

    /// Replaces block `block`'s terminator, updating CFG links — the MIR
    /// analog of `scatha_ir::Function::set_terminator`, used by jump
    /// elision to drop now-redundant unconditional jumps.
    pub fn set_terminator(&mut self, block: MirBlockId, kind: MirInstKind) -> MirInstId {
        debug_assert!(kind.is_terminator());
        if let Some(old) = self.block(block).terminator() {
            if self.inst(old).is_terminator() {
                let old_succs: Vec<MirBlockId> = self.inst(old).kind.successors().into_iter().collect();
                self.remove(old);
                self.update_cfg_links(block, &old_succs, &[]);
            }
        }
        let id = MirInstId::new(self.insts.len() as u32);
        let new_succs: Vec<MirBlockId> = kind.successors().into_iter().collect();
        self.insts.push(Instruction { id, block, kind, dest: None, bytewidth: 8 });
        self.block_mut(block).insts.push(id);
        self.update_cfg_links(block, &[], &new_succs);
        id
    }

    /// Reorders `block_order` to the given permutation (every existing
    /// block id, in the new layout order). Used by jump elision (spec
    /// §4.7).
    pub fn set_block_order(&mut self, order: Vec<MirBlockId>) {
        debug_assert_eq!(order.len(), self.block_order.len());
        self.block_order = order;
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) / align * align
}

#[derive(Debug, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    function_ids: HashMap<String, MirFunctionId>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_function(&mut self, name: impl Into<String>) -> MirFunctionId {
        let name = name.into();
        let id = MirFunctionId::new(self.functions.len() as u32);
        self.functions.push(Function::new(id, name.clone()));
        self.function_ids.insert(name, id);
        id
    }

    pub fn function(&self, id: MirFunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: MirFunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn find_function(&self, name: &str) -> Option<MirFunctionId> {
        self.function_ids.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_aligns_each_slot() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let a = f.new_stack_slot(1, 1);
        let b = f.new_stack_slot(8, 8);
        assert_eq!(f.stack_slot_offset(a), 0);
        assert_eq!(f.stack_slot_offset(b), 8);
        assert_eq!(f.frame_size(), 16);
    }

    #[test]
    fn set_terminator_updates_predecessor_links() {
        let mut f = Function::new(MirFunctionId::new(0), "f");
        let b0 = f.new_block(Some("entry".into()));
        let b1 = f.new_block(Some("next".into()));
        f.set_terminator(b0, MirInstKind::Jump { target: b1 });
        assert_eq!(f.preds(b1), &[b0]);
        f.set_terminator(b0, MirInstKind::Return);
        assert!(f.preds(b1).is_empty());
    }
}
