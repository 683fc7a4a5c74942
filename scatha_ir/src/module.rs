//! IR module: functions, globals, basic blocks and instructions, plus the
//! def-use bookkeeping every IR-editing utility must keep consistent
//! (spec §3 "Ownership", invariant 1 in §8).

use crate::ids::{BlockId, FunctionId, GlobalId, InstId, LocalValue, Operand, TypeId};
use crate::instruction::{InstKind, Instruction};
use hashbrown::{HashMap, HashSet};

/// A basic block: an ordered instruction list ending in exactly one
/// terminator, with predecessor/successor links kept consistent by
/// terminator mutation (spec §3).
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub name: Option<String>,
    pub insts: Vec<InstId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    pub fn phi_prefix_len(&self, insts: &[Instruction]) -> usize {
        self.insts.iter().take_while(|id| insts[id.index()].is_phi()).count()
    }
}

/// A global variable: a module-level storage slot with a fixed type and
/// optional initializer.
#[derive(Debug, Clone)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub pointee_ty: TypeId,
    pub initializer: Option<crate::ids::ConstantId>,
    pub is_mutable: bool,
    /// Roots `global-dce`'s reachability walk, mirroring
    /// `Function::visible_externally` (spec §4.5 `global-dce`).
    pub visible_externally: bool,
}

/// Calling convention a function declaration uses, distinguishing the
/// source language's own ABI from a foreign (C) one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    Scatha,
    C,
}

/// A function: an intrusive-order list of basic blocks (first is entry)
/// plus the arenas backing its instructions and a per-function def-use map.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub param_types: Vec<TypeId>,
    pub param_names: Vec<Option<String>>,
    pub ret_ty: TypeId,
    pub calling_convention: CallingConvention,
    pub foreign: Option<(u32, u32)>,
    pub visible_externally: bool,
    block_order: Vec<BlockId>,
    blocks: Vec<BasicBlock>,
    insts: Vec<Instruction>,
    names: HashSet<String>,
    users: HashMap<LocalValue, HashSet<InstId>>,
    cfg_dirty: bool,
    next_anon: u32,
}

impl Function {
    pub fn new(id: FunctionId, name: impl Into<String>, param_types: Vec<TypeId>, ret_ty: TypeId) -> Self {
        Self {
            id,
            name: name.into(),
            param_names: vec![None; param_types.len()],
            param_types,
            ret_ty,
            calling_convention: CallingConvention::Scatha,
            foreign: None,
            visible_externally: false,
            block_order: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            names: HashSet::new(),
            users: HashMap::new(),
            cfg_dirty: false,
            next_anon: 0,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.block_order.is_empty()
    }

    /// Drops every block, instruction and def-use entry, turning a defined
    /// function back into a bare declaration in place. Used by `global-dce`
    /// to discard an unreachable function's body without disturbing its
    /// `FunctionId` (other functions' `Call` operands may still name it
    /// transiently during the same pass run).
    pub fn clear_body(&mut self) {
        self.block_order.clear();
        self.blocks.clear();
        self.insts.clear();
        self.names.clear();
        self.users.clear();
        self.cfg_dirty = false;
        self.next_anon = 0;
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.block_order.first().copied()
    }

    pub fn block_order(&self) -> &[BlockId] {
        &self.block_order
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.insts[id.index()]
    }

    pub fn param_type(&self, index: u32) -> TypeId {
        self.param_types[index as usize]
    }

    pub fn value_type(&self, value: LocalValue) -> TypeId {
        match value {
            LocalValue::Param(i) => self.param_type(i),
            LocalValue::Inst(id) => self.inst(id).ty,
        }
    }

    /// Appends a freshly-created block to the function, returning its id.
    /// The first block ever created becomes the entry block.
    pub fn new_block(&mut self, name: impl Into<Option<String>>) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { name: name.into(), ..Default::default() });
        self.block_order.push(id);
        id
    }

    fn fresh_name(&mut self, requested: Option<String>) -> Option<String> {
        match requested {
            None => None,
            Some(n) if !self.names.contains(&n) => {
                self.names.insert(n.clone());
                Some(n)
            }
            Some(n) => {
                loop {
                    let candidate = format!("{n}.{}", self.next_anon);
                    self.next_anon += 1;
                    if !self.names.contains(&candidate) {
                        self.names.insert(candidate.clone());
                        break Some(candidate);
                    }
                }
            }
        }
    }

    fn record_users(&mut self, user: InstId, operands: &[Operand]) {
        for op in operands {
            if let Operand::Local(lv) = op {
                self.users.entry(*lv).or_default().insert(user);
            }
        }
    }

    fn drop_users(&mut self, user: InstId, operands: &[Operand]) {
        for op in operands {
            if let Operand::Local(lv) = op {
                if let Some(set) = self.users.get_mut(lv) {
                    set.remove(&user);
                }
            }
        }
    }

    /// Every instruction that currently uses `value` as an operand (spec
    /// §3: "an unordered multiset of users").
    pub fn users_of(&self, value: LocalValue) -> impl Iterator<Item = InstId> + '_ {
        self.users.get(&value).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn has_users(&self, value: LocalValue) -> bool {
        self.users.get(&value).is_some_and(|s| !s.is_empty())
    }

    fn update_cfg_links(&mut self, block: BlockId, old_succs: &[BlockId], new_succs: &[BlockId]) {
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
        self.cfg_dirty = true;
    }

    /// Appends a new instruction to the end of `block`'s instruction list.
    /// If `kind` is a terminator, predecessor/successor links are updated.
    pub fn append(&mut self, block: BlockId, kind: InstKind, ty: TypeId, name: Option<String>) -> InstId {
        let id = InstId::new(self.insts.len() as u32);
        let name = self.fresh_name(name);
        let operands = kind.operands();
        let is_term = kind.is_terminator();
        let succs = kind.successors();
        self.insts.push(Instruction { id, block, name, ty, kind });
        self.block_mut(block).insts.push(id);
        self.record_users(id, &operands);
        if is_term {
            let succs: Vec<BlockId> = succs.into_iter().collect();
            self.update_cfg_links(block, &[], &succs);
        }
        id
    }

    /// Inserts a new instruction immediately before `before` in its block.
    pub fn insert_before(&mut self, before: InstId, kind: InstKind, ty: TypeId, name: Option<String>) -> InstId {
        let block = self.inst(before).block;
        let id = InstId::new(self.insts.len() as u32);
        let name = self.fresh_name(name);
        let operands = kind.operands();
        self.insts.push(Instruction { id, block, name, ty, kind });
        let blk = self.block_mut(block);
        let pos = blk.insts.iter().position(|&i| i == before).expect("before must live in block");
        blk.insts.insert(pos, id);
        self.record_users(id, &operands);
        id
    }

    /// Replaces every operand referencing `old` with `new` across the
    /// whole function — the fundamental IR editing primitive (spec §3).
    pub fn replace_all_uses_with(&mut self, old: LocalValue, new: Operand) {
        let users: Vec<InstId> = self.users_of(old).collect();
        for user in users {
            let inst = self.inst_mut(user);
            inst.kind.replace_operand(Operand::Local(old), new);
        }
        if let Some(set) = self.users.remove(&old) {
            if let Operand::Local(new_lv) = new {
                self.users.entry(new_lv).or_default().extend(set);
            }
        }
    }

    /// Removes an instruction: drops its operand user-links, its own
    /// user-set entry (must be empty unless `force`), and its slot in the
    /// owning block. CFG-modifying: call sites must `invalidate_cfg_info`.
    pub fn remove(&mut self, id: InstId) {
        let block = self.inst(id).block;
        let operands = self.inst(id).operands();
        self.drop_users(id, &operands);
        self.users.remove(&LocalValue::Inst(id));
        self.block_mut(block).insts.retain(|&i| i != id);
    }

    /// Replaces block `block`'s terminator, updating CFG links. The old
    /// terminator (if any) is removed first.
    pub fn set_terminator(&mut self, block: BlockId, kind: InstKind, name: Option<String>, void_ty: TypeId) -> InstId {
        debug_assert!(kind.is_terminator());
        if let Some(old) = self.block(block).terminator() {
            if self.inst(old).is_terminator() {
                let old_succs: Vec<BlockId> = self.inst(old).successors().into_iter().collect();
                self.remove(old);
                self.update_cfg_links(block, &old_succs, &[]);
            }
        }
        let id = InstId::new(self.insts.len() as u32);
        let name = self.fresh_name(name);
        let new_succs: Vec<BlockId> = kind.successors().into_iter().collect();
        self.insts.push(Instruction { id, block, name, ty: void_ty, kind });
        self.block_mut(block).insts.push(id);
        self.update_cfg_links(block, &[], &new_succs);
        id
    }

    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.block(block).preds
    }

    /// Rewrites every occurrence of `old_target` in `pred`'s terminator to
    /// `new_target`, updating predecessor/successor links accordingly. Used
    /// by `simplify-cfg` to thread a jump past an empty forwarding block.
    pub fn redirect_successor(&mut self, pred: BlockId, old_target: BlockId, new_target: BlockId) {
        let term = self.block(pred).terminator().expect("every block has a terminator");
        match &mut self.inst_mut(term).kind {
            InstKind::Goto { target } if *target == old_target => *target = new_target,
            InstKind::Branch { if_true, if_false, .. } => {
                if *if_true == old_target {
                    *if_true = new_target;
                }
                if *if_false == old_target {
                    *if_false = new_target;
                }
            }
            _ => return,
        }
        self.block_mut(old_target).preds.retain(|&p| p != pred);
        let new_succs = &mut self.block_mut(pred).succs;
        for s in new_succs.iter_mut() {
            if *s == old_target {
                *s = new_target;
            }
        }
        let new_preds = &mut self.block_mut(new_target).preds;
        if !new_preds.contains(&pred) {
            new_preds.push(pred);
        }
        self.cfg_dirty = true;
    }

    /// Moves every instruction (and CFG successor) from `from` to `to`,
    /// leaving `from` empty. Used by `tail-rec-elim` to turn the entry block
    /// into a dedicated preheader ahead of a freshly introduced loop header
    /// carrying the same body.
    pub fn move_block_contents(&mut self, from: BlockId, to: BlockId) {
        let ids = std::mem::take(&mut self.block_mut(from).insts);
        for &id in &ids {
            self.inst_mut(id).block = to;
        }
        let old_succs = std::mem::take(&mut self.block_mut(from).succs);
        for &s in &old_succs {
            for p in self.block_mut(s).preds.iter_mut() {
                if *p == from {
                    *p = to;
                }
            }
        }
        self.block_mut(to).insts = ids;
        self.block_mut(to).succs = old_succs;
        self.cfg_dirty = true;
    }

    /// Orphans a block: drops it from the function's block order and clears
    /// its CFG links. Its arena slot is left in place (append-only, like
    /// `remove`'s treatment of instructions) since other blocks may still
    /// reference its `BlockId` transiently during a pass.
    pub fn delete_block(&mut self, block: BlockId) {
        let succs = self.block(block).succs.clone();
        for s in succs {
            self.block_mut(s).preds.retain(|&p| p != block);
        }
        let insts = self.block(block).insts.clone();
        for id in insts {
            let operands = self.inst(id).operands();
            self.drop_users(id, &operands);
            self.users.remove(&LocalValue::Inst(id));
        }
        self.block_order.retain(|&b| b != block);
        let blk = self.block_mut(block);
        blk.insts.clear();
        blk.succs.clear();
        blk.preds.clear();
        self.cfg_dirty = true;
    }

    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.block(block).succs
    }

    pub fn invalidate_cfg_info(&mut self) {
        self.cfg_dirty = true;
    }

    pub fn cfg_dirty(&self) -> bool {
        self.cfg_dirty
    }

    pub fn clear_cfg_dirty(&mut self) {
        self.cfg_dirty = false;
    }

    /// Validates the IR invariants of spec §8 that are cheap to check
    /// eagerly: name uniqueness, single terminator per block, phi incoming
    /// set matches predecessor set. Called by the builder's `finish()`
    /// and by tests.
    pub fn setup_invariants(&self) -> Result<(), String> {
        for &block in &self.block_order {
            let blk = self.block(block);
            if blk.insts.is_empty() {
                return Err(format!("block {block} has no terminator"));
            }
            let term_count = blk.insts.iter().filter(|&&i| self.inst(i).is_terminator()).count();
            if term_count != 1 {
                return Err(format!("block {block} has {term_count} terminators, expected exactly 1"));
            }
            if !self.inst(*blk.insts.last().unwrap()).is_terminator() {
                return Err(format!("block {block}'s terminator is not its last instruction"));
            }
            for &inst_id in &blk.insts {
                let inst = self.inst(inst_id);
                if let InstKind::Phi { incoming } = &inst.kind {
                    let mut incoming_preds: Vec<BlockId> = incoming.iter().map(|(p, _)| *p).collect();
                    let mut actual_preds = blk.preds.clone();
                    incoming_preds.sort();
                    actual_preds.sort();
                    if incoming_preds != actual_preds {
                        return Err(format!("phi {} incoming predecessors {incoming_preds:?} != block predecessors {actual_preds:?}", inst.display_name()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Moves each instruction in `ids` (typically buffered `alloca`s) to
    /// the front of the entry block, in the given order, removing it from
    /// wherever it currently lives. Used by `FunctionBuilder::finish`.
    pub fn hoist_to_entry(&mut self, ids: &[InstId]) {
        let Some(entry) = self.entry_block() else { return };
        for &id in ids {
            let old_block = self.inst(id).block;
            if old_block != entry {
                self.block_mut(old_block).insts.retain(|&i| i != id);
            }
            self.inst_mut(id).block = entry;
        }
        let entry_insts = &mut self.block_mut(entry).insts;
        entry_insts.retain(|id| !ids.contains(id));
        for (offset, &id) in ids.iter().enumerate() {
            entry_insts.insert(offset, id);
        }
    }

    pub fn blocks_iter(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.block_order.iter().map(move |&id| (id, self.block(id)))
    }

    pub fn insts_in(&self, block: BlockId) -> impl Iterator<Item = &Instruction> {
        self.block(block).insts.iter().map(move |&id| self.inst(id))
    }

    pub fn all_insts(&self) -> impl Iterator<Item = &Instruction> {
        self.block_order.iter().flat_map(move |&b| self.insts_in(b))
    }
}

/// The whole compiled module: every function and global. Owns all
/// `Function`s; `Function`s own their `BasicBlock`s and `Instruction`s
/// (spec §3 "Ownership" — nested, deterministic destruction).
#[derive(Debug, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    function_ids: HashMap<String, FunctionId>,
    global_ids: HashMap<String, GlobalId>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_function(&mut self, name: impl Into<String>, param_types: Vec<TypeId>, ret_ty: TypeId) -> FunctionId {
        let name = name.into();
        if let Some(&id) = self.function_ids.get(&name) {
            return id;
        }
        let id = FunctionId::new(self.functions.len() as u32);
        self.functions.push(Function::new(id, name.clone(), param_types, ret_ty));
        self.function_ids.insert(name, id);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.function_ids.get(name).copied()
    }

    pub fn declare_global(&mut self, name: impl Into<String>, pointee_ty: TypeId, initializer: Option<crate::ids::ConstantId>, is_mutable: bool) -> GlobalId {
        let name = name.into();
        let id = GlobalId::new(self.globals.len() as u32);
        self.globals.push(Global { id, name: name.clone(), pointee_ty, initializer, is_mutable, visible_externally: false });
        self.global_ids.insert(name, id);
        id
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.global_ids.get(name).copied()
    }

    /// Every currently name-addressable global, i.e. those `global-dce`
    /// has not yet swept (spec §4.5). Mirrors `Context::clean_constants`'s
    /// cache-eviction idiom: dead globals keep their arena slot (so a
    /// stale `GlobalId` never dangles) but drop out of lookup-by-name.
    pub fn live_globals(&self) -> impl Iterator<Item = &Global> {
        self.global_ids.values().map(move |&id| self.global(id))
    }

    /// Evicts every global not in `live` from the name table, driven by
    /// `global-dce` after it has computed reachability from externally
    /// visible roots.
    pub fn remove_dead_globals(&mut self, live: &HashSet<GlobalId>) {
        self.global_ids.retain(|_, id| live.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn sample_function(ctx: &mut Context) -> Function {
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let ret_val = Operand::Local(LocalValue::Param(0));
        f.set_terminator(entry, InstKind::Return { value: Some(ret_val) }, None, ctx.void_type());
        f
    }

    #[test]
    fn invariant_one_every_operand_has_a_registered_user() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let add = f.append(
            entry,
            InstKind::Arithmetic { op: crate::instruction::ArithmeticOp::Add, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) },
            i64_ty,
            Some("sum".into()),
        );
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(add))) }, None, ctx.void_type());
        assert!(f.users_of(LocalValue::Param(0)).any(|u| u == add));
        let ret_id = f.block(entry).terminator().unwrap();
        assert!(f.users_of(LocalValue::Inst(add)).any(|u| u == ret_id));
    }

    #[test]
    fn setup_invariants_rejects_block_without_terminator() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![], i64_ty);
        f.new_block(Some("entry".into()));
        assert!(f.setup_invariants().is_err());
        let _ = &mut ctx;
    }

    #[test]
    fn setup_invariants_accepts_single_terminator() {
        let mut ctx = Context::new();
        let f = sample_function(&mut ctx);
        assert!(f.setup_invariants().is_ok());
    }

    #[test]
    fn replace_all_uses_with_updates_every_user() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let a = f.append(entry, InstKind::UnaryArithmetic { op: crate::instruction::UnaryArithmeticOp::Neg, operand: Operand::Local(LocalValue::Param(0)) }, i64_ty, None);
        let b = f.append(entry, InstKind::UnaryArithmetic { op: crate::instruction::UnaryArithmeticOp::Neg, operand: Operand::Local(LocalValue::Inst(a)) }, i64_ty, None);
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(b))) }, None, ctx.void_type());
        f.replace_all_uses_with(LocalValue::Inst(a), Operand::Local(LocalValue::Param(0)));
        let InstKind::UnaryArithmetic { operand, .. } = &f.inst(b).kind else { panic!() };
        assert_eq!(*operand, Operand::Local(LocalValue::Param(0)));
    }
}
