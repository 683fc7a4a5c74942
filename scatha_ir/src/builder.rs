//! Ergonomic IR construction during lowering (spec §4.3). Tracks a
//! "current block" the way a textbook SSA builder does, and buffers
//! `alloca`s so `finish()` can hoist them into the entry block in source
//! order — IR-gen never has to reason about the entry block while lowering
//! control flow deep in a function body.

use crate::context::Context;
use crate::ids::{BlockId, InstId, LocalValue, Operand, TypeId};
use crate::instruction::{ArithmeticOp, Callee, CompareMode, CompareOp, ConversionOp, GepIndex, InstKind, UnaryArithmeticOp};
use crate::module::Function;

pub struct FunctionBuilder<'f> {
    func: &'f mut Function,
    current: Option<BlockId>,
    pending_allocas: Vec<InstId>,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self { func, current: None, pending_allocas: Vec::new() }
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }

    pub fn new_block(&mut self, name: impl Into<Option<String>>) -> BlockId {
        self.func.new_block(name)
    }

    pub fn current_block(&self) -> BlockId {
        self.current.expect("FunctionBuilder: no current block set")
    }

    pub fn set_current(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    /// Runs `body` with `block` as the current block, then restores
    /// whatever was current beforehand. Mirrors `with_block_current`.
    pub fn with_block_current<R>(&mut self, block: BlockId, body: impl FnOnce(&mut Self) -> R) -> R {
        let prev = self.current;
        self.current = Some(block);
        let result = body(self);
        self.current = prev;
        result
    }

    fn add(&mut self, kind: InstKind, ty: TypeId, name: Option<String>) -> InstId {
        let block = self.current_block();
        self.func.append(block, kind, ty, name)
    }

    pub fn alloca(&mut self, ctx: &Context, allocated_ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        let id = self.add(InstKind::Alloca { allocated_ty }, ctx.ptr_type(), name.into());
        self.pending_allocas.push(id);
        id
    }

    pub fn load(&mut self, ptr: Operand, loaded_ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::Load { ptr, loaded_ty }, loaded_ty, name.into())
    }

    pub fn store(&mut self, ctx: &Context, ptr: Operand, value: Operand) -> InstId {
        self.add(InstKind::Store { ptr, value }, ctx.void_type(), None)
    }

    pub fn gep(&mut self, ctx: &Context, ptr: Operand, base_ty: TypeId, indices: Vec<GepIndex>, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::GetElementPointer { ptr, base_ty, indices }, ctx.ptr_type(), name.into())
    }

    pub fn insert_value(&mut self, aggregate: Operand, value: Operand, indices: Vec<u64>, ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::InsertValue { aggregate, value, indices }, ty, name.into())
    }

    pub fn extract_value(&mut self, aggregate: Operand, indices: Vec<u64>, ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::ExtractValue { aggregate, indices }, ty, name.into())
    }

    pub fn arithmetic(&mut self, op: ArithmeticOp, lhs: Operand, rhs: Operand, ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::Arithmetic { op, lhs, rhs }, ty, name.into())
    }

    pub fn unary(&mut self, op: UnaryArithmeticOp, operand: Operand, ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::UnaryArithmetic { op, operand }, ty, name.into())
    }

    pub fn convert(&mut self, op: ConversionOp, operand: Operand, target_ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::Conversion { op, operand, target_ty }, target_ty, name.into())
    }

    pub fn compare(&mut self, ctx: &mut Context, mode: CompareMode, op: CompareOp, lhs: Operand, rhs: Operand, name: impl Into<Option<String>>) -> InstId {
        let i1 = ctx.int_type(1);
        self.add(InstKind::Compare { mode, op, lhs, rhs }, i1, name.into())
    }

    pub fn call(&mut self, callee: Callee, args: Vec<Operand>, ret_ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        self.add(InstKind::Call { callee, args }, ret_ty, name.into())
    }

    pub fn phi(&mut self, ctx: &Context, incoming: Vec<(BlockId, Operand)>, ty: TypeId, name: impl Into<Option<String>>) -> InstId {
        let _ = ctx;
        self.add(InstKind::Phi { incoming: incoming.into() }, ty, name.into())
    }

    pub fn goto(&mut self, ctx: &Context, target: BlockId) -> InstId {
        let void = ctx.void_type();
        let block = self.current_block();
        self.func.set_terminator(block, InstKind::Goto { target }, None, void)
    }

    pub fn branch(&mut self, ctx: &Context, cond: Operand, if_true: BlockId, if_false: BlockId) -> InstId {
        let void = ctx.void_type();
        let block = self.current_block();
        self.func.set_terminator(block, InstKind::Branch { cond, if_true, if_false }, None, void)
    }

    pub fn ret(&mut self, ctx: &Context, value: Option<Operand>) -> InstId {
        let void = ctx.void_type();
        let block = self.current_block();
        self.func.set_terminator(block, InstKind::Return { value }, None, void)
    }

    pub fn unreachable(&mut self, ctx: &Context) -> InstId {
        let void = ctx.void_type();
        let block = self.current_block();
        self.func.set_terminator(block, InstKind::Unreachable, None, void)
    }

    pub fn value(&self, inst: InstId) -> Operand {
        Operand::Local(LocalValue::Inst(inst))
    }

    /// Hoists every buffered `alloca` into the entry block in the order
    /// they were created, then validates the function's IR invariants.
    pub fn finish(self) -> Result<(), String> {
        if self.func.entry_block().is_none() {
            return Err("function has no entry block".to_string());
        }
        self.func.hoist_to_entry(&self.pending_allocas);
        self.func.setup_invariants()
    }
}
