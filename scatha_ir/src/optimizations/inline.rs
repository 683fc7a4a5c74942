//! Drives inlining by SCC traversal with a size/benefit heuristic (spec
//! §4.5 `inline`): a callee is a candidate only if it is alone in its call
//! graph SCC (no recursion through it), reduces to a single basic block
//! ending in `return` after its own simplification pipeline runs, and is
//! within a size budget. Splicing a single-block callee needs no control
//! flow surgery: its instructions are inserted in place of the call and its
//! return value directly replaces the call's uses.

use crate::analysis::CallGraph;
use crate::context::Context;
use crate::ids::{FunctionId, InstId, LocalValue, Operand, TypeId};
use crate::instruction::{Callee, InstKind};
use crate::module::{Function, Module};
use crate::pass::{ComposedFunctionPass, ModulePass, PassCategory};
use hashbrown::HashMap;

/// Above this instruction count a callee is assumed not to pay for the
/// call overhead it removes, matching the spirit of the the size/benefit
/// heuristic without a full cost model.
const SIZE_THRESHOLD: usize = 24;

pub struct Inline;

impl ModulePass for Inline {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Optimization
    }

    fn run(&self, ctx: &mut Context, module: &mut Module, children: &ComposedFunctionPass) -> bool {
        let cg = CallGraph::build(module);
        let sccs = cg.compute_sccs(module);
        let mut changed = false;

        for scc in sccs {
            let [callee_id] = scc[..] else { continue };
            let Some(body) = prepare_candidate(ctx, module, callee_id, children) else { continue };

            let caller_ids: Vec<FunctionId> = module.functions.iter().map(|f| f.id).filter(|&id| id != callee_id).collect();
            for caller_id in caller_ids {
                if inline_into(ctx, module, caller_id, callee_id, &body) {
                    changed = true;
                }
            }
        }
        changed
    }
}

/// A flattened, already-simplified single-block function body ready to be
/// spliced at a call site.
struct InlinableBody {
    insts: Vec<(InstId, InstKind, TypeId)>,
    ret_value: Option<Operand>,
}

fn prepare_candidate(ctx: &mut Context, module: &Module, callee_id: FunctionId, children: &ComposedFunctionPass) -> Option<InlinableBody> {
    let original = module.function(callee_id);
    if original.is_declaration() || original.block_order().len() != 1 {
        return None;
    }
    if original.all_insts().any(|i| matches!(&i.kind, InstKind::Call { callee: Callee::Function(f), .. } if *f == callee_id)) {
        return None;
    }

    let mut clone: Function = original.clone();
    children.run(ctx, &mut clone);
    if clone.block_order().len() != 1 {
        return None;
    }
    let entry = clone.entry_block()?;
    let body: Vec<&crate::instruction::Instruction> = clone.insts_in(entry).collect();
    if body.len() > SIZE_THRESHOLD {
        return None;
    }
    let Some((last, rest)) = body.split_last() else { return None };
    let InstKind::Return { value } = last.kind.clone() else { return None };

    Some(InlinableBody { insts: rest.iter().map(|i| (i.id, i.kind.clone(), i.ty)).collect(), ret_value: value })
}

fn remap(op: Operand, args: &[Operand], value_map: &HashMap<InstId, Operand>) -> Operand {
    match op {
        Operand::Local(LocalValue::Param(i)) => args[i as usize],
        Operand::Local(LocalValue::Inst(id)) => value_map.get(&id).copied().unwrap_or(op),
        Operand::Global(_) | Operand::Constant(_) => op,
    }
}

fn remap_kind(kind: &InstKind, args: &[Operand], value_map: &HashMap<InstId, Operand>) -> InstKind {
    let mut kind = kind.clone();
    for op in collect_operand_mut(&mut kind) {
        *op = remap(*op, args, value_map);
    }
    kind
}

/// Every mutable operand slot in an `InstKind`, mirroring `operands()` but
/// yielding references so callers can rewrite them in place.
fn collect_operand_mut(kind: &mut InstKind) -> Vec<&mut Operand> {
    match kind {
        InstKind::Alloca { .. } | InstKind::Goto { .. } | InstKind::Unreachable => vec![],
        InstKind::Load { ptr, .. } => vec![ptr],
        InstKind::Store { ptr, value } => vec![ptr, value],
        InstKind::GetElementPointer { ptr, indices, .. } => {
            let mut out = vec![ptr];
            for idx in indices {
                if let crate::instruction::GepIndex::Value(v) = idx {
                    out.push(v);
                }
            }
            out
        }
        InstKind::InsertValue { aggregate, value, .. } => vec![aggregate, value],
        InstKind::ExtractValue { aggregate, .. } => vec![aggregate],
        InstKind::Arithmetic { lhs, rhs, .. } => vec![lhs, rhs],
        InstKind::UnaryArithmetic { operand, .. } => vec![operand],
        InstKind::Conversion { operand, .. } => vec![operand],
        InstKind::Compare { lhs, rhs, .. } => vec![lhs, rhs],
        InstKind::Branch { cond, .. } => vec![cond],
        InstKind::Return { value } => value.iter_mut().collect(),
        InstKind::Phi { incoming } => incoming.iter_mut().map(|(_, v)| v).collect(),
        InstKind::Call { args, .. } => args.iter_mut().collect(),
    }
}

fn inline_into(_ctx: &mut Context, module: &mut Module, caller_id: FunctionId, callee_id: FunctionId, body: &InlinableBody) -> bool {
    let call_sites: Vec<InstId> = module
        .function(caller_id)
        .all_insts()
        .filter(|i| matches!(&i.kind, InstKind::Call { callee: Callee::Function(f), .. } if *f == callee_id))
        .map(|i| i.id)
        .collect();
    if call_sites.is_empty() {
        return false;
    }

    let func = module.function_mut(caller_id);
    for call_id in call_sites {
        let InstKind::Call { args, .. } = func.inst(call_id).kind.clone() else { continue };
        let mut value_map: HashMap<InstId, Operand> = HashMap::new();
        for &(old_id, ref kind, ty) in &body.insts {
            let new_kind = remap_kind(kind, &args, &value_map);
            let new_id = func.insert_before(call_id, new_kind, ty, None);
            value_map.insert(old_id, Operand::Local(LocalValue::Inst(new_id)));
        }
        let ret = body.ret_value.map(|v| remap(v, &args, &value_map));
        if let Some(ret) = ret {
            func.replace_all_uses_with(LocalValue::Inst(call_id), ret);
        }
        func.remove(call_id);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LocalValue;
    use crate::instruction::ArithmeticOp;

    #[test]
    fn small_single_block_callee_is_spliced_into_its_caller() {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let i64_ty = ctx.int_type(64);

        let square = module.declare_function("square", vec![i64_ty], i64_ty);
        let sq_entry = module.function_mut(square).new_block(Some("entry".into()));
        let mul = module.function_mut(square).append(sq_entry, InstKind::Arithmetic { op: ArithmeticOp::Mul, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Local(LocalValue::Param(0)) }, i64_ty, None);
        module.function_mut(square).set_terminator(sq_entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(mul))) }, None, ctx.void_type());

        let caller = module.declare_function("f", vec![i64_ty], i64_ty);
        let entry = module.function_mut(caller).new_block(Some("entry".into()));
        let call = module.function_mut(caller).append(entry, InstKind::Call { callee: Callee::Function(square), args: vec![Operand::Local(LocalValue::Param(0))] }, i64_ty, None);
        module.function_mut(caller).set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(call))) }, None, ctx.void_type());

        let empty = ComposedFunctionPass::default();
        let changed = Inline.run(&mut ctx, &mut module, &empty);
        assert!(changed);
        assert!(module.function(caller).all_insts().all(|i| !matches!(i.kind, InstKind::Call { .. })));
        assert!(module.function(caller).all_insts().any(|i| matches!(i.kind, InstKind::Arithmetic { op: ArithmeticOp::Mul, .. })));
    }
}
