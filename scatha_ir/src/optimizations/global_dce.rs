//! Iteratively removes externally-invisible globals and functions
//! unreferenced by any externally visible root, and the constants they
//! alone kept alive (`global-dce`). Reachability is a single
//! transitive walk from the root set rather than a literal fixed-point
//! loop: unlike a local peephole pass, a whole-module reachability
//! computation already accounts for chains of internal calls in one pass;
//! repeated runs across a pipeline fixed point are handled by the pass
//! manager re-running the pipeline, not by looping here.

use crate::analysis::CallGraph;
use crate::context::Context;
use crate::ids::{FunctionId, GlobalId, Operand};
use crate::module::Module;
use crate::pass::{ComposedFunctionPass, ModulePass, PassCategory};
use hashbrown::HashSet;

pub struct GlobalDce;

impl ModulePass for GlobalDce {
    fn name(&self) -> &'static str {
        "global-dce"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Optimization
    }

    fn run(&self, ctx: &mut Context, module: &mut Module, _children: &ComposedFunctionPass) -> bool {
        let cg = CallGraph::build(module);

        let mut live_fns: HashSet<FunctionId> = HashSet::new();
        let mut live_globals: HashSet<GlobalId> = HashSet::new();
        let mut worklist: Vec<FunctionId> = module.functions.iter().filter(|f| f.visible_externally).map(|f| f.id).collect();
        for &f in &worklist {
            live_fns.insert(f);
        }
        for g in module.live_globals() {
            if g.visible_externally {
                live_globals.insert(g.id);
            }
        }

        while let Some(f) = worklist.pop() {
            for callee in cg.callees(f) {
                if live_fns.insert(callee) {
                    worklist.push(callee);
                }
            }
            for inst in module.function(f).all_insts() {
                for op in inst.operands() {
                    if let Operand::Global(g) = op {
                        live_globals.insert(g);
                    }
                }
            }
        }

        let mut changed = false;
        let dead_fns: Vec<FunctionId> = module.functions.iter().filter(|f| !f.is_declaration() && !live_fns.contains(&f.id)).map(|f| f.id).collect();
        for id in dead_fns {
            module.function_mut(id).clear_body();
            changed = true;
        }

        let dead_globals_exist = module.live_globals().any(|g| !live_globals.contains(&g.id));
        if dead_globals_exist {
            module.remove_dead_globals(&live_globals);
            changed = true;
        }

        let mut live_constants = HashSet::new();
        for func in &module.functions {
            for inst in func.all_insts() {
                for op in inst.operands() {
                    if let Operand::Constant(c) = op {
                        live_constants.insert(c);
                    }
                }
            }
        }
        for g in module.live_globals() {
            if let Some(c) = g.initializer {
                live_constants.insert(c);
            }
        }
        ctx.clean_constants(&live_constants);

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{LocalValue, Operand as IrOperand};
    use crate::instruction::{Callee, InstKind};

    #[test]
    fn function_unreachable_from_any_public_root_is_cleared() {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let i64_ty = ctx.int_type(64);

        let dead = module.declare_function("dead", vec![], i64_ty);
        module.function_mut(dead).visible_externally = false;
        let entry = module.function_mut(dead).new_block(Some("entry".into()));
        module.function_mut(dead).set_terminator(entry, InstKind::Return { value: Some(IrOperand::Constant(ctx.const_int(i64_ty, 1))) }, None, ctx.void_type());

        let main = module.declare_function("main", vec![], i64_ty);
        module.function_mut(main).visible_externally = true;
        let mentry = module.function_mut(main).new_block(Some("entry".into()));
        module.function_mut(main).set_terminator(mentry, InstKind::Return { value: Some(IrOperand::Constant(ctx.const_int(i64_ty, 0))) }, None, ctx.void_type());

        let empty = ComposedFunctionPass::default();
        let changed = GlobalDce.run(&mut ctx, &mut module, &empty);
        assert!(changed);
        assert!(module.function(dead).is_declaration());
        assert!(!module.function(main).is_declaration());
    }

    #[test]
    fn function_reachable_through_a_call_chain_survives() {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let i64_ty = ctx.int_type(64);

        let helper = module.declare_function("helper", vec![], i64_ty);
        module.function_mut(helper).visible_externally = false;
        let hentry = module.function_mut(helper).new_block(Some("entry".into()));
        module.function_mut(helper).set_terminator(hentry, InstKind::Return { value: Some(IrOperand::Constant(ctx.const_int(i64_ty, 7))) }, None, ctx.void_type());

        let main = module.declare_function("main", vec![], i64_ty);
        module.function_mut(main).visible_externally = true;
        let mentry = module.function_mut(main).new_block(Some("entry".into()));
        let call = module.function_mut(main).append(mentry, InstKind::Call { callee: Callee::Function(helper), args: vec![] }, i64_ty, None);
        module.function_mut(main).set_terminator(mentry, InstKind::Return { value: Some(IrOperand::Local(LocalValue::Inst(call))) }, None, ctx.void_type());

        let empty = ComposedFunctionPass::default();
        GlobalDce.run(&mut ctx, &mut module, &empty);
        assert!(!module.function(helper).is_declaration());
    }

    #[test]
    fn unreferenced_invisible_global_is_swept() {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let i64_ty = ctx.int_type(64);
        let init = ctx.const_int(i64_ty, 1);
        let g = module.declare_global("g", i64_ty, Some(init), false);

        let main = module.declare_function("main", vec![], i64_ty);
        module.function_mut(main).visible_externally = true;
        let entry = module.function_mut(main).new_block(Some("entry".into()));
        module.function_mut(main).set_terminator(entry, InstKind::Return { value: None }, None, ctx.void_type());

        let empty = ComposedFunctionPass::default();
        GlobalDce.run(&mut ctx, &mut module, &empty);
        assert!(module.find_global("g").is_none());
        let _ = g;
    }
}
