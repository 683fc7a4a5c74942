//! Drives the full IR → MIR pipeline (spec §4.7): instruction selection,
//! SSA destruction, register allocation and the post-allocation cleanups,
//! in the order the reference implementation's `CodeGenContext` threads
//! them (`original_source/lib/CodeGen/CodeGen.cc`).

use crate::coalesce;
use crate::interference::{self, InterferenceGraph};
use crate::jump_elision;
use crate::liveness::Liveness;
use crate::module::{Function as MirFunction, Module as MirModule};
use crate::register::{HwReg, Register};
use crate::select;
use crate::ssa_destruction;
use hashbrown::HashMap;
use scatha_ir::context::Context;
use scatha_ir::module::Module as IrModule;

/// Target-machine parameters codegen needs beyond what selection already
/// bakes in: how many general-purpose hardware registers the allocator may
/// hand out (spec §4.7's "a fixed, small number of general-purpose
/// registers", modeled on the reference VM's register file).
#[derive(Debug, Clone, Copy)]
pub struct CodegenConfig {
    pub num_hardware_registers: u8,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self { num_hardware_registers: 16 }
    }
}

/// Lowers every defined function in `ir` to hardware-register MIR: selection,
/// SSA destruction, coalescing, allocation, and jump elision, in that order.
/// Declarations pass through untouched — there is no body to lower.
pub fn lower_module(ctx: &Context, ir: &IrModule, config: CodegenConfig) -> MirModule {
    log::debug!("codegen: selecting {} function(s)", ir.functions.len());
    let mut mm = select::select_module(ctx, ir);
    log::debug!("codegen: destroying SSA (phi -> copy)");
    ssa_destruction::destroy(&mut mm);
    for func in &mut mm.functions {
        if func.block_order().is_empty() {
            continue;
        }
        log::debug!("codegen: lowering function '{}' to hardware registers", func.name);
        lower_function(func, config);
    }
    log::debug!("codegen: done");
    mm
}

fn lower_function(func: &mut MirFunction, config: CodegenConfig) {
    log::trace!("  coalescing virtual-register copies before allocation");
    coalesce::coalesce_virtual(func);

    let liveness = Liveness::compute(func);
    let graph = InterferenceGraph::build(func, &liveness);
    let precolored = precolor(func, &graph, config);
    log::trace!("  coloring interference graph ({} register(s) available)", config.num_hardware_registers);
    let coloring = interference::color(&graph, config.num_hardware_registers, &precolored);
    interference::apply(func, &coloring);

    log::trace!("  sweeping trivial post-allocation copies and eliding redundant jumps");
    coalesce::sweep_trivial_copies(func);
    jump_elision::run(func);
}

/// Pins parameter registers to the first hardware slots in
/// calling-convention order, and does the same for return registers unless
/// that would double-book a slot still live from a parameter (spec §4.7
/// "argument and return slots are pre-colored"). A return value whose
/// natural slot conflicts this way is left to the greedy colorer instead of
/// forcing an incorrect assignment.
fn precolor(func: &MirFunction, graph: &InterferenceGraph, config: CodegenConfig) -> HashMap<Register, HwReg> {
    let mut map = HashMap::new();
    for (i, &r) in func.param_registers.iter().enumerate() {
        if (i as u8) < config.num_hardware_registers {
            map.insert(r, HwReg(i as u8));
        }
    }
    for (i, &r) in func.return_registers.iter().enumerate() {
        if (i as u8) >= config.num_hardware_registers {
            continue;
        }
        let want = HwReg(i as u8);
        let conflicts = graph.neighbors(r).any(|n| map.get(&n) == Some(&want));
        if !conflicts {
            map.entry(r).or_insert(want);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatha_ir::builder::FunctionBuilder;
    use scatha_ir::context::Context;
    use scatha_ir::ids::{LocalValue, Operand as IrOperand};
    use scatha_ir::module::Module as IrModule;

    #[test]
    fn identity_function_lowers_to_hardware_registers_throughout() {
        let mut ctx = Context::new();
        let mut module = IrModule::new();
        let i64_ty = ctx.int_type(64);
        let id = module.declare_function("id", vec![i64_ty], i64_ty);
        {
            let mut b = FunctionBuilder::new(module.function_mut(id));
            let entry = b.new_block(Some("entry".into()));
            b.set_current(entry);
            b.ret(&ctx, Some(IrOperand::Local(LocalValue::Param(0))));
            b.finish().unwrap();
        }

        let mm = lower_module(&ctx, &module, CodegenConfig::default());
        let f = mm.function(mm.find_function("id").unwrap());
        for inst in f.all_insts() {
            if let Some(d) = inst.dest {
                assert!(d.is_pinned(), "every destination register must be hardware-assigned after lowering");
            }
            for u in inst.used_registers() {
                assert!(u.is_pinned(), "every used register must be hardware-assigned after lowering");
            }
        }
    }
}
