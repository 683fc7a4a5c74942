//! Pass manager: the pipeline-string parser (`pipeline.rs`), a registry of
//! self-registering named passes, and the function/module pass drivers
//! (spec §4.5).

pub mod pipeline;

use crate::context::Context;
use crate::module::{Function, Module};
use pipeline::{parse_pipeline, PipelineError, PipelineNode};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A pass's taxonomy, carried alongside its name for diagnostics/tooling
/// (spec §4.5: "a category (canonicalization, simplification, optimization,
/// schedule)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCategory {
    Canonicalization,
    Simplification,
    Optimization,
    Schedule,
}

/// `(Context, Function) -> bool`: runs on one function at a time, returns
/// whether it changed anything.
pub trait FunctionPass: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> PassCategory;
    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool;
}

/// `(Context, Module, FunctionPass) -> bool`: a whole-module transformation
/// that may additionally drive a composed function pass (its pipeline
/// children) over the functions it touches, e.g. `inline`'s children are
/// run on a callee before its body is copied into a caller.
pub trait ModulePass: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> PassCategory;
    fn run(&self, ctx: &mut Context, module: &mut Module, children: &ComposedFunctionPass) -> bool;
}

/// A function pass built by composing a pipeline node's children in order,
/// each run once per invocation (the node itself decides whether to loop
/// its composed children to a fixed point).
#[derive(Default)]
pub struct ComposedFunctionPass {
    stages: Vec<&'static dyn FunctionPass>,
}

impl ComposedFunctionPass {
    pub fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let mut changed = false;
        for stage in &self.stages {
            changed |= stage.run(ctx, func);
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

struct Registry {
    function_passes: HashMap<&'static str, &'static dyn FunctionPass>,
    module_passes: HashMap<&'static str, &'static dyn ModulePass>,
}

macro_rules! fp {
    ($map:expr, $names:expr, $pass:expr) => {{
        static PASS: &(dyn FunctionPass) = &$pass;
        for n in $names {
            $map.insert(n, PASS);
        }
    }};
}

macro_rules! mp {
    ($map:expr, $names:expr, $pass:expr) => {{
        static PASS: &(dyn ModulePass) = &$pass;
        for n in $names {
            $map.insert(n, PASS);
        }
    }};
}

/// Builds the frozen pass table: a static map built once at first use,
/// without relying on link-time `inventory`-style registration, which Rust
/// doesn't give us for free the way a C++ static initializer would.
fn build_registry() -> Registry {
    use crate::optimizations::*;

    let mut function_passes: HashMap<&'static str, &'static dyn FunctionPass> = HashMap::new();
    let mut module_passes: HashMap<&'static str, &'static dyn ModulePass> = HashMap::new();

    fp!(function_passes, ["unify-returns", "unifyreturns"], unify_returns::UnifyReturns);
    fp!(function_passes, ["split-returns", "splitreturns"], split_returns::SplitReturns);
    fp!(function_passes, ["split-critical-edges", "splitcriticaledges"], split_critical_edges::SplitCriticalEdges);
    fp!(function_passes, ["loop-canonicalize", "loopcanonicalize"], loop_canonicalize::LoopCanonicalize);
    fp!(function_passes, ["mem2reg"], mem2reg::Mem2Reg);
    fp!(function_passes, ["sroa"], sroa::Sroa);
    fp!(function_passes, ["gvn"], gvn::Gvn);
    fp!(function_passes, ["inst-combine", "instcombine"], inst_combine::InstCombine);
    fp!(function_passes, ["dce"], dce::Dce);
    fp!(function_passes, ["simplify-cfg", "simplifycfg"], simplify_cfg::SimplifyCfg);
    fp!(function_passes, ["tail-rec-elim", "tailrecelim", "tre"], tail_rec_elim::TailRecElim);

    mp!(module_passes, ["inline"], inline::Inline);
    mp!(module_passes, ["global-dce", "globaldce"], global_dce::GlobalDce);

    Registry { function_passes, module_passes }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

/// Thrown when a pipeline node names a pass the registry doesn't know, or
/// when a function-pass node is given children (which only module passes
/// accept).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassManagerError {
    #[error("{0}")]
    Parse(#[from] PipelineError),
    #[error("unknown pass name '{0}'")]
    UnknownPass(String),
    #[error("function pass '{0}' does not accept children")]
    UnexpectedChildren(String),
}

enum Stage {
    Function(&'static dyn FunctionPass),
    Module(&'static dyn ModulePass, ComposedFunctionPass),
}

fn compose(node: &PipelineNode) -> Result<ComposedFunctionPass, PassManagerError> {
    let mut stages = Vec::new();
    for child in &node.children {
        let resolved = resolve(child)?;
        match resolved {
            Stage::Function(p) => stages.push(p),
            Stage::Module(..) => return Err(PassManagerError::UnknownPass(format!("module pass '{}' cannot appear as a function-pass child", child.name))),
        }
    }
    Ok(ComposedFunctionPass { stages })
}

fn resolve(node: &PipelineNode) -> Result<Stage, PassManagerError> {
    let reg = registry();
    if let Some(&fp) = reg.function_passes.get(node.name.as_str()) {
        if !node.children.is_empty() {
            return Err(PassManagerError::UnexpectedChildren(node.name.clone()));
        }
        return Ok(Stage::Function(fp));
    }
    if let Some(&mp) = reg.module_passes.get(node.name.as_str()) {
        let children = compose(node)?;
        return Ok(Stage::Module(mp, children));
    }
    Err(PassManagerError::UnknownPass(node.name.clone()))
}

/// Drives a parsed (or freshly-parsed) pipeline over a module. Each
/// top-level sibling runs once, in textual order; function-pass siblings
/// apply to every function in the module.
pub struct PassManager {
    root: PipelineNode,
}

impl PassManager {
    pub fn parse(pipeline_text: &str) -> Result<Self, PassManagerError> {
        let root = parse_pipeline(pipeline_text)?;
        Ok(Self { root })
    }

    /// Runs every top-level stage once. Returns whether anything changed.
    pub fn run(&self, ctx: &mut Context, module: &mut Module) -> Result<bool, PassManagerError> {
        let mut changed = false;
        for node in &self.root.children {
            changed |= self.run_node(ctx, module, node)?;
        }
        Ok(changed)
    }

    /// Re-runs the whole pipeline until a fixed point (or a generous
    /// iteration cap, guarding against pathological oscillation) per spec
    /// §4.5 "fixed-point pipelines repeat until no change".
    pub fn run_to_fixpoint(&self, ctx: &mut Context, module: &mut Module) -> Result<(), PassManagerError> {
        const MAX_ITERS: u32 = 32;
        for i in 0..MAX_ITERS {
            log::debug!("pass manager: fixpoint iteration {i}");
            if !self.run(ctx, module)? {
                return Ok(());
            }
        }
        log::warn!("pass manager: pipeline did not reach a fixed point after {MAX_ITERS} iterations");
        Ok(())
    }

    fn run_node(&self, ctx: &mut Context, module: &mut Module, node: &PipelineNode) -> Result<bool, PassManagerError> {
        match resolve(node)? {
            Stage::Function(fp) => {
                log::info!("running function pass '{}'", fp.name());
                let mut changed = false;
                for func in module.functions.iter_mut() {
                    if func.is_declaration() {
                        continue;
                    }
                    if fp.run(ctx, func) {
                        changed = true;
                        func.invalidate_cfg_info();
                    }
                }
                Ok(changed)
            }
            Stage::Module(mp, children) => {
                log::info!("running module pass '{}'", mp.name());
                Ok(mp.run(ctx, module, &children))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn unknown_pass_name_is_reported() {
        let pm = PassManager::parse("not-a-real-pass").unwrap();
        let mut ctx = Context::new();
        let mut module = Module::new();
        let err = pm.run(&mut ctx, &mut module).unwrap_err();
        assert!(matches!(err, PassManagerError::UnknownPass(_)));
    }

    #[test]
    fn function_pass_child_on_a_function_pass_is_rejected() {
        let pm = PassManager::parse("dce(mem2reg)").unwrap();
        let mut ctx = Context::new();
        let mut module = Module::new();
        let err = pm.run(&mut ctx, &mut module).unwrap_err();
        assert!(matches!(err, PassManagerError::UnexpectedChildren(_)));
    }

    #[test]
    fn known_pipeline_runs_without_error_on_empty_module() {
        let pm = PassManager::parse("mem2reg, dce, simplify-cfg").unwrap();
        let mut ctx = Context::new();
        let mut module = Module::new();
        assert!(pm.run(&mut ctx, &mut module).is_ok());
    }
}
