//! Whole-module call graph and its SCC decomposition, per spec §4.4, used
//! by the inliner (bottom-up SCC traversal) and global-DCE (reachability
//! from externally-visible roots).

use crate::ids::FunctionId;
use crate::instruction::{Callee, InstKind};
use crate::module::Module;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    /// Direct-call edges, self-recursion omitted (spec §4.4).
    edges: HashMap<FunctionId, HashSet<FunctionId>>,
}

impl CallGraph {
    pub fn build(module: &Module) -> Self {
        let mut edges: HashMap<FunctionId, HashSet<FunctionId>> = HashMap::new();
        for func in &module.functions {
            let entry = edges.entry(func.id).or_default();
            for inst in func.all_insts() {
                if let InstKind::Call { callee: Callee::Function(callee), .. } = &inst.kind {
                    if *callee != func.id {
                        entry.insert(*callee);
                    }
                }
            }
        }
        Self { edges }
    }

    pub fn callees(&self, f: FunctionId) -> impl Iterator<Item = FunctionId> + '_ {
        self.edges.get(&f).into_iter().flat_map(|s| s.iter().copied())
    }

    /// SCCs of the call graph, topologically ordered callee-first (so a
    /// bottom-up traversal — inline callees before callers — can simply
    /// iterate the result in order), via Tarjan's algorithm.
    pub fn compute_sccs(&self, module: &Module) -> Vec<Vec<FunctionId>> {
        struct State {
            index: HashMap<FunctionId, usize>,
            lowlink: HashMap<FunctionId, usize>,
            on_stack: HashSet<FunctionId>,
            stack: Vec<FunctionId>,
            next_index: usize,
            sccs: Vec<Vec<FunctionId>>,
        }

        fn strongconnect(v: FunctionId, graph: &CallGraph, s: &mut State) {
            s.index.insert(v, s.next_index);
            s.lowlink.insert(v, s.next_index);
            s.next_index += 1;
            s.stack.push(v);
            s.on_stack.insert(v);
            for w in graph.callees(v).collect::<Vec<_>>() {
                if !s.index.contains_key(&w) {
                    strongconnect(w, graph, s);
                    let wl = s.lowlink[&w];
                    let vl = s.lowlink[&v];
                    s.lowlink.insert(v, vl.min(wl));
                } else if s.on_stack.contains(&w) {
                    let wi = s.index[&w];
                    let vl = s.lowlink[&v];
                    s.lowlink.insert(v, vl.min(wi));
                }
            }
            if s.lowlink[&v] == s.index[&v] {
                let mut component = Vec::new();
                loop {
                    let w = s.stack.pop().unwrap();
                    s.on_stack.remove(&w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                s.sccs.push(component);
            }
        }

        let mut state = State { index: HashMap::new(), lowlink: HashMap::new(), on_stack: HashSet::new(), stack: Vec::new(), next_index: 0, sccs: Vec::new() };
        for func in &module.functions {
            if !state.index.contains_key(&func.id) {
                strongconnect(func.id, self, &mut state);
            }
        }
        state.sccs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ids::Operand;

    #[test]
    fn self_recursive_call_is_not_an_edge() {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let i64_ty = ctx.int_type(64);
        let f = module.declare_function("f", vec![i64_ty], i64_ty);
        let entry = module.function_mut(f).new_block(Some("entry".into()));
        module.function_mut(f).append(entry, InstKind::Call { callee: Callee::Function(f), args: vec![Operand::Local(crate::ids::LocalValue::Param(0))] }, i64_ty, None);
        module.function_mut(f).set_terminator(entry, InstKind::Return { value: None }, None, ctx.void_type());
        let cg = CallGraph::build(&module);
        assert_eq!(cg.callees(f).count(), 0);
    }
}
