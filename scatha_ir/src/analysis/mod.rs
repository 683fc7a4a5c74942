//! Function analyses cached on the IR and invalidated by
//! `Function::invalidate_cfg_info`. Each analysis is computed
//! on demand and handed back as an owned value — callers who want caching
//! across passes hold onto the result themselves and recompute after any
//! CFG edit, so analyses are lazily re-derived on next access without
//! requiring `Function` to store `dyn Any` caches.

pub mod callgraph;
pub mod dominance;
pub mod liveness;
pub mod loop_nest;

pub use callgraph::CallGraph;
pub use dominance::DominatorTree;
pub use liveness::Liveness;
pub use loop_nest::LoopForest;
