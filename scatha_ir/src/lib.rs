//! SSA IR, analyses, pass manager, optimizations and AST lowering for the
//! Scatha compiler core (spec §3, §4.1–§4.6).

pub mod analysis;
pub mod builder;
pub mod context;
pub mod ids;
pub mod instruction;
pub mod irgen;
pub mod irtext;
pub mod module;
pub mod optimizations;
pub mod pass;
pub mod types;

pub use builder::FunctionBuilder;
pub use context::{Constant, Context};
pub use ids::*;
pub use instruction::*;
pub use module::{BasicBlock, CallingConvention, Function, Global, Module};
pub use types::{StructLayout, Type};
