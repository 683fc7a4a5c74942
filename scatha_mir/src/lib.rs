//! Machine IR: explicit registers, memory-address operands, selection-DAG
//! based instruction selection from `scatha_ir`, SSA destruction, register
//! allocation and the post-allocation cleanups jump elision and copy
//! coalescing depend on (spec §3 "MIR mirrors", §4.7).

pub mod coalesce;
pub mod codegen;
pub mod ids;
pub mod instruction;
pub mod interference;
pub mod jump_elision;
pub mod liveness;
pub mod module;
pub mod operand;
pub mod register;
pub mod select;
pub mod selection_dag;
pub mod ssa_destruction;

pub use codegen::{lower_module, CodegenConfig};
pub use ids::*;
pub use instruction::*;
pub use module::{CallingConvention, Function, Module, StackSlot};
pub use operand::{AddrBase, MemoryAddress, MirOperand};
pub use register::{HwReg, LiveInterval, Register};
