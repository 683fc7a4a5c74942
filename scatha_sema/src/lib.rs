//! The fixed shape of the symbol table produced by the (out of scope)
//! semantic analyzer: entities, scopes, qualified types, access control.
//!
//! As with `scatha_ast`, this crate defines types only. `scatha_ir`'s IR
//! generator reads a `SymbolTable` plus the `scatha_ast` tree and produces
//! an IR module; nothing in this crate performs name resolution or type
//! checking itself — that happens upstream, out of scope for the core.

pub mod decoration;
pub mod entity;
pub mod qual_type;
pub mod scope;
pub mod symbol_table;

pub use decoration::{Decorations, ExprDecoration, NodeId};
pub use entity::*;
pub use qual_type::*;
pub use scope::*;
pub use symbol_table::*;
