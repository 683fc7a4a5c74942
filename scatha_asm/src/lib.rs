//! Assembler, binary emitter and debug-info producer for the Scatha
//! compiler (spec §4.8 "Assembler", §4.9 "Debug-info producer", §6 "Binary
//! format"). Consumes a lowered `scatha_mir::Module` and the owning
//! `scatha_ir` context/module (for globals and FFI signatures) and
//! produces a binary ready for `Target::write_to_disk`.

pub mod assembler;
pub mod data;
pub mod debuginfo;
pub mod ffi;
pub mod header;
pub mod opcode;
pub mod target;

pub use assembler::{assemble, build_ffi_decls, AssembleError, AssembledOutput};
pub use data::{build_data_section, DataSection, GlobalLayout};
pub use debuginfo::DebugInfo;
pub use ffi::{FfiFunctionDecl, FfiLibraryDecl, FfiType};
pub use header::{HeaderError, ProgramHeader, HEADER_SIZE, MAGIC, VERSION};
pub use opcode::Opcode;
pub use target::{SymbolEntry, SymbolTable, Target};
