//! Data-section layout (spec §6 "Binary format": "data section" /
//! "zero-initialized + literal bytes"), grounded on
//! `examples/original_source/lib/IRGen/` global-lowering and `svm/Program.h`'s
//! `dataOffset`. Globals are laid out in declaration order, each naturally
//! aligned; an uninitialized (or zero) global contributes its size in
//! zeroed bytes, an initialized one contributes its constant's byte image.

use scatha_ir::context::{Constant, Context};
use scatha_ir::ids::GlobalId;
use scatha_ir::module::Module as IrModule;
use scatha_ir::types::Type;
use hashbrown::HashMap;

/// One global's placement within the assembled data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalLayout {
    pub offset: u64,
    pub size: u64,
}

/// The flattened data section plus a map from each live global to its
/// byte offset within it (consumed by `Lea`/`Load`/`Store` operands whose
/// `AddrBase::Global` still needs resolving to an absolute address).
#[derive(Debug, Clone, Default)]
pub struct DataSection {
    pub bytes: Vec<u8>,
    pub offsets: HashMap<GlobalId, GlobalLayout>,
}

pub fn build_data_section(ctx: &Context, ir: &IrModule) -> DataSection {
    let mut section = DataSection::default();
    let mut globals: Vec<_> = ir.live_globals().collect();
    globals.sort_by_key(|g| g.id);
    for global in globals {
        let size = ctx.size_of(global.pointee_ty);
        let align = ctx.align_of(global.pointee_ty).max(1);
        let offset = round_up(section.bytes.len() as u64, align);
        section.bytes.resize(offset as usize, 0);
        match global.initializer {
            Some(cid) => encode_constant(ctx, cid, &mut section.bytes),
            None => section.bytes.resize((offset + size) as usize, 0),
        }
        section.bytes.resize(section.bytes.len().max((offset + size) as usize), 0);
        section.offsets.insert(global.id, GlobalLayout { offset, size });
    }
    section
}

fn encode_constant(ctx: &Context, id: scatha_ir::ids::ConstantId, out: &mut Vec<u8>) {
    match ctx.constant(id).clone() {
        Constant::Integral { ty, value } => {
            let width = match ctx.type_of(ty) {
                Type::Int(w) => *w,
                _ => 64,
            };
            let bytes = (width as u32).div_ceil(8) as usize;
            out.extend_from_slice(&value.to_le_bytes()[..bytes.min(16)]);
        }
        Constant::Float { ty, bits } => match ctx.type_of(ty) {
            Type::Float(32) => out.extend_from_slice(&(bits as u32).to_le_bytes()),
            _ => out.extend_from_slice(&bits.to_le_bytes()),
        },
        Constant::NullPointer => out.extend_from_slice(&0u64.to_le_bytes()),
        Constant::Undef { ty } => out.resize(out.len() + ctx.size_of(ty) as usize, 0),
        Constant::RecordStruct { ty, fields } => {
            let struct_id = match ctx.type_of(ty) {
                Type::Struct(sid) => *sid,
                _ => unreachable!("RecordStruct constant must have a struct type"),
            };
            let layout = ctx.struct_layout(struct_id);
            let base = out.len();
            out.resize(base + layout.size as usize, 0);
            for (field, &offset) in fields.iter().zip(&layout.offsets) {
                let mut field_bytes = Vec::new();
                encode_constant(ctx, *field, &mut field_bytes);
                let at = base + offset as usize;
                out[at..at + field_bytes.len()].copy_from_slice(&field_bytes);
            }
        }
        Constant::RecordArray { elements, .. } => {
            for e in elements {
                encode_constant(ctx, e, out);
            }
        }
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialized_global_is_laid_out_with_its_byte_image() {
        let mut ctx = Context::new();
        let mut module = IrModule::new();
        let i64_ty = ctx.int_type(64);
        let init = ctx.const_int(i64_ty, 42);
        let g = module.declare_global("answer", i64_ty, Some(init), false);
        let section = build_data_section(&ctx, &module);
        let layout = section.offsets[&g];
        assert_eq!(layout.size, 8);
        assert_eq!(&section.bytes[layout.offset as usize..(layout.offset + 8) as usize], &42i64.to_le_bytes());
    }

    #[test]
    fn uninitialized_global_is_zero_filled() {
        let mut ctx = Context::new();
        let mut module = IrModule::new();
        let i32_ty = ctx.int_type(32);
        let g = module.declare_global("counter", i32_ty, None, true);
        let section = build_data_section(&ctx, &module);
        let layout = section.offsets[&g];
        assert_eq!(layout.size, 4);
        assert_eq!(&section.bytes[layout.offset as usize..(layout.offset + 4) as usize], &[0, 0, 0, 0]);
    }
}
