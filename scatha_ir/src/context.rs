//! Type/constant context: owns every uniqued type, struct layout and
//! constant with program lifetime, per spec §4.1. `get-or-create` semantics
//! only — callers never construct a `TypeId`/`ConstantId` directly.

use crate::ids::{ConstantId, StructId, TypeId};
use crate::types::{compute_struct_layout, StructLayout, Type};
use hashbrown::HashMap;

/// A uniqued constant value, keyed structurally by `(type, bit-pattern)`.
///
/// Integers and floats are stored as fixed-width host integers/doubles
/// rather than true arbitrary-precision `APInt`/`APFloat` values — widths
/// here never exceed 64 bits (spec §3: `iN` for `1..=64`, `fN` for `32|64`),
/// so `i128`/`f64` losslessly represent every representable bit pattern
/// without the bias a narrower host type would introduce.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integral { ty: TypeId, value: i128 },
    Float { ty: TypeId, bits: u64 },
    NullPointer,
    Undef { ty: TypeId },
    RecordStruct { ty: TypeId, fields: Vec<ConstantId> },
    RecordArray { ty: TypeId, elements: Vec<ConstantId> },
}

impl Constant {
    pub fn type_of(&self, ctx: &Context) -> TypeId {
        match self {
            Constant::Integral { ty, .. } => *ty,
            Constant::Float { ty, .. } => *ty,
            Constant::NullPointer => ctx.ptr_type(),
            Constant::Undef { ty } => *ty,
            Constant::RecordStruct { ty, .. } => *ty,
            Constant::RecordArray { ty, .. } => *ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Integral(TypeId, i128),
    Float(TypeId, u64),
    NullPointer,
    Undef(TypeId),
    RecordStruct(TypeId, Vec<ConstantId>),
    RecordArray(TypeId, Vec<ConstantId>),
}

/// Owns every type, struct layout, constant and string literal with
/// program lifetime. One `Context` per compilation; never shared across
/// compilations (spec §5: IR values are never shared across `Context`s).
#[derive(Debug, Default)]
pub struct Context {
    types: Vec<Type>,
    type_cache: HashMap<Type, TypeId>,
    structs: Vec<StructLayout>,
    struct_cache: HashMap<(Option<String>, Vec<TypeId>), StructId>,
    constants: Vec<Constant>,
    constant_cache: HashMap<ConstantKey, ConstantId>,
    string_cache: HashMap<String, ConstantId>,
    void_ty: Option<TypeId>,
    ptr_ty: Option<TypeId>,
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Self::default();
        ctx.void_ty = Some(ctx.intern(Type::Void));
        ctx.ptr_ty = Some(ctx.intern(Type::Ptr));
        ctx
    }

    fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.type_cache.get(&ty) {
            return id;
        }
        let id = TypeId::new(self.types.len() as u32);
        self.type_cache.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn void_type(&self) -> TypeId {
        self.void_ty.expect("Context::new initializes void_ty")
    }

    pub fn ptr_type(&self) -> TypeId {
        self.ptr_ty.expect("Context::new initializes ptr_ty")
    }

    pub fn int_type(&mut self, width: u8) -> TypeId {
        assert!((1..=64).contains(&width), "integer width must be 1..=64, got {width}");
        self.intern(Type::Int(width))
    }

    pub fn float_type(&mut self, width: u8) -> TypeId {
        assert!(width == 32 || width == 64, "float width must be 32 or 64, got {width}");
        self.intern(Type::Float(width))
    }

    pub fn array_type(&mut self, element: TypeId, count: u64) -> TypeId {
        self.intern(Type::Array { element, count })
    }

    pub fn function_type(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Type::Function { ret, params })
    }

    /// Interns an (anonymous or named) struct type, computing its layout by
    /// natural alignment (§4.1). Keyed structurally by `(name, member
    /// TypeIds)` before any `StructId` is allocated, so two calls describing
    /// the same anonymous shape (or the same named one) unify to one
    /// `StructId`/`TypeId` rather than each minting a fresh layout.
    pub fn struct_type(&mut self, name: Option<String>, members: Vec<TypeId>) -> TypeId {
        let key = (name.clone(), members.clone());
        if let Some(&struct_id) = self.struct_cache.get(&key) {
            return self.intern(Type::Struct(struct_id));
        }
        let layout = compute_struct_layout(name, members, |id| {
            let ty = &self.types[id.index()];
            self.size_align_of_type(ty)
        });
        let struct_id = StructId::new(self.structs.len() as u32);
        self.structs.push(layout);
        self.struct_cache.insert(key, struct_id);
        self.intern(Type::Struct(struct_id))
    }

    fn size_align_of_type(&self, ty: &Type) -> (u64, u64) {
        match ty {
            Type::Void => (0, 1),
            Type::Ptr => (8, 8),
            Type::Int(w) => (((*w as u64) + 7) / 8, int_align(*w)),
            Type::Float(w) => ((*w as u64) / 8, (*w as u64) / 8),
            Type::Struct(id) => {
                let layout = &self.structs[id.index()];
                (layout.size, layout.align)
            }
            Type::Array { element, count } => {
                let (e_size, e_align) = self.size_align_of_type(&self.types[element.index()]);
                (e_size * count, e_align)
            }
            Type::Function { .. } => (8, 8),
        }
    }

    pub fn type_of(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn struct_layout(&self, id: StructId) -> &StructLayout {
        &self.structs[id.index()]
    }

    pub fn size_of(&self, id: TypeId) -> u64 {
        self.size_align_of_type(&self.types[id.index()]).0
    }

    pub fn align_of(&self, id: TypeId) -> u64 {
        self.size_align_of_type(&self.types[id.index()]).1
    }

    fn intern_constant(&mut self, key: ConstantKey, value: Constant) -> ConstantId {
        if let Some(&id) = self.constant_cache.get(&key) {
            return id;
        }
        let id = ConstantId::new(self.constants.len() as u32);
        self.constant_cache.insert(key, id);
        self.constants.push(value);
        id
    }

    pub fn const_int(&mut self, ty: TypeId, value: i128) -> ConstantId {
        self.intern_constant(ConstantKey::Integral(ty, value), Constant::Integral { ty, value })
    }

    pub fn const_float(&mut self, ty: TypeId, value: f64) -> ConstantId {
        let bits = value.to_bits();
        self.intern_constant(ConstantKey::Float(ty, bits), Constant::Float { ty, bits })
    }

    pub fn const_null(&mut self) -> ConstantId {
        self.intern_constant(ConstantKey::NullPointer, Constant::NullPointer)
    }

    pub fn const_undef(&mut self, ty: TypeId) -> ConstantId {
        self.intern_constant(ConstantKey::Undef(ty), Constant::Undef { ty })
    }

    pub fn const_struct(&mut self, ty: TypeId, fields: Vec<ConstantId>) -> ConstantId {
        self.intern_constant(ConstantKey::RecordStruct(ty, fields.clone()), Constant::RecordStruct { ty, fields })
    }

    pub fn const_array(&mut self, ty: TypeId, elements: Vec<ConstantId>) -> ConstantId {
        self.intern_constant(ConstantKey::RecordArray(ty, elements.clone()), Constant::RecordArray { ty, elements })
    }

    /// Returns an `ArrayConstant` of `i8` for the given string literal,
    /// reusing a previously-created constant for the same text.
    pub fn string_literal(&mut self, text: &str) -> ConstantId {
        if let Some(&id) = self.string_cache.get(text) {
            return id;
        }
        let i8_ty = self.int_type(8);
        let array_ty = self.array_type(i8_ty, text.len() as u64);
        let bytes: Vec<ConstantId> = text.bytes().map(|b| self.const_int(i8_ty, b as i128)).collect();
        let id = self.const_array(array_ty, bytes);
        self.string_cache.insert(text.to_owned(), id);
        id
    }

    pub fn constant(&self, id: ConstantId) -> &Constant {
        &self.constants[id.index()]
    }

    /// Removes constants with zero users, driven after dead-code
    /// elimination (§4.1). Takes the live set as computed by the caller
    /// (typically `global-dce`, which already walks every function body).
    pub fn clean_constants(&mut self, live: &hashbrown::HashSet<ConstantId>) {
        // Constants are append-only uniqued storage; "removal" here means
        // dropping them from the interning caches so they can no longer be
        // looked up, not compacting the arena (which would invalidate ids
        // held elsewhere). The sweep is driven by, not blocking, later passes.
        self.constant_cache.retain(|_, id| live.contains(id));
        self.string_cache.retain(|_, id| live.contains(id));
    }
}

fn int_align(width: u8) -> u64 {
    (((width as u64) + 7) / 8).next_power_of_two().min(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, 1)]
    #[case(8, 1, 1)]
    #[case(16, 2, 2)]
    #[case(32, 4, 4)]
    #[case(33, 5, 8)]
    #[case(64, 8, 8)]
    fn int_type_size_and_align(#[case] width: u8, #[case] expected_size: u64, #[case] expected_align: u64) {
        let mut ctx = Context::new();
        let ty = ctx.int_type(width);
        assert_eq!(ctx.size_of(ty), expected_size);
        assert_eq!(ctx.align_of(ty), expected_align);
    }

    #[rstest]
    #[case(32, 4, 4)]
    #[case(64, 8, 8)]
    fn float_type_size_and_align(#[case] width: u8, #[case] expected_size: u64, #[case] expected_align: u64) {
        let mut ctx = Context::new();
        let ty = ctx.float_type(width);
        assert_eq!(ctx.size_of(ty), expected_size);
        assert_eq!(ctx.align_of(ty), expected_align);
    }

    #[test]
    fn identical_struct_shapes_unify_to_one_type_id() {
        let mut ctx = Context::new();
        let i32_ty = ctx.int_type(32);
        let a = ctx.struct_type(None, vec![i32_ty, i32_ty]);
        let b = ctx.struct_type(None, vec![i32_ty, i32_ty]);
        assert_eq!(a, b, "structurally identical anonymous structs must unique to the same TypeId");
    }

    #[test]
    fn const_int_is_uniqued_by_type_and_bit_pattern() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let a = ctx.const_int(i64_ty, 42);
        let b = ctx.const_int(i64_ty, 42);
        assert_eq!(a, b);
        let c = ctx.const_int(i64_ty, 43);
        assert_ne!(a, c);
    }

    #[test]
    fn string_literal_is_cached() {
        let mut ctx = Context::new();
        let a = ctx.string_literal("hi");
        let b = ctx.string_literal("hi");
        assert_eq!(a, b);
    }
}
