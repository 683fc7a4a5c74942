//! Resolved types, qualifiers and the dense symbol/type id scheme.
//!
//! Grounded on `examples/original_source/scatha/include/scatha/Sema/QualType.h`
//! (the newer revision, with `PointerBindMode`) and
//! `.../Sema/SymbolID.h`. The C++ original packs a type-tag into spare bits
//! of a 64-bit id; Rust has no equally ergonomic bitfield story, so the tag
//! is carried alongside the index as a separate byte instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of entity a [`SymbolId`] names, recoverable from the id alone
/// without consulting the symbol table — mirrors the original's packed
/// category nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolCategory {
    Variable,
    Function,
    OverloadSet,
    Type,
    Scope,
}

/// A dense index into the symbol table's entity arena, tagged with the
/// entity's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId {
    index: u32,
    category: SymbolCategory,
}

impl SymbolId {
    pub fn new(index: u32, category: SymbolCategory) -> Self {
        Self { index, category }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn category(self) -> SymbolCategory {
        self.category
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{:?}:{}", self.category, self.index)
    }
}

/// A dense index into the type arena. Distinct from `SymbolId` because
/// types are uniqued structurally (see [`crate::symbol_table::SymbolTable`])
/// rather than declared once like a variable or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Mutability qualifier of a `QualType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutability {
    Const,
    Mutable,
}

/// Whether a pointer/reference is bound to a fixed object (`Static`) or may
/// be rebound to point elsewhere dynamically (`Dynamic`). Mirrors the
/// original's `PointerBindMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerBindMode {
    Static,
    Dynamic,
}

/// Whether an expression names a location (`LValue`) or a transient value
/// (`RValue`), mirroring `refToLValue` in the original's analysis utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueCategory {
    LValue,
    RValue,
}

/// Visibility/access control of an entity relative to its declaring scope,
/// computed upstream by `determineAccessControl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessControl {
    Public,
    Internal,
    Private,
}

/// The resolved, structural shape of a type as produced by the semantic
/// analyzer. Distinct from `scatha_ir::Type`: this is the *source-level*
/// type (may still be a reference, may name a user struct by id); IR-gen
/// lowers it to an IR type using the ABI rules of §4.6.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    Int { width: u8, signed: bool },
    Float { width: u8 },
    Struct(TypeId),
    Array { element: Box<Type>, count: Option<u64> },
    Pointer(Box<QualType>),
    Reference(Box<QualType>),
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_))
    }

    /// Mirrors `getQualType`: unwraps a reference to its pointee, or returns
    /// `self` unchanged wrapped at the given mutability.
    pub fn strip_reference(&self, fallback_mut: Mutability) -> QualType {
        match self {
            Type::Reference(inner) => (**inner).clone(),
            other => QualType::new(other.clone(), fallback_mut, PointerBindMode::Static),
        }
    }
}

/// A type possibly qualified by mutability and pointer-bind-mode
/// qualifiers. Behaves like a thin, non-owning smart pointer around a
/// `Type` in the original; here it simply owns its `Type` since Rust's
/// arena story differs, but the qualifier shape is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualType {
    ty: Type,
    mutability: Mutability,
    bind_mode: PointerBindMode,
}

impl QualType {
    pub fn new(ty: Type, mutability: Mutability, bind_mode: PointerBindMode) -> Self {
        Self { ty, mutability, bind_mode }
    }

    pub fn constant(ty: Type) -> Self {
        Self::new(ty, Mutability::Const, PointerBindMode::Static)
    }

    pub fn mutable_(ty: Type) -> Self {
        Self::new(ty, Mutability::Mutable, PointerBindMode::Static)
    }

    pub fn get(&self) -> &Type {
        &self.ty
    }

    pub fn is_mut(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    pub fn is_const(&self) -> bool {
        self.mutability == Mutability::Const
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn is_dyn(&self) -> bool {
        self.bind_mode == PointerBindMode::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.bind_mode == PointerBindMode::Static
    }

    pub fn bind_mode(&self) -> PointerBindMode {
        self.bind_mode
    }

    pub fn to_mut(&self, mutability: Mutability) -> Self {
        Self::new(self.ty.clone(), mutability, self.bind_mode)
    }

    pub fn to_bind_mode(&self, bind_mode: PointerBindMode) -> Self {
        Self::new(self.ty.clone(), self.mutability, bind_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn symbol_id_roundtrips_category() {
        let id = SymbolId::new(7, SymbolCategory::Function);
        assert_eq!(id.index(), 7);
        assert_eq!(id.category(), SymbolCategory::Function);
    }

    #[test]
    fn strip_reference_unwraps_qualified_pointee() {
        let inner = QualType::new(Type::Int { width: 32, signed: true }, Mutability::Const, PointerBindMode::Static);
        let reference = Type::Reference(Box::new(inner.clone()));
        assert_eq!(reference.strip_reference(Mutability::Mutable), inner);
    }

    #[test]
    fn strip_reference_wraps_non_reference_with_fallback() {
        let ty = Type::Bool;
        let stripped = ty.strip_reference(Mutability::Mutable);
        assert_eq!(stripped.mutability(), Mutability::Mutable);
        assert_eq!(*stripped.get(), Type::Bool);
    }
}
