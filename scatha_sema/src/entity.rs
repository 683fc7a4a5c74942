//! Entities recorded in the symbol table: variables, functions, structs and
//! their members. Grounded on `examples/original_source/include/scatha/Sema/EntityBase.h`
//! and `.../Sema/Entity.h` (`Variable`, `Function`, `StructType`), with
//! `AccessControl` attached per `determineAccessControl`
//! (`lib/Sema/Analysis/Utility.h`).

use crate::qual_type::{AccessControl, QualType, SymbolCategory, SymbolId, Type, TypeId};
use crate::scope::ScopeId;
use serde::{Deserialize, Serialize};

/// Fields every entity shares, mirroring the original's `EntityBase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityBase {
    pub name: String,
    pub id: SymbolId,
    pub scope: ScopeId,
    pub access: AccessControl,
}

/// A declared variable (local, global, or struct member).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub base: EntityBase,
    pub ty: QualType,
    pub is_global: bool,
    /// Byte offset within the enclosing struct, if this is a member.
    pub member_offset: Option<u64>,
}

/// Where a foreign function's implementation lives: a (library slot,
/// function index) pair resolved at assembly time (§4.8, §6). `None` for
/// native functions defined in this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignSlot {
    pub library_slot: u32,
    pub function_index: u32,
}

/// A declared or defined function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub base: EntityBase,
    pub params: Vec<QualType>,
    pub return_type: Type,
    pub foreign: Option<ForeignSlot>,
}

impl Function {
    pub fn is_foreign(&self) -> bool {
        self.foreign.is_some()
    }

    pub fn signature_matches(&self, param_types: &[Type]) -> bool {
        self.params.len() == param_types.len()
            && self.params.iter().zip(param_types).all(|(p, t)| p.get() == t)
    }
}

/// Set of overloaded functions sharing a name, mirroring `OverloadSet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverloadSet {
    pub base: EntityBase,
    pub functions: Vec<SymbolId>,
}

impl OverloadSet {
    /// Mirrors `findBySignature`: the overload whose parameter types exactly
    /// match `param_types`, if any.
    pub fn find_by_signature<'a>(
        &self,
        functions: impl Iterator<Item = &'a Function>,
        param_types: &[Type],
    ) -> Option<&'a Function> {
        functions.into_iter().find(|f| f.signature_matches(param_types))
    }
}

/// The lifetime-function role a member function fills, used to decide
/// whether a type has non-trivial lifetime (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifetimeRole {
    Constructor,
    CopyConstructor,
    MoveConstructor,
    Destructor,
}

/// A user-declared struct/record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructType {
    pub base: EntityBase,
    pub type_id: TypeId,
    pub members: Vec<SymbolId>,
    pub size: u64,
    pub align: u64,
    pub lifetime_functions: Vec<(LifetimeRole, SymbolId)>,
}

impl StructType {
    /// Non-trivial lifetime iff any constructor/destructor is user-declared,
    /// mirroring `nonTrivialLifetimeType`.
    pub fn has_non_trivial_lifetime(&self) -> bool {
        !self.lifetime_functions.is_empty()
    }

    /// Mirrors `isAggregate`: no user-defined lifetime functions and no
    /// member with access control stronger than the struct's own.
    pub fn is_aggregate(&self, members: impl Iterator<Item = AccessControl>) -> bool {
        !self.has_non_trivial_lifetime() && members.into_iter().all(|m| m <= self.base.access)
    }
}

/// Any symbol-table entity, dispatched by `SymbolCategory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entity {
    Variable(Variable),
    Function(Function),
    OverloadSet(OverloadSet),
    Struct(StructType),
}

impl Entity {
    pub fn base(&self) -> &EntityBase {
        match self {
            Entity::Variable(v) => &v.base,
            Entity::Function(f) => &f.base,
            Entity::OverloadSet(o) => &o.base,
            Entity::Struct(s) => &s.base,
        }
    }

    pub fn category(&self) -> SymbolCategory {
        match self {
            Entity::Variable(_) => SymbolCategory::Variable,
            Entity::Function(_) => SymbolCategory::Function,
            Entity::OverloadSet(_) => SymbolCategory::OverloadSet,
            Entity::Struct(_) => SymbolCategory::Type,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Entity::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Entity::Struct(s) => Some(s),
            _ => None,
        }
    }
}

/// Mirrors `determineAccessControlByContext`: absent an explicit
/// annotation, a declaration's access control defaults to `Public` at file
/// scope and `Private` everywhere nested (block/function/struct-body
/// locals cannot be more visible than the scope that holds them).
pub fn determine_access_control_by_context(kind: crate::scope::ScopeKind) -> AccessControl {
    use crate::scope::ScopeKind;
    match kind {
        ScopeKind::Global | ScopeKind::File => AccessControl::Public,
        ScopeKind::Struct => AccessControl::Public,
        ScopeKind::Function | ScopeKind::Block | ScopeKind::Object => AccessControl::Private,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKind;

    #[test]
    fn default_access_control_is_public_at_file_scope() {
        assert_eq!(determine_access_control_by_context(ScopeKind::File), AccessControl::Public);
        assert_eq!(determine_access_control_by_context(ScopeKind::Block), AccessControl::Private);
    }
}
