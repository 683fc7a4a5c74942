//! The symbol table itself: owns every `Scope` and `Entity`, mirroring
//! `examples/original_source/include/scatha/Sema/SymbolTable.h`'s ownership
//! split ("scopes don't own their child scopes, these objects are owned by
//! the symbol table").

use crate::entity::{Entity, EntityBase, Function, StructType, Variable};
use crate::qual_type::{AccessControl, SymbolCategory, SymbolId};
use crate::scope::{Scope, ScopeId, ScopeKind};
use hashbrown::HashMap;

/// Owns the full scope tree and entity arena produced by the (out of
/// scope) semantic analyzer. `scatha_ir`'s IR generator is the sole
/// consumer inside this workspace.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    entities: Vec<Entity>,
    global_scope: ScopeId,
    current_scope: ScopeId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let global_scope_symbol = SymbolId::new(0, SymbolCategory::Scope);
        let global = Scope::new(ScopeKind::Global, global_scope_symbol, None);
        Self { scopes: vec![global], entities: Vec::new(), global_scope: ScopeId::new(0), current_scope: ScopeId::new(0) }
    }

    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index() as usize]
    }

    pub fn entity(&self, id: SymbolId) -> &Entity {
        &self.entities[id.index() as usize]
    }

    /// Pushes a new child scope of `current_scope` and makes it current,
    /// returning its id. Mirrors the analyzer's `pushScope`.
    pub fn push_scope(&mut self, kind: ScopeKind, name: impl Into<String>) -> ScopeId {
        let parent = self.current_scope;
        let scope_symbol = SymbolId::new(self.scopes.len() as u32, SymbolCategory::Scope);
        let scope = Scope::new(kind, scope_symbol, Some(parent));
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(scope);
        self.scopes[parent.index() as usize].add_symbol(name.into(), scope_symbol);
        self.current_scope = id;
        id
    }

    /// Mirrors `popScope`: returns to the parent scope. No-op at global
    /// scope, which has no parent.
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current_scope.index() as usize].parent() {
            self.current_scope = parent;
        }
    }

    fn declare(&mut self, name: String, category: SymbolCategory, make: impl FnOnce(SymbolId, ScopeId, AccessControl) -> Entity) -> SymbolId {
        let scope = self.current_scope;
        let access = crate::entity::determine_access_control_by_context(self.scopes[scope.index() as usize].kind());
        let id = SymbolId::new(self.entities.len() as u32, category);
        let entity = make(id, scope, access);
        self.entities.push(entity);
        self.scopes[scope.index() as usize].add_symbol(name, id);
        id
    }

    pub fn declare_variable(&mut self, name: impl Into<String>, ty: crate::qual_type::QualType, is_global: bool) -> SymbolId {
        let name = name.into();
        self.declare(name.clone(), SymbolCategory::Variable, |id, scope, access| {
            Entity::Variable(Variable {
                base: EntityBase { name, id, scope, access },
                ty,
                is_global,
                member_offset: None,
            })
        })
    }

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<crate::qual_type::QualType>,
        return_type: crate::qual_type::Type,
        foreign: Option<crate::entity::ForeignSlot>,
    ) -> SymbolId {
        let name = name.into();
        self.declare(name.clone(), SymbolCategory::Function, |id, scope, access| {
            Entity::Function(Function { base: EntityBase { name, id, scope, access }, params, return_type, foreign })
        })
    }

    pub fn declare_struct(
        &mut self,
        name: impl Into<String>,
        type_id: crate::qual_type::TypeId,
        members: Vec<SymbolId>,
        size: u64,
        align: u64,
        lifetime_functions: Vec<(crate::entity::LifetimeRole, SymbolId)>,
    ) -> SymbolId {
        let name = name.into();
        self.declare(name.clone(), SymbolCategory::Type, |id, scope, access| {
            Entity::Struct(StructType { base: EntityBase { name, id, scope, access }, type_id, members, size, align, lifetime_functions })
        })
    }

    /// Walks from `scope` up through its ancestors looking for `name`,
    /// mirroring unqualified lookup.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            let scope_ref = &self.scopes[s.index() as usize];
            if let Some(id) = scope_ref.find_id(name) {
                return Some(id);
            }
            current = scope_ref.parent();
        }
        None
    }

    /// Unqualified lookup starting at the current scope.
    pub fn lookup_current(&self, name: &str) -> Option<SymbolId> {
        self.lookup(self.current_scope, name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// All entities declared directly in `scope` (mirrors `Scope::symbols`
    /// resolved against the table).
    pub fn entities_in_scope(&self, scope: ScopeId) -> impl Iterator<Item = &Entity> + '_ {
        self.scopes[scope.index() as usize].symbols().map(move |id| self.entity(id))
    }

    /// Collects the full name→id map of entities visible from `scope`
    /// (own scope shadows ancestors), useful for IR-gen's declaration
    /// phase walk.
    pub fn visible_names(&self, scope: ScopeId) -> HashMap<String, SymbolId> {
        let mut map = HashMap::new();
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            chain.push(s);
            current = self.scopes[s.index() as usize].parent();
        }
        for s in chain.into_iter().rev() {
            for id in self.scopes[s.index() as usize].symbols() {
                let name = self.entity(id).base().name.clone();
                map.insert(name, id);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qual_type::{Mutability, PointerBindMode, QualType, Type};

    #[test]
    fn lookup_walks_up_to_global_scope() {
        let mut table = SymbolTable::new();
        let global_var = table.declare_variable(
            "g",
            QualType::new(Type::Int { width: 64, signed: true }, Mutability::Mutable, PointerBindMode::Static),
            true,
        );
        table.push_scope(ScopeKind::Function, "f");
        assert_eq!(table.lookup_current("g"), Some(global_var));
        assert_eq!(table.lookup_current("missing"), None);
    }

    #[test]
    fn pop_scope_restores_parent() {
        let mut table = SymbolTable::new();
        let global = table.current_scope();
        table.push_scope(ScopeKind::Function, "f");
        assert_ne!(table.current_scope(), global);
        table.pop_scope();
        assert_eq!(table.current_scope(), global);
    }

    #[test]
    fn nested_scope_shadows_outer_declaration() {
        let mut table = SymbolTable::new();
        table.declare_variable(
            "x",
            QualType::new(Type::Bool, Mutability::Mutable, PointerBindMode::Static),
            true,
        );
        table.push_scope(ScopeKind::Block, "b");
        let inner = table.declare_variable(
            "x",
            QualType::new(Type::Bool, Mutability::Const, PointerBindMode::Static),
            false,
        );
        assert_eq!(table.lookup_current("x"), Some(inner));
    }
}
