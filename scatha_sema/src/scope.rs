//! Scope tree, grounded on
//! `examples/original_source/include/scatha/Sema/Scope.h` and the sibling
//! `ScopeKind` enum. Scopes don't own their children or symbols by value —
//! they hold ids into the owning `SymbolTable`'s arenas, same ownership
//! split as the original ("scopes don't own their child scopes, these
//! objects are owned by the symbol table").

use crate::qual_type::SymbolId;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// A dense index into `SymbolTable::scopes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl ScopeId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// What a scope represents, distinguishing the file scope the newer design
/// adds from the rest of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    File,
    Function,
    Block,
    Struct,
    Object,
}

/// A lexical scope: a name→symbol map plus child scopes, linked to its
/// parent. Parent/child links are `ScopeId`s rather than pointers since the
/// arena owns storage.
#[derive(Debug, Clone)]
pub struct Scope {
    kind: ScopeKind,
    symbol_id: SymbolId,
    parent: Option<ScopeId>,
    children: HashMap<SymbolId, ScopeId>,
    symbols: HashMap<String, SymbolId>,
}

impl Scope {
    pub fn new(kind: ScopeKind, symbol_id: SymbolId, parent: Option<ScopeId>) -> Self {
        Self { kind, symbol_id, parent, children: HashMap::new(), symbols: HashMap::new() }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn symbol_id(&self) -> SymbolId {
        self.symbol_id
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Looks up a name declared directly in this scope (not an ancestor).
    pub fn find_id(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get(name).copied()
    }

    pub fn is_child_scope(&self, id: SymbolId) -> bool {
        self.children.contains_key(&id)
    }

    pub fn children(&self) -> impl Iterator<Item = (&SymbolId, &ScopeId)> {
        self.children.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols.values().copied()
    }

    pub(crate) fn add_symbol(&mut self, name: String, id: SymbolId) {
        self.symbols.insert(name, id);
    }

    pub(crate) fn add_child_scope(&mut self, id: SymbolId, scope: ScopeId) {
        self.children.insert(id, scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qual_type::SymbolCategory;

    #[test]
    fn find_id_only_sees_direct_members() {
        let mut scope = Scope::new(ScopeKind::Block, SymbolId::new(0, SymbolCategory::Scope), None);
        let id = SymbolId::new(1, SymbolCategory::Variable);
        scope.add_symbol("x".into(), id);
        assert_eq!(scope.find_id("x"), Some(id));
        assert_eq!(scope.find_id("y"), None);
    }
}
