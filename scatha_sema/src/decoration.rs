//! The map of AST decorations the semantic analyzer attaches to a parsed
//! tree (spec §1: "a map of AST decorations"), keyed by `scatha_ast::NodeId`.
//! IR-gen is the sole consumer inside this workspace: it never re-resolves a
//! name or re-derives a type, it only looks one up here.

use crate::qual_type::{QualType, SymbolId, ValueCategory};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub type NodeId = u32;

/// One expression's resolved type and value category, attached by the
/// analyzer to every `Expr` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprDecoration {
    pub ty: QualType,
    pub value_category: ValueCategory,
    /// The entity an `Identifier`/`Path` expression resolves to, or a
    /// `Call`'s resolved overload. `None` for expressions that don't name
    /// an entity (literals, arithmetic results, ...).
    pub symbol: Option<SymbolId>,
}

impl ExprDecoration {
    pub fn new(ty: QualType, value_category: ValueCategory) -> Self {
        Self { ty, value_category, symbol: None }
    }

    pub fn with_symbol(mut self, symbol: SymbolId) -> Self {
        self.symbol = Some(symbol);
        self
    }
}

/// Decorations for a whole program: one `ExprDecoration` per expression
/// node, plus the resolved entity behind every declaring `Item`/`Let`
/// binding. Produced in full by the (out-of-scope) analyzer before IR-gen
/// ever runs; never mutated downstream.
#[derive(Debug, Clone, Default)]
pub struct Decorations {
    exprs: HashMap<NodeId, ExprDecoration>,
    /// Resolves a declaring `Item` (function/struct/enum/const) to its
    /// symbol-table entity.
    items: HashMap<NodeId, SymbolId>,
    /// Resolves a `Let`'s identifier pattern (keyed by the `Pattern`
    /// node's id) to the local variable it declares.
    bindings: HashMap<NodeId, SymbolId>,
    /// Resolves a `Parameter`'s declaring `Function` item id plus index to
    /// the parameter's symbol, keyed by `(function_node, index)`.
    params: HashMap<(NodeId, u32), SymbolId>,
}

impl Decorations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decorate_expr(&mut self, node: NodeId, decoration: ExprDecoration) {
        self.exprs.insert(node, decoration);
    }

    pub fn expr(&self, node: NodeId) -> &ExprDecoration {
        self.exprs.get(&node).unwrap_or_else(|| panic!("expr node {node} was never decorated by the analyzer"))
    }

    pub fn decorate_item(&mut self, node: NodeId, symbol: SymbolId) {
        self.items.insert(node, symbol);
    }

    pub fn item(&self, node: NodeId) -> SymbolId {
        *self.items.get(&node).unwrap_or_else(|| panic!("item node {node} was never decorated by the analyzer"))
    }

    pub fn decorate_binding(&mut self, pattern_node: NodeId, symbol: SymbolId) {
        self.bindings.insert(pattern_node, symbol);
    }

    pub fn binding(&self, pattern_node: NodeId) -> SymbolId {
        *self.bindings.get(&pattern_node).unwrap_or_else(|| panic!("pattern node {pattern_node} was never decorated by the analyzer"))
    }

    pub fn decorate_param(&mut self, function_node: NodeId, index: u32, symbol: SymbolId) {
        self.params.insert((function_node, index), symbol);
    }

    pub fn param(&self, function_node: NodeId, index: u32) -> SymbolId {
        *self
            .params
            .get(&(function_node, index))
            .unwrap_or_else(|| panic!("parameter {index} of function node {function_node} was never decorated by the analyzer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qual_type::{Mutability, PointerBindMode, SymbolCategory, Type};

    #[test]
    fn undecorated_expr_panics_rather_than_silently_defaulting() {
        let decorations = Decorations::new();
        let result = std::panic::catch_unwind(|| decorations.expr(0));
        assert!(result.is_err());
    }

    #[test]
    fn decorated_expr_round_trips() {
        let mut decorations = Decorations::new();
        let ty = QualType::new(Type::Bool, Mutability::Const, PointerBindMode::Static);
        decorations.decorate_expr(5, ExprDecoration::new(ty.clone(), ValueCategory::RValue));
        assert_eq!(decorations.expr(5).ty, ty);
        let _ = SymbolCategory::Variable;
    }
}
