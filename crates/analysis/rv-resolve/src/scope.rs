//! Scope tree for textual macro visibility

use crate::config::Precedence;
use rustc_hash::FxHashSet;
use rv_intern::Symbol;
use rv_macro::MacroId;
use rv_span::Span;

/// Unique identifier for a scope
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct ScopeId(pub u32);

/// Kind of scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Whole source file (root)
    File,
    /// Inline module (`mod name { ... }`)
    Module,
    /// Function body
    Function,
    /// Block scope (inside { })
    Block,
}

/// Something declared directly in a scope, keyed by source offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeItem {
    /// A macro definition
    Definition {
        /// Definition id
        id: MacroId,
        /// Macro name
        name: Symbol,
        /// Offset of the definition
        offset: u32,
    },
    /// A nested scope
    Child {
        /// Child scope id
        scope: ScopeId,
        /// Offset of the child
        offset: u32,
    },
}

impl ScopeItem {
    /// Source offset the item is declared at
    #[must_use]
    pub const fn offset(&self) -> u32 {
        match self {
            Self::Definition { offset, .. } | Self::Child { offset, .. } => *offset,
        }
    }
}

/// A single scope in the scope tree
#[derive(Debug, Clone)]
pub struct Scope {
    /// Parent scope (None for the file scope)
    pub parent: Option<ScopeId>,
    /// Kind of scope
    pub kind: ScopeKind,
    /// Module name, if this is a module
    pub name: Option<Symbol>,
    /// Whether the module exports its macros to the parent (`#[macro_use]`)
    pub exported: bool,
    /// Offset of this scope's declaration in its parent
    pub offset: u32,
    /// Source range covered by the scope
    pub span: Span,
    /// Items in offset order
    pub items: Vec<ScopeItem>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, kind: ScopeKind, offset: u32, span: Span) -> Self {
        Self {
            parent,
            kind,
            name: None,
            exported: false,
            offset,
            span,
            items: Vec::new(),
        }
    }

    fn insert(&mut self, item: ScopeItem) {
        let index = self
            .items
            .partition_point(|existing| existing.offset() <= item.offset());
        self.items.insert(index, item);
    }
}

/// A position to resolve macros from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseSite {
    /// Innermost scope containing the position
    pub scope: ScopeId,
    /// Source offset
    pub offset: u32,
}

impl UseSite {
    /// Creates a use site
    #[must_use]
    pub const fn new(scope: ScopeId, offset: u32) -> Self {
        Self { scope, offset }
    }
}

/// Scope tree for macro resolution
///
/// Scopes link to their parents by id; the tree owns every scope.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    /// All scopes in the tree
    scopes: Vec<Scope>,
    /// File-level (root) scope
    pub file_scope: ScopeId,
}

impl ScopeTree {
    /// Create a new scope tree covering `span` with a file scope
    #[must_use]
    pub fn new(span: Span) -> Self {
        Self {
            scopes: vec![Scope::new(None, ScopeKind::File, span.start, span)],
            file_scope: ScopeId(0),
        }
    }

    /// Create a child scope declared at `offset` in `parent`
    pub fn create_child(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        offset: u32,
        span: Span,
    ) -> ScopeId {
        let scope_id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(Some(parent), kind, offset, span));
        self.scopes[parent.0 as usize].insert(ScopeItem::Child {
            scope: scope_id,
            offset,
        });
        scope_id
    }

    /// Create a named module scope, optionally exporting its macros
    pub fn create_module(
        &mut self,
        parent: ScopeId,
        name: Symbol,
        exported: bool,
        offset: u32,
        span: Span,
    ) -> ScopeId {
        let scope_id = self.create_child(parent, ScopeKind::Module, offset, span);
        let scope = &mut self.scopes[scope_id.0 as usize];
        scope.name = Some(name);
        scope.exported = exported;
        scope_id
    }

    /// Declare a macro definition at `offset` in `scope`
    pub fn define(&mut self, scope: ScopeId, id: MacroId, name: Symbol, offset: u32) {
        self.scopes[scope.0 as usize].insert(ScopeItem::Definition { id, name, offset });
    }

    /// Get a scope by ID
    #[must_use]
    pub fn get_scope(&self, scope: ScopeId) -> &Scope {
        &self.scopes[scope.0 as usize]
    }

    /// Number of scopes
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the tree has only its file scope
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.len() <= 1
    }

    /// Innermost scope whose span contains `offset`
    #[must_use]
    pub fn scope_at(&self, offset: u32) -> ScopeId {
        let mut current = self.file_scope;
        loop {
            let inner = self.get_scope(current).items.iter().find_map(|item| match *item {
                ScopeItem::Child { scope, .. } if self.get_scope(scope).span.contains(offset) => {
                    Some(scope)
                }
                _ => None,
            });
            match inner {
                Some(scope) => current = scope,
                None => return current,
            }
        }
    }

    /// Definitions visible at `site`, closest scope first, then declaration order
    #[must_use]
    pub fn visible_definitions(&self, site: UseSite) -> Vec<MacroId> {
        self.visible_definitions_ordered(site, Precedence::FirstMatch)
    }

    /// Visible definitions named `name`, in candidate order
    #[must_use]
    pub fn visible_definitions_named(
        &self,
        site: UseSite,
        name: Symbol,
        precedence: Precedence,
    ) -> Vec<MacroId> {
        self.visible_items(site, precedence)
            .into_iter()
            .filter(|&(_, item_name)| item_name == name)
            .map(|(id, _)| id)
            .collect()
    }

    /// Names of every visible definition, without duplicates
    #[must_use]
    pub fn visible_names(&self, site: UseSite) -> Vec<Symbol> {
        let mut seen = FxHashSet::default();
        self.visible_items(site, Precedence::FirstMatch)
            .into_iter()
            .map(|(_, name)| name)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Visible definitions at `site` in the order `precedence` prescribes
    ///
    /// Scopes are always visited closest first. Within a scope,
    /// [`Precedence::FirstMatch`] keeps declaration order and
    /// [`Precedence::Closest`] puts the textually nearest definition first.
    #[must_use]
    pub fn visible_definitions_ordered(
        &self,
        site: UseSite,
        precedence: Precedence,
    ) -> Vec<MacroId> {
        self.visible_items(site, precedence)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Every definition named `name`, visible or not
    #[must_use]
    pub fn definitions_named(&self, name: Symbol) -> Vec<MacroId> {
        self.scopes
            .iter()
            .flat_map(|scope| &scope.items)
            .filter_map(|item| match *item {
                ScopeItem::Definition { id, name: item_name, .. } if item_name == name => Some(id),
                _ => None,
            })
            .collect()
    }

    fn visible_items(&self, site: UseSite, precedence: Precedence) -> Vec<(MacroId, Symbol)> {
        let mut out = Vec::new();
        let mut current_scope = site.scope;
        let mut position = site.offset;

        loop {
            let scope_data = self.get_scope(current_scope);
            // One group per scope item; an exported module contributes its
            // definitions as a single group in their declaration order
            let mut groups = Vec::new();
            for item in scope_data.items.iter().take_while(|item| item.offset() < position) {
                let mut group = Vec::new();
                match *item {
                    ScopeItem::Definition { id, name, .. } => group.push((id, name)),
                    ScopeItem::Child { scope, .. } => self.collect_exported(scope, &mut group),
                }
                groups.push(group);
            }
            if precedence == Precedence::Closest {
                groups.reverse();
            }
            let before = out.len();
            out.extend(groups.into_iter().flatten());
            tracing::trace!(
                scope = current_scope.0,
                position,
                found = out.len() - before,
                "visibility walk"
            );

            // Walk up to parent scope
            let Some(parent) = scope_data.parent else {
                break;
            };
            position = scope_data.offset;
            current_scope = parent;
        }
        out
    }

    /// Definitions an exported module makes visible to its parent
    fn collect_exported(&self, module: ScopeId, out: &mut Vec<(MacroId, Symbol)>) {
        let scope_data = self.get_scope(module);
        if scope_data.kind != ScopeKind::Module || !scope_data.exported {
            return;
        }
        for item in &scope_data.items {
            match *item {
                ScopeItem::Definition { id, name, .. } => out.push((id, name)),
                ScopeItem::Child { scope, .. } => self.collect_exported(scope, out),
            }
        }
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new(Span::new(0, u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_intern::Interner;

    struct Fixture {
        tree: ScopeTree,
        foo: Symbol,
        bar: Symbol,
        interner: Interner,
    }

    fn fixture() -> Fixture {
        let interner = Interner::new();
        Fixture {
            tree: ScopeTree::new(Span::new(0, 1000)),
            foo: interner.intern("foo"),
            bar: interner.intern("bar"),
            interner,
        }
    }

    #[test]
    fn test_definition_visible_only_after_declaration() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        fx.tree.define(root, MacroId(0), fx.foo, 10);

        assert!(fx.tree.visible_definitions(UseSite::new(root, 5)).is_empty());
        assert_eq!(fx.tree.visible_definitions(UseSite::new(root, 20)), vec![MacroId(0)]);
    }

    #[test]
    fn test_inner_module_is_invisible_without_export() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        let outer = fx.tree.create_module(root, fx.interner.intern("m"), true, 0, Span::new(0, 100));
        let inner = fx.tree.create_module(outer, fx.interner.intern("inner"), false, 10, Span::new(10, 50));
        fx.tree.define(inner, MacroId(0), fx.foo, 20);

        assert!(fx.tree.visible_definitions(UseSite::new(root, 200)).is_empty());
        assert!(fx.tree.visible_definitions(UseSite::new(outer, 60)).is_empty());
        assert_eq!(fx.tree.visible_definitions(UseSite::new(inner, 30)), vec![MacroId(0)]);
    }

    #[test]
    fn test_exported_modules_contribute_recursively() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        let outer = fx.tree.create_module(root, fx.interner.intern("a"), true, 0, Span::new(0, 100));
        fx.tree.define(outer, MacroId(0), fx.foo, 5);
        let inner = fx.tree.create_module(outer, fx.interner.intern("b"), true, 10, Span::new(10, 50));
        fx.tree.define(inner, MacroId(1), fx.bar, 20);

        assert_eq!(
            fx.tree.visible_definitions(UseSite::new(root, 200)),
            vec![MacroId(0), MacroId(1)]
        );
        // Exported module declared after the use site contributes nothing
        assert!(fx.tree.visible_definitions(UseSite::new(root, 0)).is_empty());
    }

    #[test]
    fn test_function_scope_never_exports() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        let function = fx.tree.create_child(root, ScopeKind::Function, 0, Span::new(0, 100));
        fx.tree.define(function, MacroId(0), fx.foo, 10);

        assert!(fx.tree.visible_definitions(UseSite::new(root, 200)).is_empty());
        assert_eq!(fx.tree.visible_definitions(UseSite::new(function, 50)), vec![MacroId(0)]);
    }

    #[test]
    fn test_no_forward_reference_across_scope_boundary() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        let function = fx.tree.create_child(root, ScopeKind::Function, 0, Span::new(0, 100));
        fx.tree.define(root, MacroId(0), fx.foo, 150);

        assert!(fx.tree.visible_definitions(UseSite::new(function, 50)).is_empty());
    }

    #[test]
    fn test_closest_scope_first() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        fx.tree.define(root, MacroId(0), fx.foo, 0);
        let function = fx.tree.create_child(root, ScopeKind::Function, 10, Span::new(10, 100));
        fx.tree.define(function, MacroId(1), fx.foo, 20);
        fx.tree.define(function, MacroId(2), fx.foo, 30);

        let site = UseSite::new(function, 50);
        assert_eq!(
            fx.tree.visible_definitions(site),
            vec![MacroId(1), MacroId(2), MacroId(0)]
        );
        assert_eq!(
            fx.tree.visible_definitions_named(site, fx.foo, Precedence::Closest),
            vec![MacroId(2), MacroId(1), MacroId(0)]
        );
        assert!(fx.tree.visible_definitions_named(site, fx.bar, Precedence::FirstMatch).is_empty());
    }

    #[test]
    fn test_closest_keeps_exported_module_order() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        fx.tree.define(root, MacroId(0), fx.foo, 0);
        let module = fx.tree.create_module(root, fx.bar, true, 10, Span::new(10, 100));
        fx.tree.define(module, MacroId(1), fx.foo, 20);
        fx.tree.define(module, MacroId(2), fx.foo, 30);
        fx.tree.define(root, MacroId(3), fx.foo, 150);

        let site = UseSite::new(root, 200);
        assert_eq!(
            fx.tree.visible_definitions_named(site, fx.foo, Precedence::Closest),
            vec![MacroId(3), MacroId(1), MacroId(2), MacroId(0)]
        );
        assert_eq!(
            fx.tree.visible_definitions_named(site, fx.foo, Precedence::FirstMatch),
            vec![MacroId(0), MacroId(1), MacroId(2), MacroId(3)]
        );
    }

    #[test]
    fn test_items_sorted_by_offset() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        fx.tree.define(root, MacroId(1), fx.bar, 50);
        fx.tree.define(root, MacroId(0), fx.foo, 10);

        assert_eq!(
            fx.tree.visible_definitions(UseSite::new(root, 100)),
            vec![MacroId(0), MacroId(1)]
        );
        assert_eq!(fx.tree.definitions_named(fx.bar), vec![MacroId(1)]);
        assert_eq!(fx.tree.visible_names(UseSite::new(root, 100)), vec![fx.foo, fx.bar]);
    }

    #[test]
    fn test_scope_at() {
        let mut fx = fixture();
        let root = fx.tree.file_scope;
        let module = fx.tree.create_module(root, fx.foo, false, 10, Span::new(10, 100));
        let function = fx.tree.create_child(module, ScopeKind::Function, 20, Span::new(20, 60));

        assert_eq!(fx.tree.scope_at(5), root);
        assert_eq!(fx.tree.scope_at(15), module);
        assert_eq!(fx.tree.scope_at(30), function);
        assert_eq!(fx.tree.scope_at(80), module);
    }
}
