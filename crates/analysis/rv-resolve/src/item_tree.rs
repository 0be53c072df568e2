//! Item tree: the macro definitions, scopes and invocations of one file
//!
//! The collector walks a flat token stream and only understands as much
//! item syntax as textual macro scoping needs: inline modules and their
//! `#[macro_use]` attribute, function bodies, blocks, `macro_rules!`
//! definitions and `name!(...)` invocations.

use crate::scope::{ScopeId, ScopeKind, ScopeTree, UseSite};
use la_arena::{Arena, Idx};
use rv_intern::{Interner, Symbol};
use rv_macro::{MacroDef, MacroId, MacroRule, MacroSyntaxError, parse_macro_rules};
use rv_span::{FileId, FileSpan, Span};
use rv_tokens::{Delimiter, Token, TokenKind, matching_close};
use std::mem;

/// A collected macro invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall {
    /// Invoked macro name
    pub name: Symbol,
    /// Span of the name token
    pub name_span: Span,
    /// Tokens between the invocation delimiters
    pub arguments: Vec<Token>,
    /// Where the invocation resolves from
    pub site: UseSite,
    /// Span of the whole invocation
    pub span: Span,
}

/// Index of a collected invocation
pub type CallId = Idx<MacroCall>;

/// Everything macro resolution needs to know about one file
#[derive(Debug, Clone)]
pub struct ItemTree {
    /// File the items come from
    pub file: FileId,
    /// Scopes and the definitions declared in them
    pub scopes: ScopeTree,
    /// Collected invocations in source order
    pub calls: Arena<MacroCall>,
    /// Syntax errors in `macro_rules!` definitions
    pub errors: Vec<MacroSyntaxError>,
    macros: Vec<MacroDef>,
}

impl ItemTree {
    /// Creates an empty item tree covering `span`
    #[must_use]
    pub fn new(file: FileId, span: Span) -> Self {
        Self {
            file,
            scopes: ScopeTree::new(span),
            calls: Arena::new(),
            errors: Vec::new(),
            macros: Vec::new(),
        }
    }

    /// Collects the items of a lexed file
    #[must_use]
    #[tracing::instrument(level = "debug", skip_all, fields(file = file.0, tokens = tokens.len()))]
    pub fn collect(file: FileId, tokens: &[Token], interner: &Interner) -> Self {
        let span = Span::new(0, tokens.last().map_or(0, |last| last.span.end));
        let mut collector = Collector {
            tokens,
            interner,
            tree: Self::new(file, span),
            depth: 0,
        };
        let root = collector.tree.scopes.file_scope;
        collector.items(root, 0, tokens.len());

        let tree = collector.tree;
        tracing::debug!(
            scopes = tree.scopes.len(),
            macros = tree.macros.len(),
            calls = tree.calls.len(),
            errors = tree.errors.len(),
            "collected item tree"
        );
        tree
    }

    /// Declares a macro definition at `offset` in `scope`
    pub fn define_macro(
        &mut self,
        scope: ScopeId,
        offset: u32,
        name: Symbol,
        rules: Vec<MacroRule>,
        span: Span,
    ) -> MacroId {
        let id = MacroId(self.macros.len() as u32);
        self.macros.push(MacroDef {
            id,
            name,
            rules,
            span: FileSpan::new(self.file, span),
        });
        self.scopes.define(scope, id, name, offset);
        id
    }

    /// Definition by id
    #[must_use]
    pub fn macro_def(&self, id: MacroId) -> Option<&MacroDef> {
        self.macros.get(id.0 as usize)
    }

    /// Innermost definition whose span contains `offset`
    #[must_use]
    pub fn macro_at(&self, offset: u32) -> Option<&MacroDef> {
        self.macros
            .iter()
            .filter(|def| def.span.contains(offset))
            .min_by_key(|def| def.span.span.len())
    }

    /// Invocation whose name contains `offset`
    #[must_use]
    pub fn call_at(&self, offset: u32) -> Option<CallId> {
        self.calls
            .iter()
            .find(|(_, call)| call.name_span.contains(offset))
            .map(|(id, _)| id)
    }
}

/// Deepest group nesting the collector descends into
const MAX_NESTING: usize = 256;

struct Collector<'src> {
    tokens: &'src [Token],
    interner: &'src Interner,
    tree: ItemTree,
    depth: usize,
}

impl Collector<'_> {
    fn items(&mut self, scope: ScopeId, start: usize, end: usize) {
        if self.depth >= MAX_NESTING {
            tracing::debug!(start, end, "skipping items nested too deeply");
            return;
        }
        self.depth += 1;
        self.items_at_depth(scope, start, end);
        self.depth -= 1;
    }

    fn items_at_depth(&mut self, scope: ScopeId, start: usize, end: usize) {
        let tokens = self.tokens;
        let mut pos = start;
        let mut macro_use = false;

        while pos < end {
            let token = &tokens[pos];
            pos = match token.kind {
                TokenKind::Punct if token.text == "#" => {
                    let (next, is_macro_use) = self.attribute(pos, end);
                    macro_use |= is_macro_use;
                    next
                }
                TokenKind::Punct if token.text == ";" => {
                    macro_use = false;
                    pos + 1
                }
                TokenKind::Ident if token.text == "macro_rules" && self.is_bang(pos + 1, end) => {
                    macro_use = false;
                    self.macro_rules(scope, pos, end)
                }
                TokenKind::Ident if token.text == "mod" => {
                    let exported = mem::take(&mut macro_use);
                    self.module(scope, pos, end, exported)
                }
                TokenKind::Ident if token.text == "fn" => {
                    macro_use = false;
                    self.function(scope, pos, end)
                }
                TokenKind::Ident if self.is_bang(pos + 1, end) && self.is_open(pos + 2, end) => {
                    macro_use = false;
                    self.call(scope, pos, end)
                }
                TokenKind::Open(Delimiter::Brace) => {
                    macro_use = false;
                    let close = self.close_of(pos, end);
                    let span = self.span_between(pos, close);
                    let block = self
                        .tree
                        .scopes
                        .create_child(scope, ScopeKind::Block, token.span.start, span);
                    self.items(block, pos + 1, close);
                    (close + 1).min(end)
                }
                TokenKind::Open(_) => {
                    let close = self.close_of(pos, end);
                    self.items(scope, pos + 1, close);
                    (close + 1).min(end)
                }
                _ => pos + 1,
            };
        }
    }

    /// `#[...]` or `#![...]`; reports whether it is `#[macro_use]`
    fn attribute(&self, pos: usize, end: usize) -> (usize, bool) {
        let mut open = pos + 1;
        if open < end && self.tokens[open].is_punct("!") {
            open += 1;
        }
        if !self.is_open_with(open, end, Delimiter::Bracket) {
            return (pos + 1, false);
        }
        let close = self.close_of(open, end);
        let content = &self.tokens[open + 1..close];
        let is_macro_use = content.first().is_some_and(|first| first.is_ident("macro_use"));
        ((close + 1).min(end), is_macro_use)
    }

    /// `macro_rules! name { ... }`
    fn macro_rules(&mut self, scope: ScopeId, pos: usize, end: usize) -> usize {
        let tokens = self.tokens;
        let keyword = &tokens[pos];
        let name_index = pos + 2;
        let Some(name) = tokens[..end].get(name_index).filter(|name| name.kind == TokenKind::Ident) else {
            return pos + 1;
        };
        let open = name_index + 1;
        if !self.is_open(open, end) {
            return name_index + 1;
        }
        let close = self.close_of(open, end);
        let span = keyword.span.cover(self.span_between(open, close));
        let name = self.tree_intern(&name.text);

        let id = MacroId(self.tree.macros.len() as u32);
        let (def, errors) = parse_macro_rules(
            id,
            name,
            &tokens[open + 1..close],
            FileSpan::new(self.tree.file, span),
            self.interner,
        );
        self.tree.errors.extend(errors);
        self.tree.define_macro(scope, keyword.span.start, name, def.rules, span);
        (close + 1).min(end)
    }

    /// `mod name { ... }`; `mod name;` declares nothing here
    fn module(&mut self, scope: ScopeId, pos: usize, end: usize, exported: bool) -> usize {
        let tokens = self.tokens;
        let keyword = &tokens[pos];
        let Some(name) = tokens[..end].get(pos + 1).filter(|name| name.kind == TokenKind::Ident) else {
            return pos + 1;
        };
        let open = pos + 2;
        if !self.is_open_with(open, end, Delimiter::Brace) {
            return pos + 2;
        }
        let close = self.close_of(open, end);
        let span = keyword.span.cover(self.span_between(open, close));
        let name = self.tree_intern(&name.text);
        let module = self
            .tree
            .scopes
            .create_module(scope, name, exported, keyword.span.start, span);
        self.items(module, open + 1, close);
        (close + 1).min(end)
    }

    /// `fn name(...) -> T where ... { ... }`
    fn function(&mut self, scope: ScopeId, pos: usize, end: usize) -> usize {
        let tokens = self.tokens;
        let keyword = &tokens[pos];
        let mut cursor = pos + 1;
        while cursor < end {
            let token = &tokens[cursor];
            match token.kind {
                TokenKind::Open(Delimiter::Brace) => break,
                TokenKind::Open(_) => cursor = self.close_of(cursor, end) + 1,
                TokenKind::Punct if token.text == ";" => return cursor + 1,
                _ => cursor += 1,
            }
        }
        if cursor >= end {
            return end;
        }

        let close = self.close_of(cursor, end);
        let span = keyword.span.cover(self.span_between(cursor, close));
        let function = self
            .tree
            .scopes
            .create_child(scope, ScopeKind::Function, keyword.span.start, span);
        self.items(function, cursor + 1, close);
        (close + 1).min(end)
    }

    /// `name!(...)`, `name![...]` or `name! { ... }`
    fn call(&mut self, scope: ScopeId, pos: usize, end: usize) -> usize {
        let tokens = self.tokens;
        let name_token = &tokens[pos];
        let open = pos + 2;
        let close = self.close_of(open, end);
        let name = self.tree_intern(&name_token.text);
        let call = MacroCall {
            name,
            name_span: name_token.span,
            arguments: tokens[open + 1..close].to_vec(),
            site: UseSite::new(scope, name_token.span.start),
            span: name_token.span.cover(self.span_between(open, close)),
        };
        self.tree.calls.alloc(call);
        self.items(scope, open + 1, close);
        (close + 1).min(end)
    }

    fn tree_intern(&self, text: &str) -> Symbol {
        self.interner.intern(text)
    }

    fn is_bang(&self, pos: usize, end: usize) -> bool {
        pos < end && self.tokens[pos].is_punct("!")
    }

    fn is_open(&self, pos: usize, end: usize) -> bool {
        pos < end && self.tokens[pos].is_open()
    }

    fn is_open_with(&self, pos: usize, end: usize, delimiter: Delimiter) -> bool {
        pos < end && self.tokens[pos].kind == TokenKind::Open(delimiter)
    }

    /// Index of the token closing `open`, or `end` if the group never closes
    fn close_of(&self, open: usize, end: usize) -> usize {
        matching_close(&self.tokens[..end], open).unwrap_or(end)
    }

    /// Span from token `open` through token `close`, clamped to the stream
    fn span_between(&self, open: usize, close: usize) -> Span {
        let first = self.tokens[open].span;
        let last = self
            .tokens
            .get(close)
            .or_else(|| self.tokens.last())
            .map_or(first, |token| token.span);
        first.cover(last)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;
    use crate::scope::ScopeItem;
    use expect_test::{Expect, expect};
    use rv_tokens::lex;

    fn dump(tree: &ItemTree, interner: &Interner) -> String {
        let mut out = String::new();
        dump_scope(tree, tree.scopes.file_scope, 0, interner, &mut out);
        for (_, call) in tree.calls.iter() {
            out.push_str(&format!(
                "call {}!({}) in scope {}\n",
                interner.resolve(&call.name),
                rv_tokens::render(&call.arguments),
                call.site.scope.0
            ));
        }
        out
    }

    fn dump_scope(
        tree: &ItemTree,
        scope: ScopeId,
        indent: usize,
        interner: &Interner,
        out: &mut String,
    ) {
        let data = tree.scopes.get_scope(scope);
        let mut line = format!("{:?}", data.kind);
        if let Some(name) = data.name {
            line.push(' ');
            line.push_str(&interner.resolve(&name));
        }
        if data.exported {
            line.push_str(" #[macro_use]");
        }
        out.push_str(&format!("{:indent$}{line}\n", ""));

        for item in &data.items {
            match *item {
                ScopeItem::Definition { id, name, .. } => {
                    let rules = tree.macro_def(id).map_or(0, |def| def.rules.len());
                    let width = indent + 2;
                    out.push_str(&format!("{:width$}macro {} ({rules} rules)\n", "", interner.resolve(&name)));
                }
                ScopeItem::Child { scope, .. } => dump_scope(tree, scope, indent + 2, interner, out),
            }
        }
    }

    fn check(source: &str, expect: Expect) {
        let interner = Interner::new();
        let tokens = lex(source).tokens;
        let tree = ItemTree::collect(FileId::new(0), &tokens, &interner);
        expect.assert_eq(&dump(&tree, &interner));
    }

    #[test]
    fn test_collect_nested_items() {
        check(
            r"
macro_rules! foo_bar { () => () }
#[macro_use]
mod a {
    macro_rules! inner { ($x:expr) => ($x); () => () }
}
mod b {
    fn main() {
        foo_bar!();
        { inner!(1); }
    }
}
",
            expect![[r#"
                File
                  macro foo_bar (1 rules)
                  Module a #[macro_use]
                    macro inner (2 rules)
                  Module b
                    Function
                      Block
                call foo_bar!() in scope 3
                call inner!(1) in scope 4
            "#]],
        );
    }

    #[test]
    fn test_attribute_only_applies_to_next_item() {
        check(
            r"
#[macro_use]
fn f() {}
mod a {}
#[derive(Debug)]
#[macro_use]
pub mod b {}
",
            expect![[r#"
                File
                  Function
                  Module a
                  Module b #[macro_use]
            "#]],
        );
    }

    #[test]
    fn test_calls_inside_arguments_and_items() {
        check(
            r"
fn main() {
    let v = vec![foo!(x), 2];
    println!(concat!(a, b));
}
",
            expect![[r#"
                File
                  Function
                call vec!(foo ! (x) , 2) in scope 1
                call foo!(x) in scope 1
                call println!(concat ! (a , b)) in scope 1
                call concat!(a , b) in scope 1
            "#]],
        );
    }

    #[test]
    fn test_deep_nesting_is_skipped() {
        let interner = Interner::new();
        let source = format!("m!(); {}n!(){}", "(".repeat(20_000), ")".repeat(20_000));
        let tokens = lex(&source).tokens;
        let tree = ItemTree::collect(FileId::new(0), &tokens, &interner);

        let names: Vec<String> = tree
            .calls
            .iter()
            .map(|(_, call)| interner.resolve(&call.name))
            .collect();
        assert_eq!(names, ["m"]);
        assert_eq!(tree.scopes.len(), 1);
    }

    #[test]
    fn test_lookup_by_offset() {
        let interner = Interner::new();
        let source = "macro_rules! m { () => () }\nm!();";
        let tokens = lex(source).tokens;
        let tree = ItemTree::collect(FileId::new(0), &tokens, &interner);

        let def = tree.macro_at(3).expect("definition at offset 3");
        assert_eq!(def.id, MacroId(0));
        assert!(tree.macro_at(28).is_none());

        let call = tree.call_at(28).expect("call at offset 28");
        assert_eq!(tree.calls[call].name, interner.intern("m"));
        assert!(tree.errors.is_empty());
    }
}
