//! Macro definition types: patterns on the left of `=>`, bodies on the right

use crate::error::StructuralPatternError;
use rustc_hash::FxHashMap;
use rv_intern::Symbol;
use rv_span::{FileSpan, Span};
use rv_tokens::{Delimiter, Token};
use std::fmt;

/// Unique identifier for a macro definition
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct MacroId(pub u32);

/// Macro definition (`macro_rules! name { ... }`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    /// Unique ID
    pub id: MacroId,
    /// Macro name
    pub name: Symbol,
    /// Rules in declaration order
    pub rules: Vec<MacroRule>,
    /// Source location of the whole definition
    pub span: FileSpan,
}

/// Fragment specifier kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Expression
    Expr,
    /// Identifier
    Ident,
    /// Type
    Ty,
    /// Pattern, including top-level alternatives
    Pat,
    /// Pattern without top-level alternatives
    PatParam,
    /// Statement without trailing semicolon
    Stmt,
    /// Block
    Block,
    /// Item
    Item,
    /// Path
    Path,
    /// Token tree
    Tt,
    /// Literal
    Literal,
    /// Lifetime
    Lifetime,
    /// Attribute content
    Meta,
    /// Visibility, possibly empty
    Vis,
}

impl FragmentKind {
    /// Parses a fragment specifier such as `expr`
    #[must_use]
    pub fn from_specifier(specifier: &str) -> Option<Self> {
        let kind = match specifier {
            "expr" | "expr_2021" => Self::Expr,
            "ident" => Self::Ident,
            "ty" => Self::Ty,
            "pat" => Self::Pat,
            "pat_param" => Self::PatParam,
            "stmt" => Self::Stmt,
            "block" => Self::Block,
            "item" => Self::Item,
            "path" => Self::Path,
            "tt" => Self::Tt,
            "literal" => Self::Literal,
            "lifetime" => Self::Lifetime,
            "meta" => Self::Meta,
            "vis" => Self::Vis,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical specifier text
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expr => "expr",
            Self::Ident => "ident",
            Self::Ty => "ty",
            Self::Pat => "pat",
            Self::PatParam => "pat_param",
            Self::Stmt => "stmt",
            Self::Block => "block",
            Self::Item => "item",
            Self::Path => "path",
            Self::Tt => "tt",
            Self::Literal => "literal",
            Self::Lifetime => "lifetime",
            Self::Meta => "meta",
            Self::Vis => "vis",
        }
    }

    /// Whether a match may consume no tokens at all
    #[must_use]
    pub const fn accepts_empty(self) -> bool {
        matches!(self, Self::Vis)
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Repetition operator kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepetitionKind {
    /// Zero or more (*)
    ZeroOrMore,
    /// One or more (+)
    OneOrMore,
    /// Zero or one (?)
    ZeroOrOne,
}

impl RepetitionKind {
    /// Parses an operator token text
    #[must_use]
    pub fn from_op(op: &str) -> Option<Self> {
        match op {
            "*" => Some(Self::ZeroOrMore),
            "+" => Some(Self::OneOrMore),
            "?" => Some(Self::ZeroOrOne),
            _ => None,
        }
    }

    /// Operator text
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ZeroOrMore => "*",
            Self::OneOrMore => "+",
            Self::ZeroOrOne => "?",
        }
    }
}

/// A metavariable declaration (`$name:kind`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaVarDecl {
    /// Variable name
    pub name: Symbol,
    /// Fragment kind, `None` when the specifier is missing or unknown
    pub fragment: Option<FragmentKind>,
    /// Specifier text as written
    pub specifier: String,
    /// Span from `$` through the specifier
    pub span: Span,
}

/// A repetition group in a pattern (`$( ... ) sep? op`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repetition {
    /// Repeated sub-pattern
    pub body: Vec<PatternNode>,
    /// Separator consumed between iterations
    pub separator: Option<Token>,
    /// Repetition operator
    pub kind: RepetitionKind,
    /// Span from `$` through the operator
    pub span: Span,
}

/// A delimited sub-pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternGroup {
    /// Delimiter
    pub delimiter: Delimiter,
    /// Matchers inside
    pub body: Vec<PatternNode>,
    /// Span including both delimiters
    pub span: Span,
}

/// One node of a rule's match pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternNode {
    /// Token that must appear verbatim
    Literal(Token),
    /// Metavariable declaration
    MetaVarDecl(MetaVarDecl),
    /// Repetition group
    Repetition(Repetition),
    /// Delimited group
    Group(PatternGroup),
}

/// Index of a metavariable reference within a rule body
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RefId(pub u32);

/// Index of a repetition echo group within a rule body
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct EchoId(pub u32);

/// A metavariable use in a rule body (`$name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaVarRef {
    /// Reference index, assigned by [`MacroRule::new`]
    pub id: RefId,
    /// Referenced name
    pub name: Symbol,
    /// Span of `$name`
    pub span: Span,
}

/// A repetition echo in a rule body (`$( ... ) sep? op`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    /// Echo index, assigned by [`MacroRule::new`]
    pub id: EchoId,
    /// Repeated body
    pub body: Vec<BodyNode>,
    /// Separator emitted between iterations
    pub separator: Option<Token>,
    /// Repetition operator
    pub kind: RepetitionKind,
    /// Span from `$` through the operator
    pub span: Span,
}

/// A delimited group in a rule body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyGroup {
    /// Delimiter
    pub delimiter: Delimiter,
    /// Contents
    pub body: Vec<BodyNode>,
    /// Span including both delimiters
    pub span: Span,
}

/// One node of a rule body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyNode {
    /// Token emitted verbatim
    Token(Token),
    /// Metavariable reference
    MetaVarRef(MetaVarRef),
    /// Repetition echo
    Echo(Echo),
    /// Delimited group
    Group(BodyGroup),
}

/// Position of a reference inside the body's echo structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    /// Referenced name
    pub name: Symbol,
    /// Span of `$name`
    pub span: Span,
    /// Enclosing echoes, outermost first
    pub echoes: Vec<EchoId>,
}

/// Position of an echo inside the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoInfo {
    /// Span of the echo
    pub span: Span,
    /// Enclosing echo, if nested
    pub parent: Option<EchoId>,
    /// Nesting level, 1 for an outermost echo
    pub depth: usize,
    /// References anywhere inside the echo
    pub references: Vec<RefId>,
}

/// A pattern declaration together with its repetition depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclSite<'rule> {
    /// The declaring pattern node
    pub decl: &'rule MetaVarDecl,
    /// Number of repetitions enclosing the declaration
    pub depth: usize,
}

/// A single macro rule (pattern => body)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroRule {
    /// Left-hand side pattern
    pub pattern: Vec<PatternNode>,
    /// Right-hand side body
    pub body: Vec<BodyNode>,
    /// Span of the whole rule
    pub span: Span,
    references: Vec<ReferenceInfo>,
    echoes: Vec<EchoInfo>,
}

impl MacroRule {
    /// Creates a rule, numbering body references and echoes in source order
    #[must_use]
    pub fn new(pattern: Vec<PatternNode>, mut body: Vec<BodyNode>, span: Span) -> Self {
        let mut index = BodyIndex::default();
        index.visit(&mut body, None, &mut Vec::new());
        Self {
            pattern,
            body,
            span,
            references: index.references,
            echoes: index.echoes,
        }
    }

    /// Reference table entry for `id`
    #[must_use]
    pub fn reference(&self, id: RefId) -> Option<&ReferenceInfo> {
        self.references.get(id.0 as usize)
    }

    /// All body references in source order
    pub fn references(&self) -> impl Iterator<Item = (RefId, &ReferenceInfo)> {
        self.references
            .iter()
            .enumerate()
            .map(|(index, info)| (RefId(index as u32), info))
    }

    /// Reference whose span contains `offset`
    #[must_use]
    pub fn reference_at(&self, offset: u32) -> Option<RefId> {
        self.references()
            .find(|(_, info)| info.span.contains(offset))
            .map(|(id, _)| id)
    }

    /// Echo table entry for `id`
    #[must_use]
    pub fn echo(&self, id: EchoId) -> Option<&EchoInfo> {
        self.echoes.get(id.0 as usize)
    }

    /// Number of echoes in the body
    #[must_use]
    pub fn echo_count(&self) -> usize {
        self.echoes.len()
    }

    /// Every metavariable declaration in pattern order
    #[must_use]
    pub fn declarations(&self) -> Vec<DeclSite<'_>> {
        let mut out = Vec::new();
        collect_declarations(&self.pattern, 0, &mut out);
        out
    }

    /// First declaration of `name`
    #[must_use]
    pub fn declaration(&self, name: Symbol) -> Option<DeclSite<'_>> {
        self.declarations()
            .into_iter()
            .find(|site| site.decl.name == name)
    }

    /// Declaration whose span contains `offset`
    #[must_use]
    pub fn declaration_at(&self, offset: u32) -> Option<DeclSite<'_>> {
        self.declarations()
            .into_iter()
            .find(|site| site.decl.span.contains(offset))
    }

    /// Checks the pattern for self-contradictions
    ///
    /// # Errors
    ///
    /// Returns the first duplicate metavariable name or invalid fragment
    /// specifier found in pattern order.
    pub fn validate(&self) -> Result<(), StructuralPatternError> {
        let mut seen: FxHashMap<Symbol, Span> = FxHashMap::default();
        for site in self.declarations() {
            let decl = site.decl;
            if let Some(first) = seen.get(&decl.name) {
                return Err(StructuralPatternError::DuplicateMetaVar {
                    name: decl.name,
                    first: *first,
                    second: decl.span,
                });
            }
            seen.insert(decl.name, decl.span);

            if decl.fragment.is_none() {
                return Err(StructuralPatternError::InvalidFragmentSpecifier {
                    name: decl.name,
                    specifier: decl.specifier.clone(),
                    span: decl.span,
                });
            }
        }
        Ok(())
    }
}

impl Repetition {
    /// Names declared anywhere inside the repeated body
    #[must_use]
    pub fn declared_names(&self) -> Vec<Symbol> {
        let mut sites = Vec::new();
        collect_declarations(&self.body, 0, &mut sites);
        sites.into_iter().map(|site| site.decl.name).collect()
    }
}

fn collect_declarations<'rule>(
    nodes: &'rule [PatternNode],
    depth: usize,
    out: &mut Vec<DeclSite<'rule>>,
) {
    for node in nodes {
        match node {
            PatternNode::Literal(_) => {}
            PatternNode::MetaVarDecl(decl) => out.push(DeclSite { decl, depth }),
            PatternNode::Repetition(repetition) => {
                collect_declarations(&repetition.body, depth + 1, out);
            }
            PatternNode::Group(group) => collect_declarations(&group.body, depth, out),
        }
    }
}

#[derive(Default)]
struct BodyIndex {
    references: Vec<ReferenceInfo>,
    echoes: Vec<EchoInfo>,
}

impl BodyIndex {
    fn visit(&mut self, nodes: &mut [BodyNode], parent: Option<EchoId>, stack: &mut Vec<EchoId>) {
        for node in nodes {
            match node {
                BodyNode::Token(_) => {}
                BodyNode::MetaVarRef(reference) => {
                    let id = RefId(self.references.len() as u32);
                    reference.id = id;
                    self.references.push(ReferenceInfo {
                        name: reference.name,
                        span: reference.span,
                        echoes: stack.clone(),
                    });
                    for echo in &*stack {
                        self.echoes[echo.0 as usize].references.push(id);
                    }
                }
                BodyNode::Echo(echo) => {
                    let id = EchoId(self.echoes.len() as u32);
                    echo.id = id;
                    self.echoes.push(EchoInfo {
                        span: echo.span,
                        parent,
                        depth: stack.len() + 1,
                        references: Vec::new(),
                    });
                    stack.push(id);
                    self.visit(&mut echo.body, Some(id), stack);
                    stack.pop();
                }
                BodyNode::Group(group) => self.visit(&mut group.body, parent, stack),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;
    use rv_intern::Interner;
    use rv_tokens::TokenKind;

    fn decl(interner: &Interner, name: &str, fragment: FragmentKind, start: u32) -> PatternNode {
        PatternNode::MetaVarDecl(MetaVarDecl {
            name: interner.intern(name),
            fragment: Some(fragment),
            specifier: fragment.as_str().to_string(),
            span: Span::new(start, start + 4),
        })
    }

    fn reference(interner: &Interner, name: &str, start: u32) -> BodyNode {
        BodyNode::MetaVarRef(MetaVarRef {
            id: RefId(0),
            name: interner.intern(name),
            span: Span::new(start, start + 2),
        })
    }

    #[test]
    fn test_rule_numbers_references_and_echoes() {
        let interner = Interner::new();
        let body = vec![
            reference(&interner, "a", 0),
            BodyNode::Echo(Echo {
                id: EchoId(0),
                body: vec![
                    reference(&interner, "b", 10),
                    BodyNode::Echo(Echo {
                        id: EchoId(0),
                        body: vec![reference(&interner, "c", 20)],
                        separator: None,
                        kind: RepetitionKind::ZeroOrMore,
                        span: Span::new(18, 25),
                    }),
                ],
                separator: None,
                kind: RepetitionKind::ZeroOrMore,
                span: Span::new(8, 30),
            }),
        ];
        let rule = MacroRule::new(Vec::new(), body, Span::new(0, 30));

        assert_eq!(rule.echo_count(), 2);
        let inner = rule.reference(RefId(2)).expect("third reference");
        assert_eq!(inner.echoes, vec![EchoId(0), EchoId(1)]);
        assert_eq!(rule.echo(EchoId(1)).map(|echo| echo.depth), Some(2));
        assert_eq!(
            rule.echo(EchoId(0)).map(|echo| echo.references.clone()),
            Some(vec![RefId(1), RefId(2)])
        );
        assert_eq!(rule.reference_at(11), Some(RefId(1)));
        assert_eq!(rule.reference_at(5), None);
    }

    #[test]
    fn test_declarations_track_depth() {
        let interner = Interner::new();
        let pattern = vec![
            decl(&interner, "x", FragmentKind::Expr, 0),
            PatternNode::Repetition(Repetition {
                body: vec![PatternNode::Group(PatternGroup {
                    delimiter: Delimiter::Paren,
                    body: vec![decl(&interner, "y", FragmentKind::Ident, 10)],
                    span: Span::new(9, 16),
                })],
                separator: Some(Token::new(TokenKind::Punct, ",", Span::new(17, 18))),
                kind: RepetitionKind::OneOrMore,
                span: Span::new(7, 19),
            }),
        ];
        let rule = MacroRule::new(pattern, Vec::new(), Span::new(0, 19));

        let y = rule.declaration(interner.intern("y")).expect("y declared");
        assert_eq!(y.depth, 1);
        assert_eq!(rule.declaration_at(1).map(|site| site.depth), Some(0));
        assert_eq!(rule.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_specifiers() {
        let interner = Interner::new();
        let duplicated = MacroRule::new(
            vec![
                decl(&interner, "x", FragmentKind::Expr, 0),
                decl(&interner, "x", FragmentKind::Ty, 10),
            ],
            Vec::new(),
            Span::new(0, 14),
        );
        assert!(matches!(
            duplicated.validate(),
            Err(StructuralPatternError::DuplicateMetaVar { .. })
        ));

        let unknown = MacroRule::new(
            vec![PatternNode::MetaVarDecl(MetaVarDecl {
                name: interner.intern("z"),
                fragment: None,
                specifier: "nope".to_string(),
                span: Span::new(0, 7),
            })],
            Vec::new(),
            Span::new(0, 7),
        );
        assert!(matches!(
            unknown.validate(),
            Err(StructuralPatternError::InvalidFragmentSpecifier { .. })
        ));
    }

    #[test]
    fn test_fragment_specifiers_round_trip() {
        for spec in ["expr", "ident", "ty", "pat", "pat_param", "tt", "vis", "meta"] {
            let kind = FragmentKind::from_specifier(spec).expect("known specifier");
            assert_eq!(kind.as_str(), spec);
        }
        assert!(FragmentKind::from_specifier("expression").is_none());
    }
}
