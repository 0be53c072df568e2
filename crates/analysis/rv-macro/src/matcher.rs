//! Rule pattern matching
//!
//! Matching walks the pattern left to right over a flat token slice. Groups
//! narrow the slice to the span between their delimiters, repetitions
//! collect one binding table per iteration and fold them into sequences.

use crate::ast::{
    FragmentKind, MacroId, MacroRule, MetaVarDecl, PatternGroup, PatternNode, Repetition,
    RepetitionKind,
};
use crate::error::{MatchError, NoMatch, StructuralPatternError};
use crate::fragment::FragmentGrammar;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use rv_intern::Symbol;
use rv_span::Span;
use rv_tokens::{Token, TokenKind, matching_close, span_of};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Bindings collected during pattern matching, in first-binding order
pub type Bindings = IndexMap<Symbol, Binding, FxBuildHasher>;

/// Limits guarding against pathological patterns and input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    /// Maximum nesting of groups and repetitions in a pattern
    pub max_depth: usize,
    /// Maximum recursion of the fragment grammar inside one fragment
    pub max_fragment_depth: usize,
    /// Maximum iterations of a single repetition, unbounded when `None`
    pub max_repetitions: Option<usize>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_fragment_depth: 256,
            max_repetitions: None,
        }
    }
}

/// Tokens captured by one metavariable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Declared fragment kind
    pub kind: FragmentKind,
    /// Token index range within the invocation's argument stream
    pub range: Range<usize>,
    /// Captured tokens
    pub tokens: Vec<Token>,
}

impl Fragment {
    /// Source span of the captured tokens, `None` for an empty capture
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        span_of(&self.tokens)
    }

    /// Captured tokens as source text
    #[must_use]
    pub fn text(&self) -> String {
        rv_tokens::render(&self.tokens)
    }
}

/// A binding for a metavariable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Single captured fragment
    Fragment(Fragment),
    /// One binding per repetition iteration
    Repeated(Vec<Binding>),
}

impl Binding {
    /// Repetition nesting depth of this binding
    ///
    /// An empty sequence reports depth 1 since its element shape is unknown.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Fragment(_) => 0,
            Self::Repeated(items) => 1 + items.first().map_or(0, Self::depth),
        }
    }

    /// Binding selected by iteration indices, outermost first
    #[must_use]
    pub fn at(&self, iteration: &[usize]) -> Option<&Self> {
        let Some((first, rest)) = iteration.split_first() else {
            return Some(self);
        };
        match self {
            Self::Fragment(_) => None,
            Self::Repeated(items) => items.get(*first)?.at(rest),
        }
    }

    /// The fragment, if this binding is not repeated
    #[must_use]
    pub fn as_fragment(&self) -> Option<&Fragment> {
        match self {
            Self::Fragment(fragment) => Some(fragment),
            Self::Repeated(_) => None,
        }
    }

    /// Number of iterations, or `None` for a single fragment
    #[must_use]
    pub fn iterations(&self) -> Option<usize> {
        match self {
            Self::Fragment(_) => None,
            Self::Repeated(items) => Some(items.len()),
        }
    }
}

/// What consumed a run of invocation tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumedKind {
    /// A literal pattern token
    Literal,
    /// A metavariable fragment
    Fragment,
    /// A repetition separator
    Separator,
    /// An opening group delimiter
    Open,
    /// A closing group delimiter
    Close,
}

/// One consumed token run, in consumption order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumed {
    /// What consumed it
    pub kind: ConsumedKind,
    /// Token index range
    pub range: Range<usize>,
}

/// Successful match of one rule pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Metavariable bindings
    pub bindings: Bindings,
    /// Number of tokens consumed from the start offset
    pub consumed: usize,
    /// Consumption trace
    pub trace: Vec<Consumed>,
}

/// A rule bound to an invocation
///
/// Immutable once produced and owned by whoever asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Definition the rule belongs to
    pub macro_id: MacroId,
    /// Rule index within the definition
    pub rule_index: usize,
    /// The matched rule
    pub rule: MacroRule,
    /// Metavariable bindings
    pub bindings: Bindings,
    /// Source span of the invocation's argument tokens, `None` when empty
    pub span: Option<Span>,
    /// Consumption trace covering every argument token
    pub trace: Vec<Consumed>,
}

impl MatchResult {
    /// Binding for `name`
    #[must_use]
    pub fn binding(&self, name: Symbol) -> Option<&Binding> {
        self.bindings.get(&name)
    }
}

/// Matches a whole rule against an invocation's argument tokens
///
/// The pattern is validated first, then must consume `tokens` exactly.
///
/// # Errors
///
/// Returns [`MatchError::Structural`] when the pattern is self-contradictory
/// and [`MatchError::NoMatch`] when it does not match `tokens`.
#[tracing::instrument(level = "trace", skip_all, fields(tokens = tokens.len()))]
pub fn match_rule<G: FragmentGrammar + ?Sized>(
    rule: &MacroRule,
    tokens: &[Token],
    grammar: &G,
    config: &MatcherConfig,
) -> Result<RuleMatch, MatchError> {
    rule.validate()?;
    let matcher = Matcher::new(tokens, grammar, config);
    let rule_match = matcher.match_pattern(&rule.pattern, 0)?;
    tracing::trace!(
        consumed = rule_match.consumed,
        bindings = rule_match.bindings.len(),
        "pattern matched"
    );
    if rule_match.consumed != tokens.len() {
        return Err(NoMatch::TrailingTokens {
            at: rule_match.consumed,
        }
        .into());
    }
    Ok(rule_match)
}

/// Pattern matcher over one token stream
pub struct Matcher<'input, G: FragmentGrammar + ?Sized> {
    tokens: &'input [Token],
    grammar: &'input G,
    config: &'input MatcherConfig,
}

impl<'input, G: FragmentGrammar + ?Sized> Matcher<'input, G> {
    /// Creates a matcher over `tokens`
    #[must_use]
    pub fn new(tokens: &'input [Token], grammar: &'input G, config: &'input MatcherConfig) -> Self {
        Self {
            tokens,
            grammar,
            config,
        }
    }

    /// Matches `pattern` starting at token `start`
    ///
    /// Trailing tokens are not an error here; the returned `consumed` count
    /// tells the caller how far the pattern reached.
    ///
    /// # Errors
    ///
    /// Returns why the pattern does not match at `start`.
    pub fn match_pattern(
        &self,
        pattern: &[PatternNode],
        start: usize,
    ) -> Result<RuleMatch, MatchError> {
        let mut pos = start;
        let mut bindings = Bindings::default();
        let mut trace = Vec::new();
        self.match_sequence(pattern, &mut pos, self.tokens.len(), 0, &mut bindings, &mut trace)?;
        Ok(RuleMatch {
            bindings,
            consumed: pos - start,
            trace,
        })
    }

    fn match_sequence(
        &self,
        nodes: &[PatternNode],
        pos: &mut usize,
        limit: usize,
        depth: usize,
        bindings: &mut Bindings,
        trace: &mut Vec<Consumed>,
    ) -> Result<(), MatchError> {
        for node in nodes {
            match node {
                PatternNode::Literal(expected) => self.match_literal(expected, pos, limit, trace)?,
                PatternNode::MetaVarDecl(decl) => {
                    self.match_metavar(decl, pos, limit, bindings, trace)?;
                }
                PatternNode::Repetition(repetition) => {
                    self.match_repetition(repetition, pos, limit, depth, bindings, trace)?;
                }
                PatternNode::Group(group) => {
                    self.match_group(group, pos, limit, depth, bindings, trace)?;
                }
            }
        }
        Ok(())
    }

    fn match_literal(
        &self,
        expected: &Token,
        pos: &mut usize,
        limit: usize,
        trace: &mut Vec<Consumed>,
    ) -> Result<(), MatchError> {
        match self.tokens[..limit].get(*pos) {
            Some(found) if found.same_token(expected) => {
                trace.push(Consumed {
                    kind: ConsumedKind::Literal,
                    range: *pos..*pos + 1,
                });
                *pos += 1;
                Ok(())
            }
            Some(found) => Err(NoMatch::UnexpectedToken {
                expected: expected.text.clone(),
                found: found.text.clone(),
                at: *pos,
            }
            .into()),
            None => Err(NoMatch::UnexpectedEnd {
                expected: expected.text.clone(),
                at: *pos,
            }
            .into()),
        }
    }

    fn match_metavar(
        &self,
        decl: &MetaVarDecl,
        pos: &mut usize,
        limit: usize,
        bindings: &mut Bindings,
        trace: &mut Vec<Consumed>,
    ) -> Result<(), MatchError> {
        let kind = decl
            .fragment
            .ok_or_else(|| StructuralPatternError::InvalidFragmentSpecifier {
                name: decl.name,
                specifier: decl.specifier.clone(),
                span: decl.span,
            })?;

        let start = *pos;
        let end = self
            .grammar
            .parse_fragment(
                kind,
                &self.tokens[..limit],
                start,
                self.config.max_fragment_depth,
            )
            .filter(|&end| end <= limit && (end > start || kind.accepts_empty()))
            .ok_or(NoMatch::FragmentMismatch {
                name: decl.name,
                fragment: kind,
                at: start,
            })?;

        let fragment = Fragment {
            kind,
            range: start..end,
            tokens: self.tokens[start..end].to_vec(),
        };
        if end > start {
            trace.push(Consumed {
                kind: ConsumedKind::Fragment,
                range: start..end,
            });
        }
        bindings.insert(decl.name, Binding::Fragment(fragment));
        *pos = end;
        Ok(())
    }

    fn match_group(
        &self,
        group: &PatternGroup,
        pos: &mut usize,
        limit: usize,
        depth: usize,
        bindings: &mut Bindings,
        trace: &mut Vec<Consumed>,
    ) -> Result<(), MatchError> {
        let open = *pos;
        let expected = group.delimiter.open_char().to_string();
        let Some(token) = self.tokens[..limit].get(open) else {
            return Err(NoMatch::UnexpectedEnd { expected, at: open }.into());
        };
        if token.kind != TokenKind::Open(group.delimiter) {
            return Err(NoMatch::UnexpectedToken {
                expected,
                found: token.text.clone(),
                at: open,
            }
            .into());
        }
        if depth + 1 > self.config.max_depth {
            return Err(NoMatch::DepthLimit {
                limit: self.config.max_depth,
                at: open,
            }
            .into());
        }
        let close =
            matching_close(&self.tokens[..limit], open).ok_or(NoMatch::UnbalancedGroup { at: open })?;

        trace.push(Consumed {
            kind: ConsumedKind::Open,
            range: open..open + 1,
        });
        let mut inner = open + 1;
        self.match_sequence(&group.body, &mut inner, close, depth + 1, bindings, trace)?;
        if inner != close {
            return Err(NoMatch::TrailingTokens { at: inner }.into());
        }
        trace.push(Consumed {
            kind: ConsumedKind::Close,
            range: close..close + 1,
        });
        *pos = close + 1;
        Ok(())
    }

    fn match_repetition(
        &self,
        repetition: &Repetition,
        pos: &mut usize,
        limit: usize,
        depth: usize,
        bindings: &mut Bindings,
        trace: &mut Vec<Consumed>,
    ) -> Result<(), MatchError> {
        if depth + 1 > self.config.max_depth {
            return Err(NoMatch::DepthLimit {
                limit: self.config.max_depth,
                at: *pos,
            }
            .into());
        }

        let mut iterations = Vec::new();
        loop {
            if repetition.kind == RepetitionKind::ZeroOrOne && iterations.len() == 1 {
                break;
            }
            let reached = self
                .config
                .max_repetitions
                .filter(|&limit| iterations.len() >= limit);
            if let Some(limit) = reached {
                return Err(NoMatch::RepetitionLimit { limit, at: *pos }.into());
            }

            let checkpoint = *pos;
            let trace_len = trace.len();
            let mut separated = false;
            let separator = repetition
                .separator
                .as_ref()
                .filter(|_| !iterations.is_empty());
            if let Some(separator) = separator {
                match self.tokens[..limit].get(*pos) {
                    Some(token) if token.same_token(separator) => {
                        trace.push(Consumed {
                            kind: ConsumedKind::Separator,
                            range: *pos..*pos + 1,
                        });
                        *pos += 1;
                        separated = true;
                    }
                    _ => break,
                }
            }

            let body_start = *pos;
            let mut iteration = Bindings::default();
            match self.match_sequence(&repetition.body, pos, limit, depth + 1, &mut iteration, trace) {
                Ok(()) => {
                    if *pos == body_start && !separated {
                        // An empty iteration would repeat forever
                        if iterations.is_empty() {
                            iterations.push(iteration);
                        }
                        break;
                    }
                    iterations.push(iteration);
                }
                Err(MatchError::NoMatch(cause)) if separated => {
                    return Err(NoMatch::RepetitionFailed {
                        at: checkpoint,
                        cause: Box::new(cause),
                    }
                    .into());
                }
                Err(MatchError::NoMatch(_)) => {
                    *pos = checkpoint;
                    trace.truncate(trace_len);
                    break;
                }
                Err(structural @ MatchError::Structural(_)) => return Err(structural),
            }
        }

        if repetition.kind == RepetitionKind::OneOrMore && iterations.is_empty() {
            return Err(NoMatch::TooFewRepetitions { at: *pos }.into());
        }

        // Every completed iteration binds every name declared in the body
        for name in repetition.declared_names() {
            let sequence: Vec<Binding> = iterations
                .iter_mut()
                .filter_map(|iteration| iteration.shift_remove(&name))
                .collect();
            bindings.insert(name, Binding::Repeated(sequence));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;
    use crate::fragment::DefaultFragmentGrammar;
    use crate::parse::parse_pattern;
    use expect_test::{Expect, expect};
    use rv_intern::Interner;
    use rv_tokens::lex;

    fn pattern(source: &str, interner: &Interner) -> MacroRule {
        let tokens = lex(source).tokens;
        let pattern = parse_pattern(&tokens, interner).expect("pattern parses");
        MacroRule::new(pattern, Vec::new(), Span::default())
    }

    fn run(
        pattern_source: &str,
        input: &str,
        interner: &Interner,
    ) -> Result<RuleMatch, MatchError> {
        let rule = pattern(pattern_source, interner);
        let tokens = lex(input).tokens;
        match_rule(&rule, &tokens, &DefaultFragmentGrammar, &MatcherConfig::default())
    }

    fn render_binding(binding: &Binding) -> String {
        match binding {
            Binding::Fragment(fragment) => fragment.text(),
            Binding::Repeated(items) => {
                let inner: Vec<String> = items.iter().map(render_binding).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    fn check(pattern_source: &str, input: &str, expect: Expect) {
        let interner = Interner::new();
        let actual = match run(pattern_source, input, &interner) {
            Ok(rule_match) => rule_match
                .bindings
                .iter()
                .map(|(name, binding)| format!("{} = {}", interner.resolve(name), render_binding(binding)))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(error) => format!("error: {error}"),
        };
        expect.assert_eq(&actual);
    }

    #[test]
    fn test_single_expr() {
        check("$t:expr", "1 + 2", expect![["t = 1 + 2"]]);
    }

    #[test]
    fn test_trailing_tokens_fail() {
        check(
            "$t:expr",
            "1, u32",
            expect![["error: unexpected trailing tokens starting at token 1"]],
        );
    }

    #[test]
    fn test_expr_and_type() {
        check("$t:expr, $u:ty", "1, u32", expect![["t = 1\nu = u32"]]);
    }

    #[test]
    fn test_separated_repetition() {
        check("$($test:expr),+", "a, b, c", expect![["test = [a, b, c]"]]);
    }

    #[test]
    fn test_nested_repetition() {
        check(
            "$( [ $($x:ident)* ] );*",
            "[a b]; []; [c]",
            expect![["x = [[a, b], [], [c]]"]],
        );
    }

    #[test]
    fn test_zero_iterations_bind_empty_sequences() {
        check("start $($x:ident),*", "start", expect![["x = []"]]);
    }

    #[test]
    fn test_zero_or_one() {
        check("$($x:ident)? ;", "a ;", expect![["x = [a]"]]);
        check(
            "$($x:ident)?",
            "a b",
            expect![["error: unexpected trailing tokens starting at token 1"]],
        );
    }

    #[test]
    fn test_one_or_more_requires_an_iteration() {
        check(
            "$($x:ident)+",
            "",
            expect![["error: expected at least one repetition at token 0"]],
        );
    }

    #[test]
    fn test_failure_after_separator_is_hard() {
        check(
            "$($x:ident),* , 1",
            "a, b, 1",
            expect![["error: repetition failed after separator at token 3"]],
        );
    }

    #[test]
    fn test_group_must_be_consumed_exactly() {
        check("($a:ident)", "(x)", expect![["a = x"]]);
        check(
            "($a:ident)",
            "(x y)",
            expect![["error: unexpected trailing tokens starting at token 2"]],
        );
        check(
            "[$a:ident]",
            "(x)",
            expect![["error: expected `[`, found `(` at token 0"]],
        );
    }

    #[test]
    fn test_literal_mismatch() {
        check(
            "fn $name:ident",
            "struct S",
            expect![["error: expected `fn`, found `struct` at token 0"]],
        );

        let interner = Interner::new();
        let result = run("fn $name:ident", "fn", &interner);
        assert!(matches!(
            result,
            Err(MatchError::NoMatch(NoMatch::FragmentMismatch {
                fragment: FragmentKind::Ident,
                at: 1,
                ..
            }))
        ));
    }

    #[test]
    fn test_trace_covers_every_token() {
        let interner = Interner::new();
        let input = lex("x => [a, b; c]").tokens;
        let rule = pattern("$k:ident => [$($v:expr),*; $last:tt]", &interner);
        let rule_match =
            match_rule(&rule, &input, &DefaultFragmentGrammar, &MatcherConfig::default()).expect("matches");

        let mut next = 0;
        for consumed in &rule_match.trace {
            assert_eq!(consumed.range.start, next, "gap before {consumed:?}");
            next = consumed.range.end;
        }
        assert_eq!(next, input.len());
        assert_eq!(rule_match.consumed, input.len());
    }

    #[test]
    fn test_depth_limit() {
        let interner = Interner::new();
        let rule = pattern("(((x)))", &interner);
        let input = lex("(((x)))").tokens;
        let config = MatcherConfig {
            max_depth: 2,
            ..MatcherConfig::default()
        };
        let result = match_rule(&rule, &input, &DefaultFragmentGrammar, &config);
        assert!(matches!(
            result,
            Err(MatchError::NoMatch(NoMatch::DepthLimit { limit: 2, at: 2 }))
        ));
    }

    #[test]
    fn test_long_repetition_has_no_default_limit() {
        let interner = Interner::new();
        let input = (0..5000).map(|number: usize| number.to_string()).collect::<Vec<_>>().join(", ");
        let rule_match = run("$($x:expr),*", &input, &interner).expect("matches");

        let x = &rule_match.bindings[&interner.intern("x")];
        assert_eq!(x.iterations(), Some(5000));
        let last = x.at(&[4999]).and_then(Binding::as_fragment).expect("x[4999]");
        assert_eq!(last.text(), "4999");
    }

    #[test]
    fn test_configured_repetition_limit() {
        let interner = Interner::new();
        let rule = pattern("$($x:ident)*", &interner);
        let input = lex("a b c d").tokens;
        let config = MatcherConfig {
            max_repetitions: Some(3),
            ..MatcherConfig::default()
        };
        let result = match_rule(&rule, &input, &DefaultFragmentGrammar, &config);
        assert!(matches!(
            result,
            Err(MatchError::NoMatch(NoMatch::RepetitionLimit { limit: 3, at: 3 }))
        ));
    }

    #[test]
    fn test_deeply_nested_fragment_is_a_mismatch() {
        let interner = Interner::new();
        let input = format!("{}1", "- ".repeat(20_000));
        let result = run("$e:expr", &input, &interner);
        assert!(matches!(
            result,
            Err(MatchError::NoMatch(NoMatch::FragmentMismatch {
                fragment: FragmentKind::Expr,
                at: 0,
                ..
            }))
        ));

        check("$e:expr", "- - - ! * 1", expect![["e = - - - ! * 1"]]);
    }

    #[test]
    fn test_duplicate_metavar_is_structural() {
        let interner = Interner::new();
        let result = run("$a:ident $a:ident", "x y", &interner);
        assert!(matches!(
            result,
            Err(MatchError::Structural(StructuralPatternError::DuplicateMetaVar { .. }))
        ));
    }

    #[test]
    fn test_binding_depth_and_lookup() {
        let interner = Interner::new();
        let rule_match = run("$( ( $($x:ident),* ) )*", "(a, b) (c)", &interner).expect("matches");
        let x = &rule_match.bindings[&interner.intern("x")];

        assert_eq!(x.depth(), 2);
        assert_eq!(x.iterations(), Some(2));
        let fragment = x.at(&[0, 1]).and_then(Binding::as_fragment).expect("x[0][1]");
        assert_eq!(fragment.text(), "b");
        assert_eq!(fragment.range, 3..4);
        assert!(x.at(&[1, 1]).is_none());
    }
}
