//! Parsing `macro_rules!` bodies into rules
//!
//! The input is the token stream between the definition's outer delimiters,
//! i.e. `(pattern) => {body}; (pattern) => {body}`. Malformed rules are
//! dropped and reported; well-formed ones are kept in declaration order.

use crate::ast::{
    BodyGroup, BodyNode, Echo, EchoId, FragmentKind, MacroDef, MacroId, MacroRule, MetaVarDecl,
    MetaVarRef, PatternGroup, PatternNode, RefId, Repetition, RepetitionKind,
};
use crate::error::MacroSyntaxError;
use rv_intern::{Interner, Symbol};
use rv_span::{FileSpan, Span};
use rv_tokens::{Delimiter, Token, TokenKind, matching_close};

/// Parses the rules of a `macro_rules!` definition
///
/// Returns the definition together with every syntax error found. A rule with
/// a syntax error is left out of the definition; parsing resumes at the next
/// `;`.
#[must_use]
pub fn parse_macro_rules(
    id: MacroId,
    name: Symbol,
    tokens: &[Token],
    span: FileSpan,
    interner: &Interner,
) -> (MacroDef, Vec<MacroSyntaxError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();
    let mut pos = 0;

    while pos < tokens.len() {
        if tokens[pos].is_punct(";") {
            pos += 1;
            continue;
        }

        match parse_rule(tokens, pos, interner) {
            Ok((rule, next)) => {
                rules.push(rule);
                pos = next;
                if pos < tokens.len() && !tokens[pos].is_punct(";") {
                    errors.push(MacroSyntaxError::MissingSemicolon {
                        span: tokens[pos].span,
                    });
                    if !tokens[pos].is_open() {
                        pos = skip_past_semicolon(tokens, pos);
                    }
                }
            }
            Err(error) => {
                errors.push(error);
                pos = skip_past_semicolon(tokens, pos);
            }
        }
    }

    let def = MacroDef {
        id,
        name,
        rules,
        span,
    };
    (def, errors)
}

/// Parses a standalone matcher such as `($x:expr, $($y:ident),*)` contents
///
/// # Errors
///
/// Returns the first syntax error in the matcher.
pub fn parse_pattern(
    tokens: &[Token],
    interner: &Interner,
) -> Result<Vec<PatternNode>, MacroSyntaxError> {
    PatternParser { tokens, interner }.sequence(0, tokens.len(), 0)
}

/// Parses a standalone rule body
///
/// Reference and echo ids are assigned later by [`MacroRule::new`].
///
/// # Errors
///
/// Returns the first syntax error in the body.
pub fn parse_body(
    tokens: &[Token],
    interner: &Interner,
) -> Result<Vec<BodyNode>, MacroSyntaxError> {
    BodyParser { tokens, interner }.sequence(0, tokens.len(), 0)
}

fn parse_rule(
    tokens: &[Token],
    start: usize,
    interner: &Interner,
) -> Result<(MacroRule, usize), MacroSyntaxError> {
    let (pattern_open, pattern_close) = delimited_group(tokens, start)?;
    let arrow = pattern_close + 1;
    match tokens.get(arrow) {
        Some(token) if token.is_punct("=>") => {}
        Some(token) => return Err(MacroSyntaxError::MissingArrow { span: token.span }),
        None => {
            return Err(MacroSyntaxError::MissingArrow {
                span: Span::point(tokens[pattern_close].span.end),
            });
        }
    }
    let (body_open, body_close) = delimited_group(tokens, arrow + 1)?;

    let pattern = parse_pattern(&tokens[pattern_open + 1..pattern_close], interner)?;
    let body = parse_body(&tokens[body_open + 1..body_close], interner)?;
    let span = tokens[pattern_open].span.cover(tokens[body_close].span);

    Ok((MacroRule::new(pattern, body, span), body_close + 1))
}

fn delimited_group(tokens: &[Token], at: usize) -> Result<(usize, usize), MacroSyntaxError> {
    let Some(token) = tokens.get(at) else {
        let span = tokens.last().map(|last| Span::point(last.span.end)).unwrap_or_default();
        return Err(MacroSyntaxError::ExpectedGroup { span });
    };
    if !token.is_open() {
        return Err(MacroSyntaxError::ExpectedGroup { span: token.span });
    }
    let close = matching_close(tokens, at)
        .ok_or(MacroSyntaxError::UnbalancedDelimiter { span: token.span })?;
    Ok((at, close))
}

/// Deepest group and repetition nesting accepted in a rule
const MAX_NESTING: usize = 256;

fn nesting_too_deep(tokens: &[Token], start: usize) -> MacroSyntaxError {
    let span = tokens
        .get(start.saturating_sub(1))
        .map(|open| open.span)
        .unwrap_or_default();
    MacroSyntaxError::NestingTooDeep { span }
}

fn skip_past_semicolon(tokens: &[Token], mut pos: usize) -> usize {
    while pos < tokens.len() {
        if tokens[pos].is_punct(";") {
            return pos + 1;
        }
        pos = match matching_close(tokens, pos) {
            Some(close) => close + 1,
            None => pos + 1,
        };
    }
    pos
}

/// `$( ... )` followed by an optional separator and an operator
struct RepetitionSuffix {
    separator: Option<Token>,
    kind: RepetitionKind,
    next: usize,
    span: Span,
}

fn repetition_suffix(
    tokens: &[Token],
    dollar: usize,
    close: usize,
    end: usize,
) -> Result<RepetitionSuffix, MacroSyntaxError> {
    let group_span = tokens[dollar].span.cover(tokens[close].span);
    let missing = MacroSyntaxError::MissingRepetitionOperator { span: group_span };
    let first = tokens[..end].get(close + 1).ok_or_else(|| missing.clone())?;

    let operator = if first.kind == TokenKind::Punct {
        RepetitionKind::from_op(&first.text)
    } else {
        None
    };
    if let Some(kind) = operator {
        return Ok(RepetitionSuffix {
            separator: None,
            kind,
            next: close + 2,
            span: group_span.cover(first.span),
        });
    }

    if first.is_open() || first.is_close() || first.kind == TokenKind::Dollar {
        return Err(missing);
    }
    let op = tokens[..end].get(close + 2).ok_or_else(|| missing.clone())?;
    match RepetitionKind::from_op(&op.text) {
        Some(kind) if op.kind == TokenKind::Punct && kind != RepetitionKind::ZeroOrOne => {
            Ok(RepetitionSuffix {
                separator: Some(first.clone()),
                kind,
                next: close + 3,
                span: group_span.cover(op.span),
            })
        }
        _ => Err(missing),
    }
}

struct PatternParser<'src> {
    tokens: &'src [Token],
    interner: &'src Interner,
}

impl PatternParser<'_> {
    fn sequence(
        &self,
        start: usize,
        end: usize,
        depth: usize,
    ) -> Result<Vec<PatternNode>, MacroSyntaxError> {
        let tokens = self.tokens;
        if depth > MAX_NESTING {
            return Err(nesting_too_deep(tokens, start));
        }
        let mut nodes = Vec::new();
        let mut pos = start;

        while pos < end {
            let token = &tokens[pos];
            match token.kind {
                TokenKind::Dollar => {
                    let (node, next) = self.dollar(pos, end, depth)?;
                    nodes.push(node);
                    pos = next;
                }
                TokenKind::Open(delimiter) => {
                    let close = matching_close(&tokens[..end], pos)
                        .ok_or(MacroSyntaxError::UnbalancedDelimiter { span: token.span })?;
                    nodes.push(PatternNode::Group(PatternGroup {
                        delimiter,
                        body: self.sequence(pos + 1, close, depth + 1)?,
                        span: token.span.cover(tokens[close].span),
                    }));
                    pos = close + 1;
                }
                TokenKind::Close(_) => {
                    return Err(MacroSyntaxError::UnbalancedDelimiter { span: token.span });
                }
                _ => {
                    nodes.push(PatternNode::Literal(token.clone()));
                    pos += 1;
                }
            }
        }

        Ok(nodes)
    }

    fn dollar(
        &self,
        pos: usize,
        end: usize,
        depth: usize,
    ) -> Result<(PatternNode, usize), MacroSyntaxError> {
        let tokens = self.tokens;
        let dollar = &tokens[pos];
        let Some(next) = tokens[..end].get(pos + 1) else {
            return Ok((PatternNode::Literal(dollar.clone()), pos + 1));
        };

        match next.kind {
            TokenKind::Ident if next.text != "crate" => {
                let name = self.interner.intern(&next.text);
                let colon = tokens[..end].get(pos + 2).filter(|token| token.is_punct(":"));
                let specifier = tokens[..end]
                    .get(pos + 3)
                    .filter(|token| token.kind == TokenKind::Ident);
                match (colon, specifier) {
                    (Some(_), Some(specifier)) => {
                        let decl = MetaVarDecl {
                            name,
                            fragment: FragmentKind::from_specifier(&specifier.text),
                            specifier: specifier.text.clone(),
                            span: dollar.span.cover(specifier.span),
                        };
                        Ok((PatternNode::MetaVarDecl(decl), pos + 4))
                    }
                    _ => {
                        let decl = MetaVarDecl {
                            name,
                            fragment: None,
                            specifier: String::new(),
                            span: dollar.span.cover(next.span),
                        };
                        Ok((PatternNode::MetaVarDecl(decl), pos + 2))
                    }
                }
            }
            TokenKind::Open(Delimiter::Paren) => {
                let close = matching_close(&tokens[..end], pos + 1)
                    .ok_or(MacroSyntaxError::UnbalancedDelimiter { span: next.span })?;
                let body = self.sequence(pos + 2, close, depth + 1)?;
                let suffix = repetition_suffix(tokens, pos, close, end)?;
                let repetition = Repetition {
                    body,
                    separator: suffix.separator,
                    kind: suffix.kind,
                    span: suffix.span,
                };
                Ok((PatternNode::Repetition(repetition), suffix.next))
            }
            _ => Ok((PatternNode::Literal(dollar.clone()), pos + 1)),
        }
    }
}

struct BodyParser<'src> {
    tokens: &'src [Token],
    interner: &'src Interner,
}

impl BodyParser<'_> {
    fn sequence(
        &self,
        start: usize,
        end: usize,
        depth: usize,
    ) -> Result<Vec<BodyNode>, MacroSyntaxError> {
        let tokens = self.tokens;
        if depth > MAX_NESTING {
            return Err(nesting_too_deep(tokens, start));
        }
        let mut nodes = Vec::new();
        let mut pos = start;

        while pos < end {
            let token = &tokens[pos];
            match token.kind {
                TokenKind::Dollar => {
                    let (node, next) = self.dollar(pos, end, depth)?;
                    nodes.push(node);
                    pos = next;
                }
                TokenKind::Open(delimiter) => {
                    let close = matching_close(&tokens[..end], pos)
                        .ok_or(MacroSyntaxError::UnbalancedDelimiter { span: token.span })?;
                    nodes.push(BodyNode::Group(BodyGroup {
                        delimiter,
                        body: self.sequence(pos + 1, close, depth + 1)?,
                        span: token.span.cover(tokens[close].span),
                    }));
                    pos = close + 1;
                }
                TokenKind::Close(_) => {
                    return Err(MacroSyntaxError::UnbalancedDelimiter { span: token.span });
                }
                _ => {
                    nodes.push(BodyNode::Token(token.clone()));
                    pos += 1;
                }
            }
        }

        Ok(nodes)
    }

    fn dollar(
        &self,
        pos: usize,
        end: usize,
        depth: usize,
    ) -> Result<(BodyNode, usize), MacroSyntaxError> {
        let tokens = self.tokens;
        let dollar = &tokens[pos];
        let Some(next) = tokens[..end].get(pos + 1) else {
            return Ok((BodyNode::Token(dollar.clone()), pos + 1));
        };

        match next.kind {
            // `$crate` stays two plain tokens
            TokenKind::Ident if next.text != "crate" => {
                let reference = MetaVarRef {
                    id: RefId(0),
                    name: self.interner.intern(&next.text),
                    span: dollar.span.cover(next.span),
                };
                Ok((BodyNode::MetaVarRef(reference), pos + 2))
            }
            TokenKind::Open(Delimiter::Paren) => {
                let close = matching_close(&tokens[..end], pos + 1)
                    .ok_or(MacroSyntaxError::UnbalancedDelimiter { span: next.span })?;
                let body = self.sequence(pos + 2, close, depth + 1)?;
                let suffix = repetition_suffix(tokens, pos, close, end)?;
                let echo = Echo {
                    id: EchoId(0),
                    body,
                    separator: suffix.separator,
                    kind: suffix.kind,
                    span: suffix.span,
                };
                Ok((BodyNode::Echo(echo), suffix.next))
            }
            _ => Ok((BodyNode::Token(dollar.clone()), pos + 1)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, reason = "Tests fail loudly on unexpected shapes")]
mod tests {
    use super::*;
    use crate::error::StructuralPatternError;
    use rv_span::FileId;
    use rv_tokens::lex;

    fn parse(source: &str, interner: &Interner) -> (MacroDef, Vec<MacroSyntaxError>) {
        let tokens = lex(source).tokens;
        parse_macro_rules(
            MacroId(0),
            interner.intern("test"),
            &tokens,
            FileSpan::new(FileId(0), Span::new(0, 0)),
            interner,
        )
    }

    #[test]
    fn test_parse_two_rules() {
        let interner = Interner::new();
        let (def, errors) = parse("($t:expr) => ($t); ($t:expr, $u:ty) => { $t as $u }", &interner);

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(def.rules.len(), 2);
        assert_eq!(def.rules[1].declarations().len(), 2);
        assert_eq!(def.rules[1].references().count(), 2);
    }

    #[test]
    fn test_parse_repetition_with_separator() {
        let interner = Interner::new();
        let (def, errors) = parse("($($test:expr),+) => ($($test)*)", &interner);
        assert!(errors.is_empty(), "{errors:?}");

        let rule = &def.rules[0];
        let PatternNode::Repetition(repetition) = &rule.pattern[0] else {
            panic!("expected repetition, got {:?}", rule.pattern[0]);
        };
        assert_eq!(repetition.kind, RepetitionKind::OneOrMore);
        assert_eq!(repetition.separator.as_ref().map(|sep| sep.text.as_str()), Some(","));

        let BodyNode::Echo(echo) = &rule.body[0] else {
            panic!("expected echo, got {:?}", rule.body[0]);
        };
        assert_eq!(echo.kind, RepetitionKind::ZeroOrMore);
        assert!(echo.separator.is_none());
        assert_eq!(rule.reference(RefId(0)).map(|info| info.echoes.len()), Some(1));
    }

    #[test]
    fn test_dollar_crate_is_not_a_reference() {
        let interner = Interner::new();
        let (def, errors) = parse("() => { $crate::helper() }", &interner);
        assert!(errors.is_empty());
        assert_eq!(def.rules[0].references().count(), 0);
    }

    #[test]
    fn test_malformed_rule_is_dropped() {
        let interner = Interner::new();
        let (def, errors) = parse("($a:ident) ($b:ident); ($c:ident) => {}", &interner);

        assert_eq!(def.rules.len(), 1);
        assert!(matches!(errors[0], MacroSyntaxError::MissingArrow { .. }));
    }

    #[test]
    fn test_missing_semicolon_before_next_rule() {
        let interner = Interner::new();
        let (def, errors) = parse("($a:expr) => ($a) ($a:expr) => ($a)", &interner);

        assert_eq!(def.rules.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], MacroSyntaxError::MissingSemicolon { .. }));
    }

    #[test]
    fn test_missing_repetition_operator() {
        let interner = Interner::new();
        let (def, errors) = parse("($($a:ident)) => {}", &interner);

        assert!(def.rules.is_empty());
        assert!(matches!(
            errors[0],
            MacroSyntaxError::MissingRepetitionOperator { .. }
        ));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let interner = Interner::new();
        let deep = format!("({}x{}) => {{}}; () => {{}}", "(".repeat(10_000), ")".repeat(10_000));
        let (def, errors) = parse(&deep, &interner);

        assert_eq!(def.rules.len(), 1);
        assert!(matches!(errors[..], [MacroSyntaxError::NestingTooDeep { .. }]));

        let (nested, nested_errors) = parse("(((($x:ident)))) => { [[[$x]]] }", &interner);
        assert!(nested_errors.is_empty());
        assert_eq!(nested.rules.len(), 1);
    }

    #[test]
    fn test_unknown_specifier_is_kept_for_validation() {
        let interner = Interner::new();
        let (def, errors) = parse("($a:expression) => {}", &interner);
        assert!(errors.is_empty());
        assert!(matches!(
            def.rules[0].validate(),
            Err(StructuralPatternError::InvalidFragmentSpecifier { .. })
        ));
    }
}
