//! Metavariable references in rule bodies
//!
//! A `$name` in a body refers to the pattern declaration of the same name in
//! the same rule. Declarations outside any repetition may be used at any echo
//! depth; a declaration inside `d` repetitions must be used inside exactly
//! `d` echoes, whose iteration indices then pick the fragment.

use crate::ast::{DeclSite, EchoId, MacroRule, MetaVarDecl, RefId};
use crate::error::{StructuralPatternError, UnresolvedReference};
use crate::matcher::{Binding, Fragment, MatchResult};

/// A reference bound to the fragment it stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSite<'res> {
    /// The declaring pattern node
    pub decl: &'res MetaVarDecl,
    /// Repetition depth of the declaration
    pub depth: usize,
    /// The captured fragment for the requested iteration
    pub fragment: &'res Fragment,
}

/// Finds the declaration a body reference refers to, without a match
///
/// # Errors
///
/// Fails when the reference is unknown, the name is not declared in the
/// pattern, or the echo nesting around the reference disagrees with the
/// declaration's repetition depth.
pub fn resolve_declaration(
    rule: &MacroRule,
    reference: RefId,
) -> Result<DeclSite<'_>, UnresolvedReference> {
    let info = rule
        .reference(reference)
        .ok_or(UnresolvedReference::UnknownReference { id: reference })?;
    let site = rule
        .declaration(info.name)
        .ok_or(UnresolvedReference::NotDeclared { name: info.name })?;

    if site.depth > 0 && site.depth != info.echoes.len() {
        return Err(UnresolvedReference::DepthMismatch {
            name: info.name,
            declared: site.depth,
            referenced: info.echoes.len(),
        });
    }
    Ok(site)
}

/// Binds a body reference to its fragment in a concrete match
///
/// `iteration` holds the current index of each echo enclosing the
/// reference, outermost first. Only the first `depth` indices are used, so a
/// top-level declaration ignores them.
///
/// # Errors
///
/// Fails like [`resolve_declaration`], or with
/// [`UnresolvedReference::IterationOutOfRange`] when the match has no
/// fragment at `iteration`.
pub fn resolve_reference<'res>(
    result: &'res MatchResult,
    reference: RefId,
    iteration: &[usize],
) -> Result<BindingSite<'res>, UnresolvedReference> {
    let site = resolve_declaration(&result.rule, reference)?;
    let name = site.decl.name;
    let binding = result
        .binding(name)
        .ok_or(UnresolvedReference::NotDeclared { name })?;

    let fragment = iteration
        .get(..site.depth)
        .and_then(|path| binding.at(path))
        .and_then(Binding::as_fragment)
        .ok_or_else(|| UnresolvedReference::IterationOutOfRange {
            name,
            iteration: iteration.to_vec(),
        })?;

    Ok(BindingSite {
        decl: site.decl,
        depth: site.depth,
        fragment,
    })
}

/// How many times an echo repeats in a match
///
/// `outer` holds the indices of the echoes enclosing `echo`, outermost
/// first. Every reference inside the echo whose declaration repeats at the
/// echo's level must agree on the count.
///
/// # Errors
///
/// Returns [`StructuralPatternError::RepetitionCountMismatch`] when two
/// repeated names disagree and
/// [`StructuralPatternError::NoRepeatingVariable`] when nothing inside the
/// echo repeats at its level.
pub fn echo_iteration_count(
    result: &MatchResult,
    echo: EchoId,
    outer: &[usize],
) -> Result<usize, StructuralPatternError> {
    let rule = &result.rule;
    let Some(info) = rule.echo(echo) else {
        return Err(StructuralPatternError::NoRepeatingVariable {
            span: rule.span,
        });
    };
    let level = info.depth;
    let path = outer.get(..level.saturating_sub(1)).unwrap_or(outer);

    let mut count = None;
    for reference in &info.references {
        let Some(name) = rule.reference(*reference).map(|entry| entry.name) else {
            continue;
        };
        let Some(site) = rule.declaration(name) else {
            continue;
        };
        if site.depth < level {
            continue;
        }
        let Some(found) = result
            .binding(name)
            .and_then(|binding| binding.at(path))
            .and_then(Binding::iterations)
        else {
            continue;
        };

        match count {
            None => count = Some(found),
            Some(expected) if expected != found => {
                return Err(StructuralPatternError::RepetitionCountMismatch {
                    name,
                    expected,
                    found,
                });
            }
            Some(_) => {}
        }
    }

    count.ok_or(StructuralPatternError::NoRepeatingVariable { span: info.span })
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;
    use crate::ast::{MacroDef, MacroId};
    use crate::fragment::DefaultFragmentGrammar;
    use crate::matcher::MatcherConfig;
    use crate::parse::parse_macro_rules;
    use crate::select::{NeverCancelled, select_rule};
    use rv_intern::Interner;
    use rv_span::{FileId, FileSpan, Span};
    use rv_tokens::lex;

    fn definition(rules: &str, interner: &Interner) -> MacroDef {
        let tokens = lex(rules).tokens;
        let span = FileSpan::new(FileId::new(0), Span::default());
        let (def, errors) =
            parse_macro_rules(MacroId(0), interner.intern("m"), &tokens, span, interner);
        assert!(errors.is_empty(), "{errors:?}");
        def
    }

    fn matched(rules: &str, input: &str, interner: &Interner) -> MatchResult {
        let def = definition(rules, interner);
        let tokens = lex(input).tokens;
        select_rule(
            [&def],
            &tokens,
            &DefaultFragmentGrammar,
            &MatcherConfig::default(),
            &NeverCancelled,
        )
        .matched
        .expect("invocation matches")
    }

    fn text(
        result: &MatchResult,
        reference: u32,
        iteration: &[usize],
    ) -> Result<String, UnresolvedReference> {
        resolve_reference(result, RefId(reference), iteration).map(|site| site.fragment.text())
    }

    #[test]
    fn test_echoed_reference_resolves_per_iteration() {
        let interner = Interner::new();
        let result = matched("($($test:expr),+) => { $($test)* };", "a, b, c", &interner);

        assert_eq!(text(&result, 0, &[0]).as_deref(), Ok("a"));
        assert_eq!(text(&result, 0, &[2]).as_deref(), Ok("c"));
        assert_eq!(
            text(&result, 0, &[3]),
            Err(UnresolvedReference::IterationOutOfRange {
                name: interner.intern("test"),
                iteration: vec![3],
            })
        );
        assert_eq!(echo_iteration_count(&result, EchoId(0), &[]), Ok(3));
    }

    #[test]
    fn test_bare_reference_to_repeated_name_is_unresolved() {
        let interner = Interner::new();
        let result = matched("($($test:expr),+) => { $test };", "a, b", &interner);

        assert_eq!(
            text(&result, 0, &[]),
            Err(UnresolvedReference::DepthMismatch {
                name: interner.intern("test"),
                declared: 1,
                referenced: 0,
            })
        );
    }

    #[test]
    fn test_too_deep_reference_is_unresolved() {
        let interner = Interner::new();
        let def = definition("($($x:ident)*) => { $( $( $x )* )* };", &interner);

        assert!(matches!(
            resolve_declaration(&def.rules[0], RefId(0)),
            Err(UnresolvedReference::DepthMismatch {
                declared: 1,
                referenced: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_top_level_name_resolves_in_any_echo() {
        let interner = Interner::new();
        let result = matched("($sep:tt $($x:ident)*) => { $( $x $sep )* };", "; a b", &interner);

        assert_eq!(text(&result, 0, &[1]).as_deref(), Ok("b"));
        assert_eq!(text(&result, 1, &[0]).as_deref(), Ok(";"));
        assert_eq!(text(&result, 1, &[1]).as_deref(), Ok(";"));
    }

    #[test]
    fn test_nested_echoes() {
        let interner = Interner::new();
        let result = matched(
            "($( $name:ident : [ $($v:expr),* ] );*) => { $( $name => $( $v )* )* };",
            "a: [1, 2]; b: [3]",
            &interner,
        );

        assert_eq!(text(&result, 0, &[1]).as_deref(), Ok("b"));
        assert_eq!(text(&result, 1, &[0, 1]).as_deref(), Ok("2"));
        assert_eq!(text(&result, 1, &[1, 0]).as_deref(), Ok("3"));
        assert!(matches!(
            text(&result, 1, &[1, 1]),
            Err(UnresolvedReference::IterationOutOfRange { .. })
        ));

        assert_eq!(echo_iteration_count(&result, EchoId(0), &[]), Ok(2));
        assert_eq!(echo_iteration_count(&result, EchoId(1), &[0]), Ok(2));
        assert_eq!(echo_iteration_count(&result, EchoId(1), &[1]), Ok(1));
    }

    #[test]
    fn test_undeclared_name() {
        let interner = Interner::new();
        let def = definition("($a:ident) => { $b };", &interner);

        assert_eq!(
            resolve_declaration(&def.rules[0], RefId(0)),
            Err(UnresolvedReference::NotDeclared {
                name: interner.intern("b"),
            })
        );
        assert_eq!(
            resolve_declaration(&def.rules[0], RefId(7)),
            Err(UnresolvedReference::UnknownReference { id: RefId(7) })
        );
    }

    #[test]
    fn test_declaration_site_in_second_rule() {
        let interner = Interner::new();
        let def = definition("($t:expr) => { $t }; ($t:expr, $u:ty) => { $u };", &interner);
        let site = resolve_declaration(&def.rules[1], RefId(0)).expect("resolves");

        assert_eq!(interner.resolve(&site.decl.name), "u");
        assert_eq!(site.decl.specifier, "ty");
        assert_eq!(site.depth, 0);
    }

    #[test]
    fn test_echo_count_mismatch() {
        let interner = Interner::new();
        let result = matched("($($a:ident)* ; $($b:ident)*) => { $( $a $b )* };", "x y ; z", &interner);

        assert_eq!(
            echo_iteration_count(&result, EchoId(0), &[]),
            Err(StructuralPatternError::RepetitionCountMismatch {
                name: interner.intern("b"),
                expected: 2,
                found: 1,
            })
        );
    }

    #[test]
    fn test_echo_without_repeating_variable() {
        let interner = Interner::new();
        let result = matched("($x:ident) => { $( $x )* };", "x", &interner);

        assert!(matches!(
            echo_iteration_count(&result, EchoId(0), &[]),
            Err(StructuralPatternError::NoRepeatingVariable { .. })
        ));
    }
}
