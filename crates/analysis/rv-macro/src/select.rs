//! Rule selection across candidate definitions

use crate::ast::{MacroDef, MacroId};
use crate::error::{MatchError, NoMatch, StructuralPatternError};
use crate::fragment::FragmentGrammar;
use crate::matcher::{MatchResult, MatcherConfig, match_rule};
use rv_tokens::{Token, span_of};
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation, polled before every rule attempt
pub trait Cancellation {
    /// Whether the caller gave up on the query
    fn is_cancelled(&self) -> bool;
}

/// Cancellation that never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// A rule that was tried and did not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleAttempt {
    /// Definition the rule belongs to
    pub macro_id: MacroId,
    /// Rule index within the definition
    pub rule_index: usize,
    /// Why it did not match
    pub error: NoMatch,
}

/// A broken rule, reported against its definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionDiagnostic {
    /// Definition the rule belongs to
    pub macro_id: MacroId,
    /// Rule index within the definition
    pub rule_index: usize,
    /// The structural problem
    pub error: StructuralPatternError,
}

/// Outcome of trying candidate rules against one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// The first rule that matched
    pub matched: Option<MatchResult>,
    /// Rules tried before the match, or all of them if none matched
    pub attempts: Vec<RuleAttempt>,
    /// Structural problems found along the way
    pub diagnostics: Vec<DefinitionDiagnostic>,
    /// Whether selection stopped because of cancellation
    pub cancelled: bool,
}

/// Tries every rule of every candidate in order; the first match wins
///
/// Broken rules are skipped and recorded as diagnostics, the remaining rules
/// and definitions are still tried.
#[tracing::instrument(level = "trace", skip_all, fields(tokens = tokens.len()))]
pub fn select_rule<'def, G: FragmentGrammar + ?Sized>(
    candidates: impl IntoIterator<Item = &'def MacroDef>,
    tokens: &[Token],
    grammar: &G,
    config: &MatcherConfig,
    cancellation: &dyn Cancellation,
) -> Selection {
    let mut selection = Selection::default();

    for def in candidates {
        for (rule_index, rule) in def.rules.iter().enumerate() {
            if cancellation.is_cancelled() {
                tracing::debug!(macro_id = def.id.0, "rule selection cancelled");
                selection.cancelled = true;
                return selection;
            }

            match match_rule(rule, tokens, grammar, config) {
                Ok(rule_match) => {
                    tracing::debug!(macro_id = def.id.0, rule_index, "rule matched");
                    selection.matched = Some(MatchResult {
                        macro_id: def.id,
                        rule_index,
                        rule: rule.clone(),
                        bindings: rule_match.bindings,
                        span: span_of(tokens),
                        trace: rule_match.trace,
                    });
                    return selection;
                }
                Err(MatchError::NoMatch(error)) => {
                    tracing::trace!(macro_id = def.id.0, rule_index, %error, "rule did not match");
                    selection.attempts.push(RuleAttempt {
                        macro_id: def.id,
                        rule_index,
                        error,
                    });
                }
                Err(MatchError::Structural(error)) => {
                    tracing::debug!(macro_id = def.id.0, rule_index, %error, "skipping malformed rule");
                    selection.diagnostics.push(DefinitionDiagnostic {
                        macro_id: def.id,
                        rule_index,
                        error,
                    });
                }
            }
        }
    }

    selection
}
