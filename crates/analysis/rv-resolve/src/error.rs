//! Error types for macro resolution

use rv_intern::{Interner, Symbol};
use rv_macro::{DefinitionDiagnostic, MacroId, RuleAttempt};
use std::mem;

/// Why an invocation did not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No definition with this name exists anywhere
    NotFound {
        /// Similar visible names (for "did you mean?" messages)
        suggestions: Vec<Symbol>,
    },
    /// Definitions exist but none is visible from the use site
    NotVisible {
        /// The invisible definitions
        candidates: Vec<MacroId>,
    },
    /// Visible definitions exist but no rule matched the arguments
    NoRuleMatched {
        /// Every rule tried, in order
        attempts: Vec<RuleAttempt>,
    },
    /// The caller cancelled the query
    Cancelled,
}

/// A macro invocation that did not resolve to a rule
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolved macro {name:?}: {}", reason_text(.reason))]
pub struct Unresolved {
    /// Invoked name
    pub name: Symbol,
    /// Why resolution failed
    pub reason: UnresolvedReason,
    /// Broken rules found among the candidates
    pub diagnostics: Vec<DefinitionDiagnostic>,
}

impl Unresolved {
    /// Whether a definition was found but is not visible at the use site
    #[must_use]
    pub const fn is_visibility_violation(&self) -> bool {
        matches!(self.reason, UnresolvedReason::NotVisible { .. })
    }

    /// Compute suggestions for an unknown macro name using Levenshtein distance
    pub fn compute_suggestions(
        name: Symbol,
        interner: &Interner,
        available_names: &[Symbol],
    ) -> Vec<Symbol> {
        let target = interner.resolve(&name);
        let mut suggestions: Vec<(Symbol, usize)> = available_names
            .iter()
            .filter(|&&candidate| candidate != name)
            .map(|&candidate| {
                let candidate_str = interner.resolve(&candidate);
                let distance = levenshtein_distance(&target, &candidate_str);
                (candidate, distance)
            })
            .filter(|(_, distance)| *distance <= 3)
            .collect();

        suggestions.sort_by_key(|(_, distance)| *distance);
        suggestions.into_iter().take(3).map(|(sym, _)| sym).collect()
    }
}

fn reason_text(reason: &UnresolvedReason) -> String {
    match reason {
        UnresolvedReason::NotFound { .. } => "no such macro".to_string(),
        UnresolvedReason::NotVisible { candidates } => {
            format!("{} definition(s) exist but none is in scope", candidates.len())
        }
        UnresolvedReason::NoRuleMatched { attempts } => {
            format!("no rule matched ({} tried)", attempts.len())
        }
        UnresolvedReason::Cancelled => "cancelled".to_string(),
    }
}

/// Compute Levenshtein distance between two strings
fn levenshtein_distance(source: &str, target: &str) -> usize {
    let source: Vec<char> = source.chars().collect();
    let target: Vec<char> = target.chars().collect();

    if source.is_empty() {
        return target.len();
    }
    if target.is_empty() {
        return source.len();
    }

    let mut previous: Vec<usize> = (0..=target.len()).collect();
    let mut current = vec![0; target.len() + 1];
    for (idx, source_char) in source.iter().enumerate() {
        current[0] = idx + 1;
        for (jdx, target_char) in target.iter().enumerate() {
            let cost = usize::from(source_char != target_char);
            current[jdx + 1] = (previous[jdx + 1] + 1)
                .min(current[jdx] + 1)
                .min(previous[jdx] + cost);
        }
        mem::swap(&mut previous, &mut current);
    }

    previous[target.len()]
}
