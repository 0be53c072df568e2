//! Macro invocation and metavariable reference resolution

use crate::config::ResolveConfig;
use crate::error::{Unresolved, UnresolvedReason};
use crate::item_tree::{CallId, ItemTree};
use crate::scope::UseSite;
use rv_intern::{Interner, Symbol};
use rv_macro::{
    BindingSite, Cancellation, DeclSite, DefaultFragmentGrammar, FragmentGrammar, MacroDef, MacroId,
    MatchResult, NeverCancelled, RefId, UnresolvedReference, resolve_declaration, resolve_reference,
    select_rule,
};
use rv_tokens::Token;

/// Resolves macro invocations against the definitions of an item tree
///
/// Every query is read-only; one resolver can serve any number of queries.
pub struct MacroResolver<'db> {
    /// Scopes, definitions and collected calls
    items: &'db ItemTree,
    /// String interner for suggestions
    interner: &'db Interner,
    /// Decides how far fragments reach
    grammar: &'db dyn FragmentGrammar,
    /// Polled between rule attempts
    cancellation: &'db dyn Cancellation,
    /// Candidate ordering and matcher limits
    config: ResolveConfig,
}

impl<'db> MacroResolver<'db> {
    /// Create a resolver with the default grammar and configuration
    #[must_use]
    pub fn new(items: &'db ItemTree, interner: &'db Interner) -> Self {
        Self {
            items,
            interner,
            grammar: &DefaultFragmentGrammar,
            cancellation: &NeverCancelled,
            config: ResolveConfig::default(),
        }
    }

    /// Use `config` for subsequent queries
    #[must_use]
    pub fn with_config(mut self, config: ResolveConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom fragment grammar
    #[must_use]
    pub fn with_grammar(mut self, grammar: &'db dyn FragmentGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Poll `cancellation` before every rule attempt
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: &'db dyn Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// The item tree being resolved against
    #[must_use]
    pub fn items(&self) -> &'db ItemTree {
        self.items
    }

    /// Definitions visible at `site`, in candidate order
    #[must_use]
    pub fn visible_definitions(&self, site: UseSite) -> Vec<&'db MacroDef> {
        self.items
            .scopes
            .visible_definitions_ordered(site, self.config.precedence)
            .into_iter()
            .filter_map(|id| self.items.macro_def(id))
            .collect()
    }

    /// Binds an invocation of `name` with argument `tokens` at `site` to a rule
    ///
    /// Visible definitions named `name` are tried closest scope first; the
    /// first rule that matches wins.
    ///
    /// # Errors
    ///
    /// Returns [`Unresolved`] when no definition is visible or no rule of any
    /// visible definition matches.
    #[tracing::instrument(level = "debug", skip_all, fields(name = ?name, tokens = tokens.len()))]
    pub fn resolve_invocation(
        &self,
        name: Symbol,
        tokens: &[Token],
        site: UseSite,
    ) -> Result<MatchResult, Unresolved> {
        let candidates: Vec<&MacroDef> = self
            .items
            .scopes
            .visible_definitions_named(site, name, self.config.precedence)
            .into_iter()
            .filter_map(|id| self.items.macro_def(id))
            .collect();

        if candidates.is_empty() {
            let reason = self.not_visible_reason(name, site);
            tracing::debug!(?reason, "no visible definition");
            return Err(Unresolved {
                name,
                reason,
                diagnostics: Vec::new(),
            });
        }

        let selection = select_rule(
            candidates,
            tokens,
            self.grammar,
            &self.config.matcher,
            self.cancellation,
        );
        if let Some(matched) = selection.matched {
            return Ok(matched);
        }

        let reason = if selection.cancelled {
            UnresolvedReason::Cancelled
        } else {
            UnresolvedReason::NoRuleMatched {
                attempts: selection.attempts,
            }
        };
        tracing::debug!(
            ?reason,
            diagnostics = selection.diagnostics.len(),
            "invocation unresolved"
        );
        Err(Unresolved {
            name,
            reason,
            diagnostics: selection.diagnostics,
        })
    }

    /// Resolves a collected invocation
    ///
    /// # Errors
    ///
    /// See [`MacroResolver::resolve_invocation`].
    pub fn resolve_call(&self, call: CallId) -> Result<MatchResult, Unresolved> {
        let call = &self.items.calls[call];
        self.resolve_invocation(call.name, &call.arguments, call.site)
    }

    /// Binds a body reference of a matched rule to its fragment
    ///
    /// # Errors
    ///
    /// Returns [`UnresolvedReference`] when the reference cannot be traced to
    /// a declaration or has no fragment at `iteration`.
    #[allow(clippy::unused_self, reason = "Queries go through the resolver like invocations do")]
    pub fn resolve_reference<'res>(
        &self,
        result: &'res MatchResult,
        reference: RefId,
        iteration: &[usize],
    ) -> Result<BindingSite<'res>, UnresolvedReference> {
        resolve_reference(result, reference, iteration)
    }

    /// Declaration of the metavariable reference at `offset`, without a match
    ///
    /// Returns `None` when no rule body reference covers `offset`.
    #[must_use]
    pub fn reference_declaration_at(
        &self,
        offset: u32,
    ) -> Option<Result<(MacroId, DeclSite<'db>), UnresolvedReference>> {
        let def = self.items.macro_at(offset)?;
        let (rule, reference) = def
            .rules
            .iter()
            .find_map(|rule| Some((rule, rule.reference_at(offset)?)))?;
        Some(resolve_declaration(rule, reference).map(|site| (def.id, site)))
    }

    fn not_visible_reason(&self, name: Symbol, site: UseSite) -> UnresolvedReason {
        let candidates = self.items.scopes.definitions_named(name);
        if candidates.is_empty() {
            let available = self.items.scopes.visible_names(site);
            UnresolvedReason::NotFound {
                suggestions: Unresolved::compute_suggestions(name, self.interner, &available),
            }
        } else {
            UnresolvedReason::NotVisible { candidates }
        }
    }
}
