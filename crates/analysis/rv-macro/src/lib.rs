//! Declarative macro matching for Raven
//!
//! This crate turns `macro_rules!` definitions into rule patterns and bodies,
//! matches invocation token streams against them, and traces metavariable
//! references in rule bodies back to the fragments they bind.
//!
//! # Architecture
//!
//! - **Parsing**: `macro_rules!` contents become [`MacroRule`]s ([`parse`])
//! - **Fragments**: a [`FragmentGrammar`] decides how far a fragment reaches
//! - **Matching**: one rule against one invocation ([`match_rule`])
//! - **Selection**: first matching rule over ordered candidates ([`select_rule`])
//! - **References**: body `$name` to declaration and fragment ([`resolve_reference`])
//!
//! # Example
//!
//! ```rust,ignore
//! use rv_macro::{DefaultFragmentGrammar, MatcherConfig, NeverCancelled, select_rule};
//!
//! let selection = select_rule(
//!     [&def],
//!     &arguments,
//!     &DefaultFragmentGrammar,
//!     &MatcherConfig::default(),
//!     &NeverCancelled,
//! );
//! if let Some(matched) = selection.matched {
//!     let site = rv_macro::resolve_reference(&matched, RefId(0), &[0])?;
//! }
//! ```

pub mod ast;
pub mod error;
pub mod fragment;
pub mod matcher;
pub mod parse;
pub mod reference;
pub mod select;

pub use ast::{
    DeclSite, Echo, EchoId, EchoInfo, FragmentKind, MacroDef, MacroId, MacroRule, MetaVarDecl,
    MetaVarRef, PatternGroup, PatternNode, RefId, ReferenceInfo, Repetition, RepetitionKind,
    BodyGroup, BodyNode,
};
pub use error::{MacroSyntaxError, MatchError, NoMatch, StructuralPatternError, UnresolvedReference};
pub use fragment::{DefaultFragmentGrammar, FragmentGrammar};
pub use matcher::{
    Binding, Bindings, Consumed, ConsumedKind, Fragment, MatchResult, Matcher, MatcherConfig,
    RuleMatch, match_rule,
};
pub use parse::{parse_body, parse_macro_rules, parse_pattern};
pub use reference::{BindingSite, echo_iteration_count, resolve_declaration, resolve_reference};
pub use select::{
    Cancellation, DefinitionDiagnostic, NeverCancelled, RuleAttempt, Selection, select_rule,
};
