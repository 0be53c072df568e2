//! Macro matching and resolution error types

use crate::ast::{FragmentKind, RefId};
use rv_intern::Symbol;
use rv_span::Span;

/// A self-contradictory macro pattern
///
/// Reported against the definition that owns the rule; never aborts
/// resolution of other definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralPatternError {
    /// Same metavariable declared twice in one pattern
    #[error("duplicate metavariable {name:?} at {second} (first declared at {first})")]
    DuplicateMetaVar {
        /// Variable name
        name: Symbol,
        /// First declaration
        first: Span,
        /// Second declaration
        second: Span,
    },
    /// Missing or unknown fragment specifier
    #[error("invalid fragment specifier {specifier:?} for {name:?} at {span}")]
    InvalidFragmentSpecifier {
        /// Variable name
        name: Symbol,
        /// Specifier as written
        specifier: String,
        /// Declaration span
        span: Span,
    },
    /// Co-repeated names disagree on their iteration count
    #[error("metavariable {name:?} repeats {found} times, but {expected} were expected")]
    RepetitionCountMismatch {
        /// Variable whose count disagrees
        name: Symbol,
        /// Iteration count of the enclosing repetition
        expected: usize,
        /// Iteration count recorded for `name`
        found: usize,
    },
    /// An echo group repeats nothing at its depth
    #[error("repetition at {span} contains no metavariable repeating at this depth")]
    NoRepeatingVariable {
        /// Echo span
        span: Span,
    },
}

/// Why one rule did not match an invocation
///
/// Positions are token indices into the invocation's argument stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoMatch {
    /// A literal or delimiter did not match
    #[error("expected `{expected}`, found `{found}` at token {at}")]
    UnexpectedToken {
        /// Expected token text
        expected: String,
        /// Found token text
        found: String,
        /// Token index
        at: usize,
    },
    /// Input ended before the pattern did
    #[error("expected `{expected}`, found end of input at token {at}")]
    UnexpectedEnd {
        /// Expected token text
        expected: String,
        /// Token index
        at: usize,
    },
    /// No fragment of the declared kind starts here
    #[error("expected {fragment} fragment for {name:?} at token {at}")]
    FragmentMismatch {
        /// Variable name
        name: Symbol,
        /// Declared kind
        fragment: FragmentKind,
        /// Token index
        at: usize,
    },
    /// A `+` repetition matched zero times
    #[error("expected at least one repetition at token {at}")]
    TooFewRepetitions {
        /// Token index
        at: usize,
    },
    /// An iteration failed after its separator was consumed
    #[error("repetition failed after separator at token {at}")]
    RepetitionFailed {
        /// Index of the consumed separator
        at: usize,
        /// Failure inside the iteration
        #[source]
        cause: Box<NoMatch>,
    },
    /// Opening delimiter without a balanced closing one
    #[error("unbalanced delimiter at token {at}")]
    UnbalancedGroup {
        /// Token index of the opening delimiter
        at: usize,
    },
    /// Pattern finished with input left over
    #[error("unexpected trailing tokens starting at token {at}")]
    TrailingTokens {
        /// First leftover token index
        at: usize,
    },
    /// Nesting of groups and repetitions exceeded the configured limit
    #[error("pattern nesting exceeds {limit} at token {at}")]
    DepthLimit {
        /// Configured limit
        limit: usize,
        /// Token index
        at: usize,
    },
    /// A repetition exceeded the configured iteration limit
    #[error("repetition exceeds {limit} iterations at token {at}")]
    RepetitionLimit {
        /// Configured limit
        limit: usize,
        /// Token index
        at: usize,
    },
}

/// Failure of a single rule match
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The rule does not match; try the next one
    #[error(transparent)]
    NoMatch(#[from] NoMatch),
    /// The rule itself is broken
    #[error(transparent)]
    Structural(#[from] StructuralPatternError),
}

/// A metavariable reference that cannot be traced to a declaration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnresolvedReference {
    /// No reference with this id in the rule body
    #[error("unknown reference {id:?}")]
    UnknownReference {
        /// Reference id
        id: RefId,
    },
    /// Name never declared in the rule pattern
    #[error("metavariable {name:?} is not declared in this rule")]
    NotDeclared {
        /// Referenced name
        name: Symbol,
    },
    /// Reference nesting disagrees with declaration nesting
    #[error("metavariable {name:?} is declared at repetition depth {declared} but used at depth {referenced}")]
    DepthMismatch {
        /// Referenced name
        name: Symbol,
        /// Declaration depth
        declared: usize,
        /// Number of echo groups around the reference
        referenced: usize,
    },
    /// Requested iteration does not exist in the match
    #[error("metavariable {name:?} has no fragment at iteration {iteration:?}")]
    IterationOutOfRange {
        /// Referenced name
        name: Symbol,
        /// Requested echo iteration indices
        iteration: Vec<usize>,
    },
}

/// A malformed `macro_rules!` definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacroSyntaxError {
    /// Rule pattern or body is not a delimited group
    #[error("expected a delimited group at {span}")]
    ExpectedGroup {
        /// Offending span
        span: Span,
    },
    /// Rule without `=>`
    #[error("expected `=>` at {span}")]
    MissingArrow {
        /// Offending span
        span: Span,
    },
    /// Unbalanced delimiter
    #[error("unbalanced delimiter at {span}")]
    UnbalancedDelimiter {
        /// Offending span
        span: Span,
    },
    /// `$( ... )` without `*`, `+` or `?`
    #[error("expected repetition operator after {span}")]
    MissingRepetitionOperator {
        /// Span of the repetition group
        span: Span,
    },
    /// Rules not separated by `;`
    #[error("expected `;` between rules at {span}")]
    MissingSemicolon {
        /// Offending span
        span: Span,
    },
    /// Groups or repetitions nested too deeply to parse
    #[error("rule nested too deeply at {span}")]
    NestingTooDeep {
        /// Opening delimiter where the limit was reached
        span: Span,
    },
}
