//! Textual macro resolution for Raven
//!
//! This crate answers two questions about a file: which `macro_rules!`
//! definition and rule an invocation binds to, and which pattern declaration
//! a metavariable in a rule body refers to.
//!
//! # Architecture
//!
//! - **Item tree**: scopes, definitions and invocations collected from tokens
//! - **Scope tree**: which definitions are visible at a position
//! - **Resolver**: candidate definitions, rule selection and references
//!
//! # Usage
//!
//! ```rust,ignore
//! use rv_resolve::{ItemTree, MacroResolver};
//!
//! let items = ItemTree::collect(file, &lex(source).tokens, &interner);
//! let resolver = MacroResolver::new(&items, &interner);
//! for (call, _) in &items.calls {
//!     match resolver.resolve_call(call) {
//!         Ok(matched) => { /* matched.rule, matched.bindings */ }
//!         Err(unresolved) => { /* report unresolved.reason */ }
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod item_tree;
pub mod resolver;
pub mod scope;

pub use config::{ConfigError, Precedence, ResolveConfig};
pub use error::{Unresolved, UnresolvedReason};
pub use item_tree::{CallId, ItemTree, MacroCall};
pub use resolver::MacroResolver;
pub use scope::{Scope, ScopeId, ScopeItem, ScopeKind, ScopeTree, UseSite};
