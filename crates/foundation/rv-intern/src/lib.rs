//! String interning for symbols
//!
//! Macro names and metavariable names are interned so that bindings and
//! visibility lookups compare by key instead of by string.

pub use lasso::Spur as Symbol;
use lasso::ThreadedRodeo;
use std::fmt;
use std::sync::Arc;

/// Thread-safe string interner, cheap to clone
#[derive(Clone, Default)]
pub struct Interner {
    inner: Arc<ThreadedRodeo>,
}

impl Interner {
    /// Creates an empty interner
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ThreadedRodeo::new()),
        }
    }

    /// Interns `text`, returning the existing symbol if already present
    pub fn intern(&self, text: &str) -> Symbol {
        self.inner.get_or_intern(text)
    }

    /// Resolves a symbol to its string
    ///
    /// Symbols from a different interner resolve to an empty string.
    #[must_use]
    pub fn resolve(&self, sym: &Symbol) -> String {
        self.try_resolve(sym).unwrap_or_default()
    }

    /// Resolves a symbol, returning `None` if it was not produced by this interner
    #[must_use]
    pub fn try_resolve(&self, sym: &Symbol) -> Option<String> {
        self.inner.try_resolve(sym).map(ToString::to_string)
    }

    /// Number of distinct interned strings
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing has been interned yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Interner")
            .field("len", &self.len())
            .finish()
    }
}
