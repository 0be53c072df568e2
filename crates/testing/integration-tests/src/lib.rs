//! Integration test utilities for macro resolution
//!
//! Fixtures are plain source text with marker comments on the line below
//! the element they point at:
//!
//! - `//^` marks a reference: a macro invocation name or a `$name` in a rule body
//! - `//X` marks the declaration the reference must resolve to
//! - `//^ unresolved` marks a reference that must not resolve
//!
//! The marker character (`^` or `X`) gives the column on the previous line.

use anyhow::{Context, Result, bail, ensure};
use rv_intern::Interner;
use rv_macro::{Binding, MatchResult};
use rv_resolve::{ItemTree, MacroResolver, UnresolvedReason};
use rv_span::{FileId, Span};
use rv_tokens::{LexError, lex};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for test output
///
/// Safe to call multiple times. Enable with
/// `RUST_LOG=rv_resolve=debug` or `RUST_LOG=rv_macro=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        // Only initialize if RUST_LOG is set
        if env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_test_writer().with_target(true))
                .with(filter)
                .init();
        }
    });
}

/// Test fixture helper: one lexed and collected source file
pub struct TestFixture {
    /// Fixture source text
    pub source: String,
    /// String interner shared by every query
    pub interner: Interner,
    /// Collected scopes, definitions and calls
    pub items: ItemTree,
    /// Lexer errors, expected to be empty
    pub lex_errors: Vec<LexError>,
}

impl TestFixture {
    /// Creates a fixture from source text
    #[must_use]
    pub fn new(source: &str) -> Self {
        let interner = Interner::new();
        let lexed = lex(source);
        let items = ItemTree::collect(FileId::new(0), &lexed.tokens, &interner);
        Self {
            source: source.to_string(),
            interner,
            items,
            lex_errors: lexed.errors,
        }
    }

    /// A resolver over this fixture with default settings
    #[must_use]
    pub fn resolver(&self) -> MacroResolver<'_> {
        MacroResolver::new(&self.items, &self.interner)
    }

    /// Span of the declaration the reference at `offset` resolves to
    ///
    /// Returns `Ok(None)` when the reference is unresolved.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no reference at `offset`.
    pub fn resolve_at(&self, offset: u32) -> Result<Option<Span>> {
        let resolver = self.resolver();
        if let Some(call) = self.items.call_at(offset) {
            let resolved = resolver
                .resolve_call(call)
                .ok()
                .and_then(|matched| self.items.macro_def(matched.macro_id))
                .map(|def| def.span.span);
            return Ok(resolved);
        }
        if let Some(resolution) = resolver.reference_declaration_at(offset) {
            return Ok(resolution.ok().map(|(_, site)| site.decl.span));
        }
        bail!("no macro call or metavariable reference at offset {offset}")
    }

    /// Renders the binding table of every resolved call, one line per call
    #[must_use]
    pub fn render_calls(&self) -> String {
        let resolver = self.resolver();
        let mut out = String::new();
        for (call, data) in self.items.calls.iter() {
            let name = self.interner.resolve(&data.name);
            let line = match resolver.resolve_call(call) {
                Ok(matched) if matched.bindings.is_empty() => {
                    format!("{name}! -> rule {}", matched.rule_index)
                }
                Ok(matched) => format!(
                    "{name}! -> rule {}: {}",
                    matched.rule_index,
                    self.render_bindings(&matched)
                ),
                Err(unresolved) => {
                    format!("{name}! -> unresolved ({})", reason_label(&unresolved.reason))
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn render_bindings(&self, matched: &MatchResult) -> String {
        matched
            .bindings
            .iter()
            .map(|(name, binding)| {
                format!("{} = {}", self.interner.resolve(name), render_binding(binding))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Loads every `.rs` fixture in a directory, sorted by file name
    ///
    /// # Errors
    ///
    /// Returns an error if directory traversal or file reading fails
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
        let dir = dir.as_ref();
        let mut fixtures = Vec::new();
        let entries =
            fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
                let contents =
                    fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                fixtures.push((name, contents));
            }
        }
        fixtures.sort();
        Ok(fixtures)
    }
}

/// What the `//X` or `//^ unresolved` marker expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Resolves to the declaration covering this offset
    Declaration(u32),
    /// Does not resolve
    Unresolved,
}

/// Marker positions in a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    /// Offset of the reference
    pub reference: u32,
    /// Expected outcome
    pub expected: Expected,
}

/// Finds the `//^` and `//X` markers in `source`
///
/// # Errors
///
/// Returns an error if the reference marker is missing or duplicated, or if
/// a marker points past the end of the previous line.
pub fn find_markers(source: &str) -> Result<Markers> {
    let mut reference = None;
    let mut declaration = None;
    let mut unresolved = false;

    let mut previous: Option<(usize, &str)> = None;
    let mut line_start = 0;
    for line in source.split('\n') {
        for (marker, slot) in [("//^", &mut reference), ("//X", &mut declaration)] {
            let Some(column) = line.find(marker) else {
                continue;
            };
            let column = column + marker.len() - 1;
            let Some((previous_start, previous_line)) = previous else {
                bail!("marker `{marker}` on the first line");
            };
            ensure!(
                column < previous_line.len(),
                "marker `{marker}` points past the end of `{previous_line}`"
            );
            ensure!(slot.is_none(), "duplicate marker `{marker}`");
            *slot = Some((previous_start + column) as u32);
            if marker == "//^" {
                unresolved = line[column + 1..].trim() == "unresolved";
            }
        }
        previous = Some((line_start, line));
        line_start += line.len() + 1;
    }

    let reference = reference.context("missing `//^` marker")?;
    let expected = if unresolved {
        Expected::Unresolved
    } else {
        Expected::Declaration(declaration.context("missing `//X` marker")?)
    };
    Ok(Markers { reference, expected })
}

/// Checks that the `//^` reference in `source` resolves as its markers say
///
/// # Errors
///
/// Returns an error describing the mismatch.
pub fn check_by_code(source: &str) -> Result<()> {
    init_tracing();
    let source = trim_indent(source);
    let fixture = TestFixture::new(&source);
    ensure!(fixture.lex_errors.is_empty(), "lex errors: {:?}", fixture.lex_errors);

    let markers = find_markers(&source)?;
    let resolved = fixture.resolve_at(markers.reference)?;
    match (markers.expected, resolved) {
        (Expected::Unresolved, None) => Ok(()),
        (Expected::Unresolved, Some(span)) => {
            bail!("expected unresolved, resolved to `{}`", &source[span.range()])
        }
        (Expected::Declaration(_), None) => bail!("reference at {} is unresolved", markers.reference),
        (Expected::Declaration(offset), Some(span)) => {
            ensure!(
                span.contains(offset),
                "resolved to `{}` at {span}, expected the declaration at {offset}",
                &source[span.range()]
            );
            Ok(())
        }
    }
}

/// Removes the common leading indentation and surrounding blank lines
#[must_use]
pub fn trim_indent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|line| !line.trim().is_empty()).unwrap_or(lines.len());
    let last = lines.iter().rposition(|line| !line.trim().is_empty()).map_or(first, |last| last + 1);
    let lines = &lines[first..last];

    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn reason_label(reason: &UnresolvedReason) -> &'static str {
    match reason {
        UnresolvedReason::NotFound { .. } => "not found",
        UnresolvedReason::NotVisible { .. } => "not visible",
        UnresolvedReason::NoRuleMatched { .. } => "no rule matched",
        UnresolvedReason::Cancelled => "cancelled",
    }
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
