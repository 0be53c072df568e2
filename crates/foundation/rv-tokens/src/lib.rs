//! Token model shared by the macro matcher and the item collector
//!
//! Tokens are flat: delimiters appear as separate `Open`/`Close` tokens and
//! [`matching_close`] recovers the tree structure on demand. This keeps every
//! consumed token addressable by index, which the matcher relies on to report
//! exactly which tokens each pattern node consumed.

mod lexer;

pub use lexer::{LexError, Lexed, lex};

use rv_span::Span;
use std::fmt;

/// Delimiter of a token group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
    /// Parentheses (...)
    Paren,
    /// Brackets [...]
    Bracket,
    /// Braces {...}
    Brace,
}

impl Delimiter {
    /// Opening character
    #[must_use]
    pub const fn open_char(self) -> char {
        match self {
            Self::Paren => '(',
            Self::Bracket => '[',
            Self::Brace => '{',
        }
    }

    /// Closing character
    #[must_use]
    pub const fn close_char(self) -> char {
        match self {
            Self::Paren => ')',
            Self::Bracket => ']',
            Self::Brace => '}',
        }
    }
}

/// Literal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    /// Integer literal, including suffixed and radix-prefixed forms
    Int,
    /// Float literal
    Float,
    /// String literal (plain or raw)
    Str,
    /// Byte string literal
    ByteStr,
    /// Character literal
    Char,
    /// Byte literal
    Byte,
}

/// Kind tag of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident,
    /// Lifetime such as `'a`
    Lifetime,
    /// Literal value
    Literal(LiteralKind),
    /// Punctuation, possibly multi-character (`=>`, `::`, `..=`)
    Punct,
    /// Opening delimiter
    Open(Delimiter),
    /// Closing delimiter
    Close(Delimiter),
    /// Metavariable sigil `$`
    Dollar,
}

/// A lexical unit with its source text and span
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// Kind tag
    pub kind: TokenKind,
    /// Source text
    pub text: String,
    /// Byte span in the source file
    pub span: Span,
}

impl Token {
    /// Creates a token
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Whether `self` and `other` are the same token by kind and text, ignoring spans
    #[must_use]
    pub fn same_token(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }

    /// Whether this is the identifier or keyword `text`
    #[must_use]
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }

    /// Whether this is the punctuation `text`
    #[must_use]
    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    /// Whether this token opens a group
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.kind, TokenKind::Open(_))
    }

    /// Whether this token closes a group
    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self.kind, TokenKind::Close(_))
    }

    /// Delimiter opened by this token, if any
    #[must_use]
    pub const fn open_delimiter(&self) -> Option<Delimiter> {
        match self.kind {
            TokenKind::Open(delimiter) => Some(delimiter),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.text)
    }
}

/// Finds the index of the delimiter closing the group opened at `open`
///
/// Returns `None` when `tokens[open]` is not an opening delimiter, or when the
/// group is unbalanced or closed by the wrong delimiter kind.
#[must_use]
pub fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let first = tokens.get(open)?.open_delimiter()?;
    let mut stack = vec![first];

    for (index, token) in tokens.iter().enumerate().skip(open + 1) {
        match token.kind {
            TokenKind::Open(delimiter) => stack.push(delimiter),
            TokenKind::Close(delimiter) => {
                if stack.pop()? != delimiter {
                    return None;
                }
                if stack.is_empty() {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

/// Index one past the end of the token tree starting at `start`
///
/// A token tree is a single non-delimiter token or a whole balanced group.
/// Returns `None` for a stray closing delimiter or an unbalanced group.
#[must_use]
pub fn token_tree_end(tokens: &[Token], start: usize) -> Option<usize> {
    let token = tokens.get(start)?;
    match token.kind {
        TokenKind::Open(_) => matching_close(tokens, start).map(|close| close + 1),
        TokenKind::Close(_) => None,
        _ => Some(start + 1),
    }
}

/// Renders tokens as space-separated source text
///
/// No space is inserted after an opening delimiter or before a closing one,
/// so `( a , b )` renders as `(a , b)`.
#[must_use]
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut previous: Option<&Token> = None;
    for token in tokens {
        let glued = previous.is_none_or(|last| last.is_open() || token.is_close());
        if !glued {
            out.push(' ');
        }
        out.push_str(&token.text);
        previous = Some(token);
    }
    out
}

/// Span covering `tokens`, or `None` for an empty slice
#[must_use]
pub fn span_of(tokens: &[Token]) -> Option<Span> {
    let first = tokens.first()?;
    let last = tokens.last()?;
    Some(first.span.cover(last.span))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        lex(source).tokens
    }

    #[test]
    fn test_matching_close_nested() {
        let toks = tokens("( a [ b ] { c } ) d");
        assert_eq!(matching_close(&toks, 0), Some(8));
        assert_eq!(matching_close(&toks, 2), Some(4));
        assert_eq!(matching_close(&toks, 1), None);
    }

    #[test]
    fn test_matching_close_rejects_mismatched_kind() {
        let toks = tokens("( a ]");
        assert_eq!(matching_close(&toks, 0), None);
    }

    #[test]
    fn test_token_tree_end() {
        let toks = tokens("x (y z) )");
        assert_eq!(token_tree_end(&toks, 0), Some(1));
        assert_eq!(token_tree_end(&toks, 1), Some(5));
        assert_eq!(token_tree_end(&toks, 5), None);
    }

    #[test]
    fn test_same_token_ignores_span() {
        let toks = tokens("foo foo");
        assert_ne!(toks[0], toks[1]);
        assert!(toks[0].same_token(&toks[1]));
    }

    #[test]
    fn test_render() {
        let toks = tokens("foo ( a , b ) [ ]");
        assert_eq!(render(&toks), "foo (a , b) []");
        assert_eq!(span_of(&toks), Some(Span::new(0, 17)));
    }
}
