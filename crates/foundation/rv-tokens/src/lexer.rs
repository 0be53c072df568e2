//! Logos-based lexer for Rust-like source text

use crate::{Delimiter, LiteralKind, Token, TokenKind};
use logos::Logos;
use rv_span::Span;

/// Raw token from logos, before conversion to [`Token`]
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    Comment,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[regex(r"'[a-zA-Z_][a-zA-Z0-9_]*")]
    Lifetime,

    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9_]+)?([a-zA-Z_][a-zA-Z0-9_]*)?")]
    #[regex(r"0x[0-9a-fA-F_]+([iu](8|16|32|64|128|size))?")]
    #[regex(r"0o[0-7_]+([iu](8|16|32|64|128|size))?")]
    #[regex(r"0b[01_]+([iu](8|16|32|64|128|size))?")]
    Number,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"r"[^"]*""#)]
    #[regex(r##"r#"([^"]|"[^#])*"#"##)]
    Str,

    #[regex(r#"b"([^"\\]|\\.)*""#)]
    ByteStr,

    #[regex(r"'([^'\\\n]|\\[^\n][^'\n]*)'")]
    Char,

    #[regex(r"b'([^'\\\n]|\\[^\n][^'\n]*)'")]
    Byte,

    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,

    #[token("$")]
    Dollar,

    #[token("::")]
    #[token("=>")]
    #[token("->")]
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token("&&")]
    #[token("||")]
    #[token("..")]
    #[token("...")]
    #[token("..=")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("^=")]
    #[token("&=")]
    #[token("|=")]
    #[regex(r"[-+*/%^!&|=<>@.,;:#?~]")]
    Punct,
}

/// An unrecognized character sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized input {text:?} at {span}")]
pub struct LexError {
    /// Offending text
    pub text: String,
    /// Where it occurred
    pub span: Span,
}

/// Result of lexing a source string
#[derive(Debug, Clone, Default)]
pub struct Lexed {
    /// Tokens in source order
    pub tokens: Vec<Token>,
    /// Unrecognized input, skipped in `tokens`
    pub errors: Vec<LexError>,
}

/// Lexes `source` into flat tokens, skipping whitespace and comments
#[must_use]
pub fn lex(source: &str) -> Lexed {
    let mut lexed = Lexed::default();
    let mut logos = RawToken::lexer(source);

    while let Some(result) = logos.next() {
        let span = Span::from_range(logos.span());
        let slice = logos.slice();

        match result {
            Ok(raw) => {
                if let Some(kind) = convert_token(raw, slice) {
                    lexed.tokens.push(Token::new(kind, slice, span));
                }
            }
            Err(()) => lexed.errors.push(LexError {
                text: slice.to_string(),
                span,
            }),
        }
    }

    lexed
}

fn convert_token(raw: RawToken, slice: &str) -> Option<TokenKind> {
    let kind = match raw {
        RawToken::Comment => return None,
        RawToken::Ident => TokenKind::Ident,
        RawToken::Lifetime => TokenKind::Lifetime,
        RawToken::Number => {
            let is_float = !slice.starts_with("0x") && slice.contains('.');
            if is_float {
                TokenKind::Literal(LiteralKind::Float)
            } else {
                TokenKind::Literal(LiteralKind::Int)
            }
        }
        RawToken::Str => TokenKind::Literal(LiteralKind::Str),
        RawToken::ByteStr => TokenKind::Literal(LiteralKind::ByteStr),
        RawToken::Char => TokenKind::Literal(LiteralKind::Char),
        RawToken::Byte => TokenKind::Literal(LiteralKind::Byte),
        RawToken::OpenParen => TokenKind::Open(Delimiter::Paren),
        RawToken::CloseParen => TokenKind::Close(Delimiter::Paren),
        RawToken::OpenBracket => TokenKind::Open(Delimiter::Bracket),
        RawToken::CloseBracket => TokenKind::Close(Delimiter::Bracket),
        RawToken::OpenBrace => TokenKind::Open(Delimiter::Brace),
        RawToken::CloseBrace => TokenKind::Close(Delimiter::Brace),
        RawToken::Dollar => TokenKind::Dollar,
        RawToken::Punct => TokenKind::Punct,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        lex(source)
            .tokens
            .into_iter()
            .map(|token| (token.kind, token.text))
            .collect()
    }

    #[test]
    fn test_macro_rules_header() {
        let toks = kinds("macro_rules! foo { ($x:expr) => {} }");
        let texts: Vec<&str> = toks.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "macro_rules", "!", "foo", "{", "(", "$", "x", ":", "expr", ")", "=>", "{", "}",
                "}"
            ]
        );
        assert_eq!(toks[5].0, TokenKind::Dollar);
        assert_eq!(toks[10].0, TokenKind::Punct);
    }

    #[test]
    fn test_comments_are_skipped() {
        let lexed = lex("a // line\n /* block */ b");
        assert_eq!(lexed.tokens.len(), 2);
        assert_eq!(lexed.tokens[1].text, "b");
        assert_eq!(lexed.tokens[1].span, Span::new(23, 24));
    }

    #[test]
    fn test_literals_and_lifetimes() {
        let toks = kinds(r#"1 2.5 0xff 'a' 'b "s" 1..2 b'x'"#);
        assert_eq!(toks[0].0, TokenKind::Literal(LiteralKind::Int));
        assert_eq!(toks[1].0, TokenKind::Literal(LiteralKind::Float));
        assert_eq!(toks[2].0, TokenKind::Literal(LiteralKind::Int));
        assert_eq!(toks[3].0, TokenKind::Literal(LiteralKind::Char));
        assert_eq!(toks[4].0, TokenKind::Lifetime);
        assert_eq!(toks[5].0, TokenKind::Literal(LiteralKind::Str));
        assert_eq!(toks[6].1, "1");
        assert_eq!(toks[7].1, "..");
        assert_eq!(toks[8].1, "2");
        assert_eq!(toks[9].0, TokenKind::Literal(LiteralKind::Byte));
    }

    #[test]
    fn test_unrecognized_input_is_reported() {
        let lexed = lex("a \\ b");
        assert_eq!(lexed.tokens.len(), 2);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].span, Span::new(2, 3));
    }
}
