//! Fragment grammars used by metavariable declarations
//!
//! The matcher only needs to know how far a fragment extends, so grammars
//! report the end index of the longest parse instead of building syntax.

use crate::ast::FragmentKind;
use rv_tokens::{Delimiter, LiteralKind, Token, TokenKind, matching_close, token_tree_end};

/// Recognizes fragments of each [`FragmentKind`]
pub trait FragmentGrammar {
    /// Returns the end index (exclusive) of the longest `kind` fragment
    /// starting at `start`, or `None` when no such fragment starts there.
    ///
    /// Implementations must never read past `tokens.len()`, must treat
    /// delimited groups as atomic and must give up with `None` instead of
    /// recursing deeper than `max_nesting`.
    fn parse_fragment(
        &self,
        kind: FragmentKind,
        tokens: &[Token],
        start: usize,
        max_nesting: usize,
    ) -> Option<usize>;
}

/// Grammar for a practical subset of Rust syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFragmentGrammar;

impl FragmentGrammar for DefaultFragmentGrammar {
    fn parse_fragment(
        &self,
        kind: FragmentKind,
        tokens: &[Token],
        start: usize,
        max_nesting: usize,
    ) -> Option<usize> {
        let mut parser = FragmentParser {
            tokens,
            pos: start,
            depth: 0,
            max_nesting,
        };
        match kind {
            FragmentKind::Ident => parser.ident_fragment()?,
            FragmentKind::Lifetime => parser.eat_kind(TokenKind::Lifetime)?,
            FragmentKind::Literal => parser.literal()?,
            FragmentKind::Tt => parser.pos = token_tree_end(tokens, start)?,
            FragmentKind::Block => parser.group(Delimiter::Brace)?,
            FragmentKind::Expr => parser.expr(Restrictions::NONE)?,
            FragmentKind::Ty => parser.ty()?,
            FragmentKind::Pat => parser.pat(true)?,
            FragmentKind::PatParam => parser.pat(false)?,
            FragmentKind::Path => parser.path(PathStyle::Type)?,
            FragmentKind::Stmt => parser.stmt()?,
            FragmentKind::Item => parser.item()?,
            FragmentKind::Meta => parser.meta()?,
            FragmentKind::Vis => parser.vis()?,
        }
        Some(parser.pos)
    }
}

/// Keywords that never start a path segment
const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Restrictions {
    no_struct_literal: bool,
}

impl Restrictions {
    const NONE: Self = Self {
        no_struct_literal: false,
    };
    const CONDITION: Self = Self {
        no_struct_literal: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathStyle {
    /// Generic arguments need a turbofish (`Vec::<u8>::new`)
    Expr,
    /// Generic arguments follow the segment directly (`Vec<u8>`)
    Type,
}

// Binding powers, loosest first
const BP_ASSIGN: u8 = 1;
const BP_RANGE: u8 = 2;
const BP_OR: u8 = 3;
const BP_AND: u8 = 4;
const BP_COMPARE: u8 = 5;
const BP_BIT_OR: u8 = 6;
const BP_BIT_XOR: u8 = 7;
const BP_BIT_AND: u8 = 8;
const BP_SHIFT: u8 = 9;
const BP_SUM: u8 = 10;
const BP_PRODUCT: u8 = 11;
const BP_CAST: u8 = 12;
const BP_PREFIX: u8 = 13;

/// Binary operator recognized at the cursor
struct Infix {
    /// Left binding power
    bp: u8,
    /// Tokens making up the operator
    width: usize,
    right_assoc: bool,
    optional_rhs: bool,
}

struct FragmentParser<'tok> {
    tokens: &'tok [Token],
    pos: usize,
    /// Current recursion depth of the nesting rules
    depth: usize,
    max_nesting: usize,
}

impl<'tok> FragmentParser<'tok> {
    /// Runs `parse` one level deeper, failing once `max_nesting` is reached
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Option<()>) -> Option<()> {
        if self.depth >= self.max_nesting {
            return None;
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&'tok Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'tok Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_punct(&self, text: &str) -> bool {
        self.peek().is_some_and(|token| token.is_punct(text))
    }

    fn at_ident(&self, text: &str) -> bool {
        self.peek().is_some_and(|token| token.is_ident(text))
    }

    fn at_open(&self, delimiter: Delimiter) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Open(delimiter))
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        let found = self.at_punct(text);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_ident(&mut self, text: &str) -> bool {
        let found = self.at_ident(text);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_punct(&mut self, text: &str) -> Option<()> {
        self.eat_punct(text).then_some(())
    }

    fn expect_ident(&mut self, text: &str) -> Option<()> {
        self.eat_ident(text).then_some(())
    }

    fn eat_kind(&mut self, kind: TokenKind) -> Option<()> {
        if self.peek()?.kind == kind {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    /// Consumes a whole delimited group of the given kind
    fn group(&mut self, delimiter: Delimiter) -> Option<()> {
        if !self.at_open(delimiter) {
            return None;
        }
        self.any_group()
    }

    /// Consumes a whole delimited group of any kind
    fn any_group(&mut self) -> Option<()> {
        let close = matching_close(self.tokens, self.pos)?;
        self.pos = close + 1;
        Some(())
    }

    /// Identifier token usable as a name (keywords included, `_` excluded)
    fn ident_fragment(&mut self) -> Option<()> {
        let token = self.peek()?;
        if token.kind == TokenKind::Ident && token.text != "_" {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn plain_ident(&mut self) -> Option<()> {
        let token = self.peek()?;
        if token.kind == TokenKind::Ident && !RESERVED.contains(&token.text.as_str()) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn literal(&mut self) -> Option<()> {
        let negated = self.at_punct("-");
        let token = self.peek_at(usize::from(negated))?;
        let accepted = match token.kind {
            TokenKind::Literal(LiteralKind::Int | LiteralKind::Float) => true,
            TokenKind::Literal(_) | TokenKind::Ident => {
                !negated
                    && (token.kind != TokenKind::Ident
                        || matches!(token.text.as_str(), "true" | "false"))
            }
            _ => false,
        };
        if accepted {
            self.pos += 1 + usize::from(negated);
            Some(())
        } else {
            None
        }
    }

    // ----- paths ---------------------------------------------------------

    fn at_path_start(&self) -> bool {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Ident => {
                !RESERVED.contains(&token.text.as_str())
            }
            Some(token) => token.is_punct("::") || token.is_punct("<"),
            None => false,
        }
    }

    fn path(&mut self, style: PathStyle) -> Option<()> {
        if self.at_punct("<") {
            // Qualified path `<T as Trait>::Item`
            self.generic_args()?;
            self.expect_punct("::")?;
        } else {
            self.eat_punct("::");
        }
        self.path_segment(style)?;

        while self.at_punct("::")
            && self
                .peek_at(1)
                .is_some_and(|token| token.kind == TokenKind::Ident)
        {
            self.pos += 1;
            self.path_segment(style)?;
        }
        Some(())
    }

    fn path_segment(&mut self, style: PathStyle) -> Option<()> {
        self.plain_ident()?;
        let turbofish = self.at_punct("::") && self.peek_at(1).is_some_and(|token| token.is_punct("<"));
        match style {
            PathStyle::Expr => {
                if turbofish {
                    self.pos += 1;
                    self.generic_args()?;
                }
            }
            PathStyle::Type => {
                if turbofish {
                    self.pos += 1;
                }
                if self.at_punct("<") {
                    self.generic_args()?;
                } else if self.at_open(Delimiter::Paren) {
                    // `Fn(A) -> B` sugar
                    self.any_group()?;
                    if self.eat_punct("->") {
                        self.ty()?;
                    }
                }
            }
        }
        Some(())
    }

    /// Consumes `< ... >`, tracking nested angle brackets
    fn generic_args(&mut self) -> Option<()> {
        self.expect_punct("<")?;
        let mut depth = 1usize;
        while depth > 0 {
            let token = self.peek()?;
            match token.kind {
                TokenKind::Open(_) => {
                    self.any_group()?;
                    continue;
                }
                TokenKind::Close(_) => return None,
                TokenKind::Punct if token.text == "<" => depth += 1,
                TokenKind::Punct if token.text == ">" => depth -= 1,
                TokenKind::Punct if token.text == ";" => return None,
                _ => {}
            }
            self.pos += 1;
        }
        Some(())
    }

    // ----- types ---------------------------------------------------------

    fn ty(&mut self) -> Option<()> {
        self.nested(Self::parse_ty)
    }

    fn parse_ty(&mut self) -> Option<()> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Open(Delimiter::Paren | Delimiter::Bracket) => self.any_group(),
            TokenKind::Punct => match token.text.as_str() {
                "!" => {
                    self.pos += 1;
                    Some(())
                }
                "&" | "&&" => {
                    self.pos += 1;
                    if self.peek().is_some_and(|next| next.kind == TokenKind::Lifetime) {
                        self.pos += 1;
                    }
                    self.eat_ident("mut");
                    self.ty()
                }
                "*" => {
                    self.pos += 1;
                    if !self.eat_ident("const") {
                        self.expect_ident("mut")?;
                    }
                    self.ty()
                }
                "<" | "::" => self.path(PathStyle::Type),
                _ => None,
            },
            TokenKind::Ident => match token.text.as_str() {
                "_" => {
                    self.pos += 1;
                    Some(())
                }
                "fn" | "unsafe" | "extern" => self.fn_pointer(),
                "impl" | "dyn" => {
                    self.pos += 1;
                    self.bounds()
                }
                "for" => {
                    self.pos += 1;
                    self.generic_args()?;
                    self.ty()
                }
                _ => self.path(PathStyle::Type),
            },
            _ => None,
        }
    }

    fn fn_pointer(&mut self) -> Option<()> {
        self.eat_ident("unsafe");
        if self.eat_ident("extern") {
            self.eat_kind(TokenKind::Literal(LiteralKind::Str));
        }
        self.expect_ident("fn")?;
        self.group(Delimiter::Paren)?;
        if self.eat_punct("->") {
            self.ty()?;
        }
        Some(())
    }

    fn bounds(&mut self) -> Option<()> {
        self.bound()?;
        while self.at_punct("+") {
            self.pos += 1;
            self.bound()?;
        }
        Some(())
    }

    fn bound(&mut self) -> Option<()> {
        if self.peek()?.kind == TokenKind::Lifetime {
            self.pos += 1;
            return Some(());
        }
        if self.at_open(Delimiter::Paren) {
            return self.any_group();
        }
        self.eat_punct("?");
        if self.eat_ident("for") {
            self.generic_args()?;
        }
        self.path(PathStyle::Type)
    }

    // ----- patterns ------------------------------------------------------

    fn pat(&mut self, top_alternatives: bool) -> Option<()> {
        if top_alternatives {
            self.eat_punct("|");
        }
        self.pat_single()?;
        while top_alternatives && self.at_punct("|") {
            self.pos += 1;
            self.pat_single()?;
        }
        Some(())
    }

    fn pat_single(&mut self) -> Option<()> {
        self.nested(Self::parse_pat_single)
    }

    fn parse_pat_single(&mut self) -> Option<()> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Open(Delimiter::Paren | Delimiter::Bracket) => self.any_group(),
            TokenKind::Literal(_) => {
                self.pos += 1;
                self.pat_range_tail()
            }
            TokenKind::Punct => match token.text.as_str() {
                "-" => {
                    self.literal()?;
                    self.pat_range_tail()
                }
                "&" | "&&" => {
                    self.pos += 1;
                    self.eat_ident("mut");
                    self.pat_single()
                }
                ".." => {
                    self.pos += 1;
                    Some(())
                }
                "::" | "<" => self.pat_path(),
                _ => None,
            },
            TokenKind::Ident => match token.text.as_str() {
                "_" | "true" | "false" => {
                    self.pos += 1;
                    Some(())
                }
                "ref" | "mut" => {
                    self.eat_ident("ref");
                    self.eat_ident("mut");
                    self.plain_ident()?;
                    if self.eat_punct("@") {
                        self.pat_single()?;
                    }
                    Some(())
                }
                _ => {
                    if self.peek_at(1).is_some_and(|next| next.is_punct("@")) {
                        self.plain_ident()?;
                        self.pos += 1;
                        return self.pat_single();
                    }
                    self.pat_path()
                }
            },
            _ => None,
        }
    }

    fn pat_path(&mut self) -> Option<()> {
        self.path(PathStyle::Expr)?;
        if self.at_punct("!") && self.peek_at(1).is_some_and(Token::is_open) {
            self.pos += 1;
            return self.any_group();
        }
        if self.at_open(Delimiter::Paren) || self.at_open(Delimiter::Brace) {
            return self.any_group();
        }
        self.pat_range_tail()
    }

    fn pat_range_tail(&mut self) -> Option<()> {
        if !(self.at_punct("..=") || self.at_punct("...") || self.at_punct("..")) {
            return Some(());
        }
        self.pos += 1;
        let bounded = self.peek().is_some_and(|token| {
            matches!(token.kind, TokenKind::Literal(_)) || token.is_punct("-") || token.is_punct("::")
                || (token.kind == TokenKind::Ident && !RESERVED.contains(&token.text.as_str()))
        });
        if bounded {
            if self.at_path_start() {
                self.path(PathStyle::Expr)?;
            } else {
                self.literal()?;
            }
        }
        Some(())
    }

    // ----- expressions ---------------------------------------------------

    fn expr(&mut self, restrictions: Restrictions) -> Option<()> {
        self.expr_bp(0, restrictions)
    }

    fn can_begin_expr(&self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        match token.kind {
            TokenKind::Literal(_) | TokenKind::Lifetime | TokenKind::Open(_) => true,
            TokenKind::Ident => !matches!(token.text.as_str(), "as" | "else" | "in" | "where"),
            TokenKind::Punct => matches!(
                token.text.as_str(),
                "-" | "!" | "*" | "&" | "&&" | "|" | "||" | ".." | "..=" | "::" | "<" | "#"
            ),
            TokenKind::Close(_) | TokenKind::Dollar => false,
        }
    }

    fn expr_bp(&mut self, min_bp: u8, restrictions: Restrictions) -> Option<()> {
        self.nested(|parser| parser.parse_expr_bp(min_bp, restrictions))
    }

    fn parse_expr_bp(&mut self, min_bp: u8, restrictions: Restrictions) -> Option<()> {
        self.prefix_expr(restrictions)?;

        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Punct if token.text == "?" => self.pos += 1,
                TokenKind::Punct if token.text == "." => {
                    self.pos += 1;
                    self.field_or_method()?;
                }
                TokenKind::Open(Delimiter::Paren | Delimiter::Bracket) => self.any_group()?,
                TokenKind::Ident if token.text == "as" => {
                    if BP_CAST < min_bp {
                        break;
                    }
                    self.pos += 1;
                    self.ty()?;
                }
                _ => {
                    let Some(infix) = self.infix() else {
                        break;
                    };
                    if infix.bp < min_bp {
                        break;
                    }
                    self.pos += infix.width;
                    let rhs_bp = if infix.right_assoc { infix.bp } else { infix.bp + 1 };
                    if infix.optional_rhs && !self.can_begin_expr() {
                        continue;
                    }
                    self.expr_bp(rhs_bp, restrictions)?;
                }
            }
        }
        Some(())
    }

    fn infix(&self) -> Option<Infix> {
        let token = self.peek()?;
        if token.kind != TokenKind::Punct {
            return None;
        }
        let adjacent_twin = self
            .peek_at(1)
            .is_some_and(|next| next.text == token.text && next.span.start == token.span.end);
        let simple = |bp| Infix {
            bp,
            width: 1,
            right_assoc: false,
            optional_rhs: false,
        };

        let infix = match token.text.as_str() {
            "<" | ">" if adjacent_twin => Infix {
                width: 2,
                ..simple(BP_SHIFT)
            },
            "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "^=" | "&=" | "|=" => Infix {
                right_assoc: true,
                ..simple(BP_ASSIGN)
            },
            ".." | "..=" => Infix {
                optional_rhs: true,
                ..simple(BP_RANGE)
            },
            "||" => simple(BP_OR),
            "&&" => simple(BP_AND),
            "==" | "!=" | "<" | ">" | "<=" | ">=" => simple(BP_COMPARE),
            "|" => simple(BP_BIT_OR),
            "^" => simple(BP_BIT_XOR),
            "&" => simple(BP_BIT_AND),
            "+" | "-" => simple(BP_SUM),
            "*" | "/" | "%" => simple(BP_PRODUCT),
            _ => return None,
        };
        Some(infix)
    }

    fn field_or_method(&mut self) -> Option<()> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Literal(LiteralKind::Int | LiteralKind::Float) => {
                self.pos += 1;
                Some(())
            }
            TokenKind::Ident => {
                self.pos += 1;
                if self.at_punct("::") && self.peek_at(1).is_some_and(|next| next.is_punct("<")) {
                    self.pos += 1;
                    self.generic_args()?;
                }
                Some(())
            }
            _ => None,
        }
    }

    fn prefix_expr(&mut self, restrictions: Restrictions) -> Option<()> {
        self.nested(|parser| parser.parse_prefix_expr(restrictions))
    }

    fn parse_prefix_expr(&mut self, restrictions: Restrictions) -> Option<()> {
        let token = self.peek()?;
        if token.kind == TokenKind::Punct {
            match token.text.as_str() {
                "-" | "!" | "*" => {
                    self.pos += 1;
                    return self.expr_bp(BP_PREFIX, restrictions);
                }
                "&" | "&&" => {
                    self.pos += 1;
                    self.eat_ident("mut");
                    return self.expr_bp(BP_PREFIX, restrictions);
                }
                ".." | "..=" => {
                    self.pos += 1;
                    if self.can_begin_expr() {
                        self.expr_bp(BP_RANGE + 1, restrictions)?;
                    }
                    return Some(());
                }
                "#" => {
                    self.pos += 1;
                    self.group(Delimiter::Bracket)?;
                    return self.prefix_expr(restrictions);
                }
                _ => {}
            }
        }
        self.primary_expr(restrictions)
    }

    fn primary_expr(&mut self, restrictions: Restrictions) -> Option<()> {
        self.nested(|parser| parser.parse_primary_expr(restrictions))
    }

    fn parse_primary_expr(&mut self, restrictions: Restrictions) -> Option<()> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Literal(_) => {
                self.pos += 1;
                Some(())
            }
            TokenKind::Open(_) => self.any_group(),
            TokenKind::Lifetime => {
                // Labeled loop or block
                self.pos += 1;
                self.expect_punct(":")?;
                self.primary_expr(restrictions)
            }
            TokenKind::Punct => match token.text.as_str() {
                "|" | "||" => self.closure(),
                "::" | "<" => self.path_expr(restrictions),
                _ => None,
            },
            TokenKind::Ident => self.keyword_or_path_expr(restrictions),
            TokenKind::Close(_) | TokenKind::Dollar => None,
        }
    }

    fn keyword_or_path_expr(&mut self, restrictions: Restrictions) -> Option<()> {
        let text = self.peek()?.text.clone();
        match text.as_str() {
            "true" | "false" | "_" => {
                self.pos += 1;
                Some(())
            }
            "if" => self.if_expr(),
            "match" | "while" => {
                self.pos += 1;
                self.expr(Restrictions::CONDITION)?;
                self.group(Delimiter::Brace)
            }
            "loop" | "unsafe" | "const" => {
                self.pos += 1;
                self.group(Delimiter::Brace)
            }
            "for" => {
                self.pos += 1;
                self.pat(true)?;
                self.expect_ident("in")?;
                self.expr(Restrictions::CONDITION)?;
                self.group(Delimiter::Brace)
            }
            "let" => {
                self.pos += 1;
                self.pat(true)?;
                self.expect_punct("=")?;
                self.expr_bp(BP_AND + 1, restrictions)
            }
            "async" => {
                self.pos += 1;
                self.eat_ident("move");
                if self.at_punct("|") || self.at_punct("||") {
                    self.closure()
                } else {
                    self.group(Delimiter::Brace)
                }
            }
            "move" => {
                self.pos += 1;
                self.closure()
            }
            "return" | "break" | "yield" | "continue" => {
                self.pos += 1;
                if self.peek().is_some_and(|next| next.kind == TokenKind::Lifetime) {
                    self.pos += 1;
                }
                if text != "continue" && self.can_begin_expr() {
                    self.expr_bp(BP_ASSIGN, restrictions)?;
                }
                Some(())
            }
            _ => self.path_expr(restrictions),
        }
    }

    fn if_expr(&mut self) -> Option<()> {
        loop {
            self.expect_ident("if")?;
            self.expr(Restrictions::CONDITION)?;
            self.group(Delimiter::Brace)?;
            if !self.eat_ident("else") {
                return Some(());
            }
            if !self.at_ident("if") {
                return self.group(Delimiter::Brace);
            }
        }
    }

    fn closure(&mut self) -> Option<()> {
        if !self.eat_punct("||") {
            self.expect_punct("|")?;
            while !self.eat_punct("|") {
                self.pat(false)?;
                if self.eat_punct(":") {
                    self.ty()?;
                }
                if !self.eat_punct(",") {
                    self.expect_punct("|")?;
                    break;
                }
            }
        }
        if self.eat_punct("->") {
            self.ty()?;
            return self.group(Delimiter::Brace);
        }
        self.expr_bp(BP_ASSIGN, Restrictions::NONE)
    }

    fn path_expr(&mut self, restrictions: Restrictions) -> Option<()> {
        self.path(PathStyle::Expr)?;
        if self.at_punct("!") && self.peek_at(1).is_some_and(Token::is_open) {
            self.pos += 1;
            return self.any_group();
        }
        if self.at_open(Delimiter::Brace) && !restrictions.no_struct_literal {
            return self.any_group();
        }
        Some(())
    }

    // ----- statements and items ------------------------------------------

    fn stmt(&mut self) -> Option<()> {
        if self.eat_ident("let") {
            self.pat(true)?;
            if self.eat_punct(":") {
                self.ty()?;
            }
            if self.eat_punct("=") {
                self.expr(Restrictions::NONE)?;
                if self.eat_ident("else") {
                    self.group(Delimiter::Brace)?;
                }
            }
            return Some(());
        }
        if self.at_item_start() {
            return self.item();
        }
        self.expr(Restrictions::NONE)
    }

    fn at_item_start(&self) -> bool {
        let mut offset = 0;
        loop {
            let Some(token) = self.peek_at(offset) else {
                return false;
            };
            if token.is_punct("#") {
                return true;
            }
            if token.kind != TokenKind::Ident {
                return false;
            }
            match token.text.as_str() {
                "pub" | "async" | "extern" | "default" => offset += 1,
                "unsafe" | "const" => {
                    // `unsafe { }` and `const { }` are expressions
                    return !self
                        .peek_at(offset + 1)
                        .is_some_and(|next| next.kind == TokenKind::Open(Delimiter::Brace));
                }
                "fn" | "struct" | "enum" | "union" | "trait" | "impl" | "mod" | "use" | "static"
                | "type" | "macro_rules" => return true,
                _ => return false,
            }
        }
    }

    fn item(&mut self) -> Option<()> {
        while self.eat_punct("#") {
            self.eat_punct("!");
            self.group(Delimiter::Bracket)?;
        }
        self.vis()?;
        loop {
            let token = self.peek()?;
            if token.kind != TokenKind::Ident {
                return None;
            }
            match token.text.as_str() {
                "async" | "unsafe" | "default" => self.pos += 1,
                "extern" => {
                    self.pos += 1;
                    self.eat_kind(TokenKind::Literal(LiteralKind::Str));
                    if self.at_ident("crate") {
                        return self.until_semicolon();
                    }
                }
                "const" if self.peek_at(1).is_some_and(|next| next.is_ident("fn")) => {
                    self.pos += 1;
                }
                "fn" | "struct" | "enum" | "union" | "trait" | "impl" | "mod" => {
                    self.pos += 1;
                    return self.item_tail();
                }
                "use" | "static" | "const" | "type" => {
                    self.pos += 1;
                    return self.until_semicolon();
                }
                "macro_rules" => {
                    self.pos += 1;
                    self.expect_punct("!")?;
                    self.plain_ident()?;
                    let is_brace = self.at_open(Delimiter::Brace);
                    self.any_group()?;
                    if !is_brace {
                        self.expect_punct(";")?;
                    }
                    return Some(());
                }
                _ => {
                    // Macro invocation in item position
                    self.path(PathStyle::Expr)?;
                    self.expect_punct("!")?;
                    let is_brace = self.at_open(Delimiter::Brace);
                    self.any_group()?;
                    if !is_brace {
                        self.expect_punct(";")?;
                    }
                    return Some(());
                }
            }
        }
    }

    /// Consumes through the item body: a `;` or a brace group at depth zero
    fn item_tail(&mut self) -> Option<()> {
        loop {
            let token = self.peek()?;
            match token.kind {
                TokenKind::Open(Delimiter::Brace) => return self.any_group(),
                TokenKind::Open(_) => self.any_group()?,
                TokenKind::Close(_) => return None,
                TokenKind::Punct if token.text == ";" => {
                    self.pos += 1;
                    return Some(());
                }
                _ => self.pos += 1,
            }
        }
    }

    fn until_semicolon(&mut self) -> Option<()> {
        loop {
            let token = self.peek()?;
            match token.kind {
                TokenKind::Open(_) => self.any_group()?,
                TokenKind::Close(_) => return None,
                TokenKind::Punct if token.text == ";" => {
                    self.pos += 1;
                    return Some(());
                }
                _ => self.pos += 1,
            }
        }
    }

    fn meta(&mut self) -> Option<()> {
        self.eat_ident("unsafe");
        self.path(PathStyle::Expr)?;
        if self.peek().is_some_and(Token::is_open) {
            return self.any_group();
        }
        if self.eat_punct("=") {
            return self.expr(Restrictions::NONE);
        }
        Some(())
    }

    fn vis(&mut self) -> Option<()> {
        if !self.eat_ident("pub") {
            return Some(());
        }
        if self.at_open(Delimiter::Paren) {
            let restricted = self.peek_at(1).is_some_and(|token| {
                matches!(token.text.as_str(), "crate" | "self" | "super" | "in")
            });
            if restricted {
                self.any_group()?;
            }
        }
        Some(())
    }
}
