// ABOUTME: Token kinds and the keyword table shared by the lexer and parser

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Str,
    TripleStr,
    Number,
    True,
    False,

    Ident,

    /// `$name` or the accumulator `$@`; the token text keeps the sigil.
    Dollar,
    /// A lone `$` not followed by an identifier.
    PipeVar,

    // Keywords
    Break,
    Return,
    Each,
    Map,
    Fold,
    Filter,

    // Two-character operators
    Arrow,        // ->
    FatArrow,     // =>
    CaptureArrow, // :>
    Destruct,     // *<
    SliceOp,      // /<
    AndAnd,       // &&
    OrOr,         // ||
    EqEq,         // ==
    BangEq,       // !=
    LtEq,         // <=
    GtEq,         // >=
    Coalesce,     // ??
    OptChain,     // .?
    ColonColon,   // ::

    // Single-character operators and punctuation
    Dot,
    Question,
    At,
    Colon,
    Comma,
    Bang,
    Eq,
    Lt,
    Gt,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Caret,

    /// A bare `---` at column 1.
    FrontmatterDelim,
    /// A raw line inside the frontmatter block.
    FrontmatterLine,
    Newline,
    Comment,
    Eof,
}

impl TokenKind {
    /// Promote an identifier to a keyword token where one exists.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "break" => Some(TokenKind::Break),
            "return" => Some(TokenKind::Return),
            "each" => Some(TokenKind::Each),
            "map" => Some(TokenKind::Map),
            "fold" => Some(TokenKind::Fold),
            "filter" => Some(TokenKind::Filter),
            _ => None,
        }
    }

    /// Human-readable name used in parse error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Str | TokenKind::TripleStr => "string",
            TokenKind::Number => "number",
            TokenKind::True | TokenKind::False => "boolean",
            TokenKind::Ident => "identifier",
            TokenKind::Dollar => "variable",
            TokenKind::PipeVar => "$",
            TokenKind::Break => "break",
            TokenKind::Return => "return",
            TokenKind::Each => "each",
            TokenKind::Map => "map",
            TokenKind::Fold => "fold",
            TokenKind::Filter => "filter",
            TokenKind::Arrow => "->",
            TokenKind::FatArrow => "=>",
            TokenKind::CaptureArrow => ":>",
            TokenKind::Destruct => "*<",
            TokenKind::SliceOp => "/<",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Coalesce => "??",
            TokenKind::OptChain => ".?",
            TokenKind::ColonColon => "::",
            TokenKind::Dot => ".",
            TokenKind::Question => "?",
            TokenKind::At => "@",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Bang => "!",
            TokenKind::Eq => "=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Pipe => "|",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Amp => "&",
            TokenKind::Caret => "^",
            TokenKind::FrontmatterDelim => "---",
            TokenKind::FrontmatterLine => "frontmatter",
            TokenKind::Newline => "newline",
            TokenKind::Comment => "comment",
            TokenKind::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}
