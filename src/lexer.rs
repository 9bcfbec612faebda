// ABOUTME: Hand-written UTF-8 lexer producing a finite, spanned token stream

use crate::error::{ErrorKind, RillError};
use crate::span::{Location, Span};
use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    keep_comments: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            keep_comments: false,
        }
    }

    /// A lexer that emits `Comment` tokens instead of skipping them,
    /// for syntax-highlighting consumers.
    pub fn with_comments(source: &'a str) -> Self {
        Self {
            keep_comments: true,
            ..Self::new(source)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, RillError> {
        let mut tokens = Vec::new();
        self.lex_frontmatter(&mut tokens)?;

        loop {
            self.skip_blank();
            let start = self.location();
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", Span::point(start)));
                break;
            };

            match ch {
                '\n' => {
                    self.bump();
                    tokens.push(Token::new(TokenKind::Newline, "\n", self.span_from(start)));
                }
                '#' => {
                    let text = self.take_line_rest();
                    if self.keep_comments {
                        tokens.push(Token::new(TokenKind::Comment, text, self.span_from(start)));
                    }
                }
                '"' => tokens.push(self.lex_string()?),
                '$' => tokens.push(self.lex_dollar()),
                c if c.is_ascii_digit() => tokens.push(self.lex_number()),
                c if is_ident_start(c) => tokens.push(self.lex_ident()),
                '-' if self.column == 1 && self.is_frontmatter_delim() => {
                    self.bump();
                    self.bump();
                    self.bump();
                    tokens.push(Token::new(
                        TokenKind::FrontmatterDelim,
                        "---",
                        self.span_from(start),
                    ));
                }
                _ => tokens.push(self.lex_operator()?),
            }
        }

        Ok(tokens)
    }

    // ===== Cursor primitives =====

    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column, self.pos)
    }

    fn span_from(&self, start: Location) -> Span {
        Span::new(start, self.location())
    }

    /// Skip spaces, tabs, and carriage returns. Newlines are tokens.
    fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.bump();
        }
    }

    fn take_line_rest(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.bump();
        }
        text
    }

    // ===== Frontmatter =====

    fn is_frontmatter_delim(&self) -> bool {
        let rest = self.rest();
        if !rest.starts_with("---") {
            return false;
        }
        matches!(rest[3..].chars().next(), None | Some('\n') | Some('\r'))
    }

    /// Lex an optional leading frontmatter block. Inner lines are kept
    /// opaque: each becomes a single raw token for the parser to split.
    fn lex_frontmatter(&mut self, tokens: &mut Vec<Token>) -> Result<(), RillError> {
        if !self.is_frontmatter_delim() {
            return Ok(());
        }
        let start = self.location();
        self.bump();
        self.bump();
        self.bump();
        tokens.push(Token::new(
            TokenKind::FrontmatterDelim,
            "---",
            self.span_from(start),
        ));
        // Consume the newline after the opening delimiter.
        self.skip_blank();
        if self.peek() == Some('\n') {
            self.bump();
        }

        loop {
            if self.peek().is_none() {
                return Err(RillError::at(
                    ErrorKind::UnclosedDelimiter {
                        delimiter: "---".to_string(),
                    },
                    self.location(),
                ));
            }
            if self.is_frontmatter_delim() {
                let start = self.location();
                self.bump();
                self.bump();
                self.bump();
                tokens.push(Token::new(
                    TokenKind::FrontmatterDelim,
                    "---",
                    self.span_from(start),
                ));
                return Ok(());
            }
            let start = self.location();
            let line = self.take_line_rest();
            tokens.push(Token::new(
                TokenKind::FrontmatterLine,
                line,
                self.span_from(start),
            ));
            if self.peek() == Some('\n') {
                self.bump();
            }
        }
    }

    // ===== Literals =====

    fn lex_number(&mut self) -> Token {
        let start = self.location();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        // A dot only belongs to the number when a digit follows, so
        // `5.str` still lexes as a method call on 5.
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        Token::new(TokenKind::Number, text, self.span_from(start))
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.location();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Ident);
        Token::new(kind, text, self.span_from(start))
    }

    fn lex_dollar(&mut self) -> Token {
        let start = self.location();
        self.bump();
        if self.peek() == Some('@') {
            self.bump();
            return Token::new(TokenKind::Dollar, "$@", self.span_from(start));
        }
        if self.peek().is_some_and(is_ident_start) {
            let mut text = String::from("$");
            while let Some(ch) = self.peek() {
                if is_ident_continue(ch) {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            return Token::new(TokenKind::Dollar, text, self.span_from(start));
        }
        Token::new(TokenKind::PipeVar, "$", self.span_from(start))
    }

    // ===== Strings =====

    fn lex_string(&mut self) -> Result<Token, RillError> {
        if self.rest().starts_with("\"\"\"") {
            return self.lex_triple_string();
        }
        let start = self.location();
        self.bump();
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(RillError::at(ErrorKind::UnterminatedString, start));
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some('n') => text.push('\n'),
                        Some('r') => text.push('\r'),
                        Some('t') => text.push('\t'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        Some(other) => {
                            return Err(RillError::at(
                                ErrorKind::InvalidEscape {
                                    sequence: other.to_string(),
                                },
                                self.location(),
                            ));
                        }
                        None => {
                            return Err(RillError::at(ErrorKind::UnterminatedString, start));
                        }
                    }
                    self.bump();
                }
                Some('{') => self.copy_brace_group(&mut text, start, false)?,
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
        Ok(Token::new(TokenKind::Str, text, self.span_from(start)))
    }

    fn lex_triple_string(&mut self) -> Result<Token, RillError> {
        let start = self.location();
        self.bump();
        self.bump();
        self.bump();
        // A newline directly after the opening delimiter is not part
        // of the content (Python-style).
        if self.peek() == Some('\n') {
            self.bump();
        }
        let mut text = String::new();
        loop {
            if self.rest().starts_with("\"\"\"") {
                self.bump();
                self.bump();
                self.bump();
                break;
            }
            match self.peek() {
                None => return Err(RillError::at(ErrorKind::UnterminatedString, start)),
                Some('{') => {
                    if self.rest().starts_with("{{") {
                        text.push_str("{{");
                        self.bump();
                        self.bump();
                    } else {
                        self.copy_brace_group(&mut text, start, true)?;
                    }
                }
                Some('}') if self.rest().starts_with("}}") => {
                    text.push_str("}}");
                    self.bump();
                    self.bump();
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
        Ok(Token::new(TokenKind::TripleStr, text, self.span_from(start)))
    }

    /// Copy an interpolation group `{…}` into `text` verbatim. The
    /// braces must balance before the string ends; interpolation
    /// content is parsed later, not here.
    fn copy_brace_group(
        &mut self,
        text: &mut String,
        string_start: Location,
        triple: bool,
    ) -> Result<(), RillError> {
        let mut depth = 0usize;
        loop {
            if triple && self.rest().starts_with("\"\"\"") {
                return Err(RillError::at(
                    ErrorKind::TripleQuoteInInterpolation,
                    self.location(),
                ));
            }
            match self.peek() {
                None => return Err(RillError::at(ErrorKind::UnterminatedString, string_start)),
                Some('\n') if !triple => {
                    return Err(RillError::at(ErrorKind::UnterminatedString, string_start));
                }
                Some('{') => {
                    depth += 1;
                    text.push('{');
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    text.push('}');
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
    }

    // ===== Operators =====

    fn lex_operator(&mut self) -> Result<Token, RillError> {
        let start = self.location();
        let c1 = self.peek().unwrap();
        let c2 = self.peek_at(1);

        // The two-character table is tried before the single-character
        // table.
        let two = c2.and_then(|c2| match (c1, c2) {
            ('-', '>') => Some(TokenKind::Arrow),
            ('=', '>') => Some(TokenKind::FatArrow),
            (':', '>') => Some(TokenKind::CaptureArrow),
            ('*', '<') => Some(TokenKind::Destruct),
            ('/', '<') => Some(TokenKind::SliceOp),
            ('&', '&') => Some(TokenKind::AndAnd),
            ('|', '|') => Some(TokenKind::OrOr),
            ('=', '=') => Some(TokenKind::EqEq),
            ('!', '=') => Some(TokenKind::BangEq),
            ('<', '=') => Some(TokenKind::LtEq),
            ('>', '=') => Some(TokenKind::GtEq),
            ('?', '?') => Some(TokenKind::Coalesce),
            ('.', '?') => Some(TokenKind::OptChain),
            (':', ':') => Some(TokenKind::ColonColon),
            _ => None,
        });
        if let Some(kind) = two {
            self.bump();
            self.bump();
            let text: String = [c1, c2.unwrap()].iter().collect();
            return Ok(Token::new(kind, text, self.span_from(start)));
        }

        let single = match c1 {
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            '@' => TokenKind::At,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '!' => TokenKind::Bang,
            '=' => TokenKind::Eq,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '|' => TokenKind::Pipe,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '&' => TokenKind::Amp,
            '^' => TokenKind::Caret,
            other => {
                return Err(RillError::at(
                    ErrorKind::UnexpectedToken {
                        found: other.to_string(),
                        expected: "a token".to_string(),
                    },
                    start,
                ));
            }
        };
        self.bump();
        Ok(Token::new(single, c1.to_string(), self.span_from(start)))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_numbers_and_operators() {
        assert_eq!(
            kinds("5 + 3.25"),
            vec![
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_number_does_not_eat_method_dot() {
        assert_eq!(
            kinds("5.str"),
            vec![
                TokenKind::Number,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_two_char_operators_win_over_single() {
        assert_eq!(
            kinds("-> => :> *< /< && || == != <= >= ?? .? ::"),
            vec![
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::CaptureArrow,
                TokenKind::Destruct,
                TokenKind::SliceOp,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Coalesce,
                TokenKind::OptChain,
                TokenKind::ColonColon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_dollar_forms() {
        let tokens = Lexer::new("$x $@ $ $(").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Dollar);
        assert_eq!(tokens[0].text, "$x");
        assert_eq!(tokens[1].kind, TokenKind::Dollar);
        assert_eq!(tokens[1].text, "$@");
        assert_eq!(tokens[2].kind, TokenKind::PipeVar);
        assert_eq!(tokens[3].kind, TokenKind::PipeVar);
        assert_eq!(tokens[4].kind, TokenKind::LParen);
    }

    #[test]
    fn test_keywords_promoted() {
        assert_eq!(
            kinds("true false break return each map fold filter ident"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Break,
                TokenKind::Return,
                TokenKind::Each,
                TokenKind::Map,
                TokenKind::Fold,
                TokenKind::Filter,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::new(r#""a\nb\t\"c\"""#).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "a\nb\t\"c\"");
    }

    #[test]
    fn test_invalid_escape() {
        let err = Lexer::new(r#""bad \q""#).tokenize().unwrap_err();
        assert_eq!(err.id(), "RILL-L002");
    }

    #[test]
    fn test_unterminated_string_on_raw_newline() {
        let err = Lexer::new("\"abc\ndef\"").tokenize().unwrap_err();
        assert_eq!(err.id(), "RILL-L001");
    }

    #[test]
    fn test_interpolation_braces_copied_literally() {
        let tokens = Lexer::new(r#""got {$x.get("a")} items""#).tokenize().unwrap();
        assert_eq!(tokens[0].text, r#"got {$x.get("a")} items"#);
    }

    #[test]
    fn test_nested_braces_balance() {
        let tokens = Lexer::new(r#""{[a: {1}]}""#).tokenize().unwrap();
        assert_eq!(tokens[0].text, "{[a: {1}]}");
    }

    #[test]
    fn test_triple_string_consumes_leading_newline() {
        let tokens = Lexer::new("\"\"\"\nhello\nworld\"\"\"").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::TripleStr);
        assert_eq!(tokens[0].text, "hello\nworld");
    }

    #[test]
    fn test_triple_quote_rejected_in_interpolation() {
        let err = Lexer::new("\"\"\"x {\"\"\"y\"\"\"} z\"\"\"")
            .tokenize()
            .unwrap_err();
        assert_eq!(err.id(), "RILL-L003");
    }

    #[test]
    fn test_comments_skipped_by_default() {
        assert_eq!(
            kinds("1 # note\n2"),
            vec![
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_kept_on_request() {
        let tokens = Lexer::with_comments("1 # note").tokenize().unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Comment);
        assert_eq!(tokens[1].text, "# note");
    }

    #[test]
    fn test_frontmatter_block() {
        let tokens = Lexer::new("---\nname: demo\n---\n42").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FrontmatterDelim);
        assert_eq!(tokens[1].kind, TokenKind::FrontmatterLine);
        assert_eq!(tokens[1].text, "name: demo");
        assert_eq!(tokens[2].kind, TokenKind::FrontmatterDelim);
        assert_eq!(tokens[3].kind, TokenKind::Newline);
        assert_eq!(tokens[4].kind, TokenKind::Number);
    }

    #[test]
    fn test_spans_are_monotone_and_disjoint() {
        let tokens = Lexer::new("[1, 2] -> each { $ * 2 } => $out")
            .tokenize()
            .unwrap();
        for pair in tokens.windows(2) {
            assert!(pair[0].span.start.offset <= pair[1].span.start.offset);
            assert!(pair[0].span.end.offset <= pair[1].span.start.offset);
        }
        for token in &tokens {
            if token.kind != TokenKind::Eof {
                assert!(token.span.end.offset > token.span.start.offset);
            }
        }
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = Lexer::new("1\n  2").tokenize().unwrap();
        assert_eq!(tokens[0].span.start.line, 1);
        assert_eq!(tokens[2].span.start.line, 2);
        assert_eq!(tokens[2].span.start.column, 3);
    }
}
