// ABOUTME: Recursive-descent parser: statements, frontmatter, and error recovery

mod expr;
mod primary;

use crate::ast::{AnnotationArg, Expr, Frontmatter, PipeChain, Script, Statement, Terminator};
use crate::error::{ErrorKind, RillError};
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Result of parsing with error recovery enabled: a best-effort AST,
/// the collected errors, and whether the source parsed cleanly.
#[derive(Debug)]
pub struct ParseOutcome {
    pub ast: Script,
    pub errors: Vec<RillError>,
    pub success: bool,
}

/// Parse source text, stopping at the first error.
pub fn parse(source: &str) -> Result<Script, RillError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_script()
}

/// Parse source text, recovering at statement boundaries so that one
/// bad statement does not hide the rest of the script.
pub fn parse_with_recovery(source: &str) -> ParseOutcome {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(err) => {
            return ParseOutcome {
                ast: Script {
                    frontmatter: None,
                    statements: Vec::new(),
                    span: Span::point(crate::span::Location::start()),
                },
                errors: vec![err],
                success: false,
            };
        }
    };
    let mut parser = Parser::new(tokens);
    parser.recovery = true;
    let ast = parser
        .parse_script()
        .expect("recovery mode collects errors instead of failing");
    let errors = std::mem::take(&mut parser.errors);
    let success = errors.is_empty();
    ParseOutcome {
        ast,
        errors,
        success,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) recovery: bool,
    pub(crate) errors: Vec<RillError>,
    /// True while parsing a `@(…)` wrapper or a conditional head,
    /// where boolean operators are legal.
    pub(crate) in_condition: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            recovery: false,
            errors: Vec::new(),
            in_condition: false,
        }
    }

    // ===== Token cursor =====

    pub(crate) fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with EOF"))
    }

    pub(crate) fn peek_at(&self, n: usize) -> &Token {
        self.tokens
            .get(self.pos + n)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with EOF"))
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token, RillError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    /// Expect a closing delimiter, mapping EOF to the dedicated
    /// unclosed-bracket error.
    pub(crate) fn expect_closing(
        &mut self,
        kind: TokenKind,
        open: &str,
    ) -> Result<Token, RillError> {
        if self.at(TokenKind::Eof) {
            return Err(RillError::at(
                ErrorKind::UnclosedDelimiter {
                    delimiter: open.to_string(),
                },
                self.peek().span.start,
            ));
        }
        self.expect(kind)
    }

    pub(crate) fn skip_newlines(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Comment) {
            self.advance();
        }
    }

    /// Build an unexpected-token error at the cursor, with contextual
    /// hints for keyword typos and `=` where `->` belongs.
    pub(crate) fn unexpected(&self, expected: &str) -> RillError {
        let token = self.peek();
        let location = token.span.start;
        if token.kind == TokenKind::Eq {
            return RillError::at(ErrorKind::AssignInsteadOfArrow, location);
        }
        if token.kind == TokenKind::Ident {
            if let Some(suggestion) = keyword_suggestion(&token.text) {
                return RillError::at(
                    ErrorKind::KeywordTypo {
                        found: token.text.clone(),
                        suggestion: suggestion.to_string(),
                    },
                    location,
                );
            }
        }
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else if token.text.is_empty() {
            token.kind.describe().to_string()
        } else {
            token.text.clone()
        };
        RillError::at(
            ErrorKind::UnexpectedToken {
                found,
                expected: expected.to_string(),
            },
            location,
        )
    }

    // ===== Script level =====

    pub fn parse_script(&mut self) -> Result<Script, RillError> {
        let start = self.peek().span;
        let frontmatter = if self.at(TokenKind::FrontmatterDelim) {
            match self.parse_frontmatter() {
                Ok(fm) => Some(fm),
                Err(err) if self.recovery => {
                    self.errors.push(err);
                    self.synchronize();
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.at(TokenKind::Eof) {
            match self.parse_statement() {
                Ok(statement) => {
                    statements.push(statement);
                    if !self.at(TokenKind::Eof) && !self.at(TokenKind::Newline) {
                        // A token that could start a pipe target right
                        // after a finished chain usually means a
                        // missing arrow.
                        let err = if matches!(
                            self.peek().kind,
                            TokenKind::Dot
                                | TokenKind::OptChain
                                | TokenKind::Each
                                | TokenKind::Map
                                | TokenKind::Fold
                                | TokenKind::Filter
                                | TokenKind::At
                        ) {
                            RillError::at(ErrorKind::MissingArrow, self.peek().span.start)
                        } else {
                            self.unexpected("newline")
                        };
                        if self.recovery {
                            self.record_and_synchronize(err, &mut statements);
                        } else {
                            return Err(err);
                        }
                    }
                }
                Err(err) => {
                    if self.recovery {
                        self.record_and_synchronize(err, &mut statements);
                    } else {
                        return Err(err);
                    }
                }
            }
            self.skip_newlines();
        }

        let end = self.peek().span;
        Ok(Script {
            frontmatter,
            statements,
            span: start.to(end),
        })
    }

    fn parse_frontmatter(&mut self) -> Result<Frontmatter, RillError> {
        let open = self.expect(TokenKind::FrontmatterDelim)?;
        let mut entries = Vec::new();
        while self.at(TokenKind::FrontmatterLine) {
            let line = self.advance();
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            match text.split_once(':') {
                Some((key, value)) => {
                    entries.push((key.trim().to_string(), value.trim().to_string()));
                }
                None => entries.push((text.to_string(), String::new())),
            }
        }
        let close = self.expect_closing(TokenKind::FrontmatterDelim, "---")?;
        Ok(Frontmatter {
            entries,
            span: open.span.to(close.span),
        })
    }

    /// One statement: optional `^(…)` annotation prefix and a pipe
    /// chain. Every expression statement is a chain, even without `->`.
    pub(crate) fn parse_statement(&mut self) -> Result<Statement, RillError> {
        let start = self.peek().span;
        let annotations = if self.at(TokenKind::Caret) {
            self.parse_annotations()?
        } else {
            Vec::new()
        };
        let chain = self.parse_pipe_chain()?;
        let span = start.to(chain.span);
        Ok(Statement {
            annotations,
            chain,
            span,
        })
    }

    fn parse_annotations(&mut self) -> Result<Vec<AnnotationArg>, RillError> {
        self.expect(TokenKind::Caret)?;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        self.skip_newlines();
        while !self.at(TokenKind::RParen) {
            let start = self.peek().span;
            if self.eat(TokenKind::Star) {
                let value = self.parse_expression()?;
                let span = start.to(value.span());
                args.push(AnnotationArg::Spread { value, span });
            } else {
                let name = self.expect(TokenKind::Ident)?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expression()?;
                let span = start.to(value.span());
                args.push(AnnotationArg::Named {
                    name: name.text,
                    value,
                    span,
                });
            }
            self.skip_newlines();
            if !self.eat(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect_closing(TokenKind::RParen, "(")?;
        Ok(args)
    }

    // ===== Error recovery =====

    /// Record the failure, skip to the next plausible statement start,
    /// and leave a RecoveryError node in the failed statement's place.
    fn record_and_synchronize(&mut self, err: RillError, statements: &mut Vec<Statement>) {
        let span = self.peek().span;
        let message = err.message();
        self.errors.push(err);
        self.synchronize();
        let expr = Expr::RecoveryError { message, span };
        statements.push(Statement {
            annotations: Vec::new(),
            chain: PipeChain {
                head: expr,
                segments: Vec::new(),
                terminator: None,
                span,
            },
            span,
        });
    }

    /// Skip forward to the next top-level newline, honoring bracket
    /// nesting so recovery does not resume inside a collection literal.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Newline if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ===== Pipe chains =====

    pub(crate) fn parse_pipe_chain(&mut self) -> Result<PipeChain, RillError> {
        let head = self.parse_expression()?;
        let start = head.span();
        let mut segments = Vec::new();
        let mut end = start;

        while self.at(TokenKind::Arrow) {
            self.advance();
            // Chains may continue on the next line after an arrow.
            self.skip_newlines();
            let target = self.parse_pipe_target()?;
            end = target.span();
            segments.push(target);
        }

        let terminator = self.parse_terminator()?;
        if let Some(term) = &terminator {
            end = match term {
                Terminator::Capture { span, .. }
                | Terminator::Break { span }
                | Terminator::Return { span } => end.to(*span),
            };
        }

        Ok(PipeChain {
            head,
            segments,
            terminator,
            span: start.to(end),
        })
    }

    fn parse_terminator(&mut self) -> Result<Option<Terminator>, RillError> {
        if self.at(TokenKind::FatArrow) || self.at(TokenKind::CaptureArrow) {
            let arrow = self.advance();
            let var = self.expect(TokenKind::Dollar)?;
            let name = var.text.trim_start_matches('$').to_string();
            return Ok(Some(Terminator::Capture {
                name,
                span: arrow.span.to(var.span),
            }));
        }
        if self.at(TokenKind::Break) {
            let token = self.advance();
            return Ok(Some(Terminator::Break { span: token.span }));
        }
        if self.at(TokenKind::Return) {
            let token = self.advance();
            return Ok(Some(Terminator::Return { span: token.span }));
        }
        Ok(None)
    }
}

/// Suggest a keyword for a near-miss identifier (edit distance one, or
/// a keyword with a single letter dropped).
fn keyword_suggestion(ident: &str) -> Option<&'static str> {
    const KEYWORDS: [&str; 8] = [
        "true", "false", "break", "return", "each", "map", "fold", "filter",
    ];
    KEYWORDS
        .into_iter()
        .find(|kw| within_one_edit(ident, kw))
}

fn within_one_edit(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    match long.len() - short.len() {
        0 => short
            .iter()
            .zip(long.iter())
            .filter(|(x, y)| x != y)
            .count()
            == 1,
        1 => {
            // One deletion: the shorter must embed in the longer.
            let mut skipped = false;
            let (mut i, mut j) = (0, 0);
            while i < short.len() && j < long.len() {
                if short[i] == long[j] {
                    i += 1;
                    j += 1;
                } else if skipped {
                    return false;
                } else {
                    skipped = true;
                    j += 1;
                }
            }
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, Terminator};

    fn parse_one(source: &str) -> Statement {
        let script = parse(source).unwrap();
        assert_eq!(script.statements.len(), 1, "expected one statement");
        script.statements.into_iter().next().unwrap()
    }

    #[test]
    fn test_simple_arithmetic_statement() {
        let statement = parse_one("5 + 3");
        assert!(matches!(
            statement.chain.head,
            Expr::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
        assert!(statement.chain.segments.is_empty());
    }

    #[test]
    fn test_pipe_chain_with_capture() {
        let statement = parse_one("[1, 2] -> each { $ * 2 } => $out");
        assert_eq!(statement.chain.segments.len(), 1);
        assert!(matches!(
            statement.chain.terminator,
            Some(Terminator::Capture { ref name, .. }) if name == "out"
        ));
    }

    #[test]
    fn test_capture_alias_colon_gt() {
        let statement = parse_one("5 :> $x");
        assert!(matches!(
            statement.chain.terminator,
            Some(Terminator::Capture { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn test_break_and_return_terminators() {
        assert!(matches!(
            parse_one("$x break").chain.terminator,
            Some(Terminator::Break { .. })
        ));
        assert!(matches!(
            parse_one("$x return").chain.terminator,
            Some(Terminator::Return { .. })
        ));
    }

    #[test]
    fn test_chain_continues_after_arrow_newline() {
        let statement = parse_one("1 ->\n  inc() -> dec()");
        assert_eq!(statement.chain.segments.len(), 2);
    }

    #[test]
    fn test_annotation_prefix() {
        let statement = parse_one("^(limit: 3, model: \"fast\") [1] -> each { $ }");
        assert_eq!(statement.annotations.len(), 2);
        assert!(matches!(
            statement.annotations[0],
            AnnotationArg::Named { ref name, .. } if name == "limit"
        ));
    }

    #[test]
    fn test_annotation_spread() {
        let statement = parse_one("^(*$opts) 1");
        assert!(matches!(
            statement.annotations[0],
            AnnotationArg::Spread { .. }
        ));
    }

    #[test]
    fn test_frontmatter_entries() {
        let script = parse("---\nname: demo\nversion: 2\n---\n1\n").unwrap();
        let fm = script.frontmatter.unwrap();
        assert_eq!(fm.entries[0], ("name".to_string(), "demo".to_string()));
        assert_eq!(fm.entries[1], ("version".to_string(), "2".to_string()));
    }

    #[test]
    fn test_missing_newline_between_statements() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(err.id(), "RILL-P001");
    }

    #[test]
    fn test_keyword_typo_hint() {
        let err = parse("retrn").unwrap_err();
        assert_eq!(err.id(), "RILL-P003");
        assert!(err.message().contains("return"));
    }

    #[test]
    fn test_eq_instead_of_arrow_hint() {
        let err = parse("5 = $x").unwrap_err();
        assert_eq!(err.id(), "RILL-P005");
    }

    #[test]
    fn test_missing_arrow_hint() {
        let err = parse("[1, 2] each { $ }").unwrap_err();
        assert_eq!(err.id(), "RILL-P004");
    }

    #[test]
    fn test_unclosed_bracket_at_eof() {
        let err = parse("[1, 2").unwrap_err();
        assert_eq!(err.id(), "RILL-P002");
    }

    #[test]
    fn test_recovery_collects_errors_and_continues() {
        let outcome = parse_with_recovery("5 +\n7\n[1,\n");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 2);
        // The good middle statement still parsed.
        assert!(outcome
            .ast
            .statements
            .iter()
            .any(|s| matches!(s.chain.head, Expr::Number { value, .. } if value == 7.0)));
        assert!(outcome
            .ast
            .statements
            .iter()
            .any(|s| matches!(s.chain.head, Expr::RecoveryError { .. })));
    }

    #[test]
    fn test_recovery_success_on_clean_source() {
        let outcome = parse_with_recovery("1\n2\n");
        assert!(outcome.success);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.ast.statements.len(), 2);
    }
}
