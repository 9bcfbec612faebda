// ABOUTME: Primary parsing: literals, collections, closures, loops, extraction

use super::Parser;
use crate::ast::{DictEntry, Expr, Param, Pattern, StrPart, TypeName};
use crate::error::RillError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

impl Parser {
    pub(crate) fn parse_primary(&mut self) -> Result<Expr, RillError> {
        match self.peek().kind {
            TokenKind::Number => {
                let token = self.advance();
                let value: f64 = token.text.parse().expect("lexer produced a valid number");
                Ok(Expr::Number {
                    value,
                    span: token.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Ok(Expr::Bool {
                    value: token.kind == TokenKind::True,
                    span: token.span,
                })
            }
            TokenKind::Str => {
                let token = self.advance();
                self.parse_string_literal(token, false)
            }
            TokenKind::TripleStr => {
                let token = self.advance();
                self.parse_string_literal(token, true)
            }
            TokenKind::Ident => self.parse_ident_primary(),
            TokenKind::Dollar => self.parse_dollar_primary(),
            TokenKind::PipeVar => {
                let token = self.advance();
                if self.at(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    let span = token.span.to(self.previous_span());
                    Ok(Expr::PipeInvoke { args, span })
                } else {
                    Ok(Expr::PipeValue { span: token.span })
                }
            }
            TokenKind::LParen => self.parse_grouped(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::LBracket => self.parse_bracket_literal(),
            TokenKind::Pipe | TokenKind::OrOr => self.parse_closure(),
            TokenKind::Each | TokenKind::Map | TokenKind::Fold | TokenKind::Filter => {
                self.parse_collection()
            }
            TokenKind::At => self.parse_loop(),
            TokenKind::Destruct => self.parse_destructure(),
            TokenKind::SliceOp => self.parse_slice(),
            TokenKind::Star => {
                let star = self.advance();
                let value = self.parse_expression()?;
                let span = star.span.to(value.span());
                Ok(Expr::Spread {
                    value: Box::new(value),
                    span,
                })
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    // ===== Identifiers: null literal and host calls =====

    fn parse_ident_primary(&mut self) -> Result<Expr, RillError> {
        let next = self.peek_at(1).kind;
        if self.peek().text == "null"
            && next != TokenKind::LParen
            && next != TokenKind::ColonColon
        {
            let token = self.advance();
            return Ok(Expr::Null { span: token.span });
        }
        if next != TokenKind::LParen && next != TokenKind::ColonColon {
            return Err(self.unexpected("an expression"));
        }

        let first = self.advance();
        let start = first.span;
        let mut name = first.text;
        while self.at(TokenKind::ColonColon) {
            self.advance();
            let part = self.expect(TokenKind::Ident)?;
            name.push_str("::");
            name.push_str(&part.text);
        }
        let args = self.parse_call_args()?;
        let span = start.to(self.previous_span());
        Ok(Expr::HostCall { name, args, span })
    }

    // ===== Variables and closure calls =====

    fn parse_dollar_primary(&mut self) -> Result<Expr, RillError> {
        let token = self.peek().clone();
        if token.text == "$@" {
            self.advance();
            return Ok(Expr::Accumulator { span: token.span });
        }
        let name = token.text.trim_start_matches('$').to_string();

        // `$fn(…)` is a closure call; `$obj.path.fn(…)` reaches the
        // callable through postfix property and method operations.
        self.advance();
        if self.at(TokenKind::LParen) {
            let args = self.parse_call_args()?;
            let span = token.span.to(self.previous_span());
            return Ok(Expr::ClosureCall { name, args, span });
        }
        Ok(Expr::Var {
            name,
            span: token.span,
        })
    }

    // ===== Grouping and blocks =====

    fn parse_grouped(&mut self) -> Result<Expr, RillError> {
        let open = self.expect(TokenKind::LParen)?;
        self.skip_newlines();
        let was = self.in_condition;
        self.in_condition = false;
        let inner = self.parse_expression();
        self.in_condition = was;
        let inner = inner?;
        self.skip_newlines();
        let close = self.expect_closing(TokenKind::RParen, "(")?;
        Ok(Expr::Grouped {
            inner: Box::new(inner),
            span: open.span.to(close.span),
        })
    }

    pub(crate) fn parse_block(&mut self) -> Result<Expr, RillError> {
        let open = self.expect(TokenKind::LBrace)?;
        self.skip_newlines();
        let mut statements = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
            if self.at(TokenKind::Newline) {
                self.skip_newlines();
            } else {
                break;
            }
        }
        let close = self.expect_closing(TokenKind::RBrace, "{")?;
        Ok(Expr::Block {
            statements,
            span: open.span.to(close.span),
        })
    }

    // ===== Tuples and dicts =====

    /// `[…]` is a tuple unless the first element reads as `key:`, in
    /// which case it is a dict. `[:]` is the empty dict.
    fn parse_bracket_literal(&mut self) -> Result<Expr, RillError> {
        let open = self.expect(TokenKind::LBracket)?;
        self.skip_newlines();

        if self.at(TokenKind::Colon) && self.peek_at(1).kind == TokenKind::RBracket {
            self.advance();
            let close = self.advance();
            return Ok(Expr::Dict {
                entries: Vec::new(),
                span: open.span.to(close.span),
            });
        }

        let is_dict = matches!(
            self.peek().kind,
            TokenKind::Ident
                | TokenKind::Str
                | TokenKind::Number
                | TokenKind::True
                | TokenKind::False
        ) && self.peek_at(1).kind == TokenKind::Colon;

        if is_dict {
            let mut entries = Vec::new();
            while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
                let key_token = self.advance();
                let key = match key_token.kind {
                    TokenKind::Ident
                    | TokenKind::Str
                    | TokenKind::Number
                    | TokenKind::True
                    | TokenKind::False => key_token.text.clone(),
                    _ => return Err(self.unexpected("a dict key")),
                };
                self.expect(TokenKind::Colon)?;
                self.skip_newlines();
                let value = self.parse_expression()?;
                let span = key_token.span.to(value.span());
                entries.push(DictEntry { key, value, span });
                self.skip_newlines();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                self.skip_newlines();
            }
            let close = self.expect_closing(TokenKind::RBracket, "[")?;
            return Ok(Expr::Dict {
                entries,
                span: open.span.to(close.span),
            });
        }

        let mut items = Vec::new();
        while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
            items.push(self.parse_arg()?);
            self.skip_newlines();
            if !self.eat(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        let close = self.expect_closing(TokenKind::RBracket, "[")?;
        Ok(Expr::Tuple {
            items,
            span: open.span.to(close.span),
        })
    }

    // ===== Closures =====

    fn parse_closure(&mut self) -> Result<Expr, RillError> {
        let start = self.peek().span;
        let params = if self.at(TokenKind::OrOr) {
            self.advance();
            Vec::new()
        } else {
            self.expect(TokenKind::Pipe)?;
            let mut params = Vec::new();
            while !self.at(TokenKind::Pipe) && !self.at(TokenKind::Eof) {
                params.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect_closing(TokenKind::Pipe, "|")?;
            params
        };
        self.skip_newlines();
        let body = if self.at(TokenKind::LBrace) {
            self.parse_block()?
        } else {
            self.parse_expression()?
        };
        let span = start.to(body.span());
        Ok(Expr::Closure {
            params,
            body: Box::new(body),
            span,
        })
    }

    /// `name`, optionally `: string|number|bool` for a declared type,
    /// otherwise `: expr` for a default value.
    fn parse_param(&mut self) -> Result<Param, RillError> {
        let name = self.expect(TokenKind::Ident)?;
        let mut ty = None;
        let mut default = None;
        if self.eat(TokenKind::Colon) {
            let is_type = self.at(TokenKind::Ident)
                && matches!(self.peek().text.as_str(), "string" | "number" | "bool")
                && matches!(
                    self.peek_at(1).kind,
                    TokenKind::Comma | TokenKind::Pipe
                );
            if is_type {
                let token = self.advance();
                ty = TypeName::parse(&token.text);
            } else {
                default = Some(self.parse_expression()?);
            }
        }
        let span = name.span.to(self.previous_span());
        Ok(Param {
            name: name.text,
            ty,
            default,
            span,
        })
    }

    // ===== Collection operators =====

    fn parse_collection(&mut self) -> Result<Expr, RillError> {
        let keyword = self.advance();
        let takes_init = matches!(keyword.kind, TokenKind::Each | TokenKind::Fold);

        let init = if takes_init && self.at(TokenKind::LParen) && self.paren_precedes_body() {
            self.advance();
            self.skip_newlines();
            let expr = self.parse_expression()?;
            self.skip_newlines();
            self.expect_closing(TokenKind::RParen, "(")?;
            Some(Box::new(expr))
        } else {
            None
        };

        self.skip_newlines();
        let body = Box::new(self.parse_iteration_body()?);
        let span = keyword.span.to(body.span());
        Ok(match keyword.kind {
            TokenKind::Each => Expr::Each { body, init, span },
            TokenKind::Map => Expr::Map { body, span },
            TokenKind::Fold => Expr::Fold { body, init, span },
            TokenKind::Filter => Expr::Filter { body, span },
            _ => unreachable!("caller matched a collection keyword"),
        })
    }

    /// Distinguish `each (0) { … }` from `each ($ + 1)`: scan past the
    /// matched parenthesis group and check whether a body token follows.
    fn paren_precedes_body(&self) -> bool {
        let mut i = self.pos;
        let mut depth = 0usize;
        loop {
            let Some(token) = self.tokens.get(i) else {
                return false;
            };
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
        let mut j = i + 1;
        while matches!(
            self.tokens.get(j).map(|t| t.kind),
            Some(TokenKind::Newline) | Some(TokenKind::Comment)
        ) {
            j += 1;
        }
        matches!(
            self.tokens.get(j).map(|t| t.kind),
            Some(TokenKind::LBrace)
                | Some(TokenKind::Pipe)
                | Some(TokenKind::OrOr)
                | Some(TokenKind::Dollar)
                | Some(TokenKind::Star)
                | Some(TokenKind::LParen)
        )
    }

    /// An iterator body: closure, block, grouped expression, variable
    /// reference, or spread.
    fn parse_iteration_body(&mut self) -> Result<Expr, RillError> {
        match self.peek().kind {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Pipe | TokenKind::OrOr => self.parse_closure(),
            TokenKind::LParen => self.parse_grouped(),
            TokenKind::Dollar => self.parse_dollar_primary(),
            TokenKind::Star => {
                let star = self.advance();
                let value = self.parse_expression()?;
                let span = star.span.to(value.span());
                Ok(Expr::Spread {
                    value: Box::new(value),
                    span,
                })
            }
            _ => Err(self.unexpected("an iteration body")),
        }
    }

    // ===== Loops =====

    /// `@(cond) @ { body }` runs the check first; `@{ body } @ (cond)`
    /// runs the body first.
    fn parse_loop(&mut self) -> Result<Expr, RillError> {
        let at = self.expect(TokenKind::At)?;
        if self.at(TokenKind::LParen) {
            let cond = self.parse_condition_group()?;
            self.skip_newlines();
            self.expect(TokenKind::At)?;
            self.skip_newlines();
            let body = self.parse_block()?;
            let span = at.span.to(body.span());
            return Ok(Expr::While {
                cond: Box::new(cond),
                body: Box::new(body),
                do_while: false,
                span,
            });
        }
        if self.at(TokenKind::LBrace) {
            let body = self.parse_block()?;
            self.skip_newlines();
            self.expect(TokenKind::At)?;
            self.skip_newlines();
            let cond = self.parse_condition_group()?;
            let span = at.span.to(self.previous_span());
            return Ok(Expr::While {
                cond: Box::new(cond),
                body: Box::new(body),
                do_while: true,
                span,
            });
        }
        Err(self.unexpected("'(' or '{'"))
    }

    /// A `(cond)` wrapper with boolean operators enabled.
    fn parse_condition_group(&mut self) -> Result<Expr, RillError> {
        self.expect(TokenKind::LParen)?;
        self.skip_newlines();
        let was = self.in_condition;
        self.in_condition = true;
        let cond = self.parse_expression();
        self.in_condition = was;
        let cond = cond?;
        self.skip_newlines();
        self.expect_closing(TokenKind::RParen, "(")?;
        Ok(cond)
    }

    // ===== Extraction operators =====

    fn parse_destructure(&mut self) -> Result<Expr, RillError> {
        let op = self.expect(TokenKind::Destruct)?;
        self.expect(TokenKind::LBracket)?;
        self.skip_newlines();
        let patterns = self.parse_pattern_list()?;
        let close = self.expect_closing(TokenKind::RBracket, "[")?;
        Ok(Expr::Destructure {
            patterns,
            span: op.span.to(close.span),
        })
    }

    fn parse_pattern_list(&mut self) -> Result<Vec<Pattern>, RillError> {
        let mut patterns = Vec::new();
        while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
            patterns.push(self.parse_pattern()?);
            self.skip_newlines();
            if !self.eat(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        Ok(patterns)
    }

    fn parse_pattern(&mut self) -> Result<Pattern, RillError> {
        if self.at(TokenKind::Star) {
            self.advance();
            let name = self.expect(TokenKind::Ident)?;
            return Ok(Pattern::Rest(name.text));
        }
        if self.at(TokenKind::LBracket) {
            self.advance();
            self.skip_newlines();
            let nested = self.parse_pattern_list()?;
            self.expect_closing(TokenKind::RBracket, "[")?;
            return Ok(Pattern::Nested(nested));
        }
        let name = self.expect(TokenKind::Ident)?;
        if name.text == "_" {
            Ok(Pattern::Skip)
        } else {
            Ok(Pattern::Name(name.text))
        }
    }

    /// `/< [start:stop:step]`, with every position optional.
    fn parse_slice(&mut self) -> Result<Expr, RillError> {
        let op = self.expect(TokenKind::SliceOp)?;
        self.expect(TokenKind::LBracket)?;

        let start = if self.at(TokenKind::Colon) || self.at(TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let mut stop = None;
        let mut step = None;
        if self.eat(TokenKind::Colon) {
            if !self.at(TokenKind::Colon) && !self.at(TokenKind::RBracket) {
                stop = Some(Box::new(self.parse_expression()?));
            }
            if self.eat(TokenKind::Colon) && !self.at(TokenKind::RBracket) {
                step = Some(Box::new(self.parse_expression()?));
            }
        }
        let close = self.expect_closing(TokenKind::RBracket, "[")?;
        Ok(Expr::Slice {
            start,
            stop,
            step,
            span: op.span.to(close.span),
        })
    }

    // ===== String interpolation =====

    /// Split a string token into text and interpolation parts. The
    /// lexer kept `{…}` verbatim; each group parses as an expression.
    fn parse_string_literal(&mut self, token: Token, triple: bool) -> Result<Expr, RillError> {
        let chars: Vec<char> = token.text.chars().collect();
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if triple && c == '{' && chars.get(i + 1) == Some(&'{') {
                current.push('{');
                i += 2;
                continue;
            }
            if triple && c == '}' && chars.get(i + 1) == Some(&'}') {
                current.push('}');
                i += 2;
                continue;
            }
            if c == '{' {
                let mut depth = 1usize;
                let mut j = i + 1;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                let inner: String = chars[i + 1..j - 1].iter().collect();
                if !current.is_empty() {
                    parts.push(StrPart::Text(std::mem::take(&mut current)));
                }
                let expr = parse_embedded(&inner)?;
                parts.push(StrPart::Interp(Box::new(expr)));
                i = j;
                continue;
            }
            current.push(c);
            i += 1;
        }

        if !current.is_empty() || parts.is_empty() {
            parts.push(StrPart::Text(current));
        }
        Ok(Expr::Str {
            parts,
            span: token.span,
        })
    }
}

/// Parse one interpolated expression from a string fragment.
fn parse_embedded(source: &str) -> Result<Expr, RillError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    parser.skip_newlines();
    if !parser.at(TokenKind::Eof) {
        return Err(parser.unexpected("end of interpolation"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::ast::{Expr, Pattern, StrPart, TypeName};

    fn head(source: &str) -> Expr {
        parse(source).unwrap().statements.remove(0).chain.head
    }

    #[test]
    fn test_tuple_vs_dict_disambiguation() {
        assert!(matches!(head("[1, 2, 3]"), Expr::Tuple { .. }));
        assert!(matches!(head("[a: 1, b: 2]"), Expr::Dict { .. }));
        assert!(matches!(head("[\"k\": 1]"), Expr::Dict { .. }));
        assert!(matches!(head("[1: \"one\"]"), Expr::Dict { .. }));
        assert!(matches!(head("[true: \"yes\"]"), Expr::Dict { .. }));
        assert!(matches!(head("[]"), Expr::Tuple { items, .. } if items.is_empty()));
        assert!(matches!(head("[:]"), Expr::Dict { entries, .. } if entries.is_empty()));
    }

    #[test]
    fn test_closure_params() {
        let Expr::Closure { params, .. } = head("|a: string, b: number, c: 5, d| $a") else {
            panic!("expected closure");
        };
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].ty, Some(TypeName::String));
        assert_eq!(params[1].ty, Some(TypeName::Number));
        assert!(params[2].default.is_some());
        assert!(params[3].ty.is_none() && params[3].default.is_none());
    }

    #[test]
    fn test_no_param_closure() {
        let Expr::Closure { params, .. } = head("|| 42") else {
            panic!("expected closure");
        };
        assert!(params.is_empty());
    }

    #[test]
    fn test_each_with_accumulator() {
        let Expr::Each { init, .. } = head("each (0) { $@ + $ }") else {
            panic!("expected each");
        };
        assert!(init.is_some());
    }

    #[test]
    fn test_each_with_grouped_body() {
        let Expr::Each { init, body, .. } = head("each ($ + 1)") else {
            panic!("expected each");
        };
        assert!(init.is_none());
        assert!(matches!(*body, Expr::Grouped { .. }));
    }

    #[test]
    fn test_fold_with_closure_body() {
        let Expr::Fold { init, body, .. } = head("fold (1) |acc| $acc") else {
            panic!("expected fold");
        };
        assert!(init.is_some());
        assert!(matches!(*body, Expr::Closure { .. }));
    }

    #[test]
    fn test_map_never_takes_accumulator() {
        // `map (…)` is always a grouped body, never an initializer.
        let Expr::Map { body, .. } = head("map ($ * 2)") else {
            panic!("expected map");
        };
        assert!(matches!(*body, Expr::Grouped { .. }));
    }

    #[test]
    fn test_while_loop() {
        let Expr::While {
            do_while: false, ..
        } = head("@($ < 10) @ { $ + 1 }")
        else {
            panic!("expected while");
        };
    }

    #[test]
    fn test_do_while_loop() {
        let Expr::While { do_while: true, .. } = head("@{ $ + 1 } @ ($ < 10)") else {
            panic!("expected do-while");
        };
    }

    #[test]
    fn test_destructure_patterns() {
        let Expr::Destructure { patterns, .. } = head("*< [a, _, [b, c], *rest]") else {
            panic!("expected destructure");
        };
        assert_eq!(patterns.len(), 4);
        assert!(matches!(&patterns[0], Pattern::Name(n) if n == "a"));
        assert!(matches!(patterns[1], Pattern::Skip));
        assert!(matches!(&patterns[2], Pattern::Nested(inner) if inner.len() == 2));
        assert!(matches!(&patterns[3], Pattern::Rest(n) if n == "rest"));
    }

    #[test]
    fn test_slice_forms() {
        let Expr::Slice { start, stop, step, .. } = head("/< [1:3]") else {
            panic!("expected slice");
        };
        assert!(start.is_some() && stop.is_some() && step.is_none());

        let Expr::Slice { start, stop, step, .. } = head("/< [::-1]") else {
            panic!("expected slice");
        };
        assert!(start.is_none() && stop.is_none() && step.is_some());
    }

    #[test]
    fn test_host_call_with_namespace() {
        let Expr::HostCall { name, args, .. } = head("vector::search(\"q\", 3)") else {
            panic!("expected host call");
        };
        assert_eq!(name, "vector::search");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_direct_closure_call() {
        let Expr::ClosureCall { name, args, .. } = head("$run(1, 2)") else {
            panic!("expected closure call");
        };
        assert_eq!(name, "run");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_chained_call_is_postfix_method() {
        let Expr::Postfix { expr, ops, .. } = head("$handlers.retry.run(1)") else {
            panic!("expected postfix");
        };
        assert!(matches!(*expr, Expr::Var { ref name, .. } if name == "handlers"));
        assert!(matches!(&ops[0], crate::ast::PostfixOp::Property { name, .. } if name == "retry"));
        assert!(matches!(&ops[1], crate::ast::PostfixOp::Method { name, args, .. } if name == "run" && args.len() == 1));
    }

    #[test]
    fn test_pipe_invoke() {
        assert!(matches!(head("$(1, 2)"), Expr::PipeInvoke { args, .. } if args.len() == 2));
    }

    #[test]
    fn test_null_literal() {
        assert!(matches!(head("null"), Expr::Null { .. }));
    }

    #[test]
    fn test_string_interpolation_parts() {
        let Expr::Str { parts, .. } = head(r#""sum is {$a + $b}!""#) else {
            panic!("expected string");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], StrPart::Text(t) if t == "sum is "));
        assert!(matches!(&parts[1], StrPart::Interp(_)));
        assert!(matches!(&parts[2], StrPart::Text(t) if t == "!"));
    }

    #[test]
    fn test_triple_string_brace_escapes() {
        let source = "\"\"\"a {{literal}} and {$x}\"\"\"";
        let Expr::Str { parts, .. } = head(source) else {
            panic!("expected string");
        };
        assert!(matches!(&parts[0], StrPart::Text(t) if t == "a {literal} and "));
        assert!(matches!(&parts[1], StrPart::Interp(_)));
    }

    #[test]
    fn test_dispatch_dict_in_pipe() {
        let script = parse("\"blocked\" -> [\"blocked\": \"is blocked\"]").unwrap();
        assert!(matches!(
            script.statements[0].chain.segments[0],
            Expr::Dict { .. }
        ));
    }
}
