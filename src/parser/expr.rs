// ABOUTME: Expression parsing: precedence ladder, postfix operators, pipe targets

use super::Parser;
use crate::ast::{BinaryOp, Expr, PostfixOp, TypeName, UnaryOp};
use crate::error::RillError;
use crate::span::Span;
use crate::token::TokenKind;

impl Parser {
    /// The general expression entry point: the conditional level.
    /// `cond ? then ! else` is right-associative; boolean operators in
    /// `cond` are only legal here or inside a `@(…)` wrapper.
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, RillError> {
        let expr = self.parse_or()?;

        if self.at(TokenKind::Question) {
            self.advance();
            self.skip_newlines();
            let then_branch = self.parse_expression()?;
            let else_branch = if self.eat(TokenKind::Bang) {
                self.skip_newlines();
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            let end = else_branch
                .as_ref()
                .map(|e| e.span())
                .unwrap_or_else(|| then_branch.span());
            let span = expr.span().to(end);
            return Ok(Expr::Conditional {
                cond: Box::new(expr),
                then_branch: Box::new(then_branch),
                else_branch,
                span,
            });
        }

        if !self.in_condition && is_bool_binary(&expr) {
            return Err(self.unexpected("'?' (boolean operators are only valid in conditions)"));
        }
        Ok(expr)
    }

    /// A pipe target. `.name` at the start is sugar for `$.name`.
    pub(crate) fn parse_pipe_target(&mut self) -> Result<Expr, RillError> {
        let leading_access = (self.at(TokenKind::Dot) || self.at(TokenKind::OptChain))
            && self.peek_at(1).kind == TokenKind::Ident;
        if leading_access {
            let span = Span::point(self.peek().span.start);
            let pipe = Expr::PipeValue { span };
            return self.parse_postfix_onto(pipe);
        }
        self.parse_expression()
    }

    // ===== Binary operator ladder =====

    fn parse_or(&mut self) -> Result<Expr, RillError> {
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::OrOr) {
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, RillError> {
        let mut lhs = self.parse_equality()?;
        while self.at(TokenKind::AndAnd) {
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    pub(crate) fn parse_equality(&mut self) -> Result<Expr, RillError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, RillError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, RillError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, RillError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, RillError> {
        if self.at(TokenKind::Minus) {
            let minus = self.advance();
            // A minus directly before a number token is a negative
            // literal, not a unary expression.
            if self.at(TokenKind::Number) {
                let token = self.advance();
                let value: f64 = token.text.parse().expect("lexer produced a valid number");
                let literal = Expr::Number {
                    value: -value,
                    span: minus.span.to(token.span),
                };
                return self.parse_postfix_onto(literal);
            }
            let operand = self.parse_unary()?;
            let span = minus.span.to(operand.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        if self.at(TokenKind::Bang) {
            let bang = self.advance();
            let operand = self.parse_unary()?;
            let span = bang.span.to(operand.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix_expr()
    }

    // ===== Postfix =====

    fn parse_postfix_expr(&mut self) -> Result<Expr, RillError> {
        let primary = self.parse_primary()?;
        self.parse_postfix_onto(primary)
    }

    /// Attach method calls, property hops, type operations, and an
    /// optional `?? default` to an already-parsed expression.
    pub(crate) fn parse_postfix_onto(&mut self, expr: Expr) -> Result<Expr, RillError> {
        let start = expr.span();
        let mut ops = Vec::new();

        loop {
            if self.at(TokenKind::Dot) && self.peek_at(1).kind == TokenKind::Ident {
                let dot = self.advance();
                let name = self.advance();
                if self.at(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    let span = dot.span.to(self.previous_span());
                    ops.push(PostfixOp::Method {
                        name: name.text,
                        args,
                        span,
                    });
                } else {
                    ops.push(PostfixOp::Property {
                        name: name.text,
                        optional: false,
                        span: dot.span.to(name.span),
                    });
                }
            } else if self.at(TokenKind::OptChain) && self.peek_at(1).kind == TokenKind::Ident {
                let op = self.advance();
                let name = self.advance();
                ops.push(PostfixOp::Property {
                    name: name.text,
                    optional: true,
                    span: op.span.to(name.span),
                });
            } else if self.at(TokenKind::Colon)
                && self.peek_at(1).kind == TokenKind::Ident
                && TypeName::parse(&self.peek_at(1).text).is_some()
            {
                let colon = self.advance();
                let name = self.advance();
                let ty = TypeName::parse(&name.text).expect("checked above");
                ops.push(PostfixOp::TypeAssert {
                    ty,
                    span: colon.span.to(name.span),
                });
            } else if self.at(TokenKind::Colon)
                && self.peek_at(1).kind == TokenKind::Question
                && self.peek_at(2).kind == TokenKind::Ident
                && TypeName::parse(&self.peek_at(2).text).is_some()
            {
                let colon = self.advance();
                self.advance();
                let name = self.advance();
                let ty = TypeName::parse(&name.text).expect("checked above");
                ops.push(PostfixOp::TypeCheck {
                    ty,
                    span: colon.span.to(name.span),
                });
            } else {
                break;
            }
        }

        let default = if self.at(TokenKind::Coalesce) {
            self.advance();
            self.skip_newlines();
            Some(Box::new(self.parse_equality()?))
        } else {
            None
        };

        if ops.is_empty() && default.is_none() {
            return Ok(expr);
        }
        let span = start.to(self.previous_span());
        Ok(Expr::Postfix {
            expr: Box::new(expr),
            ops,
            default,
            span,
        })
    }

    /// Parse a parenthesized argument list; `*expr` spreads.
    pub(crate) fn parse_call_args(&mut self) -> Result<Vec<Expr>, RillError> {
        self.expect(TokenKind::LParen)?;
        self.skip_newlines();
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            args.push(self.parse_arg()?);
            self.skip_newlines();
            if !self.eat(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect_closing(TokenKind::RParen, "(")?;
        Ok(args)
    }

    pub(crate) fn parse_arg(&mut self) -> Result<Expr, RillError> {
        if self.at(TokenKind::Star) {
            let star = self.advance();
            let value = self.parse_expression()?;
            let span = star.span.to(value.span());
            return Ok(Expr::Spread {
                value: Box::new(value),
                span,
            });
        }
        self.parse_expression()
    }

    /// Span of the most recently consumed token.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos == 0 {
            return self.peek().span;
        }
        self.tokens[self.pos - 1].span
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span().to(rhs.span());
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span,
    }
}

fn is_bool_binary(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Binary {
            op: BinaryOp::And | BinaryOp::Or,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::ast::{BinaryOp, Expr, PostfixOp, TypeName, UnaryOp};

    fn head(source: &str) -> Expr {
        parse(source).unwrap().statements.remove(0).chain.head
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let Expr::Binary { op, rhs, .. } = head("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            *rhs,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_comparison_over_equality() {
        let Expr::Binary { op, .. } = head("1 < 2 == true") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Eq);
    }

    #[test]
    fn test_negative_literal_folds() {
        assert!(matches!(head("-5"), Expr::Number { value, .. } if value == -5.0));
    }

    #[test]
    fn test_unary_minus_on_variable() {
        assert!(matches!(
            head("-$x"),
            Expr::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_bool_ops_rejected_outside_conditions() {
        assert!(parse("($a && $b)").is_err());
        assert!(parse("$a || $b").is_err());
    }

    #[test]
    fn test_bool_ops_allowed_in_conditional_head() {
        let expr = head("$a && $b ? 1 ! 2");
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn test_conditional_without_else() {
        let Expr::Conditional { else_branch, .. } = head("$a ? 1") else {
            panic!("expected conditional");
        };
        assert!(else_branch.is_none());
    }

    #[test]
    fn test_method_and_property_postfix() {
        let Expr::Postfix { ops, .. } = head("$x.items.join(\",\")") else {
            panic!("expected postfix");
        };
        assert!(matches!(&ops[0], PostfixOp::Property { name, optional: false, .. } if name == "items"));
        assert!(matches!(&ops[1], PostfixOp::Method { name, args, .. } if name == "join" && args.len() == 1));
    }

    #[test]
    fn test_optional_property_and_default() {
        let Expr::Postfix { ops, default, .. } = head("$x.?missing ?? 0") else {
            panic!("expected postfix");
        };
        assert!(matches!(&ops[0], PostfixOp::Property { optional: true, .. }));
        assert!(default.is_some());
    }

    #[test]
    fn test_type_assert_and_check() {
        let Expr::Postfix { ops, .. } = head("$x: number") else {
            panic!("expected postfix");
        };
        assert!(matches!(
            &ops[0],
            PostfixOp::TypeAssert {
                ty: TypeName::Number,
                ..
            }
        ));

        let Expr::Postfix { ops, .. } = head("$x:?string") else {
            panic!("expected postfix");
        };
        assert!(matches!(
            &ops[0],
            PostfixOp::TypeCheck {
                ty: TypeName::String,
                ..
            }
        ));
    }

    #[test]
    fn test_leading_dot_in_pipe_target() {
        let script = parse("$cfg -> .model").unwrap();
        let segment = &script.statements[0].chain.segments[0];
        let Expr::Postfix { expr, ops, .. } = segment else {
            panic!("expected postfix on pipe value");
        };
        assert!(matches!(**expr, Expr::PipeValue { .. }));
        assert!(matches!(&ops[0], PostfixOp::Property { name, .. } if name == "model"));
    }

    #[test]
    fn test_spread_argument() {
        let expr = head("greet(*$args)");
        let Expr::HostCall { args, .. } = expr else {
            panic!("expected host call");
        };
        assert!(matches!(args[0], Expr::Spread { .. }));
    }
}
