// ABOUTME: Operators: arithmetic, comparison, postfix chains, extraction

use super::{calls, eval_expr, Flow};
use crate::ast::{BinaryOp, Expr, Pattern, PostfixOp, UnaryOp};
use crate::context::Context;
use crate::error::{ErrorKind, RillError, Signal};
use crate::span::Span;
use crate::value::{CallArgs, Value};

// ===== Binary and unary operators =====

pub(crate) fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    // Boolean operators short-circuit.
    match op {
        BinaryOp::And => {
            let left = eval_expr(lhs, ctx)?;
            if !left.is_truthy() {
                return Ok(Value::Bool(false));
            }
            let right = eval_expr(rhs, ctx)?;
            return Ok(Value::Bool(right.is_truthy()));
        }
        BinaryOp::Or => {
            let left = eval_expr(lhs, ctx)?;
            if left.is_truthy() {
                return Ok(Value::Bool(true));
            }
            let right = eval_expr(rhs, ctx)?;
            return Ok(Value::Bool(right.is_truthy()));
        }
        _ => {}
    }

    let left = eval_expr(lhs, ctx)?;
    let right = eval_expr(rhs, ctx)?;
    apply_binary(op, left, right, span).map_err(Signal::from)
}

fn apply_binary(op: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, RillError> {
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => Err(numeric_type_error("+", &left, &right, span)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(numeric_type_error(op.symbol(), &left, &right, span));
            };
            match op {
                BinaryOp::Sub => Ok(Value::Number(a - b)),
                BinaryOp::Mul => Ok(Value::Number(a * b)),
                BinaryOp::Div => {
                    if *b == 0.0 {
                        Err(RillError::at(ErrorKind::DivisionByZero, span.start))
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }
                BinaryOp::Mod => {
                    if *b == 0.0 {
                        Err(RillError::at(ErrorKind::DivisionByZero, span.start))
                    } else {
                        Ok(Value::Number(a % b))
                    }
                }
                _ => unreachable!("arithmetic op"),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(numeric_type_error(op.symbol(), &left, &right, span));
            };
            let holds = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::GtEq => ordering.is_ge(),
                _ => unreachable!("comparison op"),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited above"),
    }
}

fn numeric_type_error(symbol: &str, left: &Value, right: &Value, span: Span) -> RillError {
    RillError::type_error(format!(
        "cannot apply '{symbol}' to {} and {}",
        left.type_name(),
        right.type_name()
    ))
    .with_location(span.start)
}

pub(crate) fn eval_unary(
    op: UnaryOp,
    operand: &Expr,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let value = eval_expr(operand, ctx)?;
    match op {
        UnaryOp::Neg => match value {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(RillError::type_error(format!(
                "cannot negate {}",
                other.type_name()
            ))
            .with_location(span.start)
            .into()),
        },
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
    }
}

// ===== Postfix chains =====

pub(crate) fn eval_postfix(
    expr: &Expr,
    ops: &[PostfixOp],
    default: Option<&Expr>,
    ctx: &mut Context,
) -> Flow<Value> {
    let mut value = eval_expr(expr, ctx)?;

    for op in ops {
        match op {
            PostfixOp::Property {
                name,
                optional,
                span,
            } => {
                if *optional {
                    if matches!(value, Value::Null) {
                        continue;
                    }
                    value = match calls::get_property(&value, name, *span, ctx) {
                        Ok(found) => found,
                        Err(Signal::Error(err)) if is_missing_property(&err) => Value::Null,
                        Err(other) => return Err(other),
                    };
                } else {
                    value = calls::get_property(&value, name, *span, ctx)?;
                }
            }
            PostfixOp::Method { name, args, span } => {
                value = calls::invoke_method(&value, name, args, *span, ctx)?;
            }
            PostfixOp::TypeAssert { ty, span } => {
                if value.ty() != *ty {
                    return Err(RillError::type_error(format!(
                        "expected {}, got {}",
                        ty.as_str(),
                        value.type_name()
                    ))
                    .with_location(span.start)
                    .into());
                }
            }
            PostfixOp::TypeCheck { ty, .. } => {
                value = Value::Bool(value.ty() == *ty);
            }
        }
    }

    if matches!(value, Value::Null) {
        if let Some(default) = default {
            value = eval_expr(default, ctx)?;
        }
    }
    Ok(value)
}

fn is_missing_property(err: &RillError) -> bool {
    matches!(
        err.kind,
        ErrorKind::PropertyNotFound { .. } | ErrorKind::TypeError { .. }
    )
}

// ===== Extraction operators =====

/// `*< [pattern, …]` binds positionally from the piped tuple and
/// passes the input through unchanged.
pub(crate) fn eval_destructure(
    patterns: &[Pattern],
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let input = ctx.pipe_value();
    bind_patterns(patterns, &input, span, ctx)?;
    Ok(input)
}

fn bind_patterns(
    patterns: &[Pattern],
    value: &Value,
    span: Span,
    ctx: &mut Context,
) -> Flow<()> {
    let Value::Tuple(items) = value else {
        return Err(RillError::type_error(format!(
            "destructure expects a tuple, got {}",
            value.type_name()
        ))
        .with_location(span.start)
        .into());
    };

    let mut index = 0usize;
    for pattern in patterns {
        match pattern {
            Pattern::Rest(name) => {
                let rest: Vec<Value> = items.iter().skip(index).cloned().collect();
                ctx.set_var(name, Value::Tuple(rest)).map_err(Signal::from)?;
                index = items.len();
            }
            Pattern::Skip => index += 1,
            Pattern::Name(name) => {
                let item = items.get(index).cloned().unwrap_or(Value::Null);
                ctx.set_var(name, item).map_err(Signal::from)?;
                index += 1;
            }
            Pattern::Nested(inner) => {
                let item = items.get(index).cloned().unwrap_or(Value::Null);
                bind_patterns(inner, &item, span, ctx)?;
                index += 1;
            }
        }
    }
    Ok(())
}

/// `/< [start:stop:step]` over tuples and strings, with Python-style
/// negative indices and steps.
pub(crate) fn eval_slice(
    start: Option<&Expr>,
    stop: Option<&Expr>,
    step: Option<&Expr>,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let input = ctx.pipe_value();
    let start = eval_index(start, ctx)?;
    let stop = eval_index(stop, ctx)?;
    let step = eval_index(step, ctx)?.unwrap_or(1);
    if step == 0 {
        return Err(RillError::type_error("slice step cannot be zero")
            .with_location(span.start)
            .into());
    }

    match input {
        Value::Tuple(items) => {
            let picked = slice_range(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::Tuple(picked))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = slice_range(chars.len(), start, stop, step)
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(Value::String(picked))
        }
        other => Err(RillError::type_error(format!(
            "cannot slice {}",
            other.type_name()
        ))
        .with_location(span.start)
        .into()),
    }
}

fn eval_index(expr: Option<&Expr>, ctx: &mut Context) -> Flow<Option<i64>> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    match eval_expr(expr, ctx)? {
        Value::Number(n) => Ok(Some(n.floor() as i64)),
        other => Err(RillError::type_error(format!(
            "slice index must be a number, got {}",
            other.type_name()
        ))
        .into()),
    }
}

fn slice_range(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let normalize = |v: i64, lo: i64, hi: i64| -> i64 {
        let v = if v < 0 { v + len } else { v };
        v.clamp(lo, hi)
    };

    let (begin, end) = if step > 0 {
        (
            start.map_or(0, |v| normalize(v, 0, len)),
            stop.map_or(len, |v| normalize(v, 0, len)),
        )
    } else {
        (
            start.map_or(len - 1, |v| normalize(v, -1, len - 1)),
            stop.map_or(-1, |v| normalize(v, -1, len - 1)),
        )
    };

    let mut indices = Vec::new();
    let mut i = begin;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        if i >= 0 && i < len {
            indices.push(i as usize);
        }
        i += step;
    }
    indices
}

/// `*expr` in a standalone position yields an Args wrapper: tuples
/// keyed by position, dicts by name.
pub(crate) fn eval_spread(value: &Expr, span: Span, ctx: &mut Context) -> Flow<Value> {
    match eval_expr(value, ctx)? {
        Value::Tuple(items) => Ok(Value::Args(CallArgs::positional(items))),
        Value::Dict(map) => Ok(Value::Args(CallArgs {
            positional: Vec::new(),
            named: map,
        })),
        Value::Args(args) => Ok(Value::Args(args)),
        other => Err(RillError::type_error(format!(
            "cannot spread {}",
            other.type_name()
        ))
        .with_location(span.start)
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::slice_range;

    #[test]
    fn test_slice_range_forward() {
        assert_eq!(slice_range(5, Some(1), Some(4), 1), vec![1, 2, 3]);
        assert_eq!(slice_range(5, None, None, 1), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_range(5, None, None, 2), vec![0, 2, 4]);
    }

    #[test]
    fn test_slice_range_negative_indices() {
        assert_eq!(slice_range(5, Some(-2), None, 1), vec![3, 4]);
        assert_eq!(slice_range(5, None, Some(-1), 1), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_slice_range_negative_step() {
        assert_eq!(slice_range(5, None, None, -1), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_range(5, Some(3), Some(0), -1), vec![3, 2, 1]);
    }

    #[test]
    fn test_slice_range_out_of_bounds_clamps() {
        assert_eq!(slice_range(3, Some(-10), Some(10), 1), vec![0, 1, 2]);
        assert_eq!(slice_range(0, None, None, 1), Vec::<usize>::new());
    }
}
