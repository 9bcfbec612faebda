// ABOUTME: Control flow: conditionals, while loops, blocks, annotations

use super::{eval_expr, eval_statement, Flow};
use crate::ast::{AnnotationArg, Expr, Statement};
use crate::context::Context;
use crate::error::{ErrorKind, RillError, Signal};
use crate::span::Span;
use crate::value::Value;
use indexmap::IndexMap;

/// Evaluate annotation arguments in the current scope into a frame.
/// A spread annotation requires a dict.
pub(crate) fn eval_annotation_frame(
    args: &[AnnotationArg],
    ctx: &mut Context,
) -> Flow<IndexMap<String, Value>> {
    let mut frame = IndexMap::new();
    for arg in args {
        match arg {
            AnnotationArg::Named { name, value, .. } => {
                frame.insert(name.clone(), eval_expr(value, ctx)?);
            }
            AnnotationArg::Spread { value, span } => match eval_expr(value, ctx)? {
                Value::Dict(map) => frame.extend(map),
                other => {
                    return Err(RillError::at(
                        ErrorKind::InvalidSpread {
                            type_name: other.type_name().to_string(),
                        },
                        span.start,
                    )
                    .into());
                }
            },
        }
    }
    Ok(frame)
}

/// `cond ? then ! else` — only the selected branch is evaluated; the
/// pipe value stays bound to the conditional's input in both branches.
pub(crate) fn eval_conditional(
    cond: &Expr,
    then_branch: &Expr,
    else_branch: Option<&Expr>,
    ctx: &mut Context,
) -> Flow<Value> {
    let decided = eval_expr(cond, ctx)?;
    if decided.is_truthy() {
        eval_expr(then_branch, ctx)
    } else if let Some(else_branch) = else_branch {
        eval_expr(else_branch, ctx)
    } else {
        Ok(Value::Null)
    }
}

/// While and do-while. `$` starts as the piped input, and after each
/// body run becomes the body's value; the loop yields the last body
/// value, or the input when the body never ran.
pub(crate) fn eval_while(
    cond: &Expr,
    body: &Expr,
    do_while: bool,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let limit = ctx.iteration_limit();
    let mut value = ctx.pipe_value();
    let mut iterations = 0usize;

    loop {
        if !do_while {
            ctx.set_pipe_value(value.clone());
            if !eval_expr(cond, ctx)?.is_truthy() {
                break;
            }
        }
        iterations += 1;
        if iterations > limit {
            return Err(RillError::at(ErrorKind::IterationLimit { limit }, span.start).into());
        }
        ctx.set_pipe_value(value.clone());
        match eval_expr(body, ctx) {
            Ok(result) => value = result,
            Err(Signal::Break(result)) => return Ok(result),
            Err(other) => return Err(other),
        }
        if do_while {
            ctx.set_pipe_value(value.clone());
            if !eval_expr(cond, ctx)?.is_truthy() {
                break;
            }
        }
    }
    Ok(value)
}

/// A block runs its statements in a fresh scope and yields the last
/// statement's value. The scope is released on every exit path.
pub(crate) fn eval_block(statements: &[Statement], ctx: &mut Context) -> Flow<Value> {
    ctx.push_scope();
    let mut result = Ok(Value::Null);
    for statement in statements {
        match eval_statement(statement, ctx) {
            Ok(value) => result = Ok(value),
            Err(signal) => {
                result = Err(signal);
                break;
            }
        }
    }
    ctx.pop_scope();
    result
}
