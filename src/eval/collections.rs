// ABOUTME: Collection operators: each, map, fold, filter over piped iterables

use super::{calls, eval_expr, Flow};
use crate::ast::Expr;
use crate::context::Context;
use crate::error::{ErrorKind, RillError, Signal};
use crate::span::Span;
use crate::value::{Callable, Value};
use std::rc::Rc;

/// A prepared iteration body: closures, variables, and spreads resolve
/// to a callable once; blocks and groups re-evaluate per item.
enum IterBody<'a> {
    Callable(Rc<Callable>),
    Inline(&'a Expr),
}

fn prepare_body<'a>(body: &'a Expr, ctx: &mut Context) -> Flow<IterBody<'a>> {
    match body {
        Expr::Closure { .. } | Expr::Var { .. } | Expr::Spread { .. } => {
            match eval_expr(body, ctx)? {
                Value::Callable(callable) => Ok(IterBody::Callable(callable)),
                other => Err(RillError::at(
                    ErrorKind::NotCallable {
                        type_name: other.type_name().to_string(),
                    },
                    body.span().start,
                )
                .into()),
            }
        }
        _ => Ok(IterBody::Inline(body)),
    }
}

fn apply_body(body: &IterBody, item: Value, ctx: &mut Context) -> Flow<Value> {
    match body {
        IterBody::Callable(callable) => {
            calls::call_with_pipe_input(callable.clone(), item, None, ctx)
        }
        IterBody::Inline(expr) => eval_expr(expr, ctx),
    }
}

/// Adapt the piped input into an item list: tuples as-is, dicts as
/// `[key, value]` pairs, strings as single characters.
fn iterate(value: Value, span: Span) -> Result<Vec<Value>, Signal> {
    match value {
        Value::Tuple(items) => Ok(items),
        Value::Dict(map) => Ok(map
            .into_iter()
            .map(|(k, v)| Value::Tuple(vec![Value::String(k), v]))
            .collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(RillError::at(
            ErrorKind::NotIterable {
                type_name: other.type_name().to_string(),
            },
            span.start,
        )
        .into()),
    }
}

fn over_limit(index: usize, limit: usize, span: Span) -> Result<(), Signal> {
    if index >= limit {
        Err(RillError::at(ErrorKind::IterationLimit { limit }, span.start).into())
    } else {
        Ok(())
    }
}

/// Sequential iteration producing a tuple of body results. `break`
/// halts and yields the partial tuple; `return` propagates. An
/// optional initializer seeds `$@`.
pub(crate) fn eval_each(
    body: &Expr,
    init: Option<&Expr>,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let items = iterate(ctx.pipe_value(), span)?;
    let has_acc = init.is_some();
    if let Some(init) = init {
        let seed = eval_expr(init, ctx)?;
        ctx.push_accumulator(seed);
    }
    let result = run_each(body, items, span, ctx);
    if has_acc {
        ctx.pop_accumulator();
    }
    result
}

fn run_each(body: &Expr, items: Vec<Value>, span: Span, ctx: &mut Context) -> Flow<Value> {
    let limit = ctx.iteration_limit();
    let body = prepare_body(body, ctx)?;
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        over_limit(index, limit, span)?;
        ctx.set_pipe_value(item.clone());
        match apply_body(&body, item, ctx) {
            Ok(value) => results.push(value),
            Err(Signal::Break(_)) => break,
            Err(other) => return Err(other),
        }
    }
    Ok(Value::Tuple(results))
}

/// Parallel-shaped iteration: no accumulator, and `break` is rejected.
/// Items still evaluate in source order for reproducibility.
pub(crate) fn eval_map(body: &Expr, span: Span, ctx: &mut Context) -> Flow<Value> {
    let items = iterate(ctx.pipe_value(), span)?;
    let limit = ctx.iteration_limit();
    let body = prepare_body(body, ctx)?;
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        over_limit(index, limit, span)?;
        ctx.set_pipe_value(item.clone());
        match apply_body(&body, item, ctx) {
            Ok(value) => results.push(value),
            Err(Signal::Break(_)) => {
                return Err(RillError::at(ErrorKind::BreakInParallel, span.start).into());
            }
            Err(other) => return Err(other),
        }
    }
    Ok(Value::Tuple(results))
}

/// Sequential reduction: `$` is the item, `$@` the accumulator; each
/// body result rebinds `$@`, and the final accumulator is the value.
pub(crate) fn eval_fold(
    body: &Expr,
    init: Option<&Expr>,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let items = iterate(ctx.pipe_value(), span)?;
    let seed = match init {
        Some(init) => eval_expr(init, ctx)?,
        None => Value::Null,
    };
    ctx.push_accumulator(seed);
    let result = run_fold(body, items, span, ctx);
    let acc = ctx.pop_accumulator();
    result.map(|_| acc)
}

fn run_fold(body: &Expr, items: Vec<Value>, span: Span, ctx: &mut Context) -> Flow<()> {
    let limit = ctx.iteration_limit();
    let body = prepare_body(body, ctx)?;
    for (index, item) in items.into_iter().enumerate() {
        over_limit(index, limit, span)?;
        ctx.set_pipe_value(item.clone());
        match apply_body(&body, item, ctx) {
            Ok(value) => ctx
                .set_var("@", value)
                .map_err(Signal::from)?,
            Err(Signal::Break(_)) => break,
            Err(other) => return Err(other),
        }
    }
    Ok(())
}

/// Keep items whose body value is truthy. Each body runs in a fresh
/// scope with `$` bound to the item.
pub(crate) fn eval_filter(body: &Expr, span: Span, ctx: &mut Context) -> Flow<Value> {
    let items = iterate(ctx.pipe_value(), span)?;
    let limit = ctx.iteration_limit();
    let body = prepare_body(body, ctx)?;
    let mut kept = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        over_limit(index, limit, span)?;
        ctx.set_pipe_value(item.clone());
        ctx.push_scope();
        let result = apply_body(&body, item.clone(), ctx);
        ctx.pop_scope();
        match result {
            Ok(value) => {
                if value.is_truthy() {
                    kept.push(item);
                }
            }
            Err(Signal::Break(_)) => break,
            Err(other) => return Err(other),
        }
    }
    Ok(Value::Tuple(kept))
}
