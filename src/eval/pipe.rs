// ABOUTME: Pipe-chain evaluation: segment flow, dispatch dicts, terminators

use super::{calls, eval_expr, Flow};
use crate::ast::{Expr, PipeChain, Terminator};
use crate::context::Context;
use crate::error::{ErrorKind, RillError, Signal};
use crate::value::Value;

/// Evaluate a chain: the head's value flows left to right through the
/// segments. The surrounding statement's pipe value is restored on
/// every exit path, so `$` never leaks into sibling statements.
pub(crate) fn eval_pipe_chain(chain: &PipeChain, ctx: &mut Context) -> Flow<Value> {
    let saved = ctx.pipe_value();
    let result = run_chain(chain, ctx);
    ctx.set_pipe_value(saved);
    result
}

fn run_chain(chain: &PipeChain, ctx: &mut Context) -> Flow<Value> {
    let mut value = eval_expr(&chain.head, ctx)?;

    for segment in &chain.segments {
        ctx.set_pipe_value(value.clone());
        value = eval_pipe_target(segment, value, ctx)?;
    }

    match &chain.terminator {
        None => Ok(value),
        Some(Terminator::Capture { name, span }) => {
            ctx.set_var(name, value.clone())
                .map_err(|e| Signal::from(e.with_location(span.start)))?;
            ctx.fire_capture(name, &value);
            Ok(value)
        }
        Some(Terminator::Break { .. }) => Err(Signal::Break(value)),
        Some(Terminator::Return { .. }) => Err(Signal::Return(value)),
    }
}

/// Evaluate one pipe target with `input` as the segment's `$`.
fn eval_pipe_target(segment: &Expr, input: Value, ctx: &mut Context) -> Flow<Value> {
    // A dict literal applied to a primitive is a dispatch dict.
    if let Expr::Dict { .. } = segment {
        if input.is_primitive() {
            return eval_dispatch_dict(segment, input, ctx);
        }
    }

    let result = eval_expr(segment, ctx)?;

    // Variable, closure-literal, and grouped targets that evaluate to
    // a callable are applied to the piped input.
    if let Value::Callable(callable) = &result {
        if matches!(
            segment,
            Expr::Var { .. } | Expr::Closure { .. } | Expr::Grouped { .. }
        ) {
            return calls::call_with_pipe_input(callable.clone(), input, Some(segment.span()), ctx);
        }
    }
    Ok(result)
}

/// Select a dispatch-dict entry by the stringified input. A callable
/// entry is invoked with the input as the implicit `$`.
fn eval_dispatch_dict(segment: &Expr, input: Value, ctx: &mut Context) -> Flow<Value> {
    let key = input.to_display_string();
    let dict = match eval_expr(segment, ctx)? {
        Value::Dict(dict) => dict,
        other => return Ok(other),
    };
    match dict.get(&key) {
        Some(Value::Callable(callable)) => {
            calls::call_with_pipe_input(callable.clone(), input, Some(segment.span()), ctx)
        }
        Some(value) => Ok(value.clone()),
        None => Err(RillError::at(
            ErrorKind::KeyNotFound { key },
            segment.span().start,
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::eval::execute;
    use crate::parser::parse;
    use crate::value::Value;

    fn run(source: &str) -> Value {
        let script = parse(source).unwrap();
        let mut ctx = Context::with_defaults();
        execute(&script, &mut ctx).unwrap().value
    }

    #[test]
    fn test_pipe_value_flows_through_segments() {
        assert_eq!(run("5 -> $ + 1 -> $ * 2"), Value::Number(12.0));
    }

    #[test]
    fn test_pipe_value_does_not_leak_across_statements() {
        // The second statement's `$` is not the first statement's value.
        let script = parse("5\n$").unwrap();
        let mut ctx = Context::with_defaults();
        let result = execute(&script, &mut ctx).unwrap();
        assert_eq!(result.value, Value::Null);
    }

    #[test]
    fn test_capture_binds_without_updating_pipe() {
        assert_eq!(
            run("5 => $x\n$x + 1"),
            Value::Number(6.0),
        );
    }

    #[test]
    fn test_dispatch_dict_selects_entry() {
        assert_eq!(
            run("\"blocked\" -> [\"blocked\": \"is blocked\", \"error\": \"is error\"]"),
            Value::String("is blocked".to_string())
        );
    }

    #[test]
    fn test_dispatch_dict_stringifies_non_string_input() {
        assert_eq!(
            run("1 -> [\"1\": \"one\", \"2\": \"two\"]"),
            Value::String("one".to_string())
        );
        assert_eq!(
            run("true -> [true: \"yes\", false: \"no\"]"),
            Value::String("yes".to_string())
        );
    }

    #[test]
    fn test_dispatch_dict_missing_key_fails() {
        let script = parse("\"nope\" -> [\"a\": 1]").unwrap();
        let mut ctx = Context::with_defaults();
        let err = execute(&script, &mut ctx).unwrap_err();
        assert_eq!(err.id(), "RILL-R012");
    }

    #[test]
    fn test_dispatch_dict_invokes_callable_entry() {
        // The callable entry receives the input as its argument.
        assert_eq!(
            run("\"ok\" -> [\"ok\": |x| \"{$x}!\"]"),
            Value::String("ok!".to_string())
        );
    }

    #[test]
    fn test_closure_target_applied_to_input() {
        assert_eq!(run("|x| $x * 3 => $triple\n5 -> $triple"), Value::Number(15.0));
    }
}
