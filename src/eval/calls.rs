// ABOUTME: Invocation contract: closures, host calls, methods, property access

use super::{eval_expr, Flow};
use crate::ast::{Expr, Param};
use crate::context::Context;
use crate::env::Environment;
use crate::error::{ErrorKind, RillError, Signal};
use crate::span::Span;
use crate::value::{CallArgs, Callable, CallableKind, NativeFn, Value};
use std::rc::Rc;
use std::time::Instant;

fn at_span(err: RillError, span: Option<Span>) -> RillError {
    match span {
        Some(span) => err.with_location(span.start),
        None => err,
    }
}

/// Evaluate a call's argument expressions. Spreads flatten in place:
/// tuples extend the positional list, dicts become named arguments.
pub(crate) fn build_call_args(args: &[Expr], ctx: &mut Context) -> Flow<CallArgs> {
    let mut out = CallArgs::default();
    for arg in args {
        if let Expr::Spread { value, span } = arg {
            match eval_expr(value, ctx)? {
                Value::Tuple(items) => out.positional.extend(items),
                Value::Dict(map) => out.named.extend(map),
                Value::Args(inner) => {
                    out.positional.extend(inner.positional);
                    out.named.extend(inner.named);
                }
                other => {
                    return Err(RillError::type_error(format!(
                        "cannot spread {} into arguments",
                        other.type_name()
                    ))
                    .with_location(span.start)
                    .into());
                }
            }
        } else {
            out.positional.push(eval_expr(arg, ctx)?);
        }
    }
    Ok(out)
}

/// The invocation contract shared by every callable kind.
pub(crate) fn invoke_callable(
    callable: &Rc<Callable>,
    mut args: CallArgs,
    span: Option<Span>,
    ctx: &mut Context,
) -> Flow<Value> {
    // A trailing Args wrapper (spread) flattens into the call: its
    // positional entries fill remaining slots, named entries override
    // parameters by name.
    if matches!(args.positional.last(), Some(Value::Args(_))) {
        if let Some(Value::Args(spread)) = args.positional.pop() {
            args.positional.extend(spread.positional);
            args.named.extend(spread.named);
        }
    }

    match &callable.kind {
        CallableKind::Script { params, body, env } => {
            invoke_script(callable, params, body.clone(), env.clone(), args, span, ctx)
        }
        CallableKind::Runtime { func } | CallableKind::Host { func } => {
            invoke_native(&callable.display_name(), func.clone(), &args, span, ctx)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn invoke_script(
    callable: &Callable,
    params: &[Param],
    body: Rc<Expr>,
    env: Rc<Environment>,
    mut args: CallArgs,
    span: Option<Span>,
    ctx: &mut Context,
) -> Flow<Value> {
    let name = callable.display_name();

    // Property-style callables receive their dict as the implicit
    // receiver: bound to `$`, and to the first parameter when one is
    // declared and no explicit arguments were given.
    let receiver = if callable.is_property {
        callable.bound_dict.borrow().clone().map(Value::Dict)
    } else {
        None
    };
    if let Some(receiver) = &receiver {
        if !params.is_empty() && args.is_empty() {
            args.positional.push(receiver.clone());
        }
    }

    // Excess arguments are rejected before defaults are applied.
    if args.positional.len() > params.len() {
        return Err(at_span(
            RillError::arity_error(&name, params.len().to_string(), args.positional.len()),
            span,
        )
        .into());
    }
    for key in args.named.keys() {
        if !params.iter().any(|p| &p.name == key) {
            return Err(at_span(
                RillError::type_error(format!("{name}: unknown parameter '{key}'")),
                span,
            )
            .into());
        }
    }

    // Fresh scope atop the defining chain (late binding).
    let call_env = Environment::with_parent(env);
    let saved_env = ctx.swap_env(call_env);
    let saved_pipe = receiver.map(|r| {
        let old = ctx.pipe_value();
        ctx.set_pipe_value(r);
        old
    });

    let result = bind_and_run(&name, params, &body, &args, span, ctx);

    if let Some(old) = saved_pipe {
        ctx.set_pipe_value(old);
    }
    ctx.swap_env(saved_env);
    result
}

fn bind_and_run(
    name: &str,
    params: &[Param],
    body: &Expr,
    args: &CallArgs,
    span: Option<Span>,
    ctx: &mut Context,
) -> Flow<Value> {
    for (i, param) in params.iter().enumerate() {
        // Named entries override positional ones for the same slot.
        let provided = args
            .named
            .get(&param.name)
            .cloned()
            .or_else(|| args.positional.get(i).cloned());
        let value = match provided {
            Some(value) => value,
            None => match &param.default {
                Some(default) => eval_expr(default, ctx)?,
                None => {
                    return Err(at_span(
                        RillError::arity_error(name, expected_arity(params), args.len()),
                        span,
                    )
                    .into());
                }
            },
        };
        if let Some(ty) = param.ty {
            if value.ty() != ty {
                return Err(at_span(
                    RillError::type_error(format!(
                        "{name}: parameter '{}' expects {}, got {}",
                        param.name,
                        ty.as_str(),
                        value.type_name()
                    )),
                    span,
                )
                .into());
            }
        }
        ctx.bind_param(&param.name, value);
    }

    ctx.push_frame(name, span, None);
    if let Some(hook) = &ctx.hooks.on_function_call {
        hook(name);
    }
    let started = Instant::now();
    let result = match eval_expr(body, ctx) {
        Ok(value) => Ok(value),
        Err(Signal::Return(value)) => Ok(value),
        // Record the stack while this call's frame is still live.
        Err(Signal::Error(err)) => Err(Signal::Error(Box::new(ctx.attach_stack(*err)))),
        Err(other) => Err(other),
    };
    ctx.pop_frame();
    if let Some(hook) = &ctx.hooks.on_function_return {
        hook(name, started.elapsed());
    }
    result
}

fn expected_arity(params: &[Param]) -> String {
    let required = params.iter().filter(|p| p.default.is_none()).count();
    if required == params.len() {
        required.to_string()
    } else {
        format!("{required}-{}", params.len())
    }
}

fn invoke_native(
    name: &str,
    func: NativeFn,
    args: &CallArgs,
    span: Option<Span>,
    ctx: &mut Context,
) -> Flow<Value> {
    ctx.check_cancelled(span.map(|s| s.start))?;
    ctx.push_frame(name, span, None);
    if let Some(hook) = &ctx.hooks.on_function_call {
        hook(name);
    }
    let started = Instant::now();
    let result = func(args, ctx, span.map(|s| s.start));
    let elapsed = started.elapsed();
    let result = result.map_err(|e| Signal::from(ctx.attach_stack(at_span(e, span))));
    ctx.pop_frame();
    if let Some(hook) = &ctx.hooks.on_function_return {
        hook(name, elapsed);
    }

    // Cooperative timeout: a host call that outlives its budget fails
    // on return, even with a result in hand.
    if result.is_ok() {
        if let Some(limit) = ctx.timeout_ms() {
            if elapsed.as_millis() as u64 > limit {
                return Err(at_span(
                    RillError::new(ErrorKind::Timeout {
                        function: name.to_string(),
                        timeout_ms: limit,
                    }),
                    span,
                )
                .into());
            }
        }
    }
    result
}

// ===== Call forms =====

pub(crate) fn eval_host_call(
    name: &str,
    args: &[Expr],
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let Some(func) = ctx.get_function(name) else {
        return Err(RillError::undefined_function(name)
            .with_location(span.start)
            .into());
    };
    let call_args = build_call_args(args, ctx)?;
    let callable = Callable::host(name, func);
    invoke_callable(&callable, call_args, Some(span), ctx)
}

pub(crate) fn eval_closure_call(
    name: &str,
    args: &[Expr],
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let value = ctx.get_var(name).ok_or_else(|| {
        Signal::from(RillError::undefined_variable(name).with_location(span.start))
    })?;
    let callable = match value {
        Value::Callable(callable) => callable,
        other => {
            return Err(RillError::at(
                ErrorKind::NotCallable {
                    type_name: other.type_name().to_string(),
                },
                span.start,
            )
            .into());
        }
    };
    let call_args = build_call_args(args, ctx)?;
    invoke_callable(&callable, call_args, Some(span), ctx)
}

pub(crate) fn eval_pipe_invoke(args: &[Expr], span: Span, ctx: &mut Context) -> Flow<Value> {
    let callable = match ctx.pipe_value() {
        Value::Callable(callable) => callable,
        other => {
            return Err(RillError::at(
                ErrorKind::NotCallable {
                    type_name: other.type_name().to_string(),
                },
                span.start,
            )
            .into());
        }
    };
    let call_args = build_call_args(args, ctx)?;
    invoke_callable(&callable, call_args, Some(span), ctx)
}

/// Apply a callable to a piped input: the input becomes the single
/// positional argument, except for zero-parameter script callables,
/// which read it through `$`.
pub(crate) fn call_with_pipe_input(
    callable: Rc<Callable>,
    input: Value,
    span: Option<Span>,
    ctx: &mut Context,
) -> Flow<Value> {
    let wants_arg = match &callable.kind {
        CallableKind::Script { params, .. } => !params.is_empty(),
        _ => true,
    };
    let args = if wants_arg {
        CallArgs::positional(vec![input])
    } else {
        CallArgs::default()
    };
    invoke_callable(&callable, args, span, ctx)
}

// ===== Property access =====

/// One property hop. Dict members that are property-style callables
/// auto-invoke with the dict as the bound receiver. Callables expose
/// `params` and `name` for introspection.
pub(crate) fn get_property(
    value: &Value,
    name: &str,
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    match value {
        Value::Dict(dict) => match dict.get(name) {
            Some(Value::Callable(callable)) if callable.is_property => {
                *callable.bound_dict.borrow_mut() = Some(dict.clone());
                let callable = callable.clone();
                invoke_callable(&callable, CallArgs::default(), Some(span), ctx)
            }
            Some(member) => Ok(member.clone()),
            None => Err(RillError::at(
                ErrorKind::PropertyNotFound {
                    name: name.to_string(),
                },
                span.start,
            )
            .into()),
        },
        Value::Callable(callable) => match name {
            "params" => Ok(callable.params_dict()),
            "name" => Ok(callable
                .name
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null)),
            _ => Err(RillError::at(
                ErrorKind::PropertyNotFound {
                    name: name.to_string(),
                },
                span.start,
            )
            .into()),
        },
        other => Err(RillError::type_error(format!(
            "cannot access property '{name}' on {}",
            other.type_name()
        ))
        .with_location(span.start)
        .into()),
    }
}

/// Method dispatch: the registry first (reserved names stay reserved),
/// then dict members holding callables.
pub(crate) fn invoke_method(
    receiver: &Value,
    name: &str,
    args: &[Expr],
    span: Span,
    ctx: &mut Context,
) -> Flow<Value> {
    let call_args = build_call_args(args, ctx)?;

    if let Some(method) = ctx.get_method(name) {
        ctx.push_frame(name, Some(span), Some("method".to_string()));
        let result = method(receiver, &call_args, ctx)
            .map_err(|e| Signal::from(ctx.attach_stack(e.with_location(span.start))));
        ctx.pop_frame();
        return result;
    }

    if let Value::Dict(dict) = receiver {
        if let Some(member) = dict.get(name) {
            return match member {
                Value::Callable(callable) => {
                    *callable.bound_dict.borrow_mut() = Some(dict.clone());
                    let callable = callable.clone();
                    invoke_callable(&callable, call_args, Some(span), ctx)
                }
                other => Err(RillError::at(
                    ErrorKind::NotCallable {
                        type_name: other.type_name().to_string(),
                    },
                    span.start,
                )
                .into()),
            };
        }
    }

    Err(RillError::undefined_method(name)
        .with_location(span.start)
        .into())
}
