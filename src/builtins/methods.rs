//! Built-in methods, dispatched through the context's method registry
//!
//! A method takes `(receiver, args, ctx)`. The registry is consulted
//! before dict members, which keeps `keys`, `values`, and `entries`
//! reserved.

use crate::context::Context;
use crate::error::{ErrorKind, RillError, ARITY_NONE, ARITY_ONE, ARITY_ZERO_OR_ONE};
use crate::value::{CallArgs, Value};
use regex::Regex;
use std::rc::Rc;

fn no_args(method: &str, args: &CallArgs) -> Result<(), RillError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(RillError::arity_error(method, ARITY_NONE, args.len()))
    }
}

fn one_arg<'a>(method: &str, args: &'a CallArgs) -> Result<&'a Value, RillError> {
    if args.positional.len() != 1 || !args.named.is_empty() {
        return Err(RillError::arity_error(method, ARITY_ONE, args.len()));
    }
    Ok(&args.positional[0])
}

fn optional_arg<'a>(method: &str, args: &'a CallArgs) -> Result<Option<&'a Value>, RillError> {
    if args.positional.len() > 1 || !args.named.is_empty() {
        return Err(RillError::arity_error(method, ARITY_ZERO_OR_ONE, args.len()));
    }
    Ok(args.positional.first())
}

fn receiver_type_error(method: &str, receiver: &Value) -> RillError {
    RillError::type_error(format!(
        "{method}: not supported on {}",
        receiver.type_name()
    ))
}

fn string_arg(method: &str, value: &Value) -> Result<String, RillError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(RillError::type_error(format!(
            "{method}: expected string, got {}",
            other.type_name()
        ))),
    }
}

// ===== Conversion =====

fn method_str(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("str", args)?;
    Ok(Value::String(receiver.to_display_string()))
}

fn method_num(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("num", args)?;
    match receiver {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Bool(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| RillError::type_error(format!("num: cannot parse '{s}' as a number"))),
        other => Err(receiver_type_error("num", other)),
    }
}

// ===== Measurement =====

fn method_len(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("len", args)?;
    let len = match receiver {
        Value::String(s) => s.chars().count(),
        Value::Tuple(items) => items.len(),
        Value::Dict(map) => map.len(),
        other => return Err(receiver_type_error("len", other)),
    };
    Ok(Value::Number(len as f64))
}

fn method_empty(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("empty", args)?;
    let empty = match receiver {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Tuple(items) => items.is_empty(),
        Value::Dict(map) => map.is_empty(),
        other => return Err(receiver_type_error("empty", other)),
    };
    Ok(Value::Bool(empty))
}

// ===== Strings =====

fn method_trim(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("trim", args)?;
    match receiver {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Err(receiver_type_error("trim", other)),
    }
}

fn method_split(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    let separator = match optional_arg("split", args)? {
        Some(value) => string_arg("split", value)?,
        None => "\n".to_string(),
    };
    match receiver {
        Value::String(s) => Ok(Value::Tuple(
            s.split(separator.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        other => Err(receiver_type_error("split", other)),
    }
}

fn method_join(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    let separator = match optional_arg("join", args)? {
        Some(value) => string_arg("join", value)?,
        None => ",".to_string(),
    };
    match receiver {
        Value::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
            Ok(Value::String(parts.join(&separator)))
        }
        other => Err(receiver_type_error("join", other)),
    }
}

fn method_lines(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("lines", args)?;
    match receiver {
        Value::String(s) => Ok(Value::Tuple(
            s.lines().map(|l| Value::String(l.to_string())).collect(),
        )),
        other => Err(receiver_type_error("lines", other)),
    }
}

fn method_contains(
    receiver: &Value,
    args: &CallArgs,
    _ctx: &mut Context,
) -> Result<Value, RillError> {
    let needle = one_arg("contains", args)?;
    let found = match receiver {
        Value::String(s) => s.contains(&needle.to_display_string()),
        Value::Tuple(items) => items.iter().any(|item| item == needle),
        Value::Dict(map) => map.contains_key(&needle.to_display_string()),
        other => return Err(receiver_type_error("contains", other)),
    };
    Ok(Value::Bool(found))
}

/// Match a regex against the receiver. With capture groups, the result
/// is a tuple of the groups; without, a one-element tuple holding the
/// whole match. No match yields an empty tuple. Patterns are not
/// anchored.
fn method_matches(
    receiver: &Value,
    args: &CallArgs,
    _ctx: &mut Context,
) -> Result<Value, RillError> {
    let pattern = string_arg("matches", one_arg("matches", args)?)?;
    let Value::String(text) = receiver else {
        return Err(receiver_type_error("matches", receiver));
    };
    let regex = Regex::new(&pattern).map_err(|e| {
        RillError::new(ErrorKind::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })
    })?;

    let Some(captures) = regex.captures(text) else {
        return Ok(Value::Tuple(Vec::new()));
    };
    if captures.len() > 1 {
        let groups = captures
            .iter()
            .skip(1)
            .map(|group| match group {
                Some(m) => Value::String(m.as_str().to_string()),
                None => Value::Null,
            })
            .collect();
        Ok(Value::Tuple(groups))
    } else {
        Ok(Value::Tuple(vec![Value::String(
            captures[0].to_string(),
        )]))
    }
}

// ===== Element access =====

fn method_first(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("first", args)?;
    match receiver {
        Value::Tuple(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(receiver_type_error("first", other)),
    }
}

fn method_last(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("last", args)?;
    match receiver {
        Value::Tuple(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .last()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(receiver_type_error("last", other)),
    }
}

fn method_at(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    let index = match one_arg("at", args)? {
        Value::Number(n) => n.floor() as i64,
        other => {
            return Err(RillError::type_error(format!(
                "at: index must be a number, got {}",
                other.type_name()
            )));
        }
    };
    let len = match receiver {
        Value::Tuple(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => return Err(receiver_type_error("at", other)),
    };
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RillError::new(ErrorKind::IndexOutOfBounds { index, length: len }));
    }
    match receiver {
        Value::Tuple(items) => Ok(items[resolved as usize].clone()),
        Value::String(s) => Ok(Value::String(
            s.chars()
                .nth(resolved as usize)
                .map(String::from)
                .unwrap_or_default(),
        )),
        _ => unreachable!("receiver checked above"),
    }
}

// ===== Comparison =====

fn compare(method: &str, receiver: &Value, other: &Value) -> Result<std::cmp::Ordering, RillError> {
    match (receiver, other) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).ok_or_else(|| {
            RillError::type_error(format!("{method}: cannot order NaN"))
        }),
        _ => Ok(receiver
            .to_display_string()
            .cmp(&other.to_display_string())),
    }
}

fn method_eq(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    Ok(Value::Bool(receiver == one_arg("eq", args)?))
}

fn method_ne(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    Ok(Value::Bool(receiver != one_arg("ne", args)?))
}

fn method_lt(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    Ok(Value::Bool(
        compare("lt", receiver, one_arg("lt", args)?)?.is_lt(),
    ))
}

fn method_gt(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    Ok(Value::Bool(
        compare("gt", receiver, one_arg("gt", args)?)?.is_gt(),
    ))
}

fn method_le(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    Ok(Value::Bool(
        compare("le", receiver, one_arg("le", args)?)?.is_le(),
    ))
}

fn method_ge(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    Ok(Value::Bool(
        compare("ge", receiver, one_arg("ge", args)?)?.is_ge(),
    ))
}

// ===== Dicts =====

fn method_keys(receiver: &Value, args: &CallArgs, _ctx: &mut Context) -> Result<Value, RillError> {
    no_args("keys", args)?;
    match receiver {
        Value::Dict(map) => Ok(Value::Tuple(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        _ => Ok(Value::Tuple(Vec::new())),
    }
}

fn method_values(
    receiver: &Value,
    args: &CallArgs,
    _ctx: &mut Context,
) -> Result<Value, RillError> {
    no_args("values", args)?;
    match receiver {
        Value::Dict(map) => Ok(Value::Tuple(map.values().cloned().collect())),
        _ => Ok(Value::Tuple(Vec::new())),
    }
}

fn method_entries(
    receiver: &Value,
    args: &CallArgs,
    _ctx: &mut Context,
) -> Result<Value, RillError> {
    no_args("entries", args)?;
    match receiver {
        Value::Dict(map) => Ok(Value::Tuple(
            map.iter()
                .map(|(k, v)| Value::Tuple(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )),
        _ => Ok(Value::Tuple(Vec::new())),
    }
}

/// Register all built-in methods on the context.
pub fn register(ctx: &mut Context) {
    ctx.register_method("str", Rc::new(method_str));
    ctx.register_method("num", Rc::new(method_num));
    ctx.register_method("len", Rc::new(method_len));
    ctx.register_method("empty", Rc::new(method_empty));
    ctx.register_method("trim", Rc::new(method_trim));
    ctx.register_method("split", Rc::new(method_split));
    ctx.register_method("join", Rc::new(method_join));
    ctx.register_method("lines", Rc::new(method_lines));
    ctx.register_method("contains", Rc::new(method_contains));
    ctx.register_method("matches", Rc::new(method_matches));
    ctx.register_method("first", Rc::new(method_first));
    ctx.register_method("last", Rc::new(method_last));
    ctx.register_method("at", Rc::new(method_at));
    ctx.register_method("eq", Rc::new(method_eq));
    ctx.register_method("ne", Rc::new(method_ne));
    ctx.register_method("lt", Rc::new(method_lt));
    ctx.register_method("gt", Rc::new(method_gt));
    ctx.register_method("le", Rc::new(method_le));
    ctx.register_method("ge", Rc::new(method_ge));
    ctx.register_method("keys", Rc::new(method_keys));
    ctx.register_method("values", Rc::new(method_values));
    ctx.register_method("entries", Rc::new(method_entries));
}
