//! Built-in functions: identity, type, log, json
//!
//! All four are registered as runtime callables and may be shadowed by
//! host functions of the same name.

use crate::context::Context;
use crate::error::{RillError, ARITY_ONE};
use crate::span::Location;
use crate::value::{CallArgs, Value};
use std::rc::Rc;

fn single<'a>(function: &str, args: &'a CallArgs) -> Result<&'a Value, RillError> {
    if args.positional.len() != 1 || !args.named.is_empty() {
        return Err(RillError::arity_error(function, ARITY_ONE, args.len()));
    }
    Ok(&args.positional[0])
}

/// Returns its argument unchanged.
pub fn builtin_identity(
    args: &CallArgs,
    _ctx: &mut Context,
    _loc: Option<Location>,
) -> Result<Value, RillError> {
    single("identity", args).cloned()
}

/// Returns the runtime type tag of its argument.
pub fn builtin_type(
    args: &CallArgs,
    _ctx: &mut Context,
    _loc: Option<Location>,
) -> Result<Value, RillError> {
    let value = single("type", args)?;
    Ok(Value::String(value.type_name().to_string()))
}

/// Fires the host's `on_log` callback and passes the value through,
/// so `log` can be spliced into any pipeline.
pub fn builtin_log(
    args: &CallArgs,
    ctx: &mut Context,
    _loc: Option<Location>,
) -> Result<Value, RillError> {
    let value = single("log", args)?;
    ctx.fire_log(value);
    Ok(value.clone())
}

/// Serializes the value to its JSON text form.
pub fn builtin_json(
    args: &CallArgs,
    _ctx: &mut Context,
    _loc: Option<Location>,
) -> Result<Value, RillError> {
    let value = single("json", args)?;
    let text = serde_json::to_string(&value.to_json())
        .map_err(|e| RillError::type_error(format!("json: {e}")))?;
    Ok(Value::String(text))
}

/// Register all built-in functions on the context.
pub fn register(ctx: &mut Context) {
    ctx.register_function("identity", Rc::new(builtin_identity));
    ctx.register_function("type", Rc::new(builtin_type));
    ctx.register_function("log", Rc::new(builtin_log));
    ctx.register_function("json", Rc::new(builtin_json));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(
        f: fn(&CallArgs, &mut Context, Option<Location>) -> Result<Value, RillError>,
        value: Value,
    ) -> Result<Value, RillError> {
        let mut ctx = Context::with_defaults();
        let args = CallArgs::positional(vec![value]);
        f(&args, &mut ctx, None)
    }

    #[test]
    fn test_identity_returns_argument() {
        let result = call(builtin_identity, Value::Number(7.0)).unwrap();
        assert_eq!(result, Value::Number(7.0));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(
            call(builtin_type, Value::Null).unwrap(),
            Value::String("null".to_string())
        );
        assert_eq!(
            call(builtin_type, Value::Tuple(vec![])).unwrap(),
            Value::String("tuple".to_string())
        );
    }

    #[test]
    fn test_json_stringifies() {
        let mut dict = crate::value::Dict::new();
        dict.insert("a".to_string(), Value::Number(1.0));
        let result = call(builtin_json, Value::Dict(dict)).unwrap();
        assert_eq!(result, Value::String("{\"a\":1.0}".to_string()));
    }

    #[test]
    fn test_arity_rejected() {
        let mut ctx = Context::with_defaults();
        let args = CallArgs::positional(vec![Value::Null, Value::Null]);
        let err = builtin_identity(&args, &mut ctx, None).unwrap_err();
        assert_eq!(err.id(), "RILL-R005");
    }
}
