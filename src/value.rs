// ABOUTME: Runtime value model: tagged union, callables, and call arguments

use crate::ast::{Expr, Param, TypeName};
use crate::context::Context;
use crate::env::Environment;
use crate::error::RillError;
use crate::span::Location;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Rill dicts are string-keyed and preserve insertion order.
pub type Dict = IndexMap<String, Value>;

/// Native function signature shared by runtime built-ins and
/// host-provided functions: `(args, ctx, call_location) -> value`.
pub type NativeFn = Rc<dyn Fn(&CallArgs, &mut Context, Option<Location>) -> Result<Value, RillError>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Tuple(Vec<Value>),
    Dict(Dict),
    Callable(Rc<Callable>),
    /// Internal wrapper produced by the spread operator: values keyed
    /// by position and/or name. Flattened at call sites.
    Args(CallArgs),
}

/// Positional and named arguments carried into an invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// The three callable variants: user closures, wrapped built-ins, and
/// host-supplied functions.
pub enum CallableKind {
    Script {
        params: Vec<Param>,
        body: Rc<Expr>,
        /// The defining scope chain; names resolve through it at
        /// invocation time (late binding).
        env: Rc<Environment>,
    },
    Runtime {
        func: NativeFn,
    },
    Host {
        func: NativeFn,
    },
}

pub struct Callable {
    pub name: Option<String>,
    pub kind: CallableKind,
    /// Property-style callables auto-invoke on dict access with the
    /// dict bound as the implicit receiver.
    pub is_property: bool,
    pub bound_dict: RefCell<Option<Dict>>,
}

impl Callable {
    pub fn script(params: Vec<Param>, body: Rc<Expr>, env: Rc<Environment>) -> Rc<Self> {
        Rc::new(Callable {
            name: None,
            kind: CallableKind::Script { params, body, env },
            is_property: false,
            bound_dict: RefCell::new(None),
        })
    }

    pub fn runtime(name: &str, func: NativeFn) -> Rc<Self> {
        Rc::new(Callable {
            name: Some(name.to_string()),
            kind: CallableKind::Runtime { func },
            is_property: false,
            bound_dict: RefCell::new(None),
        })
    }

    pub fn host(name: &str, func: NativeFn) -> Rc<Self> {
        Rc::new(Callable {
            name: Some(name.to_string()),
            kind: CallableKind::Host { func },
            is_property: false,
            bound_dict: RefCell::new(None),
        })
    }

    /// Property-style variant of a script callable, as stored for lazy
    /// dict-value blocks.
    pub fn property(params: Vec<Param>, body: Rc<Expr>, env: Rc<Environment>) -> Rc<Self> {
        Rc::new(Callable {
            name: None,
            kind: CallableKind::Script { params, body, env },
            is_property: true,
            bound_dict: RefCell::new(None),
        })
    }

    /// Display name used in call frames and error messages.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<closure>".to_string())
    }

    /// Introspection dict for `.params`: `{ name: { type: "…" } }`.
    pub fn params_dict(&self) -> Value {
        match &self.kind {
            CallableKind::Script { params, .. } => {
                let mut dict = Dict::new();
                for param in params {
                    let mut info = Dict::new();
                    if let Some(ty) = param.ty {
                        info.insert("type".to_string(), Value::String(ty.as_str().to_string()));
                    }
                    dict.insert(param.name.clone(), Value::Dict(info));
                }
                Value::Dict(dict)
            }
            _ => Value::Dict(Dict::new()),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            CallableKind::Script { .. } => "script",
            CallableKind::Runtime { .. } => "runtime",
            CallableKind::Host { .. } => "host",
        };
        write!(f, "#<{} {}>", kind, self.display_name())
    }
}

impl Value {
    /// The runtime type tag.
    pub fn type_name(&self) -> &'static str {
        self.ty().as_str()
    }

    pub fn ty(&self) -> TypeName {
        match self {
            Value::Null => TypeName::Null,
            Value::Bool(_) => TypeName::Bool,
            Value::Number(_) => TypeName::Number,
            Value::String(_) => TypeName::String,
            Value::Tuple(_) => TypeName::Tuple,
            Value::Dict(_) => TypeName::Dict,
            Value::Callable(_) => TypeName::Callable,
            // Args is internal; it reads as a tuple when observed.
            Value::Args(_) => TypeName::Tuple,
        }
    }

    /// Truthiness: null, false, 0, "", [], and empty dicts are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
            Value::Callable(_) => true,
            Value::Args(args) => !args.is_empty(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    /// Bare rendering: strings without quotes. Used for interpolation,
    /// the `str` method, and dispatch-dict keys.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Convert to a JSON value for the `json` built-in. Callables have
    /// no JSON form and serialize as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(map) => {
                let object: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(object)
            }
            Value::Callable(_) => serde_json::Value::Null,
            Value::Args(args) => {
                serde_json::Value::Array(args.positional.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Convert a JSON value into a Rill value. Hosts use this to seed
    /// initial variables from configuration.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Tuple(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let dict: Dict = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect();
                Value::Dict(dict)
            }
        }
    }
}

/// Deep structural equality. Dict equality ignores key order; callables
/// compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Args(a), Value::Args(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                // Whole numbers display without the trailing `.0`.
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Value::Tuple(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "[")?;
                if map.is_empty() {
                    write!(f, ":")?;
                }
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "]")
            }
            Value::Callable(c) => write!(f, "{c:?}"),
            Value::Args(args) => {
                write!(f, "#<args")?;
                for value in &args.positional {
                    write!(f, " {value}")?;
                }
                for (name, value) in &args.named {
                    write!(f, " {name}: {value}")?;
                }
                write!(f, ">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_display() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(-2.5).to_string(), "-2.5");
        assert_eq!(Value::Number(0.0).to_string(), "0");
    }

    #[test]
    fn test_string_display_quotes_and_escapes() {
        assert_eq!(Value::String("hi".to_string()).to_string(), "\"hi\"");
        assert_eq!(
            Value::String("say \"hi\"".to_string()).to_string(),
            "\"say \\\"hi\\\"\""
        );
        assert_eq!(
            Value::String("hi".to_string()).to_display_string(),
            "hi"
        );
    }

    #[test]
    fn test_tuple_display() {
        let value = Value::Tuple(vec![
            Value::Number(1.0),
            Value::Tuple(vec![Value::Number(2.0)]),
        ]);
        assert_eq!(value.to_string(), "[1, [2]]");
    }

    #[test]
    fn test_dict_equality_ignores_order() {
        let mut a = Dict::new();
        a.insert("x".to_string(), Value::Number(1.0));
        a.insert("y".to_string(), Value::Number(2.0));

        let mut b = Dict::new();
        b.insert("y".to_string(), Value::Number(2.0));
        b.insert("x".to_string(), Value::Number(1.0));

        assert_eq!(Value::Dict(a), Value::Dict(b));
    }

    #[test]
    fn test_deep_equality_is_structural() {
        let a = Value::Tuple(vec![Value::String("a".to_string()), Value::Null]);
        let b = Value::Tuple(vec![Value::String("a".to_string()), Value::Null]);
        assert_eq!(a, b);
        assert_ne!(a, Value::Tuple(vec![Value::String("a".to_string())]));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Tuple(vec![]).is_truthy());
        assert!(!Value::Dict(Dict::new()).is_truthy());
        assert!(Value::Number(0.1).is_truthy());
        assert!(Value::String(" ".to_string()).is_truthy());
    }

    #[test]
    fn test_json_round_trip() {
        let mut dict = Dict::new();
        dict.insert("items".to_string(), Value::Tuple(vec![Value::Number(1.0)]));
        dict.insert("name".to_string(), Value::String("demo".to_string()));
        let value = Value::Dict(dict);

        let json = value.to_json();
        assert_eq!(json["items"][0], 1.0);
        assert_eq!(Value::from_json(&json), value);
    }
}
