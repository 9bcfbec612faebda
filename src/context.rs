// ABOUTME: Runtime context: scopes, registries, annotations, hooks, and limits

use crate::ast::TypeName;
use crate::env::Environment;
use crate::error::{CallFrame, ErrorKind, RillError, DEFAULT_ITERATION_LIMIT};
use crate::span::{Location, Span};
use crate::value::{CallArgs, Callable, NativeFn, Value};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A registered method: `(receiver, args, ctx) -> value`.
pub type MethodFn =
    Rc<dyn Fn(&Value, &CallArgs, &mut Context) -> Result<Value, RillError>>;

/// Host-provided callbacks and observability hooks. All optional.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_log: Option<Rc<dyn Fn(&Value)>>,
    pub on_log_event: Option<Rc<dyn Fn(&str, &Value)>>,
    pub on_step_start: Option<Rc<dyn Fn(usize)>>,
    pub on_step_end: Option<Rc<dyn Fn(usize, Duration)>>,
    pub on_function_call: Option<Rc<dyn Fn(&str)>>,
    pub on_function_return: Option<Rc<dyn Fn(&str, Duration)>>,
    pub on_capture: Option<Rc<dyn Fn(&str, &Value)>>,
    pub on_error: Option<Rc<dyn Fn(usize, &RillError)>>,
}

/// Everything a host supplies when constructing a context.
#[derive(Default)]
pub struct ContextOptions {
    /// Initial variables bound in the global scope.
    pub variables: HashMap<String, Value>,
    /// Host functions, addressable by (possibly `::`-namespaced) name.
    pub functions: HashMap<String, NativeFn>,
    pub hooks: Hooks,
    /// Per-host-call timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Regex patterns; a string statement value matching any of them
    /// fails the run. Compiled at construction.
    pub auto_exceptions: Vec<String>,
    /// Shared cancellation signal, consulted at every suspension point.
    pub cancellation: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

pub struct Context {
    env: Rc<Environment>,
    globals: Rc<Environment>,
    var_types: HashMap<String, TypeName>,
    functions: HashMap<String, NativeFn>,
    methods: HashMap<String, MethodFn>,
    pipe: Value,
    accumulators: Vec<Value>,
    annotations: Vec<IndexMap<String, Value>>,
    call_stack: Vec<CallFrame>,
    pub hooks: Hooks,
    auto_exceptions: Vec<(String, Regex)>,
    timeout_ms: Option<u64>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Build a context from host options. Fails when an auto-exception
    /// pattern is not a valid regex.
    pub fn new(options: ContextOptions) -> Result<Self, RillError> {
        let globals = Environment::new();
        for (name, value) in options.variables {
            globals.define(name, value);
        }

        let mut auto_exceptions = Vec::with_capacity(options.auto_exceptions.len());
        for pattern in options.auto_exceptions {
            let compiled = Regex::new(&pattern).map_err(|e| {
                RillError::new(ErrorKind::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })?;
            auto_exceptions.push((pattern, compiled));
        }

        let mut ctx = Self {
            env: globals.clone(),
            globals,
            var_types: HashMap::new(),
            functions: HashMap::new(),
            methods: HashMap::new(),
            pipe: Value::Null,
            accumulators: Vec::new(),
            annotations: Vec::new(),
            call_stack: Vec::new(),
            hooks: options.hooks,
            auto_exceptions,
            timeout_ms: options.timeout_ms,
            cancelled: options
                .cancellation
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        };
        crate::builtins::register_builtins(&mut ctx);
        // Host functions may override built-ins of the same name.
        for (name, func) in options.functions {
            ctx.functions.insert(name, func);
        }
        // Record type locks for pre-seeded variables.
        let seeded = ctx.globals.snapshot();
        for (name, value) in seeded {
            if !matches!(value, Value::Null) {
                ctx.var_types.insert(name, value.ty());
            }
        }
        Ok(ctx)
    }

    pub fn with_defaults() -> Self {
        Self::new(ContextOptions::default()).expect("default options are valid")
    }

    // ===== Scopes and variables =====

    pub fn env(&self) -> Rc<Environment> {
        self.env.clone()
    }

    pub fn push_scope(&mut self) {
        self.env = Environment::with_parent(self.env.clone());
    }

    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.env.parent() {
            self.env = parent;
        }
    }

    /// Swap in a different scope chain (closure invocation), returning
    /// the current one for restoration.
    pub fn swap_env(&mut self, env: Rc<Environment>) -> Rc<Environment> {
        std::mem::replace(&mut self.env, env)
    }

    pub fn get_var(&self, name: &str) -> Option<Value> {
        if name == "@" {
            return self.accumulators.last().cloned();
        }
        self.env.get(name)
    }

    /// Bind `name` in the current scope, enforcing the per-name type
    /// lock. A lock recorded from a null value is promoted by the
    /// first non-null assignment.
    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), RillError> {
        if name == "@" {
            return match self.accumulators.last_mut() {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(RillError::undefined_variable("@")),
            };
        }
        let new_type = value.ty();
        match self.var_types.get(name) {
            Some(&locked) if locked != TypeName::Null && new_type != locked => {
                return Err(RillError::type_error(format!(
                    "variable ${name} is {}, cannot assign {}",
                    locked.as_str(),
                    new_type.as_str()
                )));
            }
            _ => {}
        }
        if new_type != TypeName::Null {
            self.var_types.insert(name.to_string(), new_type);
        } else {
            self.var_types.entry(name.to_string()).or_insert(TypeName::Null);
        }
        self.env.define(name.to_string(), value);
        Ok(())
    }

    /// Bind a closure parameter without touching the type-lock table;
    /// parameter types are checked by the invocation contract instead.
    pub fn bind_param(&self, name: &str, value: Value) {
        self.env.define(name.to_string(), value);
    }

    /// Snapshot of the global scope, for `execute` results.
    pub fn variables(&self) -> IndexMap<String, Value> {
        self.globals.snapshot()
    }

    // ===== Pipe value and accumulators =====

    pub fn pipe_value(&self) -> Value {
        self.pipe.clone()
    }

    pub fn set_pipe_value(&mut self, value: Value) {
        self.pipe = value;
    }

    pub fn push_accumulator(&mut self, value: Value) {
        self.accumulators.push(value);
    }

    pub fn pop_accumulator(&mut self) -> Value {
        self.accumulators.pop().unwrap_or(Value::Null)
    }

    pub fn accumulator(&self) -> Option<Value> {
        self.accumulators.last().cloned()
    }

    // ===== Functions and methods =====

    pub fn register_function(&mut self, name: &str, func: NativeFn) {
        self.functions.insert(name.to_string(), func);
    }

    pub fn get_function(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).cloned()
    }

    pub fn register_method(&mut self, name: &str, method: MethodFn) {
        self.methods.insert(name.to_string(), method);
    }

    pub fn get_method(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }

    /// Wrap a registered function as a host callable value.
    pub fn function_as_value(&self, name: &str) -> Option<Value> {
        self.get_function(name)
            .map(|f| Value::Callable(Callable::host(name, f)))
    }

    // ===== Annotations =====

    /// Push a frame merged over the innermost one (inner wins).
    pub fn push_annotations(&mut self, frame: IndexMap<String, Value>) {
        let mut merged = self.annotations.last().cloned().unwrap_or_default();
        merged.extend(frame);
        self.annotations.push(merged);
    }

    pub fn pop_annotations(&mut self) {
        self.annotations.pop();
    }

    pub fn get_annotation(&self, name: &str) -> Option<Value> {
        self.annotations.last().and_then(|frame| frame.get(name).cloned())
    }

    /// The active iteration cap: a positive numeric `limit` annotation,
    /// floored; anything else falls back to the default.
    pub fn iteration_limit(&self) -> usize {
        match self.get_annotation("limit") {
            Some(Value::Number(n)) if n >= 1.0 => n.floor() as usize,
            _ => DEFAULT_ITERATION_LIMIT,
        }
    }

    // ===== Call stack =====

    pub fn push_frame(&mut self, function: &str, span: Option<Span>, note: Option<String>) {
        self.call_stack.push(CallFrame {
            span,
            function: function.to_string(),
            note,
        });
    }

    pub fn pop_frame(&mut self) {
        self.call_stack.pop();
    }

    pub fn call_stack(&self) -> &[CallFrame] {
        &self.call_stack
    }

    /// Attach the current call stack to an error that lacks one.
    pub fn attach_stack(&self, mut err: RillError) -> RillError {
        if err.call_stack.is_empty() && !self.call_stack.is_empty() {
            err.call_stack = self.call_stack.clone();
        }
        err
    }

    // ===== Limits, cancellation, auto-exceptions =====

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn cancellation(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn check_cancelled(&self, location: Option<Location>) -> Result<(), RillError> {
        if self.cancelled.load(Ordering::Relaxed) {
            let mut err = RillError::new(ErrorKind::Aborted);
            err.location = location;
            Err(err)
        } else {
            Ok(())
        }
    }

    /// Statement post-check: a string value matching any compiled
    /// pattern raises an auto-exception.
    pub fn check_auto_exceptions(&self, value: &Value) -> Result<(), RillError> {
        let Value::String(text) = value else {
            return Ok(());
        };
        for (pattern, regex) in &self.auto_exceptions {
            if regex.is_match(text) {
                return Err(RillError::new(ErrorKind::AutoException {
                    pattern: pattern.clone(),
                    matched_value: text.clone(),
                }));
            }
        }
        Ok(())
    }

    // ===== Callbacks =====

    pub fn fire_log(&self, value: &Value) {
        if let Some(hook) = &self.hooks.on_log {
            hook(value);
        }
    }

    pub fn fire_log_event(&self, event: &str, value: &Value) {
        if let Some(hook) = &self.hooks.on_log_event {
            hook(event, value);
        }
    }

    pub fn fire_capture(&self, name: &str, value: &Value) {
        if let Some(hook) = &self.hooks.on_capture {
            hook(name, value);
        }
    }
}

/// Rewrite `name` → `ns::name` for each entry of a host extension
/// bundle. The conventional `dispose` cleanup hook keeps its name.
pub fn prefix_functions(
    namespace: &str,
    functions: HashMap<String, NativeFn>,
) -> HashMap<String, NativeFn> {
    functions
        .into_iter()
        .map(|(name, func)| {
            if name == "dispose" {
                (name, func)
            } else {
                (format!("{namespace}::{name}"), func)
            }
        })
        .collect()
}

/// Map a final script value to a process-style exit code and optional
/// message, for exec front-ends.
pub fn exit_status(value: &Value) -> (i32, Option<String>) {
    match value {
        Value::Tuple(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (Value::Number(code), Value::String(msg)) if *code == 0.0 || *code == 1.0 => {
                (*code as i32, Some(msg.clone()))
            }
            _ => (0, None),
        },
        Value::Tuple(_) => (0, None),
        Value::Bool(false) => (1, None),
        Value::String(s) if s.is_empty() => (1, None),
        Value::Null => (1, None),
        _ => (0, None),
    }
}
