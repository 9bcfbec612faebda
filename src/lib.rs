// ABOUTME: Library crate for the Rill language core: lexer, parser, evaluator

pub mod ast;
pub mod builtins;
pub mod context;
pub mod env;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod value;

pub use context::{exit_status, prefix_functions, Context, ContextOptions, Hooks, MethodFn};
pub use error::{CallFrame, ErrorKind, RillError, Signal};
pub use eval::{execute, ExecutionResult, StepOutcome, Stepper};
pub use parser::{parse, parse_with_recovery, ParseOutcome};
pub use span::{Location, Span};
pub use value::{CallArgs, Callable, CallableKind, Dict, NativeFn, Value};

/// Build a runtime context from host options. Fails when an
/// auto-exception pattern is not a valid regex.
pub fn create_context(options: ContextOptions) -> Result<Context, RillError> {
    Context::new(options)
}

/// Build a statement-at-a-time stepper over a parsed script.
pub fn create_stepper(script: ast::Script, ctx: Context) -> Stepper {
    Stepper::new(script, ctx)
}

/// Parse and execute `source` against a fresh default context.
pub fn run(source: &str) -> Result<ExecutionResult, RillError> {
    let script = parse(source)?;
    let mut ctx = Context::with_defaults();
    execute(&script, &mut ctx)
}
