// ABOUTME: Tree-walking evaluator: dispatch, statement loop, execute, stepper

mod calls;
mod collections;
mod control;
mod ops;
mod pipe;

use crate::ast::{Expr, Script, Statement, StrPart, Terminator};
use crate::context::Context;
use crate::error::{ErrorKind, RillError, Signal};
use crate::value::{Callable, Dict, Value};
use indexmap::IndexMap;
use std::rc::Rc;
use std::time::Instant;

/// Evaluation result type: a value, or an in-flight unwind/error.
pub(crate) type Flow<T> = Result<T, Signal>;

/// The outcome of running a script to completion.
#[derive(Debug)]
pub struct ExecutionResult {
    pub value: Value,
    /// Snapshot of the global scope after the run.
    pub variables: IndexMap<String, Value>,
}

/// Run every statement of `script` against `ctx`, returning the final
/// statement's value and the global variables.
pub fn execute(script: &Script, ctx: &mut Context) -> Result<ExecutionResult, RillError> {
    let mut last = Value::Null;
    for (index, statement) in script.statements.iter().enumerate() {
        match run_top_statement(statement, index, ctx) {
            Ok(value) => last = value,
            Err(Signal::Return(value)) => {
                return Ok(ExecutionResult {
                    value,
                    variables: ctx.variables(),
                });
            }
            Err(signal) => {
                let err = ctx.attach_stack(signal.into_error());
                if let Some(hook) = &ctx.hooks.on_error {
                    hook(index, &err);
                }
                return Err(err);
            }
        }
    }
    Ok(ExecutionResult {
        value: last,
        variables: ctx.variables(),
    })
}

/// One top-level statement, with step hooks around it. The
/// cancellation check comes first: a cancelled statement is never
/// observed to begin.
fn run_top_statement(statement: &Statement, index: usize, ctx: &mut Context) -> Flow<Value> {
    ctx.check_cancelled(Some(statement.span.start))?;
    if let Some(hook) = &ctx.hooks.on_step_start {
        hook(index);
    }
    let started = Instant::now();
    let result = eval_statement(statement, ctx);
    if let Some(hook) = &ctx.hooks.on_step_end {
        hook(index, started.elapsed());
    }
    result
}

/// Statement evaluation: cancellation check, annotation frame, chain
/// evaluation, then the auto-exception sweep over the value.
pub(crate) fn eval_statement(statement: &Statement, ctx: &mut Context) -> Flow<Value> {
    ctx.check_cancelled(Some(statement.span.start))?;

    if statement.annotations.is_empty() {
        let value = pipe::eval_pipe_chain(&statement.chain, ctx)?;
        ctx.check_auto_exceptions(&value)
            .map_err(|e| Signal::from(e.with_location(statement.span.start)))?;
        return Ok(value);
    }

    let frame = control::eval_annotation_frame(&statement.annotations, ctx)?;
    ctx.push_annotations(frame);
    let result = pipe::eval_pipe_chain(&statement.chain, ctx);
    ctx.pop_annotations();
    let value = result?;
    ctx.check_auto_exceptions(&value)
        .map_err(|e| Signal::from(e.with_location(statement.span.start)))?;
    Ok(value)
}

/// The single dispatch point over the AST sum.
pub(crate) fn eval_expr(expr: &Expr, ctx: &mut Context) -> Flow<Value> {
    match expr {
        Expr::Null { .. } => Ok(Value::Null),
        Expr::Number { value, .. } => Ok(Value::Number(*value)),
        Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
        Expr::Str { parts, .. } => eval_string(parts, ctx),
        Expr::Tuple { items, .. } => eval_tuple(items, ctx),
        Expr::Dict { entries, .. } => eval_dict(entries, ctx),
        Expr::Closure { params, body, .. } => Ok(Value::Callable(Callable::script(
            params.clone(),
            Rc::new((**body).clone()),
            ctx.env(),
        ))),
        Expr::Var { name, span } => ctx
            .get_var(name)
            .ok_or_else(|| RillError::undefined_variable(name).with_location(span.start).into()),
        Expr::Accumulator { span } => ctx
            .get_var("@")
            .ok_or_else(|| RillError::undefined_variable("@").with_location(span.start).into()),
        Expr::PipeValue { .. } => Ok(ctx.pipe_value()),
        Expr::HostCall { name, args, span } => calls::eval_host_call(name, args, *span, ctx),
        Expr::ClosureCall { name, args, span } => calls::eval_closure_call(name, args, *span, ctx),
        Expr::PipeInvoke { args, span } => calls::eval_pipe_invoke(args, *span, ctx),
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
            ..
        } => control::eval_conditional(cond, then_branch, else_branch.as_deref(), ctx),
        Expr::While {
            cond,
            body,
            do_while,
            span,
        } => control::eval_while(cond, body, *do_while, *span, ctx),
        Expr::Block { statements, .. } => control::eval_block(statements, ctx),
        Expr::Each { body, init, span } => {
            collections::eval_each(body, init.as_deref(), *span, ctx)
        }
        Expr::Map { body, span } => collections::eval_map(body, *span, ctx),
        Expr::Fold { body, init, span } => {
            collections::eval_fold(body, init.as_deref(), *span, ctx)
        }
        Expr::Filter { body, span } => collections::eval_filter(body, *span, ctx),
        Expr::Destructure { patterns, span } => ops::eval_destructure(patterns, *span, ctx),
        Expr::Slice {
            start,
            stop,
            step,
            span,
        } => ops::eval_slice(start.as_deref(), stop.as_deref(), step.as_deref(), *span, ctx),
        Expr::Spread { value, span } => ops::eval_spread(value, *span, ctx),
        Expr::Binary { op, lhs, rhs, span } => ops::eval_binary(*op, lhs, rhs, *span, ctx),
        Expr::Unary { op, operand, span } => ops::eval_unary(*op, operand, *span, ctx),
        Expr::Grouped { inner, .. } => eval_expr(inner, ctx),
        Expr::Postfix {
            expr,
            ops,
            default,
            ..
        } => ops::eval_postfix(expr, ops, default.as_deref(), ctx),
        Expr::RecoveryError { message, span } => Err(RillError::at(
            ErrorKind::InvalidNode {
                message: message.clone(),
            },
            span.start,
        )
        .into()),
    }
}

fn eval_string(parts: &[StrPart], ctx: &mut Context) -> Flow<Value> {
    let mut text = String::new();
    for part in parts {
        match part {
            StrPart::Text(s) => text.push_str(s),
            StrPart::Interp(expr) => {
                let value = eval_expr(expr, ctx)?;
                text.push_str(&value.to_display_string());
            }
        }
    }
    Ok(Value::String(text))
}

/// Tuple literal. Spread items flatten tuples into the enclosing list.
fn eval_tuple(items: &[Expr], ctx: &mut Context) -> Flow<Value> {
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        if let Expr::Spread { value, span } = item {
            match eval_expr(value, ctx)? {
                Value::Tuple(inner) => values.extend(inner),
                Value::Args(args) => values.extend(args.positional),
                other => {
                    return Err(RillError::type_error(format!(
                        "cannot spread {} into a tuple",
                        other.type_name()
                    ))
                    .with_location(span.start)
                    .into());
                }
            }
        } else {
            values.push(eval_expr(item, ctx)?);
        }
    }
    Ok(Value::Tuple(values))
}

/// Dict literal. Block values are stored as lazy property callables
/// rather than being evaluated.
fn eval_dict(entries: &[crate::ast::DictEntry], ctx: &mut Context) -> Flow<Value> {
    let mut dict = Dict::new();
    for entry in entries {
        let value = if matches!(entry.value, Expr::Block { .. }) {
            Value::Callable(Callable::property(
                Vec::new(),
                Rc::new(entry.value.clone()),
                ctx.env(),
            ))
        } else {
            eval_expr(&entry.value, ctx)?
        };
        dict.insert(entry.key.clone(), value);
    }
    Ok(Value::Dict(dict))
}

// ===== Stepper =====

/// Result of a single `Stepper::step` call.
#[derive(Debug)]
pub struct StepOutcome {
    pub value: Value,
    pub done: bool,
    pub index: usize,
    pub total: usize,
    /// Name bound by a `=> $name` terminator on this statement.
    pub captured: Option<String>,
}

/// Statement-at-a-time execution over an owned context, for hosts that
/// drive scripts incrementally.
pub struct Stepper {
    script: Script,
    ctx: Context,
    index: usize,
    last: Value,
    done: bool,
}

impl Stepper {
    pub fn new(script: Script, ctx: Context) -> Self {
        let done = script.statements.is_empty();
        Self {
            script,
            ctx,
            index: 0,
            last: Value::Null,
            done,
        }
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.script.statements.len()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// The value and variables accumulated so far.
    pub fn get_result(&self) -> ExecutionResult {
        ExecutionResult {
            value: self.last.clone(),
            variables: self.ctx.variables(),
        }
    }

    /// Run the next statement. A failed step marks the stepper done.
    pub fn step(&mut self) -> Result<StepOutcome, RillError> {
        if self.done {
            return Ok(StepOutcome {
                value: self.last.clone(),
                done: true,
                index: self.index,
                total: self.total(),
                captured: None,
            });
        }
        let statement = self.script.statements[self.index].clone();
        let captured = match &statement.chain.terminator {
            Some(Terminator::Capture { name, .. }) => Some(name.clone()),
            _ => None,
        };
        match run_top_statement(&statement, self.index, &mut self.ctx) {
            Ok(value) => {
                self.last = value.clone();
                self.index += 1;
                if self.index >= self.total() {
                    self.done = true;
                }
                Ok(StepOutcome {
                    value,
                    done: self.done,
                    index: self.index,
                    total: self.total(),
                    captured,
                })
            }
            Err(Signal::Return(value)) => {
                self.last = value.clone();
                self.done = true;
                self.index += 1;
                Ok(StepOutcome {
                    value,
                    done: true,
                    index: self.index,
                    total: self.total(),
                    captured,
                })
            }
            Err(signal) => {
                let err = self.ctx.attach_stack(signal.into_error());
                if let Some(hook) = &self.ctx.hooks.on_error {
                    hook(self.index, &err);
                }
                self.done = true;
                Err(err)
            }
        }
    }
}
