// ABOUTME: Error taxonomy with stable error ids, plus control-flow signals

use crate::span::{Location, Span};
use crate::value::Value;
use indexmap::IndexMap;
use thiserror::Error;

/// Base URL for rendered error documentation. Help URLs derive
/// deterministically from the error id.
pub const HELP_BASE_URL: &str = "https://rill-lang.dev/errors";

/// Default iteration cap applied when no `limit` annotation is present.
pub const DEFAULT_ITERATION_LIMIT: usize = 10_000;

// ===== Common expected-arity strings =====
pub const ARITY_NONE: &str = "0";
pub const ARITY_ONE: &str = "1";
pub const ARITY_ZERO_OR_ONE: &str = "0-1";

/// Every failure the core can produce. The `#[error]` template is the
/// error's rendered message; placeholders expand from the variant's
/// fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // ===== Lexer =====
    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Invalid escape sequence: \\{sequence}")]
    InvalidEscape { sequence: String },

    #[error("Triple-quoted strings are not allowed inside an interpolation")]
    TripleQuoteInInterpolation,

    // ===== Parse =====
    #[error("Unexpected token '{found}', expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("Unexpected end of input: unclosed '{delimiter}'")]
    UnclosedDelimiter { delimiter: String },

    #[error("Unknown identifier '{found}', did you mean '{suggestion}'?")]
    KeywordTypo { found: String, suggestion: String },

    #[error("Expected '->' between pipeline stages")]
    MissingArrow,

    #[error("'=' is not valid here; use '->' to pipe or '=>' to capture")]
    AssignInsteadOfArrow,

    // ===== Runtime =====
    #[error("Undefined variable: ${name}")]
    UndefinedVariable { name: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    #[error("Undefined method: {name}")]
    UndefinedMethod { name: String },

    #[error("Type error: {message}")]
    TypeError { message: String },

    #[error("{function}: expected {expected} argument{}, got {actual}", if *.expected == "1" { "" } else { "s" })]
    ArityError {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Value of type {type_name} is not callable")]
    NotCallable { type_name: String },

    #[error("Cannot iterate over {type_name}")]
    NotIterable { type_name: String },

    #[error("Iteration limit: loop exceeded {limit} iterations")]
    IterationLimit { limit: usize },

    #[error("break is not allowed in parallel iteration")]
    BreakInParallel,

    #[error("Annotation spread requires a dict, got {type_name}")]
    InvalidSpread { type_name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Property '{name}' does not exist")]
    PropertyNotFound { name: String },

    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("Auto-exception: pattern '{pattern}' matched '{matched_value}'")]
    AutoException {
        pattern: String,
        matched_value: String,
    },

    #[error("TimeoutError: {function} exceeded {timeout_ms}ms")]
    Timeout { function: String, timeout_ms: u64 },

    #[error("Execution aborted")]
    Aborted,

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Cannot evaluate statement with parse errors: {message}")]
    InvalidNode { message: String },
}

impl ErrorKind {
    /// Stable identifier of the form `RILL-[LPR]NNN`.
    pub fn id(&self) -> &'static str {
        match self {
            ErrorKind::UnterminatedString => "RILL-L001",
            ErrorKind::InvalidEscape { .. } => "RILL-L002",
            ErrorKind::TripleQuoteInInterpolation => "RILL-L003",
            ErrorKind::UnexpectedToken { .. } => "RILL-P001",
            ErrorKind::UnclosedDelimiter { .. } => "RILL-P002",
            ErrorKind::KeywordTypo { .. } => "RILL-P003",
            ErrorKind::MissingArrow => "RILL-P004",
            ErrorKind::AssignInsteadOfArrow => "RILL-P005",
            ErrorKind::UndefinedVariable { .. } => "RILL-R001",
            ErrorKind::UndefinedFunction { .. } => "RILL-R002",
            ErrorKind::UndefinedMethod { .. } => "RILL-R003",
            ErrorKind::TypeError { .. } => "RILL-R004",
            ErrorKind::ArityError { .. } => "RILL-R005",
            ErrorKind::NotCallable { .. } => "RILL-R006",
            ErrorKind::NotIterable { .. } => "RILL-R007",
            ErrorKind::IterationLimit { .. } => "RILL-R008",
            ErrorKind::BreakInParallel => "RILL-R009",
            ErrorKind::InvalidSpread { .. } => "RILL-R010",
            ErrorKind::DivisionByZero => "RILL-R011",
            ErrorKind::KeyNotFound { .. } => "RILL-R012",
            ErrorKind::PropertyNotFound { .. } => "RILL-R013",
            ErrorKind::IndexOutOfBounds { .. } => "RILL-R014",
            ErrorKind::AutoException { .. } => "RILL-R015",
            ErrorKind::Timeout { .. } => "RILL-R016",
            ErrorKind::Aborted => "RILL-R017",
            ErrorKind::InvalidPattern { .. } => "RILL-R018",
            ErrorKind::InvalidNode { .. } => "RILL-R019",
        }
    }

    /// `lexer`, `parse`, or `runtime`, derived from the id.
    pub fn category(&self) -> &'static str {
        match self.id().as_bytes()[5] {
            b'L' => "lexer",
            b'P' => "parse",
            _ => "runtime",
        }
    }

    /// Structured key/value context carried alongside the message.
    pub fn context(&self) -> IndexMap<String, String> {
        let mut map = IndexMap::new();
        let mut put = |k: &str, v: String| {
            map.insert(k.to_string(), v);
        };
        match self {
            ErrorKind::InvalidEscape { sequence } => put("sequence", sequence.clone()),
            ErrorKind::UnexpectedToken { found, expected } => {
                put("found", found.clone());
                put("expected", expected.clone());
            }
            ErrorKind::UnclosedDelimiter { delimiter } => put("delimiter", delimiter.clone()),
            ErrorKind::KeywordTypo { found, suggestion } => {
                put("found", found.clone());
                put("suggestion", suggestion.clone());
            }
            ErrorKind::UndefinedVariable { name }
            | ErrorKind::UndefinedFunction { name }
            | ErrorKind::UndefinedMethod { name }
            | ErrorKind::PropertyNotFound { name } => put("name", name.clone()),
            ErrorKind::TypeError { message } => put("message", message.clone()),
            ErrorKind::ArityError {
                function,
                expected,
                actual,
            } => {
                put("function", function.clone());
                put("expected", expected.clone());
                put("actual", actual.to_string());
            }
            ErrorKind::NotCallable { type_name }
            | ErrorKind::NotIterable { type_name }
            | ErrorKind::InvalidSpread { type_name } => put("type", type_name.clone()),
            ErrorKind::IterationLimit { limit } => put("limit", limit.to_string()),
            ErrorKind::KeyNotFound { key } => put("key", key.clone()),
            ErrorKind::IndexOutOfBounds { index, length } => {
                put("index", index.to_string());
                put("length", length.to_string());
            }
            ErrorKind::AutoException {
                pattern,
                matched_value,
            } => {
                put("pattern", pattern.clone());
                put("matched_value", matched_value.clone());
            }
            ErrorKind::Timeout {
                function,
                timeout_ms,
            } => {
                put("function", function.clone());
                put("timeout_ms", timeout_ms.to_string());
            }
            ErrorKind::InvalidPattern { pattern, message } => {
                put("pattern", pattern.clone());
                put("message", message.clone());
            }
            ErrorKind::InvalidNode { message } => put("message", message.clone()),
            _ => {}
        }
        map
    }
}

/// A recorded call-stack frame, pushed around each host call and
/// script-callable invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub span: Option<Span>,
    pub function: String,
    pub note: Option<String>,
}

/// A structured error: kind plus where it happened and how we got there.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}{}", location_suffix(.location))]
pub struct RillError {
    pub kind: ErrorKind,
    pub location: Option<Location>,
    pub call_stack: Vec<CallFrame>,
}

fn location_suffix(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

impl RillError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
            call_stack: Vec::new(),
        }
    }

    pub fn at(kind: ErrorKind, location: Location) -> Self {
        Self {
            kind,
            location: Some(location),
            call_stack: Vec::new(),
        }
    }

    /// Attach a location unless one is already recorded.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location.get_or_insert(location);
        self
    }

    /// The rendered message without the location suffix.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn category(&self) -> &'static str {
        self.kind.category()
    }

    /// Documentation URL for this error, derived from its id.
    pub fn help_url(&self) -> String {
        format!("{}/{}", HELP_BASE_URL, self.id().to_lowercase())
    }

    /// JSON rendering for hosts that ship diagnostics out of process.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), self.id().into());
        obj.insert("category".into(), self.category().into());
        obj.insert("message".into(), self.message().into());
        obj.insert("help".into(), self.help_url().into());
        if let Some(loc) = &self.location {
            obj.insert(
                "location".into(),
                serde_json::json!({
                    "line": loc.line,
                    "column": loc.column,
                    "offset": loc.offset,
                }),
            );
        }
        let context: serde_json::Map<String, serde_json::Value> = self
            .kind
            .context()
            .into_iter()
            .map(|(k, v)| (k, v.into()))
            .collect();
        if !context.is_empty() {
            obj.insert("context".into(), context.into());
        }
        if !self.call_stack.is_empty() {
            let frames: Vec<serde_json::Value> = self
                .call_stack
                .iter()
                .map(|f| serde_json::json!({ "function": f.function, "note": f.note }))
                .collect();
            obj.insert("call_stack".into(), frames.into());
        }
        obj.into()
    }

    // ===== Helper constructors =====

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError {
            message: message.into(),
        })
    }

    pub fn arity_error(function: &str, expected: impl Into<String>, actual: usize) -> Self {
        Self::new(ErrorKind::ArityError {
            function: function.to_string(),
            expected: expected.into(),
            actual,
        })
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedVariable {
            name: name.to_string(),
        })
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedFunction {
            name: name.to_string(),
        })
    }

    pub fn undefined_method(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedMethod {
            name: name.to_string(),
        })
    }
}

impl From<ErrorKind> for RillError {
    fn from(kind: ErrorKind) -> Self {
        RillError::new(kind)
    }
}

/// Control-flow unwinds and errors, threaded through every `eval_*`
/// return value. `Break` and `Return` are unwind markers caught by
/// their lexical owners, not user-visible failures.
#[derive(Debug, Clone)]
pub enum Signal {
    Break(Value),
    Return(Value),
    Error(Box<RillError>),
}

impl From<RillError> for Signal {
    fn from(err: RillError) -> Self {
        Signal::Error(Box::new(err))
    }
}

impl From<ErrorKind> for Signal {
    fn from(kind: ErrorKind) -> Self {
        Signal::Error(Box::new(RillError::new(kind)))
    }
}

impl Signal {
    /// Convert an unwind that escaped its owner into a plain error.
    pub fn into_error(self) -> RillError {
        match self {
            Signal::Error(err) => *err,
            Signal::Break(_) => RillError::type_error("break outside of a loop or pipeline"),
            Signal::Return(_) => RillError::type_error("return outside of a function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_ids_are_stable() {
        assert_eq!(ErrorKind::UnterminatedString.id(), "RILL-L001");
        assert_eq!(
            ErrorKind::UndefinedVariable {
                name: "x".to_string()
            }
            .id(),
            "RILL-R001"
        );
        assert_eq!(ErrorKind::MissingArrow.id(), "RILL-P004");
    }

    #[test]
    fn test_category_from_id() {
        assert_eq!(ErrorKind::UnterminatedString.category(), "lexer");
        assert_eq!(ErrorKind::MissingArrow.category(), "parse");
        assert_eq!(ErrorKind::Aborted.category(), "runtime");
    }

    #[test]
    fn test_message_rendering() {
        let err = RillError::new(ErrorKind::IterationLimit { limit: 3 });
        assert!(err.message().contains("exceeded 3 iterations"));

        let err = RillError::arity_error("greet", "1", 3);
        assert_eq!(err.message(), "greet: expected 1 argument, got 3");

        let err = RillError::arity_error("greet", "2", 3);
        assert_eq!(err.message(), "greet: expected 2 arguments, got 3");
    }

    #[test]
    fn test_help_url_derives_from_id() {
        let err = RillError::new(ErrorKind::DivisionByZero);
        assert_eq!(err.help_url(), "https://rill-lang.dev/errors/rill-r011");
    }

    #[test]
    fn test_location_suffix_in_display() {
        let err = RillError::at(
            ErrorKind::UndefinedVariable {
                name: "missing".to_string(),
            },
            crate::span::Location::new(2, 5, 14),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("Undefined variable: $missing"));
        assert!(rendered.contains("line 2, column 5"));
    }

    #[test]
    fn test_json_rendering_includes_context() {
        let err = RillError::new(ErrorKind::AutoException {
            pattern: "ERROR".to_string(),
            matched_value: "ERROR: boom".to_string(),
        });
        let json = err.to_json();
        assert_eq!(json["id"], "RILL-R015");
        assert_eq!(json["context"]["pattern"], "ERROR");
        assert_eq!(json["context"]["matched_value"], "ERROR: boom");
    }
}
