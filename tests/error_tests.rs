// ABOUTME: Error taxonomy: ids, locations, call stacks, recovery mode

use rill::{execute, parse, parse_with_recovery, Context, ErrorKind};

fn run_err(source: &str) -> rill::RillError {
    let script = parse(source).expect("script parses");
    let mut ctx = Context::with_defaults();
    execute(&script, &mut ctx).expect_err("script fails")
}

#[test]
fn test_undefined_variable() {
    let err = run_err("$missing");
    assert_eq!(err.id(), "RILL-R001");
    assert_eq!(err.category(), "runtime");
    assert!(err.message().contains("$missing"));
    assert!(err.location.is_some());
}

#[test]
fn test_undefined_function_and_method() {
    assert_eq!(run_err("nope()").id(), "RILL-R002");
    assert_eq!(run_err("5 -> .nope()").id(), "RILL-R003");
}

#[test]
fn test_arithmetic_type_error() {
    let err = run_err("1 + \"x\"");
    assert_eq!(err.id(), "RILL-R004");
    assert!(err.message().contains("number"));
    assert!(err.message().contains("string"));
}

#[test]
fn test_division_and_modulo_by_zero() {
    assert_eq!(run_err("1 / 0").id(), "RILL-R011");
    assert_eq!(run_err("1 % 0").id(), "RILL-R011");
}

#[test]
fn test_not_callable() {
    assert_eq!(run_err("5 => $x\n$x(1)").id(), "RILL-R006");
}

#[test]
fn test_lexer_error_location() {
    let err = parse("1\n\"unterminated").unwrap_err();
    assert_eq!(err.id(), "RILL-L001");
    assert_eq!(err.category(), "lexer");
    let location = err.location.unwrap();
    assert_eq!(location.line, 2);
    assert_eq!(location.column, 1);
}

#[test]
fn test_parse_error_ids() {
    assert_eq!(parse("(1 + 2").unwrap_err().id(), "RILL-P002");
    assert_eq!(parse("{ 1").unwrap_err().id(), "RILL-P002");
    assert_eq!(parse("eech { $ }").unwrap_err().id(), "RILL-P003");
    assert_eq!(parse("5 = $x").unwrap_err().id(), "RILL-P005");
}

#[test]
fn test_recovery_keeps_good_statements() {
    let outcome = parse_with_recovery("1 +\n2 + 3\n4 +\n");
    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 2);
    assert_eq!(outcome.ast.statements.len(), 3);
    // Each failed statement is replaced by a recovery node.
    let recovery_count = outcome
        .ast
        .statements
        .iter()
        .filter(|s| matches!(s.chain.head, rill::ast::Expr::RecoveryError { .. }))
        .count();
    assert_eq!(recovery_count, 2);
}

#[test]
fn test_recovery_errors_serialize_to_json() {
    let outcome = parse_with_recovery("1 +\n");
    let json = outcome.errors[0].to_json();
    assert_eq!(json["category"], "parse");
    assert!(json["id"].as_str().unwrap().starts_with("RILL-P"));
    assert!(json["location"]["line"].is_number());
    assert!(json["help"]
        .as_str()
        .unwrap()
        .starts_with("https://rill-lang.dev/errors/"));
}

#[test]
fn test_evaluating_recovery_node_fails() {
    let outcome = parse_with_recovery("1 +\n");
    let mut ctx = Context::with_defaults();
    let err = execute(&outcome.ast, &mut ctx).unwrap_err();
    assert_eq!(err.id(), "RILL-R019");
}

#[test]
fn test_call_stack_attached_to_nested_failures() {
    let source = "|x| $x + $boom => $inner\n|x| $inner($x) => $outer\n$outer(1)";
    let err = run_err(source);
    assert_eq!(err.id(), "RILL-R001");
    let frames: Vec<&str> = err.call_stack.iter().map(|f| f.function.as_str()).collect();
    assert!(frames.contains(&"<closure>"));
    assert!(err.call_stack.len() >= 2);
}

#[test]
fn test_break_outside_loop_is_an_error() {
    let err = run_err("5 break");
    assert_eq!(err.id(), "RILL-R004");
    assert!(err.message().contains("break"));
}

#[test]
fn test_error_kind_equality_and_context() {
    let err = run_err("$gone");
    assert_eq!(
        err.kind,
        ErrorKind::UndefinedVariable {
            name: "gone".to_string()
        }
    );
    assert_eq!(err.kind.context()["name"], "gone");
}

#[test]
fn test_error_location_points_at_offender() {
    let err = run_err("1 => $a\n$a + $nope");
    let location = err.location.unwrap();
    assert_eq!(location.line, 2);
    assert_eq!(location.column, 6);
}

#[test]
fn test_invalid_regex_in_matches() {
    let err = run_err("\"abc\" -> .matches(\"[unclosed\")");
    assert_eq!(err.id(), "RILL-R018");
}

#[test]
fn test_type_error_on_non_iterable_annotation_path() {
    // A dict input to each iterates; a callable input does not.
    let err = run_err("|| 1 => $f\n$f -> each { $ }");
    assert_eq!(err.id(), "RILL-R007");
}

#[test]
fn test_value_still_checked_after_annotated_statement() {
    let script = parse("^(tag: \"x\") \"FATAL: crash\"").unwrap();
    let mut ctx = Context::new(rill::ContextOptions {
        auto_exceptions: vec!["FATAL".to_string()],
        ..Default::default()
    })
    .unwrap();
    let err = execute(&script, &mut ctx).unwrap_err();
    assert_eq!(err.id(), "RILL-R015");
}
