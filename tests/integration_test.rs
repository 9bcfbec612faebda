// ABOUTME: End-to-end scenarios exercising the full lexer/parser/evaluator stack

use rill::{execute, parse, Context, ContextOptions, Dict, Value};

/// Parse and run a script against a default context.
fn run(source: &str) -> Value {
    let script = parse(source).expect("script parses");
    let mut ctx = Context::with_defaults();
    execute(&script, &mut ctx).expect("script runs").value
}

fn run_err(source: &str) -> rill::RillError {
    let script = parse(source).expect("script parses");
    let mut ctx = Context::with_defaults();
    execute(&script, &mut ctx).expect_err("script fails")
}

#[test]
fn test_arithmetic() {
    assert_eq!(run("5 + 3"), Value::Number(8.0));
    assert_eq!(run("2 + 3 * 4"), Value::Number(14.0));
    assert_eq!(run("(2 + 3) * 4"), Value::Number(20.0));
    assert_eq!(run("10 % 3"), Value::Number(1.0));
    assert_eq!(run("-5 + 2"), Value::Number(-3.0));
}

#[test]
fn test_each_doubles() {
    assert_eq!(
        run("[1, 2, 3] -> each { $ * 2 }"),
        Value::Tuple(vec![
            Value::Number(2.0),
            Value::Number(4.0),
            Value::Number(6.0)
        ])
    );
}

#[test]
fn test_dispatch_dict() {
    assert_eq!(
        run("\"blocked\" -> [\"blocked\": \"is blocked\", \"error\": \"is error\"]"),
        Value::String("is blocked".to_string())
    );
}

#[test]
fn test_while_iteration_limit() {
    let err = run_err("^(limit: 3) 0 -> @($ < 100) @ { $ + 1 }");
    assert_eq!(err.id(), "RILL-R008");
    assert!(err.message().contains("exceeded 3 iterations"));
}

#[test]
fn test_auto_exception_pattern() {
    let script = parse("\"ERROR: something failed\"").unwrap();
    let mut ctx = Context::new(ContextOptions {
        auto_exceptions: vec!["ERROR".to_string()],
        ..Default::default()
    })
    .unwrap();
    let err = execute(&script, &mut ctx).unwrap_err();
    assert_eq!(err.id(), "RILL-R015");
    let context = err.kind.context();
    assert_eq!(context["pattern"], "ERROR");
    assert_eq!(context["matched_value"], "ERROR: something failed");
}

#[test]
fn test_closure_params_introspection() {
    let result = run("|a: string, b: number| { $a } :> $fn\n$fn.params");

    let mut a_info = Dict::new();
    a_info.insert("type".to_string(), Value::String("string".to_string()));
    let mut b_info = Dict::new();
    b_info.insert("type".to_string(), Value::String("number".to_string()));
    let mut expected = Dict::new();
    expected.insert("a".to_string(), Value::Dict(a_info));
    expected.insert("b".to_string(), Value::Dict(b_info));

    assert_eq!(result, Value::Dict(expected));
}

// ===== Universal properties =====

#[test]
fn test_literal_format_round_trip() {
    let literals = vec![
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Number(42.0),
        Value::Number(-2.5),
        Value::String("hello world".to_string()),
        Value::String("say \"hi\"".to_string()),
    ];
    for value in literals {
        let reparsed = run(&value.to_string());
        assert_eq!(reparsed, value, "round trip failed for {value}");
    }
}

#[test]
fn test_type_lock_only_first_type_sticks() {
    let err = run_err("5 => $x\n\"text\" => $x");
    assert_eq!(err.id(), "RILL-R004");

    // Same-type rebinding is fine.
    assert_eq!(run("5 => $x\n6 => $x\n$x"), Value::Number(6.0));
}

#[test]
fn test_scope_isolation_after_block() {
    let err = run_err("{ 5 => $inner }\n$inner");
    assert_eq!(err.id(), "RILL-R001");
}

#[test]
fn test_block_yields_last_statement() {
    assert_eq!(run("{ 1\n2\n3 }"), Value::Number(3.0));
}

#[test]
fn test_each_iteration_limit_annotation() {
    let err = run_err("^(limit: 2) [1, 2, 3] -> each { $ }");
    assert_eq!(err.id(), "RILL-R008");
}

#[test]
fn test_string_interpolation() {
    assert_eq!(
        run("3 => $n\n\"n is {$n}, twice is {$n * 2}\""),
        Value::String("n is 3, twice is 6".to_string())
    );
}

#[test]
fn test_triple_quoted_string() {
    assert_eq!(
        run("\"\"\"\nline one\nline two\"\"\""),
        Value::String("line one\nline two".to_string())
    );
}

#[test]
fn test_frontmatter_is_opaque_to_execution() {
    assert_eq!(run("---\ntitle: demo\n---\n7"), Value::Number(7.0));
}

#[test]
fn test_conditional_branches() {
    assert_eq!(
        run("5 -> $ > 3 ? \"big\" ! \"small\""),
        Value::String("big".to_string())
    );
    assert_eq!(
        run("2 -> $ > 3 ? \"big\" ! \"small\""),
        Value::String("small".to_string())
    );
}

#[test]
fn test_while_loop_counts_up() {
    assert_eq!(run("0 -> @($ < 5) @ { $ + 1 }"), Value::Number(5.0));
}

#[test]
fn test_do_while_runs_body_at_least_once() {
    assert_eq!(run("10 -> @{ $ + 1 } @ ($ < 5)"), Value::Number(11.0));
}

#[test]
fn test_final_value_and_variables_snapshot() {
    let script = parse("1 => $a\n2 => $b\n$a + $b").unwrap();
    let mut ctx = Context::with_defaults();
    let result = execute(&script, &mut ctx).unwrap();
    assert_eq!(result.value, Value::Number(3.0));
    assert_eq!(result.variables["a"], Value::Number(1.0));
    assert_eq!(result.variables["b"], Value::Number(2.0));
}

#[test]
fn test_script_level_return_stops_execution() {
    let script = parse("1 => $a\n\"early\" return\n\"unreached\" => $a").unwrap();
    let mut ctx = Context::with_defaults();
    let result = execute(&script, &mut ctx).unwrap();
    assert_eq!(result.value, Value::String("early".to_string()));
    assert_eq!(result.variables["a"], Value::Number(1.0));
}
