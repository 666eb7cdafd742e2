use super::*;
use crate::ast::Program;
use crate::codegen::{Bytecode, Emitter};
use crate::errors::ErrorKind;
use crate::ir::{IRBuilder, Optimizer};
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::stdlib::Natives;
use crate::validation::Validator;

use pretty_assertions::assert_eq;

fn program(source: &str) -> Program {
    let natives = Natives::standard();
    let program = parse(tokenize(source).unwrap()).unwrap();
    match Validator::new(natives.prelude()).validate(program) {
        Ok(validated) => validated.program().clone(),
        Err(errors) => panic!("validation failed: {errors:#?}"),
    }
}

fn runtime(max_depth: usize) -> Runtime {
    let mut rt = Runtime::new(max_depth).with_printer(PrintHandler::buffer());
    Natives::standard().install(&mut rt).unwrap();
    rt
}

fn bytecode(program: &Program) -> Bytecode {
    let natives = Natives::standard();
    let ir = IRBuilder::new()
        .with_externals(natives.names())
        .build(program)
        .unwrap();
    Emitter::new()
        .compile(&Optimizer::standard().optimize(ir))
        .unwrap()
}

fn interpret_with(rt: &mut Runtime, source: &str) -> HelixResult<Value> {
    Interpreter::new(rt).run(&program(source))
}

fn execute_with(rt: &mut Runtime, source: &str) -> HelixResult<Value> {
    let code = bytecode(&program(source));
    Vm::new(rt, &code).run()
}

/// Runs `source` in both modes and checks they agree on value and output.
fn run_both(source: &str) -> (Value, String) {
    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    let interpreted = interpret_with(&mut rt, source).unwrap();
    let interpreted_out = rt.printer().output();
    rt.teardown().unwrap();
    assert_eq!(rt.heap().stats().live, 0);

    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    let executed = execute_with(&mut rt, source).unwrap();
    let executed_out = rt.printer().output();
    rt.teardown().unwrap();
    assert_eq!(rt.heap().stats().live, 0);

    assert_eq!(interpreted, executed, "modes disagree on the result");
    assert_eq!(interpreted_out, executed_out, "modes disagree on output");
    (interpreted, interpreted_out)
}

fn error_both(source: &str, max_depth: usize) -> (HelixError, HelixError) {
    let mut rt = runtime(max_depth);
    let interpreted = interpret_with(&mut rt, source).unwrap_err();
    let mut rt = runtime(max_depth);
    let executed = execute_with(&mut rt, source).unwrap_err();
    (interpreted, executed)
}

#[test]
fn test_scope_exit_frees_locals_exactly_once() {
    let mut rt = Runtime::default();
    rt.push_scope();
    let handle = rt.declare("x", Value::Int(5)).unwrap();
    assert_eq!(rt.heap().ref_count(handle), Some(1));

    rt.pop_scope().unwrap();
    assert!(!rt.heap().is_live(handle));
    assert_eq!(rt.heap().stats().frees, 1);

    let err = rt.heap().get(handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Memory);
    assert!(rt.lookup("x", Span::default()).is_err());
}

#[test]
fn test_double_free_is_memory_error() {
    let mut heap = Heap::new();
    let handle = heap.alloc(Value::Int(1));
    assert_eq!(heap.release(handle).unwrap(), Some(Value::Int(1)));

    assert_eq!(heap.free(handle).unwrap_err().kind(), ErrorKind::Memory);
    assert_eq!(heap.release(handle).unwrap_err().kind(), ErrorKind::Memory);
    assert_eq!(heap.stats().frees, 1);
}

#[test]
fn test_redefining_a_global_releases_the_old_value() {
    let mut rt = Runtime::default();
    let first = rt.define_global("limit", Value::Int(1)).unwrap();
    let second = rt.define_global("limit", Value::Int(2)).unwrap();
    assert!(!rt.heap().is_live(first));
    assert_eq!(rt.heap().stats().live, 1);
    assert_eq!(rt.lookup("limit", Span::default()), Ok(Value::Int(2)));

    // a binding whose object was already freed surfaces as a memory error
    rt.heap.release(second).unwrap();
    let err = rt.define_global("limit", Value::Int(3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Memory);
}

#[test]
fn test_free_with_outstanding_references_is_memory_error() {
    let mut heap = Heap::new();
    let handle = heap.alloc(Value::Bool(true));
    heap.retain(handle).unwrap();

    let err = heap.free(handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Memory);
    assert!(err.message().contains("2 outstanding"));

    assert_eq!(heap.release(handle).unwrap(), None);
    assert_eq!(heap.release(handle).unwrap(), Some(Value::Bool(true)));
    assert!(!heap.is_live(handle));
}

#[test]
fn test_stale_handle_does_not_alias_reused_slot() {
    let mut heap = Heap::new();
    let first = heap.alloc(Value::Int(1));
    heap.release(first).unwrap();
    let second = heap.alloc(Value::Int(2));

    assert_ne!(first, second);
    assert!(heap.get(first).is_err());
    assert_eq!(heap.get(second).unwrap(), &Value::Int(2));
    assert_eq!(heap.stats().live, 1);
}

#[test]
fn test_shadowing_restores_outer_binding() {
    let (value, _) = run_both(
        "let x = 1;
         var inner = 0;
         { let x = 2; inner = x; }
         x * 10 + inner",
    );
    assert_eq!(value, Value::Int(12));
}

#[test]
fn test_captured_environment_outlives_call() {
    let source = "
        fn make_counter() -> fn() -> int {
            var count = 0;
            fn next() -> int { count = count + 1; return count; }
            return next;
        }
        let counter = make_counter();
        counter();
        counter();
        counter()";
    let (value, _) = run_both(source);
    assert_eq!(value, Value::Int(3));

    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    interpret_with(&mut rt, source).unwrap();
    // `counter` still holds the call's environment
    assert_eq!(rt.escaped(), 1);
    rt.teardown().unwrap();
    assert_eq!(rt.escaped(), 0);
    assert_eq!(rt.heap().stats().live, 0);
}

#[test]
fn test_uncaptured_function_scope_is_released() {
    let source = "
        var total = 0;
        {
            fn helper() -> int { return 41; }
            total = helper() + 1;
        }
        total";
    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    let natives = Natives::standard().len();
    assert_eq!(interpret_with(&mut rt, source).unwrap(), Value::Int(42));
    assert_eq!(rt.escaped(), 0);
    assert_eq!(rt.heap().stats().live, natives + 1);

    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    assert_eq!(execute_with(&mut rt, source).unwrap(), Value::Int(42));
    assert_eq!(rt.escaped(), 0);
    assert_eq!(rt.heap().stats().live, natives + 1);
}

#[test]
fn test_dropped_closure_releases_its_environment() {
    let source = "
        fn zero() -> int { return 0; }
        fn make() -> fn() -> int {
            let secret = 7;
            fn reveal() -> int { return secret; }
            return reveal;
        }
        var f = make();
        f = zero;
        f()";
    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    assert_eq!(interpret_with(&mut rt, source).unwrap(), Value::Int(0));
    // the escaped call environment becomes unreachable once `f` moves on
    rt.collect().unwrap();
    assert_eq!(rt.escaped(), 0);
}

#[test]
fn test_loop_closures_see_final_loop_variable() {
    let (value, _) = run_both(
        "fn zero() -> int { return 0; }
         var last = zero;
         for (var i = 0; i < 3; i = i + 1) {
             fn get() -> int { return i; }
             last = get;
         }
         last()",
    );
    assert_eq!(value, Value::Int(3));
}

#[test]
fn test_loop_body_locals_are_fresh_per_iteration() {
    let (value, _) = run_both(
        "fn zero() -> int { return 0; }
         var first = zero;
         var last = zero;
         for (var i = 0; i < 3; i = i + 1) {
             let snapshot = i * 10;
             fn get() -> int { return snapshot; }
             if i == 0 { first = get; }
             last = get;
         }
         first() + last()",
    );
    assert_eq!(value, Value::Int(20));
}

#[test]
fn test_mutual_recursion_before_definition() {
    let (_, output) = run_both(
        "print(is_even(10));
         print(is_even(7));
         fn is_even(n: int) -> bool {
             if n == 0 { return true; }
             return is_odd(n - 1);
         }
         fn is_odd(n: int) -> bool {
             if n == 0 { return false; }
             return is_even(n - 1);
         }",
    );
    assert_eq!(output, "true\nfalse\n");
}

#[test]
fn test_recursion_and_output() {
    let (value, output) = run_both(
        "fn fib(n: int) -> int {
             if n < 2 { return n; }
             return fib(n - 1) + fib(n - 2);
         }
         var i = 0;
         while i < 6 { print(fib(i)); i = i + 1; }
         fib(15)",
    );
    assert_eq!(value, Value::Int(610));
    assert_eq!(output, "0\n1\n1\n2\n3\n5\n");
}

#[test]
fn test_mixed_arithmetic_and_strings() {
    let (value, output) = run_both(
        "let half = 1 / 2;
         let ratio = 1 / 2.0;
         print(str(half) + \" \" + str(ratio));
         print(-7 % 3);
         \"a\" + \"b\"",
    );
    assert_eq!(value, Value::Str("ab".into()));
    assert_eq!(output, "0 0.5\n-1\n");
}

#[test]
fn test_division_by_zero_is_runtime_error() {
    let (interpreted, executed) = error_both("let a = 4; a / 0", DEFAULT_MAX_DEPTH);
    assert_eq!(interpreted.kind(), ErrorKind::Runtime);
    assert_eq!(executed.kind(), ErrorKind::Runtime);
    assert!(interpreted.message().contains("division by zero"));
    assert!(executed.message().contains("division by zero"));
}

#[test]
fn test_recursion_depth_is_bounded() {
    let (interpreted, executed) = error_both(
        "fn down(n: int) -> int { return down(n + 1); }
         down(0)",
        50,
    );
    for err in [interpreted, executed] {
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert!(err.message().contains("maximum recursion depth of 50"));
    }
}

#[test]
fn test_arity_mismatch_names_both_counts() {
    // Validation would reject this, so run the tree directly.
    let program = parse(
        tokenize("fn add(a: int, b: int) -> int { return a + b; } add(1)").unwrap(),
    )
    .unwrap();
    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    let err = Interpreter::new(&mut rt).run(&program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(err.message(), "function 'add' expects 2 argument(s) but got 1");
    assert_eq!(err.span().line, 1);

    let code = Bytecode::parse(
        "FUNC_START add\nPARAM a\nPARAM b\nLOAD a\nLOAD b\nADD\nRETURN\nFUNC_END\n\
         PUSH_CONST 1\nCALL add 1\n",
    )
    .unwrap();
    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    let err = Vm::new(&mut rt, &code).run().unwrap_err();
    assert_eq!(err.message(), "function 'add' expects 2 argument(s) but got 1");
    assert_eq!(err.span().line, 10);
}

#[test]
fn test_errors_still_unwind_scopes() {
    let mut rt = runtime(DEFAULT_MAX_DEPTH);
    let err = interpret_with(
        &mut rt,
        "fn boom(n: int) -> int { let local = n; { let deeper = 1; return n / 0; } }
         boom(3)",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(rt.depth(), 0);
    assert_eq!(rt.heap().stats().live, Natives::standard().len() + 1);
}

#[test]
fn test_value_display() {
    assert_eq!(Value::Float(2.0).to_string(), "2.0");
    assert_eq!(Value::Float(0.25).to_string(), "0.25");
    assert_eq!(Value::Unit.to_string(), "()");
    assert_eq!(Value::Str("hi".into()).to_string(), "hi");
    assert_eq!(Value::Int(-3).to_string(), "-3");
}

#[test]
fn test_numeric_equality_across_int_and_float() {
    assert_eq!(
        operators::binary(crate::ast::BinOp::Eq, &Value::Int(2), &Value::Float(2.0)),
        Ok(Value::Bool(true))
    );
    assert_eq!(
        operators::binary(crate::ast::BinOp::Eq, &Value::Int(2), &Value::Str("2".into())),
        Ok(Value::Bool(false))
    );
}

#[test]
fn test_integer_overflow_is_an_error() {
    let err = operators::binary(crate::ast::BinOp::Mul, &Value::Int(i64::MAX), &Value::Int(2))
        .unwrap_err();
    assert!(err.contains("overflow"));
}

#[test]
fn test_json_round_trip_of_domain_value() {
    let mut registry = DomainRegistry::default();
    crate::stdlib::domain::register_deserializers(&mut registry);
    let natives = Natives::standard();
    let genome = natives.get("genome").unwrap();
    let value = (genome.func)(&PrintHandler::buffer(), &[Value::Str("acgt".into())]).unwrap();

    let json = value.to_json().unwrap();
    assert_eq!(json, serde_json::json!({ "type": "genome", "data": "ACGT" }));
    assert_eq!(Value::from_json(&json, &registry).unwrap(), value);
    assert!(Value::Function(Rc::new(Closure {
        name: "f".into(),
        params: vec![],
        body: ClosureBody::Bytecode { entry: 0 },
        env: Environment::global(),
    }))
    .to_json()
    .is_err());
}
