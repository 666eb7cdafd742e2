use super::*;
use crate::errors::ErrorKind;
use crate::ir::{IRBuilder, IrKind, Optimizer};
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::runtime::{PrintHandler, Runtime, Value, Vm};
use crate::stdlib::Natives;
use crate::validation::Validator;

use pretty_assertions::assert_eq;

fn compile_at(source: &str, level: u8) -> Bytecode {
    let natives = Natives::standard();
    let program = parse(tokenize(source).unwrap()).unwrap();
    let validated = match Validator::new(natives.prelude()).validate(program) {
        Ok(validated) => validated,
        Err(errors) => panic!("validation failed: {errors:#?}"),
    };
    let ir = IRBuilder::new()
        .with_externals(natives.names())
        .build(&validated)
        .unwrap();
    compile(&Optimizer::for_level(level).optimize(ir)).unwrap()
}

fn listing(source: &str) -> String {
    compile_at(source, 0).to_string()
}

fn lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("{line}\n"))
        .collect()
}

fn run(code: &Bytecode) -> (Value, String) {
    let mut rt = Runtime::default().with_printer(PrintHandler::buffer());
    Natives::standard().install(&mut rt).unwrap();
    let value = Vm::new(&mut rt, code).run().unwrap();
    (value, rt.printer().output())
}

#[test]
fn test_if_else_listing() {
    assert_eq!(
        listing("var x = 1; if x > 0 { x = 2; } else { x = 3; } x"),
        lines(
            "PUSH_CONST 1
             DECLARE x
             LOAD x
             PUSH_CONST 0
             GT
             JUMP_IF_FALSE else_0
             ENTER_SCOPE
             PUSH_CONST 2
             STORE x
             EXIT_SCOPE
             JUMP endif_0
             LABEL else_0
             ENTER_SCOPE
             PUSH_CONST 3
             STORE x
             EXIT_SCOPE
             LABEL endif_0
             LOAD x"
        )
    );
}

#[test]
fn test_while_listing() {
    assert_eq!(
        listing("var i = 0; while i < 2 { i = i + 1; }"),
        lines(
            "PUSH_CONST 0
             DECLARE i
             LABEL while_start_0
             LOAD i
             PUSH_CONST 2
             LT
             JUMP_IF_FALSE while_end_0
             ENTER_SCOPE
             LOAD i
             PUSH_CONST 1
             ADD
             STORE i
             EXIT_SCOPE
             JUMP while_start_0
             LABEL while_end_0"
        )
    );
}

#[test]
fn test_function_listing() {
    assert_eq!(
        listing("fn add(a: int, b: int) -> int { return a + b; } add(1, 2)"),
        lines(
            "FUNC_START add
             PARAM a
             PARAM b
             LOAD a
             LOAD b
             ADD
             RETURN
             FUNC_END
             PUSH_CONST 1
             PUSH_CONST 2
             CALL add 2"
        )
    );
}

#[test]
fn test_bare_return_pushes_unit() {
    let text = listing("fn stop() { return; } stop(); let done = true;");
    assert!(text.contains("PUSH_CONST ()\nRETURN\nFUNC_END\n"), "{text}");
    assert!(text.contains("CALL stop 0\nPOP\n"), "{text}");
}

#[test]
fn test_labels_are_unique_per_construct() {
    let code = compile_at(
        "var n = 0;
         if n == 0 { if n < 1 { n = 1; } }
         while n < 3 { n = n + 1; }",
        0,
    );
    for label in ["else_0", "endif_0", "else_1", "endif_1", "while_start_2", "while_end_2"] {
        assert!(code.label(label).is_some(), "missing {label}:\n{code}");
    }
}

#[test]
fn test_listing_survives_text_round_trip() {
    let code = compile_at(
        "fn greet(name: string) -> string { return \"hi \\\"\" + name + \"\\\"\\n\"; }
         let ratio = 1.0 / 4;
         print(greet(\"bob\"));
         print(ratio);
         not false",
        0,
    );
    let text = code.to_string();
    assert!(text.contains("PUSH_CONST \"hi \\\"\""), "{text}");
    assert!(text.contains("PUSH_CONST 1.0\n"), "{text}");
    assert!(text.contains("NOT\n"), "{text}");
    assert_eq!(Bytecode::parse(&text).unwrap(), code);
}

#[test]
fn test_constants_parse() {
    assert_eq!(instruction::parse_constant("()"), Ok(Constant::Unit));
    assert_eq!(instruction::parse_constant("-12"), Ok(Constant::Int(-12)));
    assert_eq!(instruction::parse_constant("2.5"), Ok(Constant::Float(2.5)));
    assert_eq!(
        instruction::parse_constant("\"a\\tb\""),
        Ok(Constant::Str("a\tb".to_string()))
    );
    assert!(instruction::parse_constant("\"open").is_err());
    assert!(instruction::parse_constant("\"escaped\\\"").is_err());
    assert!(instruction::parse_constant("nope").is_err());
}

#[test]
fn test_comments_and_blank_lines_are_skipped() {
    let code = Bytecode::parse("; result\n\n  PUSH_CONST 41\nPUSH_CONST 1\nADD\n").unwrap();
    assert_eq!(code.len(), 3);
    assert_eq!(run(&code).0, Value::Int(42));
}

#[test]
fn test_unknown_mnemonic_reports_line() {
    let err = Bytecode::parse("POP\nFROB x\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.span().line, 2);
    assert_eq!(err.message(), "unknown instruction 'FROB'");
}

#[test]
fn test_malformed_operands() {
    assert!("CALL f".parse::<Instruction>().is_err());
    assert!("CALL f many".parse::<Instruction>().is_err());
    assert!("POP 1".parse::<Instruction>().is_err());
    assert!("LOAD".parse::<Instruction>().is_err());
    assert_eq!(
        "CALL f 2".parse::<Instruction>(),
        Ok(Instruction::Call {
            name: "f".to_string(),
            argc: 2
        })
    );
}

#[test]
fn test_structural_errors() {
    let err = Bytecode::parse("PUSH_CONST true\nJUMP nowhere\n").unwrap_err();
    assert_eq!(err.message(), "jump to unknown label 'nowhere'");
    assert_eq!(err.span().line, 2);

    let err = Bytecode::parse("LABEL a\nLABEL a\n").unwrap_err();
    assert_eq!(err.message(), "label 'a' is defined twice");

    let err = Bytecode::parse("FUNC_END\n").unwrap_err();
    assert_eq!(err.message(), "FUNC_END without FUNC_START");

    let err = Bytecode::parse("POP\nFUNC_START f\n").unwrap_err();
    assert_eq!(err.message(), "FUNC_START without FUNC_END");
    assert_eq!(err.span().line, 2);
}

#[test]
fn test_malformed_ir_is_rejected() {
    let span = Span::default();
    let root = IrNode::block(vec![IrNode::new(IrKind::If, vec![], span)], span);
    let err = compile(&root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.message().starts_with("cannot emit 'if'"), "{}", err.message());
}

#[test]
fn test_emitted_code_runs() {
    let code = compile_at(
        "fn fact(n: int) -> int {
             if n < 2 { return 1; }
             return n * fact(n - 1);
         }
         for (var i = 1; i <= 4; i = i + 1) { print(fact(i)); }
         fact(10)",
        2,
    );
    let (value, output) = run(&code);
    assert_eq!(value, Value::Int(3_628_800));
    assert_eq!(output, "1\n2\n6\n24\n");
}

#[test]
fn test_function_falls_through_to_unit() {
    let code = compile_at("fn noop() { let x = 1; } noop()", 2);
    assert_eq!(run(&code).0, Value::Unit);
}

#[test]
fn test_handwritten_listing_runs() {
    let code = Bytecode::parse(
        "; countdown
         PUSH_CONST 3
         DECLARE n
         LABEL top
         LOAD n
         PUSH_CONST 0
         GT
         JUMP_IF_FALSE done
         LOAD n
         CALL print 1
         POP
         LOAD n
         PUSH_CONST 1
         SUB
         STORE n
         JUMP top
         LABEL done
         LOAD n",
    )
    .unwrap();
    let (value, output) = run(&code);
    assert_eq!(value, Value::Int(0));
    assert_eq!(output, "3\n2\n1\n");
}
