use super::*;
use crate::errors::ErrorKind;
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::runtime::{Interpreter, Runtime, Value};
use crate::stdlib::Natives;
use crate::validation::Validator;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn lower(source: &str) -> IrNode {
    let natives = Natives::standard();
    let program = parse(tokenize(source).unwrap()).unwrap();
    let validated = match Validator::new(natives.prelude()).validate(program) {
        Ok(validated) => validated,
        Err(errors) => panic!("validation failed: {errors:#?}"),
    };
    IRBuilder::new()
        .with_externals(natives.names())
        .build(&validated)
        .unwrap()
}

fn optimized(source: &str) -> IrNode {
    Optimizer::standard().optimize(lower(source))
}

fn only_child(root: &IrNode) -> &IrNode {
    assert_eq!(root.children.len(), 1, "expected one statement in:\n{root}");
    &root.children[0]
}

fn var(id: usize, name: &str, mutable: bool) -> VarRef {
    Rc::new(IrVar {
        id,
        name: name.to_string(),
        mutable,
    })
}

#[test]
fn test_folds_nested_arithmetic() {
    let root = optimized("2 + 3 * 4");
    assert_eq!(only_child(&root).as_constant(), Some(&Constant::Int(14)));
}

#[test]
fn test_folds_unary_and_strings() {
    assert_eq!(
        only_child(&optimized("-(3 - 5)")).as_constant(),
        Some(&Constant::Int(2))
    );
    assert_eq!(
        only_child(&optimized("not (1 < 2)")).as_constant(),
        Some(&Constant::Bool(false))
    );
    assert_eq!(
        only_child(&optimized("\"ab\" + \"cd\"")).as_constant(),
        Some(&Constant::Str("abcd".to_string()))
    );
    assert_eq!(
        only_child(&optimized("1 + 0.5")).as_constant(),
        Some(&Constant::Float(1.5))
    );
}

#[test]
fn test_division_by_constant_zero_is_left_for_runtime() {
    for source in ["1 / 0", "7 % 0", "1.0 / 0.0"] {
        let root = optimized(source);
        let node = only_child(&root);
        assert!(
            matches!(node.kind, IrKind::BinaryOp(BinOp::Div | BinOp::Mod)),
            "{source} was folded to {node}"
        );
    }
}

#[test]
fn test_overflow_is_not_folded() {
    let root = optimized("9223372036854775807 + 1");
    assert_eq!(only_child(&root).kind, IrKind::BinaryOp(BinOp::Add));
}

#[test]
fn test_folding_stops_at_variables() {
    let root = optimized("let x = 2; x * (3 + 4)");
    let product = &root.children[1];
    assert_eq!(product.kind, IrKind::BinaryOp(BinOp::Mul));
    assert_eq!(product.children[1].as_constant(), Some(&Constant::Int(7)));
}

#[test]
fn test_statements_after_return_are_dropped() {
    let root = optimized(
        "fn f() -> int {
             var x = 0;
             return 1;
             x = 2;
         }",
    );
    let function = only_child(&root);
    assert!(matches!(function.kind, IrKind::Function { .. }));
    let kinds: Vec<_> = function.children.iter().map(|c| c.kind.clone()).collect();
    assert_eq!(kinds.len(), 2);
    assert_eq!(kinds[1], IrKind::Return);
}

#[test]
fn test_constant_if_keeps_only_taken_branch() {
    let root = optimized("if 1 < 2 { print(1); } else { print(2); }");
    let taken = only_child(&root);
    assert_eq!(taken.kind, IrKind::Block);
    let call = &taken.children[0];
    assert!(matches!(&call.kind, IrKind::Call { callee } if callee.name == "print"));
    assert_eq!(call.children[0].as_constant(), Some(&Constant::Int(1)));

    let root = optimized("if false { print(1); }");
    let skipped = only_child(&root);
    assert_eq!(skipped.kind, IrKind::Block);
    assert!(skipped.children.is_empty());
}

#[test]
fn test_false_loop_is_removed() {
    let root = optimized("while 1 > 2 { print(1); }");
    let removed = only_child(&root);
    assert_eq!(removed.kind, IrKind::Block);
    assert!(removed.children.is_empty());
}

#[test]
fn test_dynamic_branches_survive() {
    let root = optimized("var x = 1; if x > 0 { x = 2; } while x < 5 { x = x + 1; }");
    assert_eq!(root.children[1].kind, IrKind::If);
    assert_eq!(root.children[2].kind, IrKind::While);
}

#[test]
fn test_optimization_levels() {
    assert!(Optimizer::for_level(0).pass_names().is_empty());
    assert_eq!(Optimizer::for_level(1).pass_names(), vec!["constant-folding"]);
    assert_eq!(
        Optimizer::for_level(3).pass_names(),
        vec!["constant-folding", "dead-code-elimination"]
    );

    let unoptimized = Optimizer::for_level(0).optimize(lower("1 + 1"));
    assert_eq!(only_child(&unoptimized).kind, IrKind::BinaryOp(BinOp::Add));
}

#[test]
fn test_functions_are_hoisted_ahead_of_statements() {
    let root = lower(
        "print(twice(2));
         fn twice(n: int) -> int { return n * 2; }
         let y = twice(3);",
    );
    let IrKind::Function { var: twice, params } = &root.children[0].kind else {
        panic!("expected the function first:\n{root}");
    };
    assert_eq!(twice.name, "twice");
    assert_eq!(params.len(), 1);

    let IrKind::Call { callee } = &root.children[1].kind else {
        panic!("expected the print call second:\n{root}");
    };
    assert_eq!(callee.name, "print");
    let IrKind::Call { callee: inner } = &root.children[1].children[0].kind else {
        panic!("expected a nested call");
    };
    assert!(Rc::ptr_eq(inner, twice));
}

#[test]
fn test_trailing_declaration_keeps_expression_from_being_the_result() {
    let root = lower("1 + 1; fn f() {}");
    assert_eq!(root.children.len(), 3);
    assert!(matches!(root.children[0].kind, IrKind::Function { .. }));
    assert_eq!(root.children[1].kind, IrKind::BinaryOp(BinOp::Add));
    assert_eq!(root.children[2], IrNode::block(vec![], root.span()));

    let root = lower("fn f() {} 1 + 1");
    assert_eq!(root.children.len(), 2);
    assert!(root.children[1].is_expression());
}

#[test]
fn test_for_loop_lowers_to_annotated_while() {
    let root = lower("for (var i = 0; i < 3; i = i + 1) { print(i); }");
    let outer = only_child(&root);
    assert_eq!(outer.kind, IrKind::Block);
    assert!(matches!(
        outer.children[0].kind,
        IrKind::Assignment { declare: true, .. }
    ));

    let lowered = &outer.children[1];
    assert_eq!(lowered.kind, IrKind::While);
    assert_eq!(lowered.annotation("lowered_from"), Some("for"));
    let iteration = &lowered.children[1];
    assert_eq!(iteration.children.len(), 2);
    assert!(matches!(
        iteration.children[1].kind,
        IrKind::Assignment { declare: false, .. }
    ));
}

#[test]
fn test_for_without_condition_loops_on_true() {
    let root = lower("for (;;) { print(1); }");
    let lowered = &only_child(&root).children[0];
    assert_eq!(lowered.children[0].as_constant(), Some(&Constant::Bool(true)));
}

#[test]
fn test_shadowed_names_get_distinct_ids() {
    let root = lower("let x = 1; { let x = 2; print(x); } print(x);");
    let outer = match &root.children[0].kind {
        IrKind::Assignment { target, .. } => target.clone(),
        other => panic!("unexpected {other:?}"),
    };
    let inner_use = &root.children[1].children[1].children[0];
    let outer_use = &root.children[2].children[0];
    let (IrKind::Variable(inner), IrKind::Variable(used)) = (&inner_use.kind, &outer_use.kind)
    else {
        panic!("expected variable reads:\n{root}");
    };
    assert_ne!(inner.id, outer.id);
    assert_eq!(used.id, outer.id);
}

#[test]
fn test_struct_lowers_to_nothing() {
    let root = lower("struct Point { x: int, y: int } let a = 1;");
    assert!(matches!(
        only_child(&root).kind,
        IrKind::Assignment { declare: true, .. }
    ));
}

#[test]
fn test_unresolved_name_is_reported() {
    let program = parse(tokenize("missing + 1").unwrap()).unwrap();
    let err = IRBuilder::new().build(&program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.message().contains("'missing'"));
}

#[test]
fn test_display_labels_declarations() {
    let root = lower("fn id(a: int) -> int { return a; }");
    let dump = root.to_string();
    // natives take the first ids
    let id = Natives::standard().len();
    let header = format!("block\n  function id#{id}(a#{})\n", id + 1);
    assert!(dump.starts_with(&header), "{dump}");
    assert!(dump.contains(&format!("variable a#{}", id + 1)));
}

#[test]
fn test_ir_validator_accepts_lowered_programs() {
    let natives = Natives::standard();
    let root = lower(
        "fn fact(n: int) -> int { if n < 2 { return 1; } return n * fact(n - 1); }
         var total = 0;
         for (var i = 0; i < 4; i = i + 1) { total = total + fact(i); }
         print(total);",
    );
    assert_eq!(
        IRValidator::new().with_externals(natives.names()).validate(&root),
        Ok(())
    );
}

#[test]
fn test_ir_validator_reports_every_problem() {
    let span = Span::default();
    let frozen = var(0, "frozen", false);
    let ghost = var(1, "ghost", true);
    let f = var(2, "f", false);
    let root = IrNode::block(
        vec![
            IrNode::new(
                IrKind::Assignment {
                    target: frozen.clone(),
                    declare: true,
                },
                vec![IrNode::constant(Constant::Int(1), span)],
                span,
            ),
            IrNode::new(
                IrKind::Assignment {
                    target: frozen,
                    declare: false,
                },
                vec![IrNode::constant(Constant::Int(2), span)],
                span,
            ),
            IrNode::new(IrKind::Variable(ghost), vec![], span),
            IrNode::new(IrKind::Return, vec![], span),
            IrNode::new(
                IrKind::Function {
                    var: f.clone(),
                    params: vec![],
                },
                vec![],
                span,
            ),
            IrNode::new(
                IrKind::Call { callee: f },
                vec![IrNode::constant(Constant::Unit, span)],
                span,
            ),
            IrNode::new(IrKind::If, vec![], span),
        ],
        span,
    );

    let errors = IRValidator::new().validate(&root).unwrap_err();
    assert_eq!(errors.len(), 5, "{errors:#?}");
    assert!(errors[0].contains("'frozen' is immutable"));
    assert!(errors[1].contains("'ghost#1' is used outside its scope"));
    assert!(errors[2].contains("return outside of a function"));
    assert!(errors[3].contains("'f' takes 0 argument(s), called with 1"));
    assert!(errors[4].contains("expected 3 children, found 0"));
}

fn arithmetic() -> impl Strategy<Value = String> {
    let leaf = (0i64..20).prop_map(|n| n.to_string());
    leaf.prop_recursive(4, 24, 2, |inner| {
        (
            inner.clone(),
            prop::sample::select(vec!["+", "-", "*", "/", "%"]),
            inner,
        )
            .prop_map(|(l, op, r)| format!("({l} {op} {r})"))
    })
}

proptest! {
    #[test]
    fn optimizing_twice_changes_nothing(source in arithmetic()) {
        let once = optimized(&source);
        let twice = Optimizer::standard().optimize(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn folded_constants_match_evaluation(source in arithmetic()) {
        let root = optimized(&source);
        let program = parse(tokenize(&source).unwrap()).unwrap();
        let mut rt = Runtime::default();
        let evaluated = Interpreter::new(&mut rt).run(&program);
        match only_child(&root).as_constant() {
            Some(constant) => prop_assert_eq!(evaluated.ok(), Some(Value::from(constant))),
            // Only failing expressions stay unfolded.
            None => prop_assert!(evaluated.is_err()),
        }
    }
}
