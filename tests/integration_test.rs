// ABOUTME: End-to-end scenarios and cross-cutting invariants run against the public crate surface

use lisp_eval_core::build::build_program;
use lisp_eval_core::builtins::register_builtins;
use lisp_eval_core::context::InterpreterContext;
use lisp_eval_core::cps_transform::transform;
use lisp_eval_core::dataflow::DataflowGraph;
use lisp_eval_core::eval_cps;
use lisp_eval_core::eval_direct::eval_direct;
use lisp_eval_core::sexpr::{read_one, SExpr};
use lisp_eval_core::simplify::simplify;
use lisp_eval_core::tracing::TracingGraph;
use lisp_eval_core::value::Value;
use std::rc::Rc;

fn direct_eval(src: &str) -> Value {
    let ctx = InterpreterContext::new();
    let (scope, env) = register_builtins();
    let (expr, _) = read_one(src).unwrap();
    let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
    eval_direct(&node, &env, &ctx).expect("eval should succeed")
}

fn cps_eval(src: &str) -> Value {
    let ctx = InterpreterContext::new();
    let (scope, env) = register_builtins();
    let (expr, _) = read_one(src).unwrap();
    let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
    eval_cps::run(&node, &env, &ctx).expect("eval should succeed")
}

// End-to-end scenario table, one test per row.

#[test]
fn scenario_1_sums_a_variadic_application() {
    assert_eq!(direct_eval("(+ 1 2 3)").as_number(), Some(6.0));
}

#[test]
fn scenario_2_letrec_recursive_factorial() {
    let src = "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))";
    assert_eq!(direct_eval(src).as_number(), Some(120.0));
}

#[test]
fn scenario_3_try_catches_a_thrown_value() {
    assert_eq!(
        direct_eval("(try (throw 42) (lambda (e) (+ e 1)))").as_number(),
        Some(43.0)
    );
}

#[test]
fn scenario_4_set_mutates_a_letrec_binding() {
    assert_eq!(
        direct_eval("(letrec ((x 1)) (begin (set! x 7) x))").as_number(),
        Some(7.0)
    );
}

#[test]
fn scenario_5_cons_prints_as_a_dotted_pair() {
    let v = direct_eval("((lambda (a b) (cons a b)) 1 2)");
    assert_eq!(format!("{}", v), "(1 . 2)");
}

#[test]
fn scenario_6_reactive_input_update_reflows_the_sum() {
    let ctx = InterpreterContext::new();
    let (scope, env) = register_builtins();
    let (expr, _) = read_one("(+ (input n) 10)").unwrap();
    let node = build_program(&expr, &scope, &ctx).expect("build should succeed");

    let mut graph = DataflowGraph::new();
    graph.create_input("n", Value::number(1.0));
    let root = graph
        .build_node(&Rc::new(node), &env, &ctx)
        .expect("dataflow build should succeed");
    assert_eq!(graph.value_of(root).as_number(), Some(11.0));

    graph.update_input("n", Value::number(5.0));
    graph.reevaluate_all(&ctx);
    assert_eq!(graph.value_of(root).as_number(), Some(15.0));
}

// Cross-cutting invariants, one test each where checkable without a
// model-based property tester.

#[test]
fn invariant_1_lexical_correctness_resolves_the_nearest_shadowing_binding() {
    let src = "(letrec ((x 1)) ((lambda (x) x) 2))";
    assert_eq!(direct_eval(src).as_number(), Some(2.0));
}

#[test]
fn invariant_2_direct_and_cps_evaluators_agree() {
    let programs = [
        "(+ 1 2 3)",
        "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 6))",
        "(letrec ((x 1)) (begin (set! x (+ x 6)) x))",
        "(if (= 1 1) 10 20)",
    ];
    for src in programs {
        assert_eq!(
            direct_eval(src).as_number(),
            cps_eval(src).as_number(),
            "direct and cps disagreed on {}",
            src
        );
    }
}

#[test]
fn invariant_3_cps_transform_soundness_against_succ() {
    let programs = [
        "(+ 1 2 3)",
        "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))",
        "(if (= (+ 1 1) 2) (+ 10 1) (+ 20 1))",
    ];
    for src in programs {
        let ctx = InterpreterContext::with_cps_builtins();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one(src).unwrap();
        let simplified = simplify(&expr, &ctx);
        let transformed = transform(&simplified, &SExpr::symbol("SUCC"), &ctx).unwrap();
        let node = build_program(&transformed, &scope, &ctx).expect("build should succeed");
        let transformed_result =
            eval_direct(&node, &env, &ctx).expect("transformed eval should succeed");
        assert_eq!(
            transformed_result.as_number(),
            direct_eval(src).as_number(),
            "cps transform changed the result of {}",
            src
        );
    }
}

#[test]
fn invariant_4_simplifier_preserves_one_armed_if_meaning() {
    assert_eq!(direct_eval("(if #f 1)").type_name(), "unspecified");
    assert_eq!(direct_eval("(if #t 1)").as_number(), Some(1.0));
    assert_eq!(direct_eval("(and 1 2 3)").as_number(), Some(3.0));
    assert_eq!(direct_eval("(or #f #f 5)").as_number(), Some(5.0));
}

#[test]
fn invariant_5_reactive_monotonicity_without_input_changes() {
    let ctx = InterpreterContext::new();
    let (scope, env) = register_builtins();
    let (expr, _) = read_one("(+ (input n) 10)").unwrap();
    let node = build_program(&expr, &scope, &ctx).expect("build should succeed");

    let mut graph = DataflowGraph::new();
    graph.create_input("n", Value::number(1.0));
    let root = graph
        .build_node(&Rc::new(node), &env, &ctx)
        .expect("dataflow build should succeed");
    let before = graph.value_of(root).as_number();
    graph.reevaluate_all(&ctx);
    assert_eq!(graph.value_of(root).as_number(), before);
}

#[test]
fn invariant_6_reactive_cons_preserves_pair_identity_across_reevaluation() {
    let ctx = InterpreterContext::new();
    let (scope, env) = register_builtins();
    let (expr, _) = read_one("(cons (input n) 0)").unwrap();
    let node = build_program(&expr, &scope, &ctx).expect("build should succeed");

    let mut graph = DataflowGraph::new();
    graph.create_input("n", Value::number(1.0));
    let root = graph
        .build_node(&Rc::new(node), &env, &ctx)
        .expect("dataflow build should succeed");
    let before = graph.value_of(root).clone();

    graph.update_input("n", Value::number(2.0));
    graph.reevaluate_all(&ctx);
    let after = graph.value_of(root).clone();

    assert!(before.same_identity(&after), "cons should mutate in place, not replace the pair");
    assert_eq!(format!("{}", after), "(2 . 0)");
}

#[test]
fn invariant_7_tracing_reevaluation_is_idempotent_without_input_changes() {
    let ctx = InterpreterContext::new();
    let (scope, env) = register_builtins();
    let src = "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))";
    let (expr, _) = read_one(src).unwrap();
    let node = build_program(&expr, &scope, &ctx).expect("build should succeed");

    let mut graph = TracingGraph::new();
    let root = graph
        .build(&Rc::new(node), &env, &ctx)
        .expect("trace build should succeed");
    let before = graph.value_of(root).as_number();
    graph.reevaluate(root, &ctx);
    assert_eq!(graph.value_of(root).as_number(), before);
}

#[test]
fn invariant_8_environment_shape_matches_scope_slot_count() {
    let (scope, env) = register_builtins();
    assert_eq!(env.slot_count(), scope.len());
}
