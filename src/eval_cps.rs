// ABOUTME: Continuation-passing evaluator whose success/failure pair implements non-local exit

use crate::context::InterpreterContext;
use crate::env::Environment;
use crate::error::{BuildError, SchemeException};
use crate::ir::{literal_value, IrNode, IrNodeKind, VarRef};
use crate::value::{Continuation, Trampoline, Value, ValueKind};
use std::rc::Rc;

/// Walks `node` under `env`, invoking exactly one of `succeed`/`fail`
/// with the resulting value. Every arm either calls a continuation directly
/// (ordinary native recursion, fine for bounded, per-node
/// structural recursion) or, at the one point where Scheme-level recursion
/// actually compounds -- entering a lambda's body in [`apply_cps`] -- returns
/// a [`Trampoline::Bounce`] so [`run_trampoline`] drives the call instead of
/// the native stack.
pub fn eval_cps(
    node: &IrNode,
    env: &Rc<Environment>,
    ctx: &InterpreterContext,
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    match &node.kind {
        IrNodeKind::Constant(expr) => succeed(ctx, literal_value(expr)),
        IrNodeKind::Variable(r) => succeed(ctx, env.get_value(r.depth, r.index)),
        IrNodeKind::Assign(r, body) => eval_assign_cps(r, body, env, ctx, succeed, fail),
        IrNodeKind::If(cond, then_branch, else_branch) => {
            let then_branch = then_branch.clone();
            let else_branch = else_branch.clone();
            let env_c = env.clone();
            let succeed_c = succeed.clone();
            let fail_c = fail.clone();
            let cond_succ: Continuation = Rc::new(move |ctx, v| {
                if v.is_truthy() {
                    eval_cps(&then_branch, &env_c, ctx, &succeed_c, &fail_c)
                } else {
                    eval_cps(&else_branch, &env_c, ctx, &succeed_c, &fail_c)
                }
            });
            eval_cps(cond, env, ctx, &cond_succ, fail)
        }
        IrNodeKind::Lambda(lambda_node) => {
            succeed(ctx, Value::lambda(env.clone(), lambda_node.clone()))
        }
        IrNodeKind::Sequence(head, tail) => {
            let tail = tail.clone();
            let env_c = env.clone();
            let succeed_c = succeed.clone();
            let fail_c = fail.clone();
            let head_succ: Continuation = Rc::new(move |ctx, _discarded| {
                eval_cps(&tail, &env_c, ctx, &succeed_c, &fail_c)
            });
            eval_cps(head, env, ctx, &head_succ, fail)
        }
        IrNodeKind::Apply { proc, args } => {
            let args = args.clone();
            let env_c = env.clone();
            let succeed_c = succeed.clone();
            let fail_c = fail.clone();
            let proc_succ: Continuation = Rc::new(move |ctx, proc_val| {
                eval_args_cps(&args, 0, Value::nil(), proc_val, &env_c, ctx, &succeed_c, &fail_c)
            });
            eval_cps(proc, env, ctx, &proc_succ, fail)
        }
        IrNodeKind::Letrec {
            inner_scope,
            bindings,
            body,
        } => {
            let inner_env = Environment::extend_unspecified(inner_scope.clone(), env.clone());
            eval_letrec_cps(bindings, 0, inner_env, body.clone(), ctx, succeed, fail)
        }
        IrNodeKind::Try {
            try_body,
            catch_lambda,
        } => {
            let catch_lambda = catch_lambda.clone();
            let env_c = env.clone();
            let succeed_c = succeed.clone();
            let fail_c = fail.clone();
            let try_fail: Continuation = Rc::new(move |ctx, thrown_value| {
                let succeed_c2 = succeed_c.clone();
                let fail_c2 = fail_c.clone();
                let thrown = thrown_value.clone();
                let catch_succ: Continuation = Rc::new(move |ctx, handler_val| {
                    apply_cps(&handler_val, vec![thrown.clone()], ctx, &succeed_c2, &fail_c2)
                });
                eval_cps(&catch_lambda, &env_c, ctx, &catch_succ, &fail_c)
            });
            eval_cps(try_body, env, ctx, succeed, &try_fail)
        }
        IrNodeKind::Throw(body) => {
            let fail_c = fail.clone();
            let throw_succ: Continuation = Rc::new(move |ctx, v| fail_c(ctx, v));
            eval_cps(body, env, ctx, &throw_succ, fail)
        }
        IrNodeKind::Input(_) => fail(
            ctx,
            Value::error(BuildError::UnsupportedForm {
                form: "input".to_string(),
                range: node.range,
            }),
        ),
    }
}

fn eval_assign_cps(
    r: &VarRef,
    body: &IrNode,
    env: &Rc<Environment>,
    ctx: &InterpreterContext,
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    let depth = r.depth;
    let index = r.index;
    let env_c = env.clone();
    let succeed_c = succeed.clone();
    let assign_succ: Continuation = Rc::new(move |ctx, v| {
        env_c.set_value(depth, index, v);
        succeed_c(ctx, Value::unspecified())
    });
    eval_cps(body, env, ctx, &assign_succ, fail)
}

/// Evaluates `args[idx..]` left to right, consing each result onto `acc` in
/// reverse order (the accumulator is built as a reverse-order
/// Pair-list and flipped before dispatch") until all arguments are in hand,
/// then dispatches to [`apply_cps`].
fn eval_args_cps(
    args: &[Rc<IrNode>],
    idx: usize,
    acc: Value,
    proc_val: Value,
    env: &Rc<Environment>,
    ctx: &InterpreterContext,
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    if idx == args.len() {
        let arg_vals = reversed_list_to_vec(acc);
        return apply_cps(&proc_val, arg_vals, ctx, succeed, fail);
    }
    let args_owned = args.to_vec();
    let env_c = env.clone();
    let proc_c = proc_val.clone();
    let succeed_c = succeed.clone();
    let fail_c = fail.clone();
    let arg_succ: Continuation = Rc::new(move |ctx, v| {
        let new_acc = Value::cons(v, acc.clone());
        eval_args_cps(
            &args_owned,
            idx + 1,
            new_acc,
            proc_c.clone(),
            &env_c,
            ctx,
            &succeed_c,
            &fail_c,
        )
    });
    eval_cps(&args[idx], env, ctx, &arg_succ, fail)
}

fn reversed_list_to_vec(mut list: Value) -> Vec<Value> {
    let mut out = Vec::new();
    while let Some(cell) = list.as_pair().cloned() {
        let (car, cdr) = cell.borrow().clone();
        out.push(car);
        list = cdr;
    }
    out.reverse();
    out
}

fn eval_letrec_cps(
    bindings: &[(VarRef, Rc<IrNode>)],
    idx: usize,
    inner_env: Rc<Environment>,
    body: Rc<IrNode>,
    ctx: &InterpreterContext,
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    if idx == bindings.len() {
        return eval_cps(&body, &inner_env, ctx, succeed, fail);
    }
    let (var_ref, init) = &bindings[idx];
    let depth = var_ref.depth;
    let index = var_ref.index;
    let bindings_owned = bindings.to_vec();
    let inner_env_c = inner_env.clone();
    let body_c = body.clone();
    let succeed_c = succeed.clone();
    let fail_c = fail.clone();
    let init_succ: Continuation = Rc::new(move |ctx, v| {
        inner_env_c.set_value(depth, index, v);
        eval_letrec_cps(
            &bindings_owned,
            idx + 1,
            inner_env_c.clone(),
            body_c.clone(),
            ctx,
            &succeed_c,
            &fail_c,
        )
    });
    eval_cps(init, &inner_env, ctx, &init_succ, fail)
}

/// Dispatches an already-evaluated procedure to its (already-evaluated,
/// left-to-right-ordered) argument list. Shared by `Apply` and by `Try`'s
/// catch-lambda invocation. Entering a user lambda's body is the one place
/// this evaluator bounces through the trampoline rather than recursing
/// natively, since it is the site where unbounded Scheme-level recursion
/// (e.g. `letrec`-bound self-calls) would otherwise grow the Rust stack
/// without bound.
pub fn apply_cps(
    proc_val: &Value,
    args: Vec<Value>,
    ctx: &InterpreterContext,
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    match &proc_val.kind {
        ValueKind::BuiltinProc { cps_fn, .. } => cps_fn(ctx, &args, succeed, fail),
        ValueKind::LambdaProc {
            captured_env,
            lambda_node,
        } => {
            if args.len() != lambda_node.params.len() {
                return fail(
                    ctx,
                    SchemeException::arity("lambda", &lambda_node.params.len().to_string(), args.len())
                        .value,
                );
            }
            let call_env =
                Environment::extend(lambda_node.inner_scope.clone(), captured_env.clone(), args);
            let body = lambda_node.body.clone();
            let succeed = succeed.clone();
            let fail = fail.clone();
            Trampoline::bounce(move |ctx| eval_cps(&body, &call_env, ctx, &succeed, &fail))
        }
        other => fail(ctx, SchemeException::not_a_procedure(other.type_name()).value),
    }
}

/// Drains a `Trampoline` to its terminal `Done`/`Failed` value, calling each
/// `Bounce` thunk in a loop rather than letting it recurse on the native
/// stack (a trampoline returning a next-step thunk).
pub fn run_trampoline(ctx: &InterpreterContext, mut step: Trampoline) -> Result<Value, SchemeException> {
    loop {
        match step {
            Trampoline::Done(v) => return Ok(v),
            Trampoline::Failed(e) => return Err(e),
            Trampoline::Bounce(thunk) => step = thunk(ctx),
        }
    }
}

/// Entry point: evaluates `node` to completion, starting with a success
/// continuation that simply records the value and a failure continuation
/// that wraps it as a [`SchemeException`] with no source range (the range,
/// when known, is attached at the `Throw`/builtin call site that produced
/// the failing value; see `src/error.rs`).
pub fn run(node: &IrNode, env: &Rc<Environment>, ctx: &InterpreterContext) -> Result<Value, SchemeException> {
    let succeed: Continuation = Rc::new(|_ctx, v| Trampoline::Done(v));
    let fail: Continuation = Rc::new(|_ctx, v| Trampoline::Failed(SchemeException::new(v)));
    run_trampoline(ctx, eval_cps(node, env, ctx, &succeed, &fail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_program;
    use crate::builtins::register_builtins;
    use crate::sexpr::read_one;

    fn run_src(src: &str) -> Result<Value, SchemeException> {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one(src).unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        run(&node, &env, &ctx)
    }

    #[test]
    fn sums_a_variadic_application() {
        assert_eq!(run_src("(+ 1 2 3)").unwrap().as_number(), Some(6.0));
    }

    #[test]
    fn deep_recursion_does_not_overflow_the_native_stack() {
        let v = run_src(
            "(letrec ((count (lambda (n acc) (if (= n 0) acc (count (- n 1) (+ acc 1)))))) (count 20000 0))",
        )
        .unwrap();
        assert_eq!(v.as_number(), Some(20000.0));
    }

    #[test]
    fn letrec_recursive_factorial() {
        let v = run_src(
            "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))",
        )
        .unwrap();
        assert_eq!(v.as_number(), Some(120.0));
    }

    #[test]
    fn try_catches_thrown_value() {
        let v = run_src("(try (throw 42) (lambda (e) (+ e 1)))").unwrap();
        assert_eq!(v.as_number(), Some(43.0));
    }

    #[test]
    fn agrees_with_direct_evaluator_on_arity_mismatch() {
        let err = run_src("((lambda (a b) a) 1)").unwrap_err();
        assert!(err.value.as_number().is_none());
    }

    #[test]
    fn uncaught_throw_reaches_top_level_fail() {
        let err = run_src("(throw 99)").unwrap_err();
        assert_eq!(err.value.as_number(), Some(99.0));
    }
}
