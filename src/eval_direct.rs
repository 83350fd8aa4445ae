// ABOUTME: Structurally-recursive tree-walking evaluator, the first of four back-ends over the shared IR

use crate::context::InterpreterContext;
use crate::env::Environment;
use crate::error::{BuildError, SchemeException};
use crate::ir::{literal_value, IrNode, IrNodeKind};
use crate::value::{Value, ValueKind};
use std::rc::Rc;

/// The direct evaluator's failure channel. A `Scheme` exception is the
/// catchable one -- `try` handles exactly this variant. `Unsupported`
/// carries an operation this mode cannot perform (the `Input` row: "Not
/// implemented in direct mode; raises a BuildError") and is never caught by
/// user code, matching the BuildError propagation policy.
#[derive(Debug, Clone)]
pub enum DirectError {
    Scheme(SchemeException),
    Unsupported(BuildError),
}

impl From<SchemeException> for DirectError {
    fn from(e: SchemeException) -> Self {
        DirectError::Scheme(e)
    }
}

pub type DirectResult = Result<Value, DirectError>;

/// Walks `node` under `env`, per the per-node contract table.
pub fn eval_direct(node: &IrNode, env: &Rc<Environment>, ctx: &InterpreterContext) -> DirectResult {
    match &node.kind {
        IrNodeKind::Constant(expr) => Ok(literal_value(expr)),
        IrNodeKind::Variable(r) => Ok(env.get_value(r.depth, r.index)),
        IrNodeKind::Assign(r, body) => {
            let v = eval_direct(body, env, ctx)?;
            env.set_value(r.depth, r.index, v);
            Ok(Value::unspecified())
        }
        IrNodeKind::If(cond, then_branch, else_branch) => {
            let c = eval_direct(cond, env, ctx)?;
            if c.is_truthy() {
                eval_direct(then_branch, env, ctx)
            } else {
                eval_direct(else_branch, env, ctx)
            }
        }
        IrNodeKind::Lambda(lambda_node) => Ok(Value::lambda(env.clone(), lambda_node.clone())),
        IrNodeKind::Sequence(head, tail) => {
            eval_direct(head, env, ctx)?;
            eval_direct(tail, env, ctx)
        }
        IrNodeKind::Apply { proc, args } => {
            let proc_val = eval_direct(proc, env, ctx)?;
            let mut arg_vals = Vec::with_capacity(args.len());
            for a in args {
                arg_vals.push(eval_direct(a, env, ctx)?);
            }
            apply(&proc_val, &arg_vals, ctx)
        }
        IrNodeKind::Letrec {
            inner_scope,
            bindings,
            body,
        } => {
            let inner_env = Environment::extend_unspecified(inner_scope.clone(), env.clone());
            for (r, init) in bindings {
                let v = eval_direct(init, &inner_env, ctx)?;
                inner_env.set_value(r.depth, r.index, v);
            }
            eval_direct(body, &inner_env, ctx)
        }
        IrNodeKind::Try {
            try_body,
            catch_lambda,
        } => match eval_direct(try_body, env, ctx) {
            Ok(v) => Ok(v),
            Err(DirectError::Scheme(exc)) => {
                let handler = eval_direct(catch_lambda, env, ctx)?;
                apply(&handler, &[exc.value], ctx)
            }
            Err(other @ DirectError::Unsupported(_)) => Err(other),
        },
        IrNodeKind::Throw(body) => {
            let v = eval_direct(body, env, ctx)?;
            Err(SchemeException::at(v, node.range).into())
        }
        IrNodeKind::Input(_) => Err(DirectError::Unsupported(BuildError::UnsupportedForm {
            form: "input".to_string(),
            range: node.range,
        })),
    }
}

/// Dispatches an already-evaluated procedure value to its argument list.
/// Shared by `Apply` and by `Try`'s catch-lambda invocation.
pub fn apply(proc_val: &Value, args: &[Value], ctx: &InterpreterContext) -> DirectResult {
    match &proc_val.kind {
        ValueKind::BuiltinProc { direct_fn, name, .. } => {
            // Programs produced by `cps_transform::transform` thread a
            // continuation as the trailing argument of every application,
            // builtins included -- running such a program through this
            // evaluator (`--cps-builtins`) means treating that trailing
            // argument as something to call with the builtin's result
            // rather than as an ordinary operand. `SUCC` is exempt: it *is*
            // the terminal continuation, not a builtin that takes one of
            // its own.
            if ctx.cps_builtins_enabled() && *name != "SUCC" && !args.is_empty() {
                let (operands, k) = args.split_at(args.len() - 1);
                let result = direct_fn(ctx, operands)?;
                apply(&k[0], &[result], ctx)
            } else {
                Ok(direct_fn(ctx, args)?)
            }
        }
        ValueKind::LambdaProc {
            captured_env,
            lambda_node,
        } => {
            if args.len() != lambda_node.params.len() {
                return Err(SchemeException::arity(
                    "lambda",
                    &lambda_node.params.len().to_string(),
                    args.len(),
                )
                .into());
            }
            let call_env = Environment::extend(
                lambda_node.inner_scope.clone(),
                captured_env.clone(),
                args.to_vec(),
            );
            eval_direct(&lambda_node.body, &call_env, ctx)
        }
        other => Err(SchemeException::not_a_procedure(other.type_name()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_program;
    use crate::builtins::register_builtins;
    use crate::sexpr::read_one;

    fn run(src: &str) -> DirectResult {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one(src).unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        eval_direct(&node, &env, &ctx)
    }

    #[test]
    fn sums_a_variadic_application() {
        assert_eq!(run("(+ 1 2 3)").unwrap().as_number(), Some(6.0));
    }

    #[test]
    fn letrec_recursive_factorial() {
        let v = run(
            "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))",
        )
        .unwrap();
        assert_eq!(v.as_number(), Some(120.0));
    }

    #[test]
    fn try_catches_thrown_value() {
        let v = run("(try (throw 42) (lambda (e) (+ e 1)))").unwrap();
        assert_eq!(v.as_number(), Some(43.0));
    }

    #[test]
    fn set_mutates_letrec_binding() {
        let v = run("(letrec ((x 1)) (begin (set! x 7) x))").unwrap();
        assert_eq!(v.as_number(), Some(7.0));
    }

    #[test]
    fn cons_builds_a_pair() {
        let v = run("((lambda (a b) (cons a b)) 1 2)").unwrap();
        assert_eq!(format!("{}", v), "(1 . 2)");
    }

    #[test]
    fn arity_mismatch_raises_scheme_exception() {
        let err = run("((lambda (a b) a) 1)").unwrap_err();
        assert!(matches!(err, DirectError::Scheme(_)));
    }

    #[test]
    fn applying_a_non_procedure_raises_scheme_exception() {
        let err = run("(1 2 3)").unwrap_err();
        assert!(matches!(err, DirectError::Scheme(_)));
    }

    #[test]
    fn input_is_unsupported_in_direct_mode() {
        let err = run("(input n)").unwrap_err();
        assert!(matches!(err, DirectError::Unsupported(_)));
    }

    #[test]
    fn uncaught_throw_propagates_past_the_top() {
        let err = run("(throw 99)").unwrap_err();
        match err {
            DirectError::Scheme(exc) => assert_eq!(exc.value.as_number(), Some(99.0)),
            _ => panic!("expected a scheme exception"),
        }
    }

    #[test]
    fn cps_builtins_mode_calls_the_trailing_argument_with_the_result() {
        let ctx = InterpreterContext::with_cps_builtins();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one("(+ 1 2 3 SUCC)").unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let v = eval_direct(&node, &env, &ctx).expect("eval should succeed");
        assert_eq!(v.as_number(), Some(6.0));
    }

    #[test]
    fn cps_builtins_mode_leaves_succ_itself_untouched() {
        let ctx = InterpreterContext::with_cps_builtins();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one("(SUCC 42)").unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let v = eval_direct(&node, &env, &ctx).expect("eval should succeed");
        assert_eq!(v.as_number(), Some(42.0));
    }
}
