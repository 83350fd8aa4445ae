// ABOUTME: Source-to-source transform producing a program in continuation-passing style

use crate::context::InterpreterContext;
use crate::error::BuildError;
use crate::sexpr::{SExpr, SExprKind};
use crate::simplify::UNSPECIFIED_SYMBOL;

/// `⟦e⟧k`: transforms `e` so that, once evaluated, it passes its result to
/// `k` rather than returning it. `k` is itself an S-expression denoting a
/// one-argument procedure -- usually a variable reference to an
/// already-bound continuation, sometimes a fresh `lambda` built by a
/// caller further up the recursion.
///
/// Must run on already-[`crate::simplify::simplify`]d source: the
/// `if`/`and`/`or` rewrites are a separate, prior pass, and this
/// transform assumes every `if` already has both branches.
pub fn transform(expr: &SExpr, k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    match &expr.kind {
        SExprKind::List(items) if !items.is_empty() => match items[0].as_symbol() {
            Some("quote") | Some("input") => Ok(apply_k(k, expr.clone())),
            Some("if") => transform_if(items, k, ctx),
            Some("lambda") => transform_lambda(items, k, ctx),
            Some("set!") => transform_set(items, k, ctx),
            Some("begin") => transform_begin(&items[1..], k, ctx),
            Some("letrec") => transform_letrec(items, k, ctx),
            Some(form @ ("throw" | "try")) => Err(BuildError::UnsupportedForm {
                form: form.to_string(),
                range: expr.range,
            }),
            _ => transform_application(items, k, ctx),
        },
        _ => Ok(apply_k(k, expr.clone())),
    }
}

/// Leaves: literals, symbols (variable references), quoted data,
/// and `nil`/`#t`/`#f` need no further CPS-ing -- `⟦e⟧k = (k e)` in place.
fn is_leaf(expr: &SExpr) -> bool {
    match &expr.kind {
        SExprKind::List(items) if !items.is_empty() => items[0].as_symbol() == Some("quote"),
        _ => true,
    }
}

fn apply_k(k: &SExpr, value: SExpr) -> SExpr {
    SExpr::list(vec![k.clone(), value])
}

/// Wraps `k` in a singular `letrec` so it is evaluated exactly once before
/// `make` uses it, unless `k` is already a bare variable reference (the
/// `if` rule: "when k is not already a symbol, hoist it into a singular
/// letrec").
fn bind_k(
    k: &SExpr,
    ctx: &InterpreterContext,
    make: impl FnOnce(&SExpr) -> Result<SExpr, BuildError>,
) -> Result<SExpr, BuildError> {
    if k.as_symbol().is_some() {
        make(k)
    } else {
        let name = ctx.gensym("k");
        let k_var = SExpr::symbol(name.clone());
        let body = make(&k_var)?;
        Ok(SExpr::list(vec![
            SExpr::symbol("letrec"),
            SExpr::list(vec![SExpr::list(vec![SExpr::symbol(name), k.clone()])]),
            body,
        ]))
    }
}

fn transform_if(items: &[SExpr], k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    let cond = &items[1];
    let then_branch = &items[2];
    let else_branch = &items[3];
    bind_k(k, ctx, |k_ref| {
        if is_leaf(cond) {
            let then_t = transform(then_branch, k_ref, ctx)?;
            let else_t = transform(else_branch, k_ref, ctx)?;
            Ok(SExpr::list(vec![
                SExpr::symbol("if"),
                cond.clone(),
                then_t,
                else_t,
            ]))
        } else {
            let succ_name = ctx.gensym("succ");
            let succ_var = SExpr::symbol(succ_name.clone());
            let then_t = transform(then_branch, k_ref, ctx)?;
            let else_t = transform(else_branch, k_ref, ctx)?;
            let inner_if = SExpr::list(vec![SExpr::symbol("if"), succ_var, then_t, else_t]);
            let lambda = SExpr::list(vec![
                SExpr::symbol("lambda"),
                SExpr::list(vec![SExpr::symbol(succ_name)]),
                inner_if,
            ]);
            transform(cond, &lambda, ctx)
        }
    })
}

fn combine_body(exprs: &[SExpr]) -> SExpr {
    if exprs.len() == 1 {
        exprs[0].clone()
    } else {
        let mut items = vec![SExpr::symbol("begin")];
        items.extend(exprs.iter().cloned());
        SExpr::list(items)
    }
}

fn transform_lambda(items: &[SExpr], k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    let params = items[1]
        .as_list()
        .ok_or_else(|| BuildError::MalformedForm {
            form: "lambda".to_string(),
            detail: "parameter list must be a proper list of symbols".to_string(),
            range: items[1].range,
        })?
        .to_vec();
    let body = combine_body(&items[2..]);

    let succ_name = ctx.gensym("succ");
    let mut new_params = params;
    new_params.push(SExpr::symbol(succ_name.clone()));
    let body_t = transform(&body, &SExpr::symbol(succ_name), ctx)?;
    let new_lambda = SExpr::list(vec![
        SExpr::symbol("lambda"),
        SExpr::list(new_params),
        body_t,
    ]);
    Ok(apply_k(k, new_lambda))
}

/// Shared by `set!` and each step of a `letrec`'s binding chain
/// (which is exactly a sequence of `set!`s): assign
/// `init`'s value to `name`, then run `after`. Avoids the intermediate
/// continuation lambda when `init` is already a leaf.
fn assign_then(
    name: &SExpr,
    init: &SExpr,
    after: &SExpr,
    ctx: &InterpreterContext,
) -> Result<SExpr, BuildError> {
    if is_leaf(init) {
        Ok(SExpr::list(vec![
            SExpr::symbol("begin"),
            SExpr::list(vec![SExpr::symbol("set!"), name.clone(), init.clone()]),
            after.clone(),
        ]))
    } else {
        let val_name = ctx.gensym("v");
        let val_var = SExpr::symbol(val_name.clone());
        let body = SExpr::list(vec![
            SExpr::symbol("begin"),
            SExpr::list(vec![SExpr::symbol("set!"), name.clone(), val_var]),
            after.clone(),
        ]);
        let lambda = SExpr::list(vec![
            SExpr::symbol("lambda"),
            SExpr::list(vec![SExpr::symbol(val_name)]),
            body,
        ]);
        transform(init, &lambda, ctx)
    }
}

fn transform_set(items: &[SExpr], k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    let after = apply_k(k, SExpr::symbol(UNSPECIFIED_SYMBOL));
    assign_then(&items[1], &items[2], &after, ctx)
}

fn transform_begin(exprs: &[SExpr], k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    match exprs {
        [] => Ok(apply_k(k, SExpr::symbol(UNSPECIFIED_SYMBOL))),
        [last] => transform(last, k, ctx),
        [first, rest @ ..] => {
            let ignored = ctx.gensym("_");
            let rest_t = transform_begin(rest, k, ctx)?;
            let lambda = SExpr::list(vec![
                SExpr::symbol("lambda"),
                SExpr::list(vec![SExpr::symbol(ignored)]),
                rest_t,
            ]);
            transform(first, &lambda, ctx)
        }
    }
}

fn transform_letrec(items: &[SExpr], k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    let binding_exprs = items[1]
        .as_list()
        .ok_or_else(|| BuildError::MalformedForm {
            form: "letrec".to_string(),
            detail: "bindings must be a list of (name expr) pairs".to_string(),
            range: items[1].range,
        })?;
    let mut names = Vec::with_capacity(binding_exprs.len());
    let mut inits = Vec::with_capacity(binding_exprs.len());
    for b in binding_exprs {
        let pair = b.as_list().ok_or_else(|| BuildError::MalformedForm {
            form: "letrec".to_string(),
            detail: "each binding must be a (name expr) pair".to_string(),
            range: b.range,
        })?;
        names.push(pair[0].clone());
        inits.push(pair[1].clone());
    }
    let body = &items[2];

    let mut tail = transform(body, k, ctx)?;
    for (name, init) in names.iter().zip(inits.iter()).rev() {
        tail = assign_then(name, init, &tail, ctx)?;
    }
    let unspecified_bindings: Vec<SExpr> = names
        .iter()
        .map(|n| SExpr::list(vec![n.clone(), SExpr::symbol(UNSPECIFIED_SYMBOL)]))
        .collect();
    Ok(SExpr::list(vec![
        SExpr::symbol("letrec"),
        SExpr::list(unspecified_bindings),
        tail,
    ]))
}

/// Application (including the operator position): left to right, each
/// non-leaf operand is hoisted into a fresh binding via a continuation
/// lambda; `k` is threaded as the call's trailing argument.
fn transform_application(items: &[SExpr], k: &SExpr, ctx: &InterpreterContext) -> Result<SExpr, BuildError> {
    build_application(items, 0, Vec::with_capacity(items.len() + 1), k, ctx)
}

fn build_application(
    items: &[SExpr],
    idx: usize,
    collected: Vec<SExpr>,
    k: &SExpr,
    ctx: &InterpreterContext,
) -> Result<SExpr, BuildError> {
    if idx == items.len() {
        let mut call_items = collected;
        call_items.push(k.clone());
        return Ok(SExpr::list(call_items));
    }
    let item = &items[idx];
    if is_leaf(item) {
        let mut next = collected;
        next.push(item.clone());
        build_application(items, idx + 1, next, k, ctx)
    } else {
        let fresh = ctx.gensym("arg");
        let mut next = collected;
        next.push(SExpr::symbol(fresh.clone()));
        let rest = build_application(items, idx + 1, next, k, ctx)?;
        let lambda = SExpr::list(vec![
            SExpr::symbol("lambda"),
            SExpr::list(vec![SExpr::symbol(fresh)]),
            rest,
        ]);
        transform(item, &lambda, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_program;
    use crate::builtins::register_builtins;
    use crate::context::InterpreterContext;
    use crate::eval_direct::eval_direct;
    use crate::sexpr::read_one;
    use crate::simplify::simplify;

    /// CPS-transform soundness: direct evaluation of `(⟦e⟧ SUCC)` equals direct
    /// evaluation of `e`.
    fn cps_then_direct_eval(src: &str) -> crate::value::Value {
        let ctx = InterpreterContext::with_cps_builtins();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one(src).unwrap();
        let simplified = simplify(&expr, &ctx);
        let transformed = transform(&simplified, &SExpr::symbol("SUCC"), &ctx).unwrap();
        let node = build_program(&transformed, &scope, &ctx).expect("build should succeed");
        eval_direct(&node, &env, &ctx).expect("eval should succeed")
    }

    fn direct_eval(src: &str) -> crate::value::Value {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one(src).unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        eval_direct(&node, &env, &ctx).expect("eval should succeed")
    }

    #[test]
    fn leaf_transform_wraps_in_continuation_call() {
        let ctx = InterpreterContext::new();
        let (e, _) = read_one("42").unwrap();
        let t = transform(&e, &SExpr::symbol("k"), &ctx).unwrap();
        assert_eq!(t.head_symbol(), Some("k"));
    }

    #[test]
    fn soundness_on_arithmetic() {
        assert_eq!(cps_then_direct_eval("(+ 1 2 3)").as_number(), direct_eval("(+ 1 2 3)").as_number());
    }

    #[test]
    fn soundness_on_recursive_factorial() {
        let src = "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))";
        assert_eq!(cps_then_direct_eval(src).as_number(), direct_eval(src).as_number());
    }

    #[test]
    fn soundness_on_set_and_begin() {
        let src = "(letrec ((x 1)) (begin (set! x (+ x 6)) x))";
        assert_eq!(cps_then_direct_eval(src).as_number(), direct_eval(src).as_number());
    }

    #[test]
    fn soundness_on_nested_if_with_nonleaf_condition() {
        let src = "(if (= (+ 1 1) 2) (+ 10 1) (+ 20 1))";
        assert_eq!(cps_then_direct_eval(src).as_number(), direct_eval(src).as_number());
    }

    #[test]
    fn throw_is_rejected_by_the_transform() {
        let ctx = InterpreterContext::new();
        let (e, _) = read_one("(throw 1)").unwrap();
        assert!(transform(&e, &SExpr::symbol("k"), &ctx).is_err());
    }
}
