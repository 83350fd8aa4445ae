// ABOUTME: Syntactic desugaring of one-armed `if`, `and`, and `or` over S-expressions

use crate::context::InterpreterContext;
use crate::sexpr::{SExpr, SExprKind};

/// The sentinel symbol the builder recognizes as the unspecified-value
/// literal, introduced by desugaring a one-armed `if`. Keeping it as an
/// ordinary symbol (rather than inventing a new `SExprKind`) lets the
/// simplifier stay a pure S-expression-to-S-expression rewrite.
pub const UNSPECIFIED_SYMBOL: &str = "*unspecified*";

/// Rewrites `expr` to its simplified form, recursing into every subtree
/// first so that rewrites compose (e.g. an `or` nested inside an `and`
/// both end up desugared). Meaning-preserving: evaluating the rewritten
/// form yields the same value as evaluating the original.
pub fn simplify(expr: &SExpr, ctx: &InterpreterContext) -> SExpr {
    match &expr.kind {
        SExprKind::List(items) if !items.is_empty() => {
            let head = items[0].as_symbol();
            match head {
                Some("if") => simplify_if(expr, items, ctx),
                Some("and") => simplify_and(&items[1..], ctx),
                Some("or") => simplify_or(&items[1..], ctx),
                Some("quote") => expr.clone(),
                _ => {
                    let rewritten: Vec<SExpr> =
                        items.iter().map(|i| simplify(i, ctx)).collect();
                    SExpr {
                        kind: SExprKind::List(rewritten),
                        range: expr.range,
                    }
                }
            }
        }
        _ => expr.clone(),
    }
}

fn simplify_if(expr: &SExpr, items: &[SExpr], ctx: &InterpreterContext) -> SExpr {
    let range = expr.range;
    match items.len() {
        3 => {
            let cond = simplify(&items[1], ctx);
            let then_branch = simplify(&items[2], ctx);
            SExpr {
                kind: SExprKind::List(vec![
                    items[0].clone(),
                    cond,
                    then_branch,
                    SExpr::symbol(UNSPECIFIED_SYMBOL),
                ]),
                range,
            }
        }
        4 => {
            let cond = simplify(&items[1], ctx);
            let then_branch = simplify(&items[2], ctx);
            let else_branch = simplify(&items[3], ctx);
            SExpr {
                kind: SExprKind::List(vec![items[0].clone(), cond, then_branch, else_branch]),
                range,
            }
        }
        _ => {
            // Not a two- or three-argument `if` shape; leave for the builder
            // to reject with a precise BuildError::ArityMismatch.
            let rewritten: Vec<SExpr> = items.iter().map(|i| simplify(i, ctx)).collect();
            SExpr {
                kind: SExprKind::List(rewritten),
                range,
            }
        }
    }
}

fn simplify_and(rest: &[SExpr], ctx: &InterpreterContext) -> SExpr {
    match rest.len() {
        0 => SExpr::synthetic(SExprKind::Bool(true)),
        1 => simplify(&rest[0], ctx),
        _ => {
            let test = simplify(&rest[0], ctx);
            let tail = simplify_and(&rest[1..], ctx);
            SExpr::list(vec![
                SExpr::symbol("if"),
                test,
                tail,
                SExpr::synthetic(SExprKind::Bool(false)),
            ])
        }
    }
}

fn simplify_or(rest: &[SExpr], ctx: &InterpreterContext) -> SExpr {
    match rest.len() {
        0 => SExpr::synthetic(SExprKind::Bool(false)),
        1 => simplify(&rest[0], ctx),
        _ => {
            let test = simplify(&rest[0], ctx);
            let tail = simplify_or(&rest[1..], ctx);
            let fresh = ctx.gensym("or");
            SExpr::list(vec![
                SExpr::symbol("letrec"),
                SExpr::list(vec![SExpr::list(vec![SExpr::symbol(fresh.clone()), test])]),
                SExpr::list(vec![
                    SExpr::symbol("if"),
                    SExpr::symbol(fresh.clone()),
                    SExpr::symbol(fresh),
                    tail,
                ]),
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_armed_if_gets_unspecified_else() {
        let ctx = InterpreterContext::new();
        let expr = SExpr::list(vec![
            SExpr::symbol("if"),
            SExpr::synthetic(SExprKind::Bool(true)),
            SExpr::synthetic(SExprKind::Number(1.0)),
        ]);
        let simplified = simplify(&expr, &ctx);
        let items = simplified.as_list().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[3].as_symbol(), Some(UNSPECIFIED_SYMBOL));
    }

    #[test]
    fn and_expands_to_nested_if() {
        let ctx = InterpreterContext::new();
        let expr = SExpr::list(vec![
            SExpr::symbol("and"),
            SExpr::symbol("a"),
            SExpr::symbol("b"),
        ]);
        let simplified = simplify(&expr, &ctx);
        assert_eq!(simplified.head_symbol(), Some("if"));
    }

    #[test]
    fn or_expands_to_letrec_with_fresh_symbol() {
        let ctx = InterpreterContext::new();
        let expr = SExpr::list(vec![
            SExpr::symbol("or"),
            SExpr::symbol("a"),
            SExpr::symbol("b"),
        ]);
        let simplified = simplify(&expr, &ctx);
        assert_eq!(simplified.head_symbol(), Some("letrec"));
    }

    #[test]
    fn empty_and_is_true_and_empty_or_is_false() {
        let ctx = InterpreterContext::new();
        let and_expr = SExpr::list(vec![SExpr::symbol("and")]);
        let or_expr = SExpr::list(vec![SExpr::symbol("or")]);
        assert_eq!(simplify(&and_expr, &ctx).kind, SExprKind::Bool(true));
        assert_eq!(simplify(&or_expr, &ctx).kind, SExprKind::Bool(false));
    }
}
