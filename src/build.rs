// ABOUTME: Special-form classifier and IR builder -- lowers simplified S-expressions against a LexicalScope

use crate::context::InterpreterContext;
use crate::error::BuildError;
use crate::ir::{IrNode, IrNodeKind, LambdaNode, VarRef};
use crate::scope::LexicalScope;
use crate::sexpr::{SExpr, SExprKind};
use crate::simplify::simplify;
use std::rc::Rc;

const SPECIAL_FORMS: &[&str] = &[
    "if", "quote", "lambda", "set!", "begin", "letrec", "throw", "try", "input", "define",
];

fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

/// Simplifies and lowers a whole top-level program against `global_scope`
/// (normally the builtin-populated scope from `crate::builtins::register_builtins`).
pub fn build_program(
    expr: &SExpr,
    global_scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
) -> Result<IrNode, BuildError> {
    let simplified = simplify(expr, ctx);
    build(&simplified, global_scope, ctx)
}

/// Lowers one already-simplified S-expression against `scope`. Does not
/// re-simplify: callers that build subexpressions introduced by desugaring
/// (e.g. the CPS transform) are expected to have already run `simplify`
/// over the whole tree once, up front.
pub fn build(
    expr: &SExpr,
    scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
) -> Result<IrNode, BuildError> {
    match &expr.kind {
        SExprKind::List(items) if !items.is_empty() => {
            if let Some(name) = items[0].as_symbol() {
                if is_special_form(name) {
                    return build_special_form(name, expr, items, scope, ctx);
                }
            }
            build_apply(expr, items, scope, ctx)
        }
        SExprKind::Symbol(name) => build_variable(expr, name, scope),
        _ => Ok(IrNode::new(IrNodeKind::Constant(expr.clone()), expr.range)),
    }
}

fn build_variable(expr: &SExpr, name: &str, scope: &Rc<LexicalScope>) -> Result<IrNode, BuildError> {
    if name == crate::simplify::UNSPECIFIED_SYMBOL {
        return Ok(IrNode::new(IrNodeKind::Constant(expr.clone()), expr.range));
    }
    match scope.lookup(name) {
        Some(r) => {
            let var_ref = VarRef::new(name, r, target_scope_at_depth(scope, r.depth));
            Ok(IrNode::new(IrNodeKind::Variable(var_ref), expr.range))
        }
        None => Err(BuildError::InvalidIdentifier {
            name: format!("unbound symbol: {}", name),
            range: expr.range,
        }),
    }
}

/// Walks `depth` outer links from `scope` to recover the `LexicalScope` a
/// `Ref` names, so the `VarRef` can carry it for the lexical-correctness
/// invariant (resolved slot name/identity matches the `Ref`).
fn target_scope_at_depth(scope: &Rc<LexicalScope>, depth: usize) -> Rc<LexicalScope> {
    let mut current = scope.clone();
    for _ in 0..depth {
        current = current
            .outer
            .clone()
            .expect("lookup resolved a depth with no corresponding outer scope");
    }
    current
}

fn build_apply(
    expr: &SExpr,
    items: &[SExpr],
    scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
) -> Result<IrNode, BuildError> {
    let proc = Rc::new(build(&items[0], scope, ctx)?);
    let args = items[1..]
        .iter()
        .map(|a| build(a, scope, ctx).map(Rc::new))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(IrNode::new(
        IrNodeKind::Apply { proc, args },
        expr.range,
    ))
}

fn build_sequence(
    exprs: &[SExpr],
    scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
    whole_range: crate::span::SourceRange,
) -> Result<IrNode, BuildError> {
    if exprs.is_empty() {
        return Ok(IrNode::new(
            IrNodeKind::Constant(SExpr::symbol(crate::simplify::UNSPECIFIED_SYMBOL)),
            whole_range,
        ));
    }
    let mut iter = exprs.iter().rev();
    let last = iter.next().expect("checked non-empty above");
    let mut acc = build(last, scope, ctx)?;
    for e in iter {
        let head = build(e, scope, ctx)?;
        let range = e.range;
        acc = IrNode::new(
            IrNodeKind::Sequence(Rc::new(head), Rc::new(acc)),
            range,
        );
    }
    Ok(acc)
}

fn build_special_form(
    name: &str,
    expr: &SExpr,
    items: &[SExpr],
    scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
) -> Result<IrNode, BuildError> {
    match name {
        "define" => Err(BuildError::UnsupportedForm {
            form: "define".to_string(),
            range: expr.range,
        }),
        "quote" => {
            if items.len() != 2 {
                return Err(arity_error("quote", "1", items.len() - 1, expr.range));
            }
            Ok(IrNode::new(IrNodeKind::Constant(items[1].clone()), expr.range))
        }
        "if" => {
            if items.len() != 4 {
                return Err(arity_error("if", "2 or 3", items.len() - 1, expr.range));
            }
            let cond = build(&items[1], scope, ctx)?;
            let then_branch = build(&items[2], scope, ctx)?;
            let else_branch = build(&items[3], scope, ctx)?;
            Ok(IrNode::new(
                IrNodeKind::If(Rc::new(cond), Rc::new(then_branch), Rc::new(else_branch)),
                expr.range,
            ))
        }
        "set!" => {
            if items.len() != 3 {
                return Err(arity_error("set!", "2", items.len() - 1, expr.range));
            }
            let var_name = items[1].as_symbol().ok_or_else(|| BuildError::MalformedForm {
                form: "set!".to_string(),
                detail: "first argument must be a symbol".to_string(),
                range: items[1].range,
            })?;
            let r = scope.lookup(var_name).ok_or_else(|| BuildError::InvalidIdentifier {
                name: format!("unbound symbol: {}", var_name),
                range: items[1].range,
            })?;
            let var_ref = VarRef::new(var_name, r, target_scope_at_depth(scope, r.depth));
            let body = build(&items[2], scope, ctx)?;
            Ok(IrNode::new(
                IrNodeKind::Assign(var_ref, Rc::new(body)),
                expr.range,
            ))
        }
        "begin" => build_sequence(&items[1..], scope, ctx, expr.range),
        "lambda" => build_lambda(expr, items, scope, ctx),
        "letrec" => build_letrec(expr, items, scope, ctx),
        "throw" => {
            if items.len() != 2 {
                return Err(arity_error("throw", "1", items.len() - 1, expr.range));
            }
            let body = build(&items[1], scope, ctx)?;
            Ok(IrNode::new(IrNodeKind::Throw(Rc::new(body)), expr.range))
        }
        "try" => {
            if items.len() != 3 {
                return Err(arity_error("try", "2", items.len() - 1, expr.range));
            }
            let try_body = build(&items[1], scope, ctx)?;
            let catch_items = items[2].as_list().ok_or_else(|| BuildError::MalformedForm {
                form: "try".to_string(),
                detail: "catch clause must be a lambda".to_string(),
                range: items[2].range,
            })?;
            if catch_items.first().and_then(|i| i.as_symbol()) != Some("lambda") {
                return Err(BuildError::MalformedForm {
                    form: "try".to_string(),
                    detail: "catch clause must be a lambda".to_string(),
                    range: items[2].range,
                });
            }
            let params = catch_items
                .get(1)
                .and_then(|p| p.as_list())
                .unwrap_or(&[]);
            if params.len() != 1 {
                return Err(BuildError::MalformedForm {
                    form: "try".to_string(),
                    detail: "catch clause must take exactly one parameter".to_string(),
                    range: items[2].range,
                });
            }
            let catch_lambda = build(&items[2], scope, ctx)?;
            Ok(IrNode::new(
                IrNodeKind::Try {
                    try_body: Rc::new(try_body),
                    catch_lambda: Rc::new(catch_lambda),
                },
                expr.range,
            ))
        }
        "input" => {
            if items.len() != 2 {
                return Err(arity_error("input", "1", items.len() - 1, expr.range));
            }
            let input_name = items[1].as_symbol().ok_or_else(|| BuildError::MalformedForm {
                form: "input".to_string(),
                detail: "argument must be a symbol naming the input".to_string(),
                range: items[1].range,
            })?;
            Ok(IrNode::new(
                IrNodeKind::Input(input_name.to_string()),
                expr.range,
            ))
        }
        _ => unreachable!("is_special_form admitted an unhandled form: {}", name),
    }
}

fn build_lambda(
    expr: &SExpr,
    items: &[SExpr],
    scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
) -> Result<IrNode, BuildError> {
    if items.len() < 3 {
        return Err(BuildError::MalformedForm {
            form: "lambda".to_string(),
            detail: "expected a parameter list and at least one body expression".to_string(),
            range: expr.range,
        });
    }
    let param_exprs = items[1].as_list().ok_or_else(|| BuildError::MalformedForm {
        form: "lambda".to_string(),
        detail: "parameter list must be a proper list of symbols".to_string(),
        range: items[1].range,
    })?;
    let mut params = Vec::with_capacity(param_exprs.len());
    let mut inner = LexicalScope::child(scope.clone());
    for p in param_exprs {
        let param_name = p.as_symbol().ok_or_else(|| BuildError::InvalidIdentifier {
            name: "lambda parameter must be a symbol".to_string(),
            range: p.range,
        })?;
        if params.contains(&param_name.to_string()) {
            return Err(BuildError::DuplicateBinding {
                name: param_name.to_string(),
                range: p.range,
            });
        }
        inner.add_own_slot(param_name);
        params.push(param_name.to_string());
    }
    let inner_scope = Rc::new(inner);
    let body = build_sequence(&items[2..], &inner_scope, ctx, expr.range)?;
    let lambda_node = Rc::new(LambdaNode {
        params,
        inner_scope,
        body: Rc::new(body),
        range: expr.range,
    });
    Ok(IrNode::new(IrNodeKind::Lambda(lambda_node), expr.range))
}

fn build_letrec(
    expr: &SExpr,
    items: &[SExpr],
    scope: &Rc<LexicalScope>,
    ctx: &InterpreterContext,
) -> Result<IrNode, BuildError> {
    if items.len() != 3 {
        return Err(BuildError::MalformedForm {
            form: "letrec".to_string(),
            detail: "expected a binding list and one body expression".to_string(),
            range: expr.range,
        });
    }
    let binding_exprs = items[1].as_list().ok_or_else(|| BuildError::MalformedForm {
        form: "letrec".to_string(),
        detail: "bindings must be a list of (name expr) pairs".to_string(),
        range: items[1].range,
    })?;

    let mut names = Vec::with_capacity(binding_exprs.len());
    let mut init_exprs = Vec::with_capacity(binding_exprs.len());
    let mut inner = LexicalScope::child(scope.clone());
    for b in binding_exprs {
        let pair = b.as_list().ok_or_else(|| BuildError::MalformedForm {
            form: "letrec".to_string(),
            detail: "each binding must be a (name expr) pair".to_string(),
            range: b.range,
        })?;
        if pair.len() != 2 {
            return Err(BuildError::MalformedForm {
                form: "letrec".to_string(),
                detail: "each binding must be a (name expr) pair".to_string(),
                range: b.range,
            });
        }
        let binding_name = pair[0].as_symbol().ok_or_else(|| BuildError::InvalidIdentifier {
            name: "letrec binding name must be a symbol".to_string(),
            range: pair[0].range,
        })?;
        if names.contains(&binding_name.to_string()) {
            return Err(BuildError::DuplicateBinding {
                name: binding_name.to_string(),
                range: pair[0].range,
            });
        }
        inner.add_own_slot(binding_name);
        names.push(binding_name.to_string());
        init_exprs.push(pair[1].clone());
    }
    let inner_scope = Rc::new(inner);

    let mut bindings = Vec::with_capacity(names.len());
    for (i, (name, init_expr)) in names.iter().zip(init_exprs.iter()).enumerate() {
        let var_ref = VarRef::new(name.clone(), crate::scope::Ref { depth: 0, index: i }, inner_scope.clone());
        let init_ir = build(init_expr, &inner_scope, ctx)?;
        bindings.push((var_ref, Rc::new(init_ir)));
    }
    let body = build(&items[2], &inner_scope, ctx)?;

    Ok(IrNode::new(
        IrNodeKind::Letrec {
            inner_scope,
            bindings,
            body: Rc::new(body),
        },
        expr.range,
    ))
}

fn arity_error(
    form: &str,
    expected: &str,
    found: usize,
    range: crate::span::SourceRange,
) -> BuildError {
    BuildError::ArityMismatch {
        form: form.to_string(),
        expected: expected.to_string(),
        found,
        range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::read_one;

    fn build_str(src: &str) -> Result<IrNode, BuildError> {
        let ctx = InterpreterContext::new();
        let (expr, _) = read_one(src).unwrap();
        let mut global = LexicalScope::new_root();
        for name in ["+", "-", "*", "="] {
            global.add_own_slot(name);
        }
        build_program(&expr, &Rc::new(global), &ctx)
    }

    #[test]
    fn builds_simple_application() {
        let node = build_str("(+ 1 2)").unwrap();
        assert!(matches!(node.kind, IrNodeKind::Apply { .. }));
    }

    #[test]
    fn rejects_define_at_any_position() {
        let err = build_str("(define x 1)").unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedForm { .. }));
    }

    #[test]
    fn rejects_unbound_variable() {
        let err = build_str("unbound-name").unwrap_err();
        assert!(matches!(err, BuildError::InvalidIdentifier { .. }));
    }

    #[test]
    fn letrec_binds_its_own_names_for_initializers() {
        let node =
            build_str("(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))")
                .unwrap();
        assert!(matches!(node.kind, IrNodeKind::Letrec { .. }));
    }

    #[test]
    fn rejects_duplicate_lambda_parameters() {
        let err = build_str("(lambda (x x) x)").unwrap_err();
        assert!(matches!(err, BuildError::DuplicateBinding { .. }));
    }

    #[test]
    fn try_requires_single_argument_catch_lambda() {
        let err = build_str("(try (throw 1) (lambda (a b) a))").unwrap_err();
        assert!(matches!(err, BuildError::MalformedForm { .. }));
    }
}
