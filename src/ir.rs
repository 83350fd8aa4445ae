// ABOUTME: The shared intermediate representation every evaluator walks

use crate::scope::{LexicalScope, Ref};
use crate::sexpr::SExpr;
use crate::span::SourceRange;
use std::rc::Rc;

/// A resolved variable reference: `(name, depth, index,
/// target_slot)`. `name` is kept purely for diagnostics and the tracing
/// renderer; `depth`/`index` are what evaluation actually uses. `target_scope`
/// is the `LexicalScope` the builder resolved against, checked by the
/// lexical-correctness invariant.
#[derive(Debug, Clone)]
pub struct VarRef {
    pub name: String,
    pub depth: usize,
    pub index: usize,
    pub target_scope: Rc<LexicalScope>,
}

impl VarRef {
    pub fn new(name: impl Into<String>, r: Ref, target_scope: Rc<LexicalScope>) -> Self {
        VarRef {
            name: name.into(),
            depth: r.depth,
            index: r.index,
            target_scope,
        }
    }
}

/// A `lambda`'s fixed, immutable shape: its parameter slots (as an inner
/// scope), and its body. Shared (via `Rc`) between the `IrNode::Lambda` that
/// names it and every `LambdaProc` value created by evaluating that node.
///
/// Every child is `Rc`-owned rather than `Box`-owned: the CPS evaluator's
/// continuations are `'static` closures that must clone their way to
/// "what comes next" in the tree rather than borrow it, so the whole IR is
/// built as a shared, immutable graph from the start: scopes, IR, and
/// simplified source are built once per program and treated as immutable.
#[derive(Debug)]
pub struct LambdaNode {
    pub params: Vec<String>,
    pub inner_scope: Rc<LexicalScope>,
    pub body: Rc<IrNode>,
    pub range: SourceRange,
}

#[derive(Debug)]
pub enum IrNodeKind {
    Constant(SExpr),
    Variable(VarRef),
    Assign(VarRef, Rc<IrNode>),
    If(Rc<IrNode>, Rc<IrNode>, Rc<IrNode>),
    Lambda(Rc<LambdaNode>),
    Apply {
        proc: Rc<IrNode>,
        args: Vec<Rc<IrNode>>,
    },
    Sequence(Rc<IrNode>, Rc<IrNode>),
    Letrec {
        inner_scope: Rc<LexicalScope>,
        bindings: Vec<(VarRef, Rc<IrNode>)>,
        body: Rc<IrNode>,
    },
    Try {
        try_body: Rc<IrNode>,
        catch_lambda: Rc<IrNode>,
    },
    Throw(Rc<IrNode>),
    Input(String),
}

/// One node of the IR, with the source range it was built from (used by
/// `BuildError`/`SchemeException` reporting and by the tracing renderer).
#[derive(Debug)]
pub struct IrNode {
    pub kind: IrNodeKind,
    pub range: SourceRange,
}

impl IrNode {
    pub fn new(kind: IrNodeKind, range: SourceRange) -> Self {
        IrNode { kind, range }
    }
}

/// Converts a literal S-expression held by a `Constant` node into a runtime
/// `Value`, recursively turning quoted lists into proper lists of `Pair`s.
/// The `*unspecified*` sentinel symbol introduced by the simplifier
/// is recognized here rather than given its own `SExprKind`, keeping the
/// simplifier a pure S-expression rewrite.
pub fn literal_value(expr: &SExpr) -> crate::value::Value {
    use crate::value::Value;
    match &expr.kind {
        crate::sexpr::SExprKind::Number(n) => Value::number(*n),
        crate::sexpr::SExprKind::Bool(b) => Value::boolean(*b),
        crate::sexpr::SExprKind::Char(c) => Value::char(*c),
        crate::sexpr::SExprKind::Str(s) => Value::string(s.clone()),
        crate::sexpr::SExprKind::Nil => Value::nil(),
        crate::sexpr::SExprKind::Symbol(s) if s == crate::simplify::UNSPECIFIED_SYMBOL => {
            Value::unspecified()
        }
        crate::sexpr::SExprKind::Symbol(s) => Value::symbol(s.clone()),
        crate::sexpr::SExprKind::List(items) => {
            let mut acc = Value::nil();
            for item in items.iter().rev() {
                acc = Value::cons(literal_value(item), acc);
            }
            acc
        }
    }
}
