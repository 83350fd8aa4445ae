// ABOUTME: Runtime value types shared by all four evaluators

use crate::context::InterpreterContext;
use crate::env::Environment;
use crate::error::{BuildError, SchemeException};
use crate::ir::LambdaNode;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Direct-style builtin: operates on already-evaluated arguments and either
/// returns a value or raises a [`SchemeException`]. Takes the interpreter
/// context so it can gensym, or (for reactive-aware builtins like `cons`)
/// consult the dataflow call context -- see `src/dataflow.rs`.
pub type DirectFn = fn(&InterpreterContext, &[Value]) -> Result<Value, SchemeException>;

/// CPS-style builtin: takes already-evaluated arguments plus a success and
/// failure continuation, and invokes exactly one of them.
pub type CpsFn = fn(&InterpreterContext, &[Value], &Continuation, &Continuation) -> Trampoline;

/// A continuation used by the CPS evaluator: "what to do next" with a
/// single value. Modeled as a boxed closure (a closure or tagged variant
/// both work; this crate uses a closure).
pub type Continuation = Rc<dyn Fn(&InterpreterContext, Value) -> Trampoline>;

/// A single step of the CPS evaluator's trampoline. `Bounce` holds a thunk
/// producing the next step so that deeply-recursive Scheme programs do not
/// grow the native call stack; see `src/eval_cps.rs::run_trampoline`. The
/// thunk takes `&InterpreterContext` as an argument rather than capturing
/// one, mirroring `Continuation`'s call-time-argument convention -- that is
/// what lets a thunk be a `'static` closure despite the context it needs
/// living only as long as one evaluation run.
pub enum Trampoline {
    Done(Value),
    Failed(SchemeException),
    Bounce(Box<dyn FnOnce(&InterpreterContext) -> Trampoline>),
}

impl Trampoline {
    pub fn bounce(thunk: impl FnOnce(&InterpreterContext) -> Trampoline + 'static) -> Self {
        Trampoline::Bounce(Box::new(thunk))
    }
}

/// The mutable contents of a pair cell. Reactive `cons` mutates this in
/// place; every other evaluator only ever allocates a fresh cell.
pub type PairCell = Rc<RefCell<(Value, Value)>>;

#[derive(Clone)]
pub enum ValueKind {
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Symbol(Rc<str>),
    Char(char),
    Pair(PairCell),
    Nil,
    Unspecified,
    BuiltinProc {
        name: &'static str,
        direct_fn: DirectFn,
        cps_fn: CpsFn,
    },
    LambdaProc {
        captured_env: Rc<Environment>,
        lambda_node: Rc<LambdaNode>,
    },
    Error(BuildError),
}

/// A tagged runtime value. Every value carries a `generation` stamp: a
/// process-wide counter used only by the tracing front-end to visualize
/// freshness. The stamp is informational -- it never participates in
/// equality or dispatch.
#[derive(Clone)]
pub struct Value {
    pub kind: ValueKind,
    pub generation: u64,
}

thread_local! {
    // Generation stamping is the one piece of interpreter-wide state that is
    // *not* threaded through `InterpreterContext`:
    // `BuiltinProc::direct_fn` already takes `&InterpreterContext` for
    // everything semantically relevant, and the stamp itself is pure
    // bookkeeping for the tracing renderer, never observed by a Scheme
    // program. A thread-local counter keeps construction call sites
    // (`Value::number`, `Value::cons`, ...) free of context plumbing.
    static GENERATION: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

fn next_generation() -> u64 {
    GENERATION.with(|g| {
        let n = g.get();
        g.set(n + 1);
        n
    })
}

impl Value {
    fn tagged(kind: ValueKind) -> Self {
        Value {
            kind,
            generation: next_generation(),
        }
    }

    pub fn boolean(b: bool) -> Self {
        Value::tagged(ValueKind::Boolean(b))
    }

    pub fn number(n: f64) -> Self {
        Value::tagged(ValueKind::Number(n))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::tagged(ValueKind::String(s.into()))
    }

    pub fn symbol(s: impl Into<Rc<str>>) -> Self {
        Value::tagged(ValueKind::Symbol(s.into()))
    }

    pub fn char(c: char) -> Self {
        Value::tagged(ValueKind::Char(c))
    }

    pub fn nil() -> Self {
        Value::tagged(ValueKind::Nil)
    }

    pub fn unspecified() -> Self {
        Value::tagged(ValueKind::Unspecified)
    }

    pub fn error(e: BuildError) -> Self {
        Value::tagged(ValueKind::Error(e))
    }

    pub fn cons(car: Value, cdr: Value) -> Self {
        Value::tagged(ValueKind::Pair(Rc::new(RefCell::new((car, cdr)))))
    }

    pub fn from_pair_cell(cell: PairCell) -> Self {
        Value::tagged(ValueKind::Pair(cell))
    }

    pub fn builtin(name: &'static str, direct_fn: DirectFn, cps_fn: CpsFn) -> Self {
        Value::tagged(ValueKind::BuiltinProc {
            name,
            direct_fn,
            cps_fn,
        })
    }

    pub fn lambda(captured_env: Rc<Environment>, lambda_node: Rc<LambdaNode>) -> Self {
        Value::tagged(ValueKind::LambdaProc {
            captured_env,
            lambda_node,
        })
    }

    /// Truthiness: everything except `Boolean(false)` is truthy,
    /// including `Nil` and `0`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self.kind, ValueKind::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Boolean(_) => "boolean",
            ValueKind::Number(_) => "number",
            ValueKind::String(_) => "string",
            ValueKind::Symbol(_) => "symbol",
            ValueKind::Char(_) => "char",
            ValueKind::Pair(_) => "pair",
            ValueKind::Nil => "nil",
            ValueKind::Unspecified => "unspecified",
            ValueKind::BuiltinProc { .. } => "builtin-procedure",
            ValueKind::LambdaProc { .. } => "procedure",
            ValueKind::Error(_) => "error",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&PairCell> {
        match &self.kind {
            ValueKind::Pair(cell) => Some(cell),
            _ => None,
        }
    }

    /// `eqv?` dispatches by type: booleans/symbols/numbers/chars/nil compare by data;
    /// everything else (pairs, procedures, errors, strings) by identity.
    pub fn eqv(&self, other: &Value) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a == b,
            (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
            (ValueKind::Symbol(a), ValueKind::Symbol(b)) => a == b,
            (ValueKind::Char(a), ValueKind::Char(b)) => a == b,
            (ValueKind::Nil, ValueKind::Nil) => true,
            (ValueKind::Unspecified, ValueKind::Unspecified) => true,
            (ValueKind::String(a), ValueKind::String(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Pair(a), ValueKind::Pair(b)) => Rc::ptr_eq(a, b),
            (
                ValueKind::LambdaProc { lambda_node: a, .. },
                ValueKind::LambdaProc { lambda_node: b, .. },
            ) => Rc::ptr_eq(a, b),
            (ValueKind::BuiltinProc { name: a, .. }, ValueKind::BuiltinProc { name: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }

    /// Reference-equality used by the dataflow evaluator's change
    /// propagation (compares to the current value by reference
    /// equality"). Numbers/booleans/symbols/chars/nil compare by value
    /// since they have no useful notion of identity; everything else
    /// compares by the identity of its backing allocation.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::Pair(a), ValueKind::Pair(b)) => Rc::ptr_eq(a, b),
            (ValueKind::String(a), ValueKind::String(b)) => Rc::ptr_eq(a, b),
            (
                ValueKind::LambdaProc { lambda_node: a, .. },
                ValueKind::LambdaProc { lambda_node: b, .. },
            ) => Rc::ptr_eq(a, b),
            _ => self.eqv(other),
        }
    }

    fn fmt_with_visited(
        &self,
        f: &mut fmt::Formatter<'_>,
        visited: &mut HashSet<usize>,
    ) -> fmt::Result {
        match &self.kind {
            ValueKind::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            ValueKind::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            ValueKind::String(s) => write!(f, "\"{}\"", s),
            ValueKind::Symbol(s) => write!(f, "{}", s),
            ValueKind::Char(c) => write!(f, "#\\{}", c),
            ValueKind::Nil => write!(f, "()"),
            ValueKind::Unspecified => write!(f, "#<unspecified>"),
            ValueKind::Error(e) => write!(f, "#<error: {}>", e),
            ValueKind::BuiltinProc { name, .. } => write!(f, "#<builtin:{}>", name),
            ValueKind::LambdaProc { lambda_node, .. } => {
                write!(f, "#<procedure:{:p}>", Rc::as_ptr(lambda_node))
            }
            ValueKind::Pair(cell) => {
                let ptr = Rc::as_ptr(cell) as usize;
                if !visited.insert(ptr) {
                    return write!(f, "*recursive*");
                }
                write!(f, "(")?;
                let (car, cdr) = &*cell.borrow();
                car.fmt_with_visited(f, visited)?;
                let mut tail = cdr.clone();
                loop {
                    match &tail.kind {
                        ValueKind::Pair(next) => {
                            let next_ptr = Rc::as_ptr(next) as usize;
                            if !visited.insert(next_ptr) {
                                write!(f, " . *recursive*")?;
                                break;
                            }
                            write!(f, " ")?;
                            let (car, cdr) = &*next.borrow();
                            car.fmt_with_visited(f, visited)?;
                            tail = cdr.clone();
                        }
                        ValueKind::Nil => break,
                        _ => {
                            write!(f, " . ")?;
                            tail.fmt_with_visited(f, visited)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut visited = HashSet::new();
        self.fmt_with_visited(f, &mut visited)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}, gen={})", self, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_display_strips_trailing_zero() {
        assert_eq!(format!("{}", Value::number(42.0)), "42");
        assert_eq!(format!("{}", Value::number(-2.5)), "-2.5");
    }

    #[test]
    fn pair_display_as_dotted_or_proper_list() {
        let dotted = Value::cons(Value::number(1.0), Value::number(2.0));
        assert_eq!(format!("{}", dotted), "(1 . 2)");

        let proper =
            Value::cons(Value::number(1.0), Value::cons(Value::number(2.0), Value::nil()));
        assert_eq!(format!("{}", proper), "(1 2)");
    }

    #[test]
    fn recursive_pair_does_not_overflow_display() {
        let cell: PairCell = Rc::new(RefCell::new((Value::number(1.0), Value::nil())));
        let looped = Value::from_pair_cell(cell.clone());
        cell.borrow_mut().1 = looped.clone();
        let rendered = format!("{}", looped);
        assert!(rendered.contains("*recursive*"));
    }

    #[test]
    fn eqv_compares_numbers_by_value_and_pairs_by_identity() {
        assert!(Value::number(1.0).eqv(&Value::number(1.0)));
        let a = Value::cons(Value::number(1.0), Value::nil());
        let b = Value::cons(Value::number(1.0), Value::nil());
        assert!(!a.eqv(&b));
        assert!(a.eqv(&a.clone()));
    }

    #[test]
    fn generations_are_monotonic() {
        let a = Value::number(1.0);
        let b = Value::number(2.0);
        assert!(b.generation > a.generation);
    }

    #[test]
    fn truthiness_matches_scheme_semantics() {
        assert!(Value::number(0.0).is_truthy());
        assert!(Value::nil().is_truthy());
        assert!(!Value::boolean(false).is_truthy());
        assert!(Value::boolean(true).is_truthy());
    }
}
