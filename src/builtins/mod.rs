//! # Built-in procedures
//!
//! Core built-in procedures for the Lisp interpreter, organized into six
//! categories.
//!
//! ## Categories
//!
//! - **[arithmetic]**: `+ - * / mod`
//! - **[comparison]**: `= != < <= > >=`
//! - **[pairs]**: `cons car cdr`
//! - **[predicates]**: `boolean? symbol? pair? number? string? null? not`
//! - **[equality]**: `eqv? boolean=? symbol=? char=? =`
//! - **[io]**: `display newline`
//! - **[tracing_helpers]**: `SUCC`, the identity-like continuation builtin
//!   used by the CPS-transform-soundness check.
//!
//! Each category exposes one `register(&mut BuiltinRegistry)` function, in
//! a per-file registration idiom; `register_builtins` calls
//! each in turn and returns the populated global scope and environment.

use crate::context::InterpreterContext;
use crate::env::Environment;
use crate::error::SchemeException;
use crate::scope::LexicalScope;
use crate::value::{Continuation, CpsFn, DirectFn, Trampoline, Value};
use std::rc::Rc;

pub mod arithmetic;
pub mod comparison;
pub mod equality;
pub mod io;
pub mod pairs;
pub mod predicates;
pub mod tracing_helpers;

/// Accumulates builtin name/value pairs while the global `LexicalScope` is
/// being built. Stands in for "register(&mut Environment)": this
/// crate's environment model binds by slot rather than
/// by name, so slots and values are assembled together here and only
/// turned into a real `Environment` once every category has registered.
pub struct BuiltinRegistry {
    scope: LexicalScope,
    values: Vec<Value>,
}

impl BuiltinRegistry {
    fn new() -> Self {
        BuiltinRegistry {
            scope: LexicalScope::new_root(),
            values: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &'static str, direct_fn: DirectFn, cps_fn: CpsFn) {
        self.scope.add_own_slot(name);
        self.values.push(Value::builtin(name, direct_fn, cps_fn));
    }
}

/// Calls `direct_fn`, dispatching its result to `succeed` or `fail`. The
/// wrapper ("a helper wraps direct into CPS by calling
/// succeed on success and fail on thrown SchemeException"); thrown
/// exceptions reach `fail` as the `Value` they carry.
pub fn direct_to_cps(
    direct_fn: DirectFn,
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    match direct_fn(ctx, args) {
        Ok(v) => succeed(ctx, v),
        Err(e) => fail(ctx, e.value),
    }
}

pub(crate) fn require_arity(name: &str, args: &[Value], expected: usize) -> Result<(), SchemeException> {
    if args.len() != expected {
        return Err(SchemeException::arity(name, &expected.to_string(), args.len()));
    }
    Ok(())
}

pub(crate) fn require_number(name: &str, v: &Value) -> Result<f64, SchemeException> {
    v.as_number().ok_or_else(|| {
        SchemeException::message(format!("{}: expected a number, found {}", name, v.type_name()))
    })
}

/// Builds the global scope and environment from every builtin category.
pub fn register_builtins() -> (Rc<LexicalScope>, Rc<Environment>) {
    let mut reg = BuiltinRegistry::new();
    arithmetic::register(&mut reg);
    comparison::register(&mut reg);
    pairs::register(&mut reg);
    predicates::register(&mut reg);
    equality::register(&mut reg);
    io::register(&mut reg);
    tracing_helpers::register(&mut reg);

    let scope = Rc::new(reg.scope);
    let env = Environment::root(scope.clone(), reg.values);
    (scope, env)
}
