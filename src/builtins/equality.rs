//! Equality specializations: `eqv? boolean=? symbol=? char=?`.
//!
//! `=` (numeric equality) lives in [`super::comparison`]; these cover the
//! other per-type equalities, plus the general `eqv?` dispatch
//! ("booleans/symbols/numbers/chars/nil compare by data;
//! everything else by identity").

use super::{direct_to_cps, require_arity, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value, ValueKind};

fn eqv_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("eqv?", args, 2)?;
    Ok(Value::boolean(args[0].eqv(&args[1])))
}

fn eqv_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(eqv_direct, ctx, args, succeed, fail)
}

fn boolean_eq_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("boolean=?", args, 2)?;
    match (&args[0].kind, &args[1].kind) {
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Ok(Value::boolean(a == b)),
        _ => Err(SchemeException::message(
            "boolean=?: expected two booleans",
        )),
    }
}

fn boolean_eq_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(boolean_eq_direct, ctx, args, succeed, fail)
}

fn symbol_eq_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("symbol=?", args, 2)?;
    match (&args[0].kind, &args[1].kind) {
        (ValueKind::Symbol(a), ValueKind::Symbol(b)) => Ok(Value::boolean(a == b)),
        _ => Err(SchemeException::message("symbol=?: expected two symbols")),
    }
}

fn symbol_eq_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(symbol_eq_direct, ctx, args, succeed, fail)
}

fn char_eq_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("char=?", args, 2)?;
    match (&args[0].kind, &args[1].kind) {
        (ValueKind::Char(a), ValueKind::Char(b)) => Ok(Value::boolean(a == b)),
        _ => Err(SchemeException::message("char=?: expected two chars")),
    }
}

fn char_eq_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(char_eq_direct, ctx, args, succeed, fail)
}

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("eqv?", eqv_direct, eqv_cps);
    reg.add("boolean=?", boolean_eq_direct, boolean_eq_cps);
    reg.add("symbol=?", symbol_eq_direct, symbol_eq_cps);
    reg.add("char=?", char_eq_direct, char_eq_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eqv_compares_numbers_by_value_and_pairs_by_identity() {
        let ctx = InterpreterContext::new();
        assert!(eqv_direct(&ctx, &[Value::number(1.0), Value::number(1.0)])
            .unwrap()
            .is_truthy());
        let a = Value::cons(Value::number(1.0), Value::nil());
        let b = Value::cons(Value::number(1.0), Value::nil());
        assert!(!eqv_direct(&ctx, &[a, b]).unwrap().is_truthy());
    }

    #[test]
    fn typed_equalities_reject_mismatched_types() {
        let ctx = InterpreterContext::new();
        assert!(symbol_eq_direct(&ctx, &[Value::symbol("a"), Value::number(1.0)]).is_err());
        assert!(char_eq_direct(&ctx, &[Value::char('a'), Value::char('a')])
            .unwrap()
            .is_truthy());
    }
}
