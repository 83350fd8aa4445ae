//! Pair operations: `cons car cdr`.
//!
//! `cons` is special under the reactive evaluator: a dataflow call
//! context may ask it to mutate an existing pair in place rather than
//! allocate, so `car`/`cdr` consumers recompute while the pair's identity
//! stays stable. That path lives in `crate::dataflow`; these are the plain
//! direct/CPS forms every evaluator shares.

use super::{direct_to_cps, require_arity, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value};

fn cons_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("cons", args, 2)?;
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn cons_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(cons_direct, ctx, args, succeed, fail)
}

fn car_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("car", args, 1)?;
    let cell = args[0]
        .as_pair()
        .ok_or_else(|| SchemeException::wrong_type("pair", args[0].type_name()))?;
    Ok(cell.borrow().0.clone())
}

fn car_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(car_direct, ctx, args, succeed, fail)
}

fn cdr_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("cdr", args, 1)?;
    let cell = args[0]
        .as_pair()
        .ok_or_else(|| SchemeException::wrong_type("pair", args[0].type_name()))?;
    Ok(cell.borrow().1.clone())
}

fn cdr_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(cdr_direct, ctx, args, succeed, fail)
}

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("cons", cons_direct, cons_cps);
    reg.add("car", car_direct, car_cps);
    reg.add("cdr", cdr_direct, cdr_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cons_car_cdr_round_trip() {
        let ctx = InterpreterContext::new();
        let pair = cons_direct(&ctx, &[Value::number(1.0), Value::number(2.0)]).unwrap();
        assert_eq!(car_direct(&ctx, &[pair.clone()]).unwrap().as_number(), Some(1.0));
        assert_eq!(cdr_direct(&ctx, &[pair]).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn car_of_non_pair_raises() {
        let ctx = InterpreterContext::new();
        assert!(car_direct(&ctx, &[Value::number(1.0)]).is_err());
    }
}
