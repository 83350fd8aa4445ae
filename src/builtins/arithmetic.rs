//! Arithmetic operations: `+ - * / mod`.
//!
//! - `+`: sum of all arguments; zero args → `0`.
//! - `-`: subtract subsequent args from the first; one arg negates.
//! - `*`: product of all arguments; zero args → `1`.
//! - `/`: divide the first by subsequent args; one arg reciprocates. True
//!   division for every arity ≥ 1 (this crate resolves the historical open question against
//!   the historical subtracting `/`).
//! - `mod`: exactly two arguments.

use super::{direct_to_cps, require_number, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value};

fn add_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    let mut sum = 0.0;
    for a in args {
        sum += require_number("+", a)?;
    }
    Ok(Value::number(sum))
}

fn add_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(add_direct, ctx, args, succeed, fail)
}

fn sub_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    if args.is_empty() {
        return Err(SchemeException::message("-: expected at least 1 argument, found 0"));
    }
    let first = require_number("-", &args[0])?;
    if args.len() == 1 {
        return Ok(Value::number(-first));
    }
    let mut acc = first;
    for a in &args[1..] {
        acc -= require_number("-", a)?;
    }
    Ok(Value::number(acc))
}

fn sub_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(sub_direct, ctx, args, succeed, fail)
}

fn mul_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    let mut product = 1.0;
    for a in args {
        product *= require_number("*", a)?;
    }
    Ok(Value::number(product))
}

fn mul_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(mul_direct, ctx, args, succeed, fail)
}

fn div_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    if args.is_empty() {
        return Err(SchemeException::message("/: expected at least 1 argument, found 0"));
    }
    let first = require_number("/", &args[0])?;
    if args.len() == 1 {
        if first == 0.0 {
            return Err(SchemeException::message("/: division by zero"));
        }
        return Ok(Value::number(1.0 / first));
    }
    let mut acc = first;
    for a in &args[1..] {
        let divisor = require_number("/", a)?;
        if divisor == 0.0 {
            return Err(SchemeException::message("/: division by zero"));
        }
        acc /= divisor;
    }
    Ok(Value::number(acc))
}

fn div_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(div_direct, ctx, args, succeed, fail)
}

fn modulo_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    super::require_arity("mod", args, 2)?;
    let a = require_number("mod", &args[0])?;
    let b = require_number("mod", &args[1])?;
    if b == 0.0 {
        return Err(SchemeException::message("mod: division by zero"));
    }
    Ok(Value::number(a.rem_euclid(b)))
}

fn modulo_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(modulo_direct, ctx, args, succeed, fail)
}

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("+", add_direct, add_cps);
    reg.add("-", sub_direct, sub_cps);
    reg.add("*", mul_direct, mul_cps);
    reg.add("/", div_direct, div_cps);
    reg.add("mod", modulo_direct, modulo_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> Value {
        Value::number(v)
    }

    #[test]
    fn add_sums_and_defaults_to_zero() {
        let ctx = InterpreterContext::new();
        assert_eq!(add_direct(&ctx, &[]).unwrap().as_number(), Some(0.0));
        assert_eq!(
            add_direct(&ctx, &[n(1.0), n(2.0), n(3.0)]).unwrap().as_number(),
            Some(6.0)
        );
    }

    #[test]
    fn sub_negates_single_argument() {
        let ctx = InterpreterContext::new();
        assert_eq!(sub_direct(&ctx, &[n(5.0)]).unwrap().as_number(), Some(-5.0));
    }

    #[test]
    fn div_reciprocates_single_argument_and_divides_true() {
        let ctx = InterpreterContext::new();
        assert_eq!(div_direct(&ctx, &[n(4.0)]).unwrap().as_number(), Some(0.25));
        assert_eq!(
            div_direct(&ctx, &[n(10.0), n(2.0), n(5.0)]).unwrap().as_number(),
            Some(1.0)
        );
    }

    #[test]
    fn div_by_zero_raises_scheme_exception() {
        let ctx = InterpreterContext::new();
        assert!(div_direct(&ctx, &[n(1.0), n(0.0)]).is_err());
    }

    #[test]
    fn mod_requires_exactly_two_args() {
        let ctx = InterpreterContext::new();
        assert!(modulo_direct(&ctx, &[n(1.0)]).is_err());
        assert_eq!(
            modulo_direct(&ctx, &[n(7.0), n(3.0)]).unwrap().as_number(),
            Some(1.0)
        );
    }
}
