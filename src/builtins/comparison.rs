//! Comparison operations: `= != < <= > >=`.
//!
//! All comparisons require exactly two numeric arguments: unlike
//! `+`/`*`, there is no n-ary chaining here.

use super::{direct_to_cps, require_arity, require_number, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value};

fn numeric_cmp(
    name: &str,
    args: &[Value],
    op: impl Fn(f64, f64) -> bool,
) -> Result<Value, SchemeException> {
    require_arity(name, args, 2)?;
    let a = require_number(name, &args[0])?;
    let b = require_number(name, &args[1])?;
    Ok(Value::boolean(op(a, b)))
}

macro_rules! comparison_builtin {
    ($direct:ident, $cps:ident, $name:literal, $op:expr) => {
        fn $direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
            numeric_cmp($name, args, $op)
        }

        fn $cps(
            ctx: &InterpreterContext,
            args: &[Value],
            succeed: &Continuation,
            fail: &Continuation,
        ) -> Trampoline {
            direct_to_cps($direct, ctx, args, succeed, fail)
        }
    };
}

comparison_builtin!(eq_direct, eq_cps, "=", |a, b| a == b);
comparison_builtin!(ne_direct, ne_cps, "!=", |a, b| a != b);
comparison_builtin!(lt_direct, lt_cps, "<", |a, b| a < b);
comparison_builtin!(le_direct, le_cps, "<=", |a, b| a <= b);
comparison_builtin!(gt_direct, gt_cps, ">", |a, b| a > b);
comparison_builtin!(ge_direct, ge_cps, ">=", |a, b| a >= b);

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("=", eq_direct, eq_cps);
    reg.add("!=", ne_direct, ne_cps);
    reg.add("<", lt_direct, lt_cps);
    reg.add("<=", le_direct, le_cps);
    reg.add(">", gt_direct, gt_cps);
    reg.add(">=", ge_direct, ge_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> Value {
        Value::number(v)
    }

    #[test]
    fn equality_compares_numbers() {
        let ctx = InterpreterContext::new();
        assert!(eq_direct(&ctx, &[n(5.0), n(5.0)]).unwrap().is_truthy());
        assert!(!eq_direct(&ctx, &[n(5.0), n(6.0)]).unwrap().is_truthy());
    }

    #[test]
    fn ordering_operators_match_numeric_order() {
        let ctx = InterpreterContext::new();
        assert!(lt_direct(&ctx, &[n(1.0), n(2.0)]).unwrap().is_truthy());
        assert!(!lt_direct(&ctx, &[n(2.0), n(2.0)]).unwrap().is_truthy());
        assert!(le_direct(&ctx, &[n(2.0), n(2.0)]).unwrap().is_truthy());
        assert!(gt_direct(&ctx, &[n(3.0), n(2.0)]).unwrap().is_truthy());
        assert!(ge_direct(&ctx, &[n(2.0), n(2.0)]).unwrap().is_truthy());
    }

    #[test]
    fn rejects_arity_other_than_two() {
        let ctx = InterpreterContext::new();
        assert!(lt_direct(&ctx, &[n(1.0)]).is_err());
        assert!(lt_direct(&ctx, &[n(1.0), n(2.0), n(3.0)]).is_err());
    }
}
