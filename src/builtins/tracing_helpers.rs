//! `SUCC`: the identity-like continuation builtin, used to
//! state the CPS-transform-soundness property: direct
//! evaluation of `(⟦e⟧ SUCC)` must equal direct evaluation of `e`, since
//! `(SUCC v)` is just `v`.

use super::{direct_to_cps, require_arity, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value};

fn succ_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("SUCC", args, 1)?;
    Ok(args[0].clone())
}

fn succ_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(succ_direct, ctx, args, succeed, fail)
}

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("SUCC", succ_direct, succ_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succ_returns_its_argument_unchanged() {
        let ctx = InterpreterContext::new();
        let v = succ_direct(&ctx, &[Value::number(42.0)]).unwrap();
        assert_eq!(v.as_number(), Some(42.0));
    }
}
