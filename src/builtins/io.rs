//! I/O operations: `display newline`.
//!
//! Writes to the process's stdout. This is the interpreter's only side
//! channel to the outside world ("no node suspends or blocks except
//! I/O in `display`/`newline`").

use super::{direct_to_cps, require_arity, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value};
use std::io::Write;

fn display_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("display", args, 1)?;
    print!("{}", args[0]);
    let _ = std::io::stdout().flush();
    Ok(Value::unspecified())
}

fn display_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(display_direct, ctx, args, succeed, fail)
}

fn newline_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("newline", args, 0)?;
    println!();
    Ok(Value::unspecified())
}

fn newline_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(newline_direct, ctx, args, succeed, fail)
}

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("display", display_direct, display_cps);
    reg.add("newline", newline_direct, newline_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_newline_return_unspecified() {
        let ctx = InterpreterContext::new();
        let d = display_direct(&ctx, &[Value::number(1.0)]).unwrap();
        assert!(matches!(d.kind, crate::value::ValueKind::Unspecified));
        let n = newline_direct(&ctx, &[]).unwrap();
        assert!(matches!(n.kind, crate::value::ValueKind::Unspecified));
    }

    #[test]
    fn display_requires_exactly_one_argument() {
        let ctx = InterpreterContext::new();
        assert!(display_direct(&ctx, &[]).is_err());
        assert!(display_direct(&ctx, &[Value::number(1.0), Value::number(2.0)]).is_err());
    }
}
