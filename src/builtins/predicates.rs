//! Type predicates: `boolean? symbol? pair? number? string? null? not`.

use super::{direct_to_cps, require_arity, BuiltinRegistry};
use crate::context::InterpreterContext;
use crate::error::SchemeException;
use crate::value::{Continuation, Trampoline, Value, ValueKind};

macro_rules! type_predicate {
    ($direct:ident, $cps:ident, $name:literal, $pattern:pat) => {
        fn $direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
            require_arity($name, args, 1)?;
            Ok(Value::boolean(matches!(args[0].kind, $pattern)))
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

type_predicate!(boolean_p_direct, boolean_p_cps, "boolean?", ValueKind::Boolean(_));
type_predicate!(symbol_p_direct, symbol_p_cps, "symbol?", ValueKind::Symbol(_));
type_predicate!(pair_p_direct, pair_p_cps, "pair?", ValueKind::Pair(_));
type_predicate!(number_p_direct, number_p_cps, "number?", ValueKind::Number(_));
type_predicate!(string_p_direct, string_p_cps, "string?", ValueKind::String(_));
type_predicate!(null_p_direct, null_p_cps, "null?", ValueKind::Nil);

fn not_direct(_ctx: &InterpreterContext, args: &[Value]) -> Result<Value, SchemeException> {
    require_arity("not", args, 1)?;
    Ok(Value::boolean(!args[0].is_truthy()))
}

fn not_cps(
    ctx: &InterpreterContext,
    args: &[Value],
    succeed: &Continuation,
    fail: &Continuation,
) -> Trampoline {
    direct_to_cps(not_direct, ctx, args, succeed, fail)
}

pub fn register(reg: &mut BuiltinRegistry) {
    reg.add("boolean?", boolean_p_direct, boolean_p_cps);
    reg.add("symbol?", symbol_p_direct, symbol_p_cps);
    reg.add("pair?", pair_p_direct, pair_p_cps);
    reg.add("number?", number_p_direct, number_p_cps);
    reg.add("string?", string_p_direct, string_p_cps);
    reg.add("null?", null_p_direct, null_p_cps);
    reg.add("not", not_direct, not_cps);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_distinguish_kinds() {
        let ctx = InterpreterContext::new();
        assert!(number_p_direct(&ctx, &[Value::number(1.0)]).unwrap().is_truthy());
        assert!(!number_p_direct(&ctx, &[Value::boolean(true)]).unwrap().is_truthy());
        assert!(null_p_direct(&ctx, &[Value::nil()]).unwrap().is_truthy());
        assert!(pair_p_direct(&ctx, &[Value::cons(Value::nil(), Value::nil())])
            .unwrap()
            .is_truthy());
    }

    #[test]
    fn not_negates_truthiness() {
        let ctx = InterpreterContext::new();
        assert!(not_direct(&ctx, &[Value::boolean(false)]).unwrap().is_truthy());
        assert!(!not_direct(&ctx, &[Value::number(0.0)]).unwrap().is_truthy());
    }
}
