// ABOUTME: Per-interpreter mutable state grouped to avoid module-level singletons

use std::cell::Cell;

/// Groups the interpreter-wide mutable state that would otherwise live as
/// module statics: the `gensym` counter feeding the simplifier and CPS
/// transform. Dataflow's input registry and dirty queue are instead owned
/// directly by each `DataflowGraph` (see `src/dataflow.rs`), so that two
/// graphs built from two `InterpreterContext`s in one process never share
/// state either.
///
/// A host program constructs one `InterpreterContext` per independent
/// interpreter; nothing here is `Sync` and nothing needs to be, since the
/// whole evaluation core is single-threaded.
pub struct InterpreterContext {
    gensym_counter: Cell<u64>,
    /// Set by `--cps-builtins`: when true, `eval_direct::apply` treats a
    /// builtin's trailing argument as a continuation procedure rather than
    /// an ordinary operand, calling it with the builtin's result instead of
    /// returning the result directly. Needed to run source produced by
    /// `cps_transform::transform`, which threads a continuation as the
    /// trailing argument of *every* application, builtins included.
    cps_builtins: Cell<bool>,
}

impl InterpreterContext {
    pub fn new() -> Self {
        InterpreterContext {
            gensym_counter: Cell::new(0),
            cps_builtins: Cell::new(false),
        }
    }

    pub fn with_cps_builtins() -> Self {
        let ctx = Self::new();
        ctx.cps_builtins.set(true);
        ctx
    }

    pub fn cps_builtins_enabled(&self) -> bool {
        self.cps_builtins.get()
    }

    /// Allocates a globally-unique name for this context, optionally
    /// prefixed for readability in rendered/traced output.
    pub fn gensym(&self, prefix: &str) -> String {
        let n = self.gensym_counter.get();
        self.gensym_counter.set(n + 1);
        format!("{}%{}", prefix, n)
    }
}

impl Default for InterpreterContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gensym_names_are_unique_and_prefixed() {
        let ctx = InterpreterContext::new();
        let a = ctx.gensym("succ");
        let b = ctx.gensym("succ");
        assert_ne!(a, b);
        assert!(a.starts_with("succ%"));
    }

    #[test]
    fn cps_builtins_defaults_off_and_toggles_via_constructor() {
        assert!(!InterpreterContext::new().cps_builtins_enabled());
        assert!(InterpreterContext::with_cps_builtins().cps_builtins_enabled());
    }
}
