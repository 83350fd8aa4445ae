// ABOUTME: Runtime frame chain mirroring the static LexicalScope chain

use crate::scope::LexicalScope;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A variable slot's contents. Direct, CPS, and tracing evaluation all
/// bind a slot straight to a `Value`; the reactive evaluator instead binds
/// it to the dataflow node currently producing that value.
#[derive(Debug, Clone)]
pub enum Variable {
    Bound(Value),
    Dataflow(crate::dataflow::NodeId),
}

/// A runtime frame instantiating one `LexicalScope`: a vector of
/// `Variable`s in the same order as the scope's slots, plus an optional
/// link to the frame instantiating the outer scope. Constructing one
/// checks an invariant: `env.scope.outer` and `env.outer.scope`
/// must name the same scope (or both be absent).
#[derive(Debug)]
pub struct Environment {
    pub scope: Rc<LexicalScope>,
    pub outer: Option<Rc<Environment>>,
    slots: Vec<RefCell<Variable>>,
}

impl Environment {
    /// Builds the outermost environment -- normally the global/builtin
    /// frame -- binding `values` to `scope`'s slots in order.
    pub fn root(scope: Rc<LexicalScope>, values: Vec<Value>) -> Rc<Self> {
        assert!(scope.outer.is_none(), "root environment scope must have no outer");
        assert_eq!(
            values.len(),
            scope.len(),
            "environment shape invariant violated: {} values for {} slots",
            values.len(),
            scope.len()
        );
        Rc::new(Environment {
            scope,
            outer: None,
            slots: values.into_iter().map(|v| RefCell::new(Variable::Bound(v))).collect(),
        })
    }

    /// Builds a frame for `scope` (an inner scope of `outer.scope`),
    /// populated with `values` in slot order.
    pub fn extend(scope: Rc<LexicalScope>, outer: Rc<Environment>, values: Vec<Value>) -> Rc<Self> {
        match &scope.outer {
            Some(scope_outer) => assert!(
                Rc::ptr_eq(scope_outer, &outer.scope),
                "environment shape invariant violated: scope.outer != outer.scope"
            ),
            None => panic!("extend() requires a scope with an outer link"),
        }
        assert_eq!(
            values.len(),
            scope.len(),
            "environment shape invariant violated: {} values for {} slots",
            values.len(),
            scope.len()
        );
        Environment {
            scope,
            outer: Some(outer),
            slots: values.into_iter().map(|v| RefCell::new(Variable::Bound(v))).collect(),
        }
        .into()
    }

    /// Same as `extend`, but every slot starts `Unspecified` (used by
    /// `letrec`: all bindings are visible but unset while
    /// initializers run).
    pub fn extend_unspecified(scope: Rc<LexicalScope>, outer: Rc<Environment>) -> Rc<Self> {
        let n = scope.len();
        Self::extend(scope, outer, (0..n).map(|_| Value::unspecified()).collect())
    }

    fn frame_at(self: &Rc<Self>, depth: usize) -> Rc<Environment> {
        let mut frame = self.clone();
        for _ in 0..depth {
            frame = frame
                .outer
                .clone()
                .expect("VarRef depth exceeds the environment chain length");
        }
        frame
    }

    pub fn get(self: &Rc<Self>, depth: usize, index: usize) -> Variable {
        let frame = self.frame_at(depth);
        frame.slots[index].borrow().clone()
    }

    pub fn get_value(self: &Rc<Self>, depth: usize, index: usize) -> Value {
        match self.get(depth, index) {
            Variable::Bound(v) => v,
            Variable::Dataflow(_) => {
                panic!("attempted direct-mode read of a reactive variable slot")
            }
        }
    }

    pub fn set_value(self: &Rc<Self>, depth: usize, index: usize, value: Value) {
        let frame = self.frame_at(depth);
        *frame.slots[index].borrow_mut() = Variable::Bound(value);
    }

    pub fn set_dataflow(self: &Rc<Self>, depth: usize, index: usize, node: crate::dataflow::NodeId) {
        let frame = self.frame_at(depth);
        *frame.slots[index].borrow_mut() = Variable::Dataflow(node);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_matches_scope_slot_count() {
        let root = LexicalScope::root();
        let mut inner = LexicalScope::child(root.clone());
        inner.add_own_slot("x");
        inner.add_own_slot("y");
        let inner = Rc::new(inner);

        let root_env = Environment::root(root, vec![]);
        let env = Environment::extend(
            inner.clone(),
            root_env,
            vec![Value::number(1.0), Value::number(2.0)],
        );
        assert_eq!(env.slot_count(), inner.len());
    }

    #[test]
    fn get_and_set_round_trip() {
        let root = LexicalScope::root();
        let mut inner = LexicalScope::child(root.clone());
        inner.add_own_slot("x");
        let inner = Rc::new(inner);

        let root_env = Environment::root(root, vec![]);
        let env = Environment::extend(inner, root_env, vec![Value::number(1.0)]);
        assert_eq!(env.get_value(0, 0).as_number(), Some(1.0));
        env.set_value(0, 0, Value::number(9.0));
        assert_eq!(env.get_value(0, 0).as_number(), Some(9.0));
    }

    #[test]
    #[should_panic(expected = "environment shape invariant violated")]
    fn extend_panics_on_scope_outer_mismatch() {
        let root = LexicalScope::root();
        let mut unrelated = LexicalScope::child(LexicalScope::root());
        unrelated.add_own_slot("z");
        let unrelated = Rc::new(unrelated);

        let root_env = Environment::root(root, vec![]);
        Environment::extend(unrelated, root_env, vec![Value::number(1.0)]);
    }
}
