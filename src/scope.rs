// ABOUTME: Compile-time lexical scope tracking slot indices for the IR builder

use std::rc::Rc;

/// A resolved reference to a variable slot, as produced by `LexicalScope::lookup`
/// and stored on `IrNode::Variable`/`IrNode::Assign`. `depth` counts outer
/// links from the environment active at evaluation time (`depth = 0` is the
/// current frame); `index` is the slot position within that frame's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ref {
    pub depth: usize,
    pub index: usize,
}

/// One named slot in a `LexicalScope`. Slot identity (`Rc::ptr_eq` on the
/// containing `LexicalScope`, compared alongside `index`) is what the
/// slot-identity invariant: two `Ref`s naming the same scope
/// and index always resolve to the same logical binding.
#[derive(Debug, Clone)]
struct Slot {
    name: String,
}

/// An ordered list of slots, plus an optional outer scope, built once per
/// `lambda`/`letrec` and shared by every `Environment` instantiating it.
#[derive(Debug)]
pub struct LexicalScope {
    slots: Vec<Slot>,
    pub outer: Option<Rc<LexicalScope>>,
}

impl LexicalScope {
    pub fn root() -> Rc<Self> {
        Rc::new(Self::new_root())
    }

    /// Builds an owned, outer-less scope -- used to populate slots (e.g.
    /// the builtin registry's names) before wrapping it in an `Rc`.
    pub fn new_root() -> Self {
        LexicalScope {
            slots: Vec::new(),
            outer: None,
        }
    }

    pub fn child(outer: Rc<LexicalScope>) -> Self {
        LexicalScope {
            slots: Vec::new(),
            outer: Some(outer),
        }
    }

    /// Allocates a new slot for `name` in this scope, returning its index.
    /// Callers (the IR builder) are responsible for rejecting duplicate
    /// names within one scope before calling this, per the `letrec`/`lambda`
    /// parameter-list invariants.
    pub fn add_own_slot(&mut self, name: impl Into<String>) -> usize {
        self.slots.push(Slot { name: name.into() });
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot_name(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(|s| s.name.as_str())
    }

    /// Walks outward from this scope counting depth, returning the `Ref`
    /// for the nearest binding of `name`, searching innermost-first (a
    /// binding introduced in an inner scope shadows an outer one).
    pub fn lookup(&self, name: &str) -> Option<Ref> {
        let mut depth = 0;
        let mut current: Option<&LexicalScope> = Some(self);
        while let Some(scope) = current {
            if let Some(index) = scope.slots.iter().position(|s| s.name == name) {
                return Some(Ref { depth, index });
            }
            current = scope.outer.as_deref();
            depth += 1;
        }
        None
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_own_slot_at_depth_zero() {
        let mut scope = LexicalScope::child(LexicalScope::root());
        scope.add_own_slot("x");
        let r = scope.lookup("x").unwrap();
        assert_eq!(r.depth, 0);
        assert_eq!(r.index, 0);
    }

    #[test]
    fn lookup_walks_outward_and_counts_depth() {
        let root = LexicalScope::root();
        let mut outer = LexicalScope::child(root);
        outer.add_own_slot("a");
        let outer = Rc::new(outer);
        let mut inner = LexicalScope::child(outer.clone());
        inner.add_own_slot("b");

        assert_eq!(inner.lookup("b").unwrap().depth, 0);
        assert_eq!(inner.lookup("a").unwrap().depth, 1);
        assert_eq!(inner.lookup("missing"), None);
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let root = LexicalScope::root();
        let mut outer = LexicalScope::child(root);
        outer.add_own_slot("x");
        let outer = Rc::new(outer);
        let mut inner = LexicalScope::child(outer);
        inner.add_own_slot("x");

        assert_eq!(inner.lookup("x").unwrap().depth, 0);
    }
}
