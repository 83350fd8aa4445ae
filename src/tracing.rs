// ABOUTME: Tracing evaluator -- builds a tree of Cells recording exactly how a program evaluated

use crate::context::InterpreterContext;
use crate::env::Environment;
use crate::error::BuildError;
use crate::ir::{literal_value, IrNode, IrNodeKind, LambdaNode, VarRef};
use crate::value::{Value, ValueKind};
use std::cell::RefCell;
use std::rc::Rc;

/// A stable handle into a [`TracingGraph`]'s cell arena, in the same
/// never-reused-index style as `dataflow::NodeId` (arena-allocated nodes
/// identified by small integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(usize);

/// One per IR node form, plus the three cell kinds added on top of the
/// IR shape: `Call` (a lambda invocation, owning its body subtree), `Read`
/// (a variable lookup, child of the `Variable` cell that performed it), and
/// `Write` (a binding introduced by `Assign` or by entering a lambda call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Constant,
    Variable,
    Assign,
    If,
    Lambda,
    Sequence,
    Apply,
    Letrec,
    Input,
    Call,
    Read,
    Write,
}

impl CellKind {
    pub fn label(&self) -> &'static str {
        match self {
            CellKind::Constant => "Constant",
            CellKind::Variable => "Variable",
            CellKind::Assign => "Assign",
            CellKind::If => "If",
            CellKind::Lambda => "Lambda",
            CellKind::Sequence => "Sequence",
            CellKind::Apply => "Apply",
            CellKind::Letrec => "Letrec",
            CellKind::Input => "Input",
            CellKind::Call => "Call",
            CellKind::Read => "Read",
            CellKind::Write => "Write",
        }
    }
}

/// What a cell was built from, kept around so [`TracingGraph::reevaluate`]
/// can re-run the same kind-specific helper. `Read`/`Write` cells carry no
/// IR of their own -- they record bookkeeping about a `Variable`/`Assign`
/// cell's binding, not a node that can be re-walked independently.
enum Recipe {
    Node {
        ir: Rc<IrNode>,
        env: Rc<Environment>,
        tenv: Rc<TraceFrame>,
    },
    /// A lambda call's body, re-entered with the environment the call
    /// constructed (distinct from `Node` only in bookkeeping terms: it is
    /// what `Call` reevaluates).
    CallBody {
        body: Rc<IrNode>,
        env: Rc<Environment>,
        tenv: Rc<TraceFrame>,
    },
    /// Variable name read, for a `Read` cell: re-fetches the current
    /// producer/value pair from `tenv` rather than recursing into an IR
    /// node.
    ReadBinding { depth: usize, index: usize },
    /// No recipe: an input's value is set externally via `update_input`,
    /// and a bare `Write`'s value is just its one child's value.
    None,
}

struct CellNode {
    kind: CellKind,
    value: Value,
    name: Option<String>,
    /// For a `Read`/`Variable` cell, the cell currently bound to that slot
    /// -- follow the chain back to whatever last wrote it.
    producer: Option<CellId>,
    parent: Option<CellId>,
    children: Vec<CellId>,
    dirty: bool,
    recipe: Recipe,
}

/// A persistent snapshot of "which cell produced the value in each
/// resolved variable slot", parallel in shape to an [`Environment`] frame
/// but carrying `CellId`s instead of `Value`s (a "live binding set").
/// Kept as its own chain rather than folded into `Environment::Variable`
/// so the three value-only evaluators never pay for tracing bookkeeping.
struct TraceFrame {
    outer: Option<Rc<TraceFrame>>,
    producers: RefCell<Vec<CellId>>,
}

impl TraceFrame {
    fn root() -> Rc<Self> {
        Rc::new(TraceFrame {
            outer: None,
            producers: RefCell::new(Vec::new()),
        })
    }

    fn child(outer: Rc<TraceFrame>, producers: Vec<CellId>) -> Rc<Self> {
        Rc::new(TraceFrame {
            outer: Some(outer),
            producers: RefCell::new(producers),
        })
    }

    fn frame_at(self: &Rc<Self>, depth: usize) -> Rc<TraceFrame> {
        let mut frame = self.clone();
        for _ in 0..depth {
            frame = frame
                .outer
                .clone()
                .expect("VarRef depth exceeds the trace-binding chain length");
        }
        frame
    }

    fn get(self: &Rc<Self>, depth: usize, index: usize) -> CellId {
        self.frame_at(depth).producers.borrow()[index]
    }

    fn set(self: &Rc<Self>, depth: usize, index: usize, cell: CellId) {
        self.frame_at(depth).producers.borrow_mut()[index] = cell;
    }
}

/// Failure channel for cell-tree construction. Mirrors the direct
/// evaluator's split: a `BuildError` from an unsupported
/// operation is fatal for the whole run, matching the reactive evaluator's
/// "exceptions during graph construction are fatal" policy -- tracing
/// is, like dataflow, an incremental-recomputation evaluator rather than
/// one with its own non-local-exit machinery, so `try`/`throw` are
/// unsupported here exactly as `Input` is unsupported in direct mode.
pub type TracingResult = Result<CellId, BuildError>;

/// Builds and incrementally re-evaluates a tree of evaluation [`CellId`]s
/// Owns its own arena (never shared across graphs, mirroring
/// `InterpreterContext`/`DataflowGraph`'s per-instance state) and a small
/// named-input registry: a tracing run's reactive
/// inputs are simpler than the full dataflow graph's -- only the
/// `Input` cell and its dirtied ancestors need to recompute -- so each
/// `Input` cell doubles as its own reactive source rather than wrapping a
/// separate `DataflowGraph` node.
pub struct TracingGraph {
    cells: Vec<Option<CellNode>>,
    inputs: std::collections::HashMap<String, CellId>,
    unspecified_sentinel: Option<CellId>,
}

impl TracingGraph {
    pub fn new() -> Self {
        TracingGraph {
            cells: Vec::new(),
            inputs: std::collections::HashMap::new(),
            unspecified_sentinel: None,
        }
    }

    fn alloc(
        &mut self,
        kind: CellKind,
        value: Value,
        parent: Option<CellId>,
        recipe: Recipe,
    ) -> CellId {
        let id = CellId(self.cells.len());
        self.cells.push(Some(CellNode {
            kind,
            value,
            name: None,
            producer: None,
            parent,
            children: Vec::new(),
            dirty: false,
            recipe,
        }));
        id
    }

    fn cell(&self, id: CellId) -> &CellNode {
        self.cells[id.0]
            .as_ref()
            .expect("tracing bookkeeping bug: cell accessed after release")
    }

    fn cell_mut(&mut self, id: CellId) -> &mut CellNode {
        self.cells[id.0]
            .as_mut()
            .expect("tracing bookkeeping bug: cell accessed after release")
    }

    pub fn value_of(&self, id: CellId) -> &Value {
        &self.cell(id).value
    }

    pub fn kind_of(&self, id: CellId) -> CellKind {
        self.cell(id).kind
    }

    pub fn children_of(&self, id: CellId) -> &[CellId] {
        &self.cell(id).children
    }

    pub fn is_dirty(&self, id: CellId) -> bool {
        self.cell(id).dirty
    }

    pub fn name_of(&self, id: CellId) -> Option<&str> {
        self.cell(id).name.as_deref()
    }

    pub fn producer_of(&self, id: CellId) -> Option<CellId> {
        self.cell(id).producer
    }

    fn sentinel(&mut self) -> CellId {
        if let Some(id) = self.unspecified_sentinel {
            return id;
        }
        let id = self.alloc(CellKind::Constant, Value::unspecified(), None, Recipe::None);
        self.unspecified_sentinel = Some(id);
        id
    }

    fn push_child(&mut self, parent: CellId, child: CellId) {
        self.cell_mut(parent).children.push(child);
    }

    /// Registers a reactive input before evaluation begins. Reusing a
    /// name is a bookkeeping error, matching `DataflowGraph::create_input`.
    pub fn create_input(&mut self, name: impl Into<String>, initial: Value) -> CellId {
        let name = name.into();
        assert!(
            !self.inputs.contains_key(&name),
            "reactive input `{}` already registered",
            name
        );
        let id = self.alloc(CellKind::Input, initial, None, Recipe::None);
        self.cell_mut(id).name = Some(name.clone());
        self.inputs.insert(name, id);
        id
    }

    /// Updates a registered input's value and marks it and every ancestor
    /// dirty ("every InputCell subscribed to it marks
    /// itself and all ancestors dirty"). A no-op if the value's identity
    /// did not actually change, so a subsequent `reevaluate` is idempotent.
    pub fn update_input(&mut self, name: &str, value: Value) {
        let id = *self
            .inputs
            .get(name)
            .unwrap_or_else(|| panic!("unknown reactive input `{}`", name));
        if self.cell(id).value.same_identity(&value) {
            return;
        }
        self.cell_mut(id).value = value;
        self.mark_dirty_upward(id);
    }

    fn mark_dirty_upward(&mut self, mut id: CellId) {
        loop {
            self.cell_mut(id).dirty = true;
            match self.cell(id).parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
    }

    /// Builds the whole cell tree for `ir` under `env`, the top-level
    /// global environment (normally from `crate::builtins::register_builtins`).
    pub fn build(&mut self, ir: &Rc<IrNode>, env: &Rc<Environment>, ctx: &InterpreterContext) -> TracingResult {
        let tenv = TraceFrame::root();
        let sentinel = self.sentinel();
        for _ in 0..env.slot_count() {
            tenv.producers.borrow_mut().push(sentinel);
        }
        self.eval_tracing(ir, env, &tenv, None, ctx)
    }

    fn eval_tracing(
        &mut self,
        node: &Rc<IrNode>,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
        ctx: &InterpreterContext,
    ) -> TracingResult {
        match &node.kind {
            IrNodeKind::Constant(expr) => {
                let id = self.alloc(
                    CellKind::Constant,
                    literal_value(expr),
                    parent,
                    Recipe::Node {
                        ir: node.clone(),
                        env: env.clone(),
                        tenv: tenv.clone(),
                    },
                );
                Ok(id)
            }
            IrNodeKind::Variable(r) => self.eval_variable(node, r, env, tenv, parent),
            IrNodeKind::Assign(r, body) => self.eval_assign(node, r, body, env, tenv, parent, ctx),
            IrNodeKind::If(cond, then_branch, else_branch) => {
                self.eval_if(node, cond, then_branch, else_branch, env, tenv, parent, ctx)
            }
            IrNodeKind::Lambda(lambda_node) => {
                let id = self.alloc(
                    CellKind::Lambda,
                    Value::lambda(env.clone(), lambda_node.clone()),
                    parent,
                    Recipe::Node {
                        ir: node.clone(),
                        env: env.clone(),
                        tenv: tenv.clone(),
                    },
                );
                Ok(id)
            }
            IrNodeKind::Sequence(head, tail) => self.eval_sequence(node, head, tail, env, tenv, parent, ctx),
            IrNodeKind::Apply { proc, args } => self.eval_apply(node, proc, args, env, tenv, parent, ctx),
            IrNodeKind::Letrec {
                inner_scope,
                bindings,
                body,
            } => self.eval_letrec(node, inner_scope, bindings, body, env, tenv, parent, ctx),
            IrNodeKind::Try { .. } | IrNodeKind::Throw(_) => Err(BuildError::UnsupportedForm {
                form: "try/throw".to_string(),
                range: node.range,
            }),
            IrNodeKind::Input(name) => {
                let id = *self.inputs.get(name).ok_or_else(|| BuildError::MalformedForm {
                    form: "input".to_string(),
                    detail: format!("`{}` was not registered with create_input before evaluation began", name),
                    range: node.range,
                })?;
                self.cell_mut(id).parent = parent;
                if let Some(p) = parent {
                    self.push_child(p, id);
                }
                Ok(id)
            }
        }
    }

    fn eval_variable(
        &mut self,
        node: &Rc<IrNode>,
        r: &VarRef,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
    ) -> TracingResult {
        let value = env.get_value(r.depth, r.index);
        let producer = tenv.get(r.depth, r.index);
        let var_id = self.alloc(
            CellKind::Variable,
            value.clone(),
            parent,
            Recipe::Node {
                ir: node.clone(),
                env: env.clone(),
                tenv: tenv.clone(),
            },
        );
        self.cell_mut(var_id).name = Some(r.name.clone());
        let read_id = self.alloc(
            CellKind::Read,
            value,
            Some(var_id),
            Recipe::ReadBinding {
                depth: r.depth,
                index: r.index,
            },
        );
        self.cell_mut(read_id).name = Some(r.name.clone());
        self.cell_mut(read_id).producer = Some(producer);
        self.push_child(var_id, read_id);
        Ok(var_id)
    }

    fn eval_assign(
        &mut self,
        node: &Rc<IrNode>,
        r: &VarRef,
        body: &Rc<IrNode>,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
        ctx: &InterpreterContext,
    ) -> TracingResult {
        let assign_id = self.alloc(
            CellKind::Assign,
            Value::unspecified(),
            parent,
            Recipe::Node {
                ir: node.clone(),
                env: env.clone(),
                tenv: tenv.clone(),
            },
        );
        self.cell_mut(assign_id).name = Some(r.name.clone());
        let body_id = self.eval_tracing(body, env, tenv, Some(assign_id), ctx)?;
        env.set_value(r.depth, r.index, self.value_of(body_id).clone());
        let write_id = self.write_binding(r, body_id, env, tenv, assign_id);
        self.push_child(assign_id, write_id);
        Ok(assign_id)
    }

    fn write_binding(
        &mut self,
        r: &VarRef,
        source: CellId,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: CellId,
    ) -> CellId {
        let value = self.value_of(source).clone();
        let write_id = self.alloc(CellKind::Write, value, Some(parent), Recipe::None);
        self.cell_mut(write_id).name = Some(r.name.clone());
        self.push_child(write_id, source);
        self.cell_mut(source).parent = Some(write_id);
        tenv.set(r.depth, r.index, write_id);
        let _ = env;
        write_id
    }

    fn eval_if(
        &mut self,
        node: &Rc<IrNode>,
        cond: &Rc<IrNode>,
        then_branch: &Rc<IrNode>,
        else_branch: &Rc<IrNode>,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
        ctx: &InterpreterContext,
    ) -> TracingResult {
        let if_id = self.alloc(
            CellKind::If,
            Value::unspecified(),
            parent,
            Recipe::Node {
                ir: node.clone(),
                env: env.clone(),
                tenv: tenv.clone(),
            },
        );
        let cond_id = self.eval_tracing(cond, env, tenv, Some(if_id), ctx)?;
        self.push_child(if_id, cond_id);
        let branch_ir = if self.value_of(cond_id).is_truthy() {
            then_branch
        } else {
            else_branch
        };
        let branch_id = self.eval_tracing(branch_ir, env, tenv, Some(if_id), ctx)?;
        self.push_child(if_id, branch_id);
        self.cell_mut(if_id).value = self.value_of(branch_id).clone();
        Ok(if_id)
    }

    fn eval_sequence(
        &mut self,
        node: &Rc<IrNode>,
        head: &Rc<IrNode>,
        tail: &Rc<IrNode>,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
        ctx: &InterpreterContext,
    ) -> TracingResult {
        let seq_id = self.alloc(
            CellKind::Sequence,
            Value::unspecified(),
            parent,
            Recipe::Node {
                ir: node.clone(),
                env: env.clone(),
                tenv: tenv.clone(),
            },
        );
        let head_id = self.eval_tracing(head, env, tenv, Some(seq_id), ctx)?;
        self.push_child(seq_id, head_id);
        let tail_id = self.eval_tracing(tail, env, tenv, Some(seq_id), ctx)?;
        self.push_child(seq_id, tail_id);
        self.cell_mut(seq_id).value = self.value_of(tail_id).clone();
        Ok(seq_id)
    }

    fn eval_letrec(
        &mut self,
        node: &Rc<IrNode>,
        inner_scope: &Rc<crate::scope::LexicalScope>,
        bindings: &[(VarRef, Rc<IrNode>)],
        body: &Rc<IrNode>,
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
        ctx: &InterpreterContext,
    ) -> TracingResult {
        let letrec_id = self.alloc(
            CellKind::Letrec,
            Value::unspecified(),
            parent,
            Recipe::Node {
                ir: node.clone(),
                env: env.clone(),
                tenv: tenv.clone(),
            },
        );
        let inner_env = Environment::extend_unspecified(inner_scope.clone(), env.clone());
        let sentinel = self.sentinel();
        let inner_tenv = TraceFrame::child(tenv.clone(), vec![sentinel; bindings.len()]);
        for (r, init) in bindings {
            let init_id = self.eval_tracing(init, &inner_env, &inner_tenv, Some(letrec_id), ctx)?;
            inner_env.set_value(r.depth, r.index, self.value_of(init_id).clone());
            let write_id = self.write_binding(r, init_id, &inner_env, &inner_tenv, letrec_id);
            self.push_child(letrec_id, write_id);
        }
        let body_id = self.eval_tracing(body, &inner_env, &inner_tenv, Some(letrec_id), ctx)?;
        self.push_child(letrec_id, body_id);
        self.cell_mut(letrec_id).value = self.value_of(body_id).clone();
        Ok(letrec_id)
    }

    fn eval_apply(
        &mut self,
        node: &Rc<IrNode>,
        proc: &Rc<IrNode>,
        args: &[Rc<IrNode>],
        env: &Rc<Environment>,
        tenv: &Rc<TraceFrame>,
        parent: Option<CellId>,
        ctx: &InterpreterContext,
    ) -> TracingResult {
        let apply_id = self.alloc(
            CellKind::Apply,
            Value::unspecified(),
            parent,
            Recipe::Node {
                ir: node.clone(),
                env: env.clone(),
                tenv: tenv.clone(),
            },
        );
        let proc_id = self.eval_tracing(proc, env, tenv, Some(apply_id), ctx)?;
        self.push_child(apply_id, proc_id);
        let proc_val = self.value_of(proc_id).clone();
        let mut arg_ids = Vec::with_capacity(args.len());
        for a in args {
            arg_ids.push(self.eval_tracing(a, env, tenv, Some(apply_id), ctx)?);
        }
        // Ownership of each argument cell depends on what's being called: a
        // builtin call keeps them as direct children of this Apply cell,
        // while a lambda call hands them off to dispatch_call, which
        // reparents each one under its own Write cell inside the Call frame
        // (pushing here too would double-parent them).
        if matches!(proc_val.kind, ValueKind::BuiltinProc { .. }) {
            for &arg_id in &arg_ids {
                self.push_child(apply_id, arg_id);
            }
        }
        let value = self.dispatch_call(apply_id, &proc_val, &arg_ids, ctx, node)?;
        self.cell_mut(apply_id).value = value;
        Ok(apply_id)
    }

    /// Dispatches an already-traced procedure value to its (already-traced)
    /// argument cells. Builtins are evaluated in place (matching the
    /// dataflow evaluator's choice to wrap runtime errors as `Value::Error`
    /// rather than abort the whole tree); a `LambdaProc` gets a `Call`
    /// cell owning a freshly traced body subtree.
    fn dispatch_call(
        &mut self,
        apply_id: CellId,
        proc_val: &Value,
        arg_ids: &[CellId],
        ctx: &InterpreterContext,
        node: &Rc<IrNode>,
    ) -> Result<Value, BuildError> {
        match &proc_val.kind {
            ValueKind::BuiltinProc { name, direct_fn, .. } => {
                let args: Vec<Value> = arg_ids.iter().map(|a| self.value_of(*a).clone()).collect();
                Ok(match direct_fn(ctx, &args) {
                    Ok(v) => v,
                    Err(e) => Value::error(BuildError::UnsupportedForm {
                        form: format!("{}: {}", name, e),
                        range: node.range,
                    }),
                })
            }
            ValueKind::LambdaProc {
                captured_env,
                lambda_node,
            } => {
                if arg_ids.len() != lambda_node.params.len() {
                    return Err(BuildError::ArityMismatch {
                        form: "lambda".to_string(),
                        expected: lambda_node.params.len().to_string(),
                        found: arg_ids.len(),
                        range: lambda_node.range,
                    });
                }
                let call_id = self.alloc(CellKind::Call, Value::unspecified(), Some(apply_id), Recipe::None);
                self.push_child(apply_id, call_id);
                let call_env = Environment::extend(
                    lambda_node.inner_scope.clone(),
                    captured_env.clone(),
                    arg_ids.iter().map(|a| self.value_of(*a).clone()).collect(),
                );
                let call_tenv = TraceFrame::child(TraceFrame::root(), Vec::new());
                // The call frame's outer is the *captured* lexical scope's
                // trace chain, not the caller's -- mirroring how
                // `captured_env` (not the caller's `env`) is what
                // `Environment::extend` chains onto (the lambda-application
                // contract). We do not track a captured TraceFrame on
                // `LambdaProc` today, so parameter reads resolve only within
                // the call; a param referencing an enclosing binding falls
                // back to the environment's own value with no producer
                // provenance, which only affects rendering, not values.
                let mut params_tenv = Vec::with_capacity(arg_ids.len());
                for (i, arg_id) in arg_ids.iter().enumerate() {
                    let param_ref = VarRef {
                        name: lambda_node.params[i].clone(),
                        depth: 0,
                        index: i,
                        target_scope: lambda_node.inner_scope.clone(),
                    };
                    let write_id = self.write_binding(&param_ref, *arg_id, &call_env, &call_tenv, call_id);
                    self.cell_mut(*arg_id).parent = Some(write_id);
                    self.push_child(call_id, write_id);
                    params_tenv.push(write_id);
                }
                for (i, w) in params_tenv.into_iter().enumerate() {
                    call_tenv.producers.borrow_mut()[i] = w;
                    let _ = i;
                }
                let body_id = self.eval_tracing(&lambda_node.body, &call_env, &call_tenv, Some(call_id), ctx)?;
                self.push_child(call_id, body_id);
                self.cell_mut(call_id).value = self.value_of(body_id).clone();
                Ok(self.value_of(call_id).clone())
            }
            other => Err(BuildError::UnsupportedForm {
                form: format!("apply non-procedure ({})", other.type_name()),
                range: node.range,
            }),
        }
    }

    /// Re-runs every dirty cell reachable from `root`, depth-first,
    /// post-order (children before their parent, so a parent's
    /// recomputation sees fresh child values) --
    /// clear children via `release`, then re-run the kind helper.
    pub fn reevaluate(&mut self, root: CellId, ctx: &InterpreterContext) {
        if !self.is_dirty(root) {
            return;
        }
        let children: Vec<CellId> = self.children_of(root).to_vec();
        for child in &children {
            if self.cells[child.0].is_some() {
                self.reevaluate(*child, ctx);
            }
        }
        self.recompute_cell(root, ctx);
        self.cell_mut(root).dirty = false;
    }

    fn recompute_cell(&mut self, id: CellId, ctx: &InterpreterContext) {
        let recipe = std::mem::replace(&mut self.cell_mut(id).recipe, Recipe::None);
        match recipe {
            Recipe::Node { ir, env, tenv } => {
                self.clear_children(id);
                let parent = self.cell(id).parent;
                let new_id = self
                    .eval_tracing(&ir, &env, &tenv, parent, ctx)
                    .expect("reevaluation of a previously-valid subtree should not fail");
                self.splice_replacement(id, new_id);
            }
            Recipe::ReadBinding { depth, index } => {
                let tenv_owner = self.cell(id).parent.expect("a Read cell always has a Variable parent");
                // The enclosing Variable cell's own recipe carries the
                // `tenv` needed to resolve the binding; recover it rather
                // than storing a second copy on the Read cell itself.
                if let Recipe::Node { tenv, env, .. } = &self.cell(tenv_owner).recipe {
                    let producer = tenv.get(depth, index);
                    let value = env.get_value(depth, index);
                    self.cell_mut(id).producer = Some(producer);
                    self.cell_mut(id).value = value.clone();
                    self.cell_mut(tenv_owner).value = value;
                }
                self.cell_mut(id).recipe = Recipe::ReadBinding { depth, index };
            }
            Recipe::CallBody { .. } | Recipe::None => {
                // Write cells forward their single source child; Call cells
                // carry their parameter Write children first and the body
                // last, so the last child is always the value to forward.
                if let Some(&last_child) = self.cell(id).children.last() {
                    let v = self.value_of(last_child).clone();
                    self.cell_mut(id).value = v;
                }
            }
        }
    }

    /// Replaces `old`'s contents with `new`'s in place so `old`'s `CellId`
    /// (and thus every external reference to it, e.g. a parent's
    /// `children` list or a `Read`'s `producer`) stays valid after
    /// reevaluation, matching the dataflow evaluator's "object identity
    /// stable" discipline applied to cells instead of pairs.
    fn splice_replacement(&mut self, old: CellId, new: CellId) {
        let replacement = self.cells[new.0].take().expect("freshly built cell must exist");
        let parent = self.cell(old).parent;
        self.cells[old.0] = Some(CellNode { parent, ..replacement });
        for &child in &self.cell(old).children.clone() {
            self.cell_mut(child).parent = Some(old);
        }
    }

    /// Frees every child of `id` ("clear()s its children (releasing
    /// them via release())"), recursively. Does not free `id` itself.
    fn clear_children(&mut self, id: CellId) {
        let children = std::mem::take(&mut self.cell_mut(id).children);
        for child in children {
            self.release(child);
        }
    }

    fn release(&mut self, id: CellId) {
        if Some(id) == self.unspecified_sentinel {
            return;
        }
        if self.inputs.values().any(|&i| i == id) {
            return;
        }
        if let Some(node) = self.cells[id.0].take() {
            for child in node.children {
                self.release(child);
            }
        }
    }
}

impl Default for TracingGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_program;
    use crate::builtins::register_builtins;
    use crate::sexpr::read_one;

    fn build_tree(src: &str) -> (TracingGraph, CellId) {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one(src).unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let mut graph = TracingGraph::new();
        let root = graph.build(&Rc::new(node), &env, &ctx).expect("trace build should succeed");
        (graph, root)
    }

    #[test]
    fn root_cell_carries_the_expression_value() {
        let (graph, root) = build_tree("(+ 1 2 3)");
        assert_eq!(graph.value_of(root).as_number(), Some(6.0));
        assert_eq!(graph.kind_of(root), CellKind::Apply);
    }

    #[test]
    fn letrec_recursive_factorial_matches_direct_result() {
        let (graph, root) = build_tree(
            "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))",
        );
        assert_eq!(graph.value_of(root).as_number(), Some(120.0));
    }

    #[test]
    fn variable_cell_has_a_read_child() {
        let (graph, root) = build_tree("(letrec ((x 9)) x)");
        // root is the Letrec cell; its body child is the Variable cell for `x`.
        let children = graph.children_of(root);
        let body_cell = *children.last().unwrap();
        assert_eq!(graph.kind_of(body_cell), CellKind::Variable);
        let read_children = graph.children_of(body_cell);
        assert_eq!(read_children.len(), 1);
        assert_eq!(graph.kind_of(read_children[0]), CellKind::Read);
        assert_eq!(graph.value_of(read_children[0]).as_number(), Some(9.0));
    }

    #[test]
    fn input_cell_reevaluates_on_update() {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one("(+ (input n) 10)").unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let mut graph = TracingGraph::new();
        graph.create_input("n", Value::number(1.0));
        let root = graph.build(&Rc::new(node), &env, &ctx).expect("trace build should succeed");
        assert_eq!(graph.value_of(root).as_number(), Some(11.0));

        graph.update_input("n", Value::number(5.0));
        graph.reevaluate(root, &ctx);
        assert_eq!(graph.value_of(root).as_number(), Some(15.0));
    }

    #[test]
    fn reevaluation_without_input_change_is_idempotent() {
        let (mut graph, root) = build_tree("(+ 1 2 3)");
        let ctx = InterpreterContext::new();
        let before = graph.value_of(root).as_number();
        graph.reevaluate(root, &ctx);
        assert_eq!(graph.value_of(root).as_number(), before);
    }

    #[test]
    fn try_and_throw_are_unsupported_in_tracing_mode() {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one("(try (throw 1) (lambda (e) e))").unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let mut graph = TracingGraph::new();
        assert!(graph.build(&Rc::new(node), &env, &ctx).is_err());
    }

    #[test]
    fn builtin_runtime_error_is_captured_as_an_error_value_not_a_panic() {
        let (graph, root) = build_tree("(car 1)");
        assert_eq!(graph.value_of(root).type_name(), "error");
    }
}
