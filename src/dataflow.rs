// ABOUTME: Reactive evaluator -- builds a dependency graph once, then reevaluates only what changed

use crate::context::InterpreterContext;
use crate::env::{Environment, Variable};
use crate::error::BuildError;
use crate::ir::{literal_value, IrNode, IrNodeKind, LambdaNode};
use crate::span::SourceRange;
use crate::value::{Value, ValueKind};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// A stable handle into a [`DataflowGraph`]'s node slab. Never reused for a
/// different node within one graph's lifetime -- `release` frees the slot
/// but a graph never recycles indices, so a dangling `NodeId` fails loudly
/// rather than silently aliasing another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The subgraph an `Apply` node is currently wired to, rebuilt whenever the
/// procedure value it depends on changes identity.
enum CallNode {
    Builtin {
        name: &'static str,
        direct_fn: crate::value::DirectFn,
    },
    Lambda {
        #[allow(dead_code)]
        call_env: Rc<Environment>,
        body_root: NodeId,
    },
}

enum DataflowNodeKind {
    Constant,
    Input {
        #[allow(dead_code)]
        name: String,
    },
    /// Forwards whatever node currently occupies an environment slot (the
    /// "Variable ... references the node currently bound in the resolved
    /// variable's slot"). `inputs[0]` is that producer.
    Variable,
    Lambda,
    Assign,
    If {
        cond: NodeId,
        branch: Cell<NodeId>,
        then_branch_is_live: Cell<bool>,
        env: Rc<Environment>,
        then_ir: Rc<IrNode>,
        else_ir: Rc<IrNode>,
    },
    Sequence,
    Apply {
        proc_id: NodeId,
        arg_ids: Vec<NodeId>,
        call: std::cell::RefCell<CallNode>,
        last_proc: std::cell::RefCell<Value>,
    },
    Letrec,
}

struct Node {
    kind: DataflowNodeKind,
    value: Value,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    dirty: bool,
}

/// Owns one reactive program's nodes, its process-wide dirty queue, and its
/// named input registry (these live on the graph
/// instance rather than a module static so two graphs in one process never
/// interfere, mirroring [`InterpreterContext`]).
pub struct DataflowGraph {
    nodes: Vec<Option<Node>>,
    dirty: VecDeque<NodeId>,
    inputs: HashMap<String, NodeId>,
}

impl DataflowGraph {
    pub fn new() -> Self {
        DataflowGraph {
            nodes: Vec::new(),
            dirty: VecDeque::new(),
            inputs: HashMap::new(),
        }
    }

    fn alloc(&mut self, kind: DataflowNodeKind, value: Value, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            kind,
            value,
            inputs,
            outputs: Vec::new(),
            dirty: false,
        }));
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0]
            .as_ref()
            .expect("dataflow bookkeeping bug: node accessed after release")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0]
            .as_mut()
            .expect("dataflow bookkeeping bug: node accessed after release")
    }

    pub fn value_of(&self, id: NodeId) -> &Value {
        &self.node(id).value
    }

    /// `addOutput(a -> b)`: records that `b` depends on `a`. Symmetric with
    /// [`Self::remove_output`]; a duplicate insertion is a bookkeeping bug.
    fn add_output(&mut self, a: NodeId, b: NodeId) {
        let outs = &mut self.node_mut(a).outputs;
        assert!(
            !outs.contains(&b),
            "dataflow bookkeeping bug: duplicate output edge"
        );
        outs.push(b);
    }

    fn remove_output(&mut self, a: NodeId, b: NodeId) {
        let outs = &mut self.node_mut(a).outputs;
        let pos = outs
            .iter()
            .position(|&x| x == b)
            .expect("dataflow bookkeeping bug: removing an absent output edge");
        outs.remove(pos);
    }

    /// `updateValue`: compares by reference equality, stamps and
    /// enqueues outputs only on an actual change. Enqueue is coalesced via
    /// the node's own dirty flag rather than de-duplicating the queue.
    fn update_value(&mut self, id: NodeId, new_value: Value) {
        let changed = !self.node(id).value.same_identity(&new_value);
        if !changed {
            return;
        }
        self.node_mut(id).value = new_value;
        let outputs = self.node(id).outputs.clone();
        for out in outputs {
            let n = self.node_mut(out);
            if !n.dirty {
                n.dirty = true;
                self.dirty.push_back(out);
            }
        }
    }

    /// Registers a named reactive input before evaluation begins. Reusing a
    /// name is an error.
    pub fn create_input(&mut self, name: impl Into<String>, initial: Value) -> NodeId {
        let name = name.into();
        assert!(
            !self.inputs.contains_key(&name),
            "reactive input `{}` already registered",
            name
        );
        let id = self.alloc(DataflowNodeKind::Input { name: name.clone() }, initial, vec![]);
        self.inputs.insert(name, id);
        id
    }

    /// `updateInput(name, v)`: mutates a registered input and enqueues its
    /// subscribers. Call [`Self::reevaluate_all`] to drain the resulting
    /// propagation.
    pub fn update_input(&mut self, name: &str, value: Value) {
        let id = *self
            .inputs
            .get(name)
            .unwrap_or_else(|| panic!("unknown reactive input `{}`", name));
        self.update_value(id, value);
    }

    /// `reevaluateDataflowGraph()`: drains the dirty queue to completion.
    /// FIFO over insertion order; correctness does not depend on
    /// topological order since every node recomputes from the *current*
    /// stored value of its inputs.
    pub fn reevaluate_all(&mut self, ctx: &InterpreterContext) {
        while let Some(id) = self.dirty.pop_front() {
            if !self.node(id).dirty {
                continue;
            }
            self.node_mut(id).dirty = false;
            self.reevaluate_node(id, ctx);
        }
    }

    fn reevaluate_node(&mut self, id: NodeId, ctx: &InterpreterContext) {
        match &self.node(id).kind {
            DataflowNodeKind::Constant | DataflowNodeKind::Input { .. } | DataflowNodeKind::Lambda => {}
            DataflowNodeKind::Assign => {}
            DataflowNodeKind::Variable | DataflowNodeKind::Sequence | DataflowNodeKind::Letrec => {
                let producer = *self.node(id).inputs.last().expect("non-leaf node has an input");
                let new_value = self.value_of(producer).clone();
                self.update_value(id, new_value);
            }
            DataflowNodeKind::If { .. } => self.reevaluate_if(id, ctx),
            DataflowNodeKind::Apply { .. } => self.reevaluate_apply(id, ctx),
        }
    }

    fn reevaluate_if(&mut self, id: NodeId, ctx: &InterpreterContext) {
        let (cond, old_branch, then_was_live, env, then_ir, else_ir) = match &self.node(id).kind {
            DataflowNodeKind::If {
                cond,
                branch,
                then_branch_is_live,
                env,
                then_ir,
                else_ir,
            } => (
                *cond,
                branch.get(),
                then_branch_is_live.get(),
                env.clone(),
                then_ir.clone(),
                else_ir.clone(),
            ),
            _ => unreachable!(),
        };
        let truthy = self.value_of(cond).is_truthy();
        if truthy == then_was_live {
            let value = self.value_of(old_branch).clone();
            self.update_value(id, value);
            return;
        }

        self.remove_output(old_branch, id);
        self.release(old_branch);
        let ir = if truthy { &then_ir } else { &else_ir };
        let new_branch = self
            .build_node(ir, &env, ctx)
            .expect("reactive if-branch rebuild failed");
        self.add_output(new_branch, id);
        match &self.node(id).kind {
            DataflowNodeKind::If {
                branch,
                then_branch_is_live,
                ..
            } => {
                branch.set(new_branch);
                then_branch_is_live.set(truthy);
            }
            _ => unreachable!(),
        }
        self.node_mut(id).inputs = vec![cond, new_branch];
        let value = self.value_of(new_branch).clone();
        self.update_value(id, value);
    }

    fn reevaluate_apply(&mut self, id: NodeId, ctx: &InterpreterContext) {
        let (proc_id, arg_ids) = match &self.node(id).kind {
            DataflowNodeKind::Apply { proc_id, arg_ids, .. } => (*proc_id, arg_ids.clone()),
            _ => unreachable!(),
        };
        let current_proc = self.value_of(proc_id).clone();
        let proc_changed = match &self.node(id).kind {
            DataflowNodeKind::Apply { last_proc, .. } => !last_proc.borrow().same_identity(&current_proc),
            _ => unreachable!(),
        };

        if proc_changed {
            let old_body_root = match &self.node(id).kind {
                DataflowNodeKind::Apply { call, .. } => match &*call.borrow() {
                    CallNode::Lambda { body_root, .. } => Some(*body_root),
                    CallNode::Builtin { .. } => None,
                },
                _ => unreachable!(),
            };
            if let Some(root) = old_body_root {
                self.remove_output(root, id);
                self.release(root);
            }
            let new_call = build_call(&current_proc, &arg_ids, self, ctx)
                .expect("reactive apply rebuild failed: procedure changed to an unsupported shape");
            let mut inputs = vec![proc_id];
            if let CallNode::Builtin { .. } = &new_call {
                inputs.extend(arg_ids.iter().copied());
            } else if let CallNode::Lambda { body_root, .. } = &new_call {
                self.add_output(*body_root, id);
                inputs.push(*body_root);
            }
            match &self.node(id).kind {
                DataflowNodeKind::Apply { call, last_proc, .. } => {
                    *call.borrow_mut() = new_call;
                    *last_proc.borrow_mut() = current_proc;
                }
                _ => unreachable!(),
            }
            self.node_mut(id).inputs = inputs;
        }

        let new_value = self.compute_call_value(id, ctx);
        self.apply_call_value(id, new_value);
    }

    /// Computes a call node's current value without committing it --
    /// `cons`'s in-place mutation needs to inspect the
    /// previous value before deciding whether to mutate or replace.
    fn compute_call_value(&self, id: NodeId, ctx: &InterpreterContext) -> Value {
        match &self.node(id).kind {
            DataflowNodeKind::Apply { call, arg_ids, .. } => match &*call.borrow() {
                CallNode::Lambda { body_root, .. } => self.value_of(*body_root).clone(),
                CallNode::Builtin { direct_fn, name } => {
                    let args: Vec<Value> = arg_ids.iter().map(|a| self.value_of(*a).clone()).collect();
                    if *name == "cons" && args.len() == 2 {
                        if let Some(existing) = self.node(id).value.as_pair() {
                            let (car, cdr) = existing.borrow().clone();
                            if !car.same_identity(&args[0]) || !cdr.same_identity(&args[1]) {
                                *existing.borrow_mut() = (args[0].clone(), args[1].clone());
                            }
                            return Value::from_pair_cell(existing.clone());
                        }
                    }
                    match direct_fn(ctx, &args) {
                        Ok(v) => v,
                        Err(e) => Value::error(BuildError::UnsupportedForm {
                            form: format!("{}: {}", name, e),
                            range: SourceRange::synthetic(),
                        }),
                    }
                }
            },
            _ => unreachable!(),
        }
    }

    fn apply_call_value(&mut self, id: NodeId, new_value: Value) {
        self.update_value(id, new_value);
    }

    /// Recursively tears down a subgraph rooted at `id` that is exclusively
    /// owned by its caller (the losing branch of an `if`, a replaced call
    /// subgraph). Stops at `Variable`/`Input`/`Constant`/`Lambda` nodes,
    /// since those either have no owned children or their single input
    /// edge points at a producer that predates this subtree and may still
    /// be observed elsewhere.
    fn release(&mut self, id: NodeId) {
        let node = self.nodes[id.0]
            .take()
            .expect("dataflow bookkeeping bug: double release");
        for input in &node.inputs {
            self.remove_output(*input, id);
        }
        let recurse_into_inputs = !matches!(
            node.kind,
            DataflowNodeKind::Variable | DataflowNodeKind::Input { .. } | DataflowNodeKind::Constant
        );
        if recurse_into_inputs {
            for input in node.inputs {
                if self.nodes[input.0].is_some() {
                    self.release(input);
                }
            }
        }
        if let DataflowNodeKind::Apply { call, .. } = node.kind {
            if let CallNode::Lambda { body_root, .. } = call.into_inner() {
                if self.nodes[body_root.0].is_some() {
                    self.release(body_root);
                }
            }
        }
    }

    /// Builds the dataflow subgraph for `ir` under `env` (whose slots must
    /// already be `Variable::Dataflow`-bound, or `Variable::Bound` for
    /// values -- such as builtins -- that never change reactively).
    pub fn build_node(
        &mut self,
        ir: &Rc<IrNode>,
        env: &Rc<Environment>,
        ctx: &InterpreterContext,
    ) -> Result<NodeId, BuildError> {
        match &ir.kind {
            IrNodeKind::Constant(expr) => Ok(self.alloc(DataflowNodeKind::Constant, literal_value(expr), vec![])),
            IrNodeKind::Variable(r) => match env.get(r.depth, r.index) {
                Variable::Bound(v) => Ok(self.alloc(DataflowNodeKind::Constant, v, vec![])),
                Variable::Dataflow(producer) => {
                    let value = self.value_of(producer).clone();
                    let id = self.alloc(DataflowNodeKind::Variable, value, vec![producer]);
                    self.add_output(producer, id);
                    Ok(id)
                }
            },
            IrNodeKind::Assign(r, body) => {
                let body_id = self.build_node(body, env, ctx)?;
                env.set_dataflow(r.depth, r.index, body_id);
                Ok(self.alloc(DataflowNodeKind::Assign, Value::unspecified(), vec![body_id]))
            }
            IrNodeKind::If(cond, then_branch, else_branch) => {
                let cond_id = self.build_node(cond, env, ctx)?;
                let truthy = self.value_of(cond_id).is_truthy();
                let branch_ir = if truthy { then_branch } else { else_branch };
                let branch_id = self.build_node(branch_ir, env, ctx)?;
                let value = self.value_of(branch_id).clone();
                let id = self.alloc(
                    DataflowNodeKind::If {
                        cond: cond_id,
                        branch: Cell::new(branch_id),
                        then_branch_is_live: Cell::new(truthy),
                        env: env.clone(),
                        then_ir: then_branch.clone(),
                        else_ir: else_branch.clone(),
                    },
                    value,
                    vec![cond_id, branch_id],
                );
                self.add_output(cond_id, id);
                self.add_output(branch_id, id);
                Ok(id)
            }
            IrNodeKind::Lambda(lambda_node) => Ok(self.alloc(
                DataflowNodeKind::Lambda,
                Value::lambda(env.clone(), lambda_node.clone()),
                vec![],
            )),
            IrNodeKind::Sequence(head, tail) => {
                let head_id = self.build_node(head, env, ctx)?;
                let tail_id = self.build_node(tail, env, ctx)?;
                let value = self.value_of(tail_id).clone();
                let id = self.alloc(DataflowNodeKind::Sequence, value, vec![head_id, tail_id]);
                self.add_output(head_id, id);
                self.add_output(tail_id, id);
                Ok(id)
            }
            IrNodeKind::Apply { proc, args } => {
                let proc_id = self.build_node(proc, env, ctx)?;
                let mut arg_ids = Vec::with_capacity(args.len());
                for a in args {
                    arg_ids.push(self.build_node(a, env, ctx)?);
                }
                let proc_val = self.value_of(proc_id).clone();
                let call = build_call(&proc_val, &arg_ids, self, ctx)?;
                let value = match &call {
                    CallNode::Builtin { direct_fn, name } => {
                        let arg_vals: Vec<Value> = arg_ids.iter().map(|a| self.value_of(*a).clone()).collect();
                        match direct_fn(ctx, &arg_vals) {
                            Ok(v) => v,
                            Err(e) => Value::error(BuildError::UnsupportedForm {
                                form: format!("{}: {}", name, e),
                                range: ir.range,
                            }),
                        }
                    }
                    CallNode::Lambda { body_root, .. } => self.value_of(*body_root).clone(),
                };
                let mut inputs = vec![proc_id];
                match &call {
                    CallNode::Builtin { .. } => inputs.extend(arg_ids.iter().copied()),
                    CallNode::Lambda { body_root, .. } => inputs.push(*body_root),
                }
                let id = self.alloc(
                    DataflowNodeKind::Apply {
                        proc_id,
                        arg_ids,
                        call: std::cell::RefCell::new(call),
                        last_proc: std::cell::RefCell::new(proc_val),
                    },
                    value,
                    inputs.clone(),
                );
                for input in inputs {
                    self.add_output(input, id);
                }
                Ok(id)
            }
            IrNodeKind::Letrec {
                inner_scope,
                bindings,
                body,
            } => {
                let inner_env = Environment::extend(
                    inner_scope.clone(),
                    env.clone(),
                    (0..bindings.len()).map(|_| Value::unspecified()).collect(),
                );
                let mut binding_ids = Vec::with_capacity(bindings.len());
                for (var_ref, init) in bindings {
                    let init_id = self.build_node(init, &inner_env, ctx)?;
                    inner_env.set_dataflow(var_ref.depth, var_ref.index, init_id);
                    binding_ids.push(init_id);
                }
                let body_id = self.build_node(body, &inner_env, ctx)?;
                let value = self.value_of(body_id).clone();
                let mut inputs = binding_ids;
                inputs.push(body_id);
                let id = self.alloc(DataflowNodeKind::Letrec, value, inputs.clone());
                for input in inputs {
                    self.add_output(input, id);
                }
                Ok(id)
            }
            IrNodeKind::Try { .. } | IrNodeKind::Throw(_) => Err(BuildError::UnsupportedForm {
                form: "try/throw".to_string(),
                range: ir.range,
            }),
            IrNodeKind::Input(name) => self.inputs.get(name).copied().ok_or_else(|| BuildError::MalformedForm {
                form: "input".to_string(),
                detail: format!("`{}` was not registered with create_input before evaluation began", name),
                range: ir.range,
            }),
        }
    }
}

impl Default for DataflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn build_call(
    proc_val: &Value,
    arg_ids: &[NodeId],
    graph: &mut DataflowGraph,
    ctx: &InterpreterContext,
) -> Result<CallNode, BuildError> {
    match &proc_val.kind {
        ValueKind::BuiltinProc { name, direct_fn, .. } => Ok(CallNode::Builtin {
            name: *name,
            direct_fn: *direct_fn,
        }),
        ValueKind::LambdaProc {
            captured_env,
            lambda_node,
        } => build_lambda_call(captured_env, lambda_node, arg_ids, graph, ctx),
        other => Err(BuildError::UnsupportedForm {
            form: format!("apply non-procedure ({})", other.type_name()),
            range: SourceRange::synthetic(),
        }),
    }
}

fn build_lambda_call(
    captured_env: &Rc<Environment>,
    lambda_node: &Rc<LambdaNode>,
    arg_ids: &[NodeId],
    graph: &mut DataflowGraph,
    ctx: &InterpreterContext,
) -> Result<CallNode, BuildError> {
    if arg_ids.len() != lambda_node.params.len() {
        return Err(BuildError::ArityMismatch {
            form: "lambda".to_string(),
            expected: lambda_node.params.len().to_string(),
            found: arg_ids.len(),
            range: lambda_node.range,
        });
    }
    let call_env = Environment::extend(
        lambda_node.inner_scope.clone(),
        captured_env.clone(),
        (0..arg_ids.len()).map(|_| Value::unspecified()).collect(),
    );
    for (i, arg_id) in arg_ids.iter().enumerate() {
        call_env.set_dataflow(0, i, *arg_id);
    }
    let body_root = graph.build_node(&lambda_node.body, &call_env, ctx)?;
    Ok(CallNode::Lambda {
        call_env,
        body_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_program;
    use crate::builtins::register_builtins;
    use crate::sexpr::read_one;

    fn build_reactive(src: &str, input_name: &str, initial: f64) -> (DataflowGraph, NodeId) {
        let ctx = InterpreterContext::new();
        let (scope, global_env) = register_builtins();
        let mut graph = DataflowGraph::new();
        graph.create_input(input_name, Value::number(initial));
        let (expr, _) = read_one(src).unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let root = graph
            .build_node(&Rc::new(node), &global_env, &ctx)
            .expect("graph build should succeed");
        (graph, root)
    }

    #[test]
    fn recomputes_downstream_arithmetic_on_input_change() {
        let (mut graph, root) = build_reactive("(+ (input n) 1)", "n", 10.0);
        let ctx = InterpreterContext::new();
        assert_eq!(graph.value_of(root).as_number(), Some(11.0));
        graph.update_input("n", Value::number(41.0));
        graph.reevaluate_all(&ctx);
        assert_eq!(graph.value_of(root).as_number(), Some(42.0));
    }

    #[test]
    fn no_change_between_reevaluations_is_idempotent() {
        let (mut graph, root) = build_reactive("(+ (input n) 1)", "n", 10.0);
        let ctx = InterpreterContext::new();
        let first = graph.value_of(root).as_number();
        graph.reevaluate_all(&ctx);
        assert_eq!(graph.value_of(root).as_number(), first);
    }

    #[test]
    fn if_rebuilds_the_losing_branch_when_selection_flips() {
        let (mut graph, root) = build_reactive("(if (= (input n) 0) 100 200)", "n", 0.0);
        let ctx = InterpreterContext::new();
        assert_eq!(graph.value_of(root).as_number(), Some(100.0));
        graph.update_input("n", Value::number(1.0));
        graph.reevaluate_all(&ctx);
        assert_eq!(graph.value_of(root).as_number(), Some(200.0));
    }

    #[test]
    fn cons_mutates_in_place_when_only_one_field_changes() {
        let (mut graph, root) = build_reactive("(cons (input n) 0)", "n", 1.0);
        let ctx = InterpreterContext::new();
        let first_cell = graph.value_of(root).as_pair().cloned().unwrap();
        graph.update_input("n", Value::number(2.0));
        graph.reevaluate_all(&ctx);
        let second_cell = graph.value_of(root).as_pair().cloned().unwrap();
        assert!(Rc::ptr_eq(&first_cell, &second_cell));
        assert_eq!(second_cell.borrow().0.as_number(), Some(2.0));
    }
}
