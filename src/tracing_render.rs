// ABOUTME: Text rendering for tracing-evaluator cell trees -- the terminal-facing half of observability

use crate::tracing::{CellId, CellKind, TracingGraph};

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_DIRTY: &str = "\x1b[1;31m"; // bold red: a row whose value changed since the last render

/// One line of rendered output paired with the cell it came from, captured
/// before and after a reevaluation so a caller (the CLI, a future TUI) can
/// diff "what changed" without re-walking the tree itself ("recording an
/// EvaluationStep snapshot captures (cell, rendered_content)
/// before and after each stage").
#[derive(Debug, Clone)]
pub struct EvaluationStep {
    pub cell: CellId,
    pub rendered: String,
}

/// Rendering knobs driven by the CLI's `--abbrev`/`--height` flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Collapse a run of single-child `Apply` cells into one row, showing
    /// only the outermost and innermost frame of the chain.
    pub abbrev: bool,
    /// Cap the number of rows emitted; a truncation marker row is appended
    /// when more rows would otherwise have been produced.
    pub height: Option<usize>,
}

/// Removes ANSI SGR escape sequences (`\x1b[...m`) from `s`, used to
/// compute the true on-screen width of a rendered row regardless of the
/// color codes wrapped around it (an escape-stripper computes
/// display widths).
pub fn strip_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

pub fn display_width(s: &str) -> usize {
    strip_escapes(s).chars().count()
}

/// Renders the whole tree rooted at `root` as a multi-line string using
/// the standard tree-drawing prefixes (`├── `/`└── `).
pub fn render(graph: &TracingGraph, root: CellId, opts: RenderOptions) -> String {
    let mut lines = Vec::new();
    let mut truncated = false;
    render_node(graph, root, "", true, opts, &mut lines, &mut truncated);
    if truncated {
        lines.push("… (output truncated by --height)".to_string());
    }
    lines.join("\n")
}

/// Renders only the rows that changed, by walking the tree and emitting
/// one [`EvaluationStep`] per dirty cell -- the row format a caller would
/// diff against a prior [`render`] snapshot.
pub fn dirty_steps(graph: &TracingGraph, root: CellId) -> Vec<EvaluationStep> {
    let mut steps = Vec::new();
    collect_dirty(graph, root, steps_mut(&mut steps));
    steps
}

fn steps_mut(steps: &mut Vec<EvaluationStep>) -> &mut Vec<EvaluationStep> {
    steps
}

fn collect_dirty(graph: &TracingGraph, id: CellId, steps: &mut Vec<EvaluationStep>) {
    if graph.is_dirty(id) {
        steps.push(EvaluationStep {
            cell: id,
            rendered: row_text(graph, id),
        });
    }
    for &child in graph.children_of(id) {
        collect_dirty(graph, child, steps);
    }
}

fn row_text(graph: &TracingGraph, id: CellId) -> String {
    match graph.name_of(id) {
        Some(name) => format!("{} {} = {}", graph.kind_of(id).label(), name, graph.value_of(id)),
        None => format!("{} = {}", graph.kind_of(id).label(), graph.value_of(id)),
    }
}

/// Follows a chain of `Apply` cells that each call straight into another
/// `Apply` as their body (the call-chain pattern a recursive tail call
/// produces), returning the innermost cell in the chain and how many
/// intermediate frames were collapsed into it (0 if `id` is not such a
/// chain). Only the `Call` child drives the chase; an `Apply`'s own
/// operator/operand children are irrelevant to whether it is part of one.
fn collapse_apply_chain(graph: &TracingGraph, id: CellId) -> (CellId, usize) {
    let mut current = id;
    let mut depth = 0;
    loop {
        if graph.kind_of(current) != CellKind::Apply {
            break;
        }
        let call_child = graph
            .children_of(current)
            .iter()
            .find(|&&c| graph.kind_of(c) == CellKind::Call)
            .copied();
        let Some(call_id) = call_child else { break };
        match graph.children_of(call_id).last() {
            Some(&body) if graph.kind_of(body) == CellKind::Apply => {
                current = body;
                depth += 1;
            }
            _ => break,
        }
    }
    (current, depth)
}

fn render_node(
    graph: &TracingGraph,
    id: CellId,
    prefix: &str,
    is_root: bool,
    opts: RenderOptions,
    lines: &mut Vec<String>,
    truncated: &mut bool,
) {
    if let Some(cap) = opts.height {
        if lines.len() >= cap {
            *truncated = true;
            return;
        }
    }

    let (render_id, collapsed) = if opts.abbrev {
        collapse_apply_chain(graph, id)
    } else {
        (id, 0)
    };

    let connector = if is_root { "" } else { "" };
    let mut label = row_text(graph, render_id);
    if collapsed > 0 {
        label = format!("{} (+{} more apply frames)", label, collapsed);
    }
    if graph.is_dirty(render_id) {
        label = format!("{}{}{}", COLOR_DIRTY, label, COLOR_RESET);
    }
    lines.push(format!("{}{}{}", prefix, connector, label));

    let children = graph.children_of(render_id).to_vec();
    let child_count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let is_last = i + 1 == child_count;
        let branch = if is_last { "└── " } else { "├── " };
        let child_prefix = format!("{}{}", prefix, branch);
        let next_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
        render_child(graph, child, &child_prefix, &next_prefix, opts, lines, truncated);
    }
}

fn render_child(
    graph: &TracingGraph,
    id: CellId,
    own_prefix: &str,
    child_prefix: &str,
    opts: RenderOptions,
    lines: &mut Vec<String>,
    truncated: &mut bool,
) {
    if let Some(cap) = opts.height {
        if lines.len() >= cap {
            *truncated = true;
            return;
        }
    }
    let (render_id, collapsed) = if opts.abbrev {
        collapse_apply_chain(graph, id)
    } else {
        (id, 0)
    };
    let mut label = row_text(graph, render_id);
    if collapsed > 0 {
        label = format!("{} (+{} more apply frames)", label, collapsed);
    }
    if graph.is_dirty(render_id) {
        label = format!("{}{}{}", COLOR_DIRTY, label, COLOR_RESET);
    }
    lines.push(format!("{}{}", own_prefix, label));

    let children = graph.children_of(render_id).to_vec();
    let child_count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let is_last = i + 1 == child_count;
        let branch = if is_last { "└── " } else { "├── " };
        let next_own = format!("{}{}", child_prefix, branch);
        let next_child = format!("{}{}", child_prefix, if is_last { "    " } else { "│   " });
        render_child(graph, child, &next_own, &next_child, opts, lines, truncated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_program;
    use crate::builtins::register_builtins;
    use crate::context::InterpreterContext;
    use crate::sexpr::read_one;
    use std::rc::Rc;

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
    fn strip_escapes_removes_sgr_sequences() {
        let colored = format!("{}hello{}", COLOR_DIRTY, COLOR_RESET);
        assert_eq!(strip_escapes(&colored), "hello");
        assert_eq!(display_width(&colored), 5);
    }

    #[test]
    fn render_produces_a_nonempty_tree_drawing() {
        let (graph, root) = build_tree("(+ 1 2 3)");
        let text = render(&graph, root, RenderOptions::default());
        assert!(text.contains("Apply"));
        assert!(text.lines().count() > 1);
    }

    #[test]
    fn height_cap_truncates_output() {
        let (graph, root) = build_tree(
            "(letrec ((fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))",
        );
        let full = render(&graph, root, RenderOptions::default());
        let capped = render(&graph, root, RenderOptions { abbrev: false, height: Some(2) });
        assert!(capped.lines().count() < full.lines().count());
        assert!(capped.contains("truncated"));
    }

    #[test]
    fn dirty_steps_reports_only_changed_cells_after_an_input_update() {
        let ctx = InterpreterContext::new();
        let (scope, env) = register_builtins();
        let (expr, _) = read_one("(+ (input n) 10)").unwrap();
        let node = build_program(&expr, &scope, &ctx).expect("build should succeed");
        let mut graph = TracingGraph::new();
        graph.create_input("n", crate::value::Value::number(1.0));
        let root = graph.build(&Rc::new(node), &env, &ctx).expect("trace build should succeed");
        assert!(dirty_steps(&graph, root).is_empty());

        graph.update_input("n", crate::value::Value::number(5.0));
        let before_reeval = dirty_steps(&graph, root);
        assert!(!before_reeval.is_empty());
        graph.reevaluate(root, &ctx);
        assert!(dirty_steps(&graph, root).is_empty());
    }
}
