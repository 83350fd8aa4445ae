// ABOUTME: Command-line front end selecting a rendering/evaluation strategy over one source file

use clap::Parser;
use lisp_eval_core::build::build;
use lisp_eval_core::builtins::register_builtins;
use lisp_eval_core::context::InterpreterContext;
use lisp_eval_core::cps_transform;
use lisp_eval_core::dataflow::DataflowGraph;
use lisp_eval_core::error::{BuildError, SchemeException};
use lisp_eval_core::eval_cps;
use lisp_eval_core::eval_direct::{eval_direct, DirectError};
use lisp_eval_core::sexpr::{read_all, SExpr, SExprKind};
use lisp_eval_core::simplify::simplify;
use lisp_eval_core::span::SourceRange;
use lisp_eval_core::tracing::TracingGraph;
use lisp_eval_core::tracing_render::{self, RenderOptions};
use lisp_eval_core::value::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

/// Runs a program through one of four evaluation back-ends sharing a
/// common IR, or prints an intermediate stage of the pipeline.
#[derive(Parser, Debug)]
#[command(name = "lisp-eval-core")]
#[command(version = lisp_eval_core::config::VERSION)]
#[command(about = "Runs a Scheme-flavored program through one of four evaluation back-ends")]
struct CliArgs {
    /// Source file to read.
    #[arg(value_name = "FILE")]
    source: PathBuf,

    /// Print the parsed program and exit, without evaluating it.
    #[arg(long)]
    print: bool,

    /// Print the simplified program (if/and/or desugared) and exit.
    #[arg(long = "simplify-only")]
    simplify_only: bool,

    /// Run the source-level CPS transform. Alone, prints the transformed
    /// program and exits; combined with an evaluation-strategy flag, runs
    /// the transformed program through that strategy instead of the
    /// original (pair with --cps-builtins and --direct to exercise it).
    #[arg(long = "cps-transform")]
    cps_transform: bool,

    /// Evaluate with the direct recursive evaluator (the default strategy).
    #[arg(long)]
    direct: bool,

    /// Evaluate with the CPS evaluator and its trampoline.
    #[arg(long)]
    cps: bool,

    /// Evaluate with the reactive dataflow graph.
    #[arg(long)]
    reactive: bool,

    /// Evaluate with the tracing cell-tree evaluator and render its tree.
    #[arg(long)]
    tracing: bool,

    /// Treat a builtin's trailing argument as a continuation to call with
    /// its result, as CPS-transformed source expects of every application.
    #[arg(long = "cps-builtins")]
    cps_builtins: bool,

    /// Collapse single-child Apply chains in tracing output.
    #[arg(long)]
    abbrev: bool,

    /// Cap the number of rows printed in tracing output.
    #[arg(long)]
    height: Option<usize>,
}

enum Strategy {
    Direct,
    Cps,
    Reactive,
    Tracing,
}

impl CliArgs {
    fn strategy(&self) -> Result<Strategy, String> {
        match (self.direct, self.cps, self.reactive, self.tracing) {
            (false, false, false, false) | (true, false, false, false) => Ok(Strategy::Direct),
            (false, true, false, false) => Ok(Strategy::Cps),
            (false, false, true, false) => Ok(Strategy::Reactive),
            (false, false, false, true) => Ok(Strategy::Tracing),
            _ => Err("at most one of --direct, --cps, --reactive, --tracing may be given".to_string()),
        }
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<(), String> {
    let filename = args.source.display().to_string();
    let source = std::fs::read_to_string(&args.source)
        .map_err(|e| format!("{}: cannot read file: {}", filename, e))?;

    let strategy = args.strategy()?;
    let forms = read_all(&source).map_err(|e| format!("{}: parse error: {}", filename, e))?;
    let program = combine_forms(forms);

    if args.print {
        println!("{}", program);
        return Ok(());
    }

    let ctx = if args.cps_builtins {
        InterpreterContext::with_cps_builtins()
    } else {
        InterpreterContext::new()
    };

    let simplified = simplify(&program, &ctx);
    if args.simplify_only {
        println!("{}", simplified);
        return Ok(());
    }

    let to_build = if args.cps_transform {
        let transformed = cps_transform::transform(&simplified, &SExpr::symbol("SUCC"), &ctx)
            .map_err(|e| fmt_build_error(&filename, &source, &e))?;
        if !args.direct && !args.cps && !args.reactive && !args.tracing {
            println!("{}", transformed);
            return Ok(());
        }
        transformed
    } else {
        simplified
    };

    let (scope, env) = register_builtins();
    let node = build(&to_build, &scope, &ctx).map_err(|e| fmt_build_error(&filename, &source, &e))?;

    match strategy {
        Strategy::Direct => match eval_direct(&node, &env, &ctx) {
            Ok(v) => {
                println!("{}", v);
                Ok(())
            }
            Err(DirectError::Scheme(exc)) => Err(fmt_scheme_exception(&filename, &source, &exc)),
            Err(DirectError::Unsupported(e)) => Err(fmt_build_error(&filename, &source, &e)),
        },
        Strategy::Cps => match eval_cps::run(&node, &env, &ctx) {
            Ok(v) => {
                println!("{}", v);
                Ok(())
            }
            Err(exc) => Err(fmt_scheme_exception(&filename, &source, &exc)),
        },
        Strategy::Reactive => {
            let mut graph = DataflowGraph::new();
            register_inputs(&to_build, |name| {
                graph.create_input(name, Value::number(0.0));
            });
            let id = graph
                .build_node(&Rc::new(node), &env, &ctx)
                .map_err(|e| fmt_build_error(&filename, &source, &e))?;
            println!("{}", graph.value_of(id));
            Ok(())
        }
        Strategy::Tracing => {
            let mut graph = TracingGraph::new();
            register_inputs(&to_build, |name| {
                graph.create_input(name, Value::number(0.0));
            });
            let root = graph
                .build(&Rc::new(node), &env, &ctx)
                .map_err(|e| fmt_build_error(&filename, &source, &e))?;
            let opts = RenderOptions {
                abbrev: args.abbrev,
                height: args.height,
            };
            println!("{}", tracing_render::render(&graph, root, opts));
            println!("=> {}", graph.value_of(root));
            Ok(())
        }
    }
}

/// Multiple top-level forms read from one file behave as an implicit
/// `begin`; a single form is used as-is so its range stays precise.
fn combine_forms(mut forms: Vec<SExpr>) -> SExpr {
    if forms.len() == 1 {
        forms.pop().expect("checked len == 1")
    } else {
        let mut items = vec![SExpr::symbol("begin")];
        items.extend(forms);
        SExpr::list(items)
    }
}

/// Scans the program for every `(input name)` occurrence and calls `register`
/// once per distinct name, in source order -- the reactive and tracing
/// evaluators require a name to be registered with an initial value before
/// a program referencing it can be built. A non-interactive
/// CLI run has no outside source of initial values, so every discovered
/// input starts at `0`.
fn register_inputs(expr: &SExpr, mut register: impl FnMut(&str)) {
    let mut seen = Vec::new();
    collect_input_names(expr, &mut seen);
    for name in seen {
        register(&name);
    }
}

fn collect_input_names(expr: &SExpr, out: &mut Vec<String>) {
    if let SExprKind::List(items) = &expr.kind {
        if items.first().and_then(|i| i.as_symbol()) == Some("input") {
            if let Some(name) = items.get(1).and_then(|i| i.as_symbol()) {
                if !out.iter().any(|n| n == name) {
                    out.push(name.to_string());
                }
            }
            return;
        }
        for item in items {
            collect_input_names(item, out);
        }
    }
}

fn fmt_build_error(filename: &str, source: &str, e: &BuildError) -> String {
    fmt_located(filename, source, e.range(), &e.to_string())
}

fn fmt_scheme_exception(filename: &str, source: &str, exc: &SchemeException) -> String {
    match exc.range {
        Some(range) => fmt_located(filename, source, range, &exc.value.to_string()),
        None => format!("{}: {}", filename, exc.value),
    }
}

/// `filename (line,col)-(line,col): message`, followed by the offending
/// source line with a caret under the error's starting column.
fn fmt_located(filename: &str, source: &str, range: SourceRange, message: &str) -> String {
    let mut out = format!("{} {}: {}", filename, range, message);
    if let Some(line) = source.lines().nth(range.start.line.saturating_sub(1)) {
        out.push('\n');
        out.push_str(line);
        out.push('\n');
        out.push_str(&" ".repeat(range.start.column.saturating_sub(1)));
        out.push('^');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_forms_wraps_multiple_top_level_forms_in_begin() {
        let forms = read_all("(+ 1 2) (* 3 4)").unwrap();
        let combined = combine_forms(forms);
        assert_eq!(combined.head_symbol(), Some("begin"));
    }

    #[test]
    fn combine_forms_leaves_a_single_form_untouched() {
        let forms = read_all("(+ 1 2)").unwrap();
        let combined = combine_forms(forms);
        assert_eq!(combined.head_symbol(), Some("+"));
    }

    #[test]
    fn collect_input_names_finds_every_distinct_name_once() {
        let (expr, _) = lisp_eval_core::sexpr::read_one("(+ (input n) (input m) (input n))").unwrap();
        let mut names = Vec::new();
        collect_input_names(&expr, &mut names);
        assert_eq!(names, vec!["n".to_string(), "m".to_string()]);
    }

    #[test]
    fn strategy_rejects_conflicting_flags() {
        let args = CliArgs {
            source: PathBuf::from("x.scm"),
            print: false,
            simplify_only: false,
            cps_transform: false,
            direct: true,
            cps: true,
            reactive: false,
            tracing: false,
            cps_builtins: false,
            abbrev: false,
            height: None,
        };
        assert!(args.strategy().is_err());
    }

    #[test]
    fn strategy_defaults_to_direct() {
        let args = CliArgs {
            source: PathBuf::from("x.scm"),
            print: false,
            simplify_only: false,
            cps_transform: false,
            direct: false,
            cps: false,
            reactive: false,
            tracing: false,
            cps_builtins: false,
            abbrev: false,
            height: None,
        };
        assert!(matches!(args.strategy(), Ok(Strategy::Direct)));
    }
}
