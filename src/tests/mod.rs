//! End-to-end scenarios: files built as syntax trees, loaded into an
//! `Interpreter` and run from `main`.

use crate::config::Options;
use crate::language::ast::*;
use crate::language::span::Span;
use crate::language::types::TypeExpr;
use crate::runtime::Interpreter;
use tracing_subscriber::EnvFilter;

mod concurrency;
mod control_flow;

/// Honors `RUST_LOG` so that a failing scenario can be rerun with the
/// interpreter's trace output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int() -> TypeExpr {
    TypeExpr::named("int")
}

fn func(name: &str, sig: FuncTypeExpr, body: Vec<Statement>) -> Decl {
    Decl::Func(FuncDecl {
        name: Identifier::new(name),
        sig,
        body: Block::new(body),
        span: Span::default(),
    })
}

fn main(body: Vec<Statement>) -> Decl {
    func("main", FuncTypeExpr::default(), body)
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::ident(name), args)
}

fn println(args: Vec<Expr>) -> Statement {
    Statement::expr(call("println", args))
}

fn make(ty: TypeExpr, size: Option<i64>) -> Expr {
    let mut args = vec![Expr::type_expr(ty)];
    args.extend(size.map(Expr::int));
    call("make", args)
}

fn interpreter(options: Options) -> Interpreter {
    init_tracing();
    Interpreter::new(options.capturing_output())
}

/// Loads `decls` as one file, runs `main` and returns what it printed.
fn run_file(decls: Vec<Decl>) -> String {
    let mut interpreter = interpreter(Options::default());
    interpreter.load(&File { decls }).expect("load");
    interpreter.run().expect("run");
    interpreter.take_output()
}
