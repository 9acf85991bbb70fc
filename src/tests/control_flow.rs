use super::*;
use crate::language::types::{FuncType, Type};
use crate::runtime::value::Value;

fn lt(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOp::Lt, left, right)
}

fn add(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, left, right)
}

fn sub(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOp::Sub, left, right)
}

#[test]
fn recursive_fibonacci() {
    let sig = FuncTypeExpr::new(vec![Field::named("n", int())], vec![Field::anon(int())]);
    let fib = func(
        "fib",
        sig,
        vec![
            Statement::if_else(
                lt(Expr::ident("n"), Expr::int(2)),
                vec![Statement::ret(vec![Expr::ident("n")])],
                None,
            ),
            Statement::ret(vec![add(
                call("fib", vec![sub(Expr::ident("n"), Expr::int(1))]),
                call("fib", vec![sub(Expr::ident("n"), Expr::int(2))]),
            )]),
        ],
    );
    let output = run_file(vec![fib, main(vec![println(vec![call("fib", vec![Expr::int(15)])])])]);
    assert_eq!(output, "610\n");
}

#[test]
fn closures_share_captured_variables() {
    let counter_ty = TypeExpr::Func(Box::new(FuncTypeExpr::new(vec![], vec![Field::anon(int())])));
    let counter = func(
        "counter",
        FuncTypeExpr::new(vec![], vec![Field::anon(counter_ty)]),
        vec![
            Statement::define(&["n"], vec![Expr::int(0)]),
            Statement::ret(vec![Expr::func_lit(
                FuncTypeExpr::new(vec![], vec![Field::anon(int())]),
                vec![
                    Statement::inc(Expr::ident("n")),
                    Statement::ret(vec![Expr::ident("n")]),
                ],
            )]),
        ],
    );
    let output = run_file(vec![
        counter,
        main(vec![
            Statement::define(&["a", "b"], vec![call("counter", vec![]), call("counter", vec![])]),
            Statement::expr(call("a", vec![])),
            println(vec![call("a", vec![]), call("b", vec![])]),
        ]),
    ]);
    assert_eq!(output, "2 1\n");
}

#[test]
fn variadic_calls_pack_and_spread() {
    let sum = func(
        "sum",
        FuncTypeExpr {
            params: vec![Field::named("xs", int())],
            results: vec![Field::anon(int())],
            variadic: true,
        },
        vec![
            Statement::define(&["total"], vec![Expr::int(0)]),
            Statement::range(
                Some("_"),
                Some("x"),
                Expr::ident("xs"),
                vec![Statement::op_assign(BinaryOp::Add, Expr::ident("total"), Expr::ident("x"))],
            ),
            Statement::ret(vec![Expr::ident("total")]),
        ],
    );
    let numbers = Expr::slice_lit(int(), vec![Expr::int(4), Expr::int(5)]);
    let output = run_file(vec![
        sum,
        main(vec![
            Statement::define(&["xs"], vec![numbers]),
            Statement::assign(
                vec![Expr::ident("xs")],
                vec![call("append", vec![Expr::ident("xs"), Expr::int(6)])],
            ),
            println(vec![
                call("sum", vec![]),
                call("sum", vec![Expr::int(1), Expr::int(2)]),
                Expr::spread_call(Expr::ident("sum"), vec![Expr::ident("xs")]),
                call("len", vec![Expr::ident("xs")]),
            ]),
        ]),
    ]);
    assert_eq!(output, "0 3 15 3\n");
}

#[test]
fn map_lookup_reports_presence() {
    let ages = Expr::MapLiteral {
        key: TypeExpr::named("string"),
        value: int(),
        entries: vec![MapLiteralEntry {
            key: Expr::string("ann"),
            value: Expr::int(31),
        }],
        span: Span::default(),
    };
    let lookup = |key: &str| {
        Statement::Assign(AssignStmt {
            lhs: vec![Expr::ident("age"), Expr::ident("ok")],
            op: AssignOp::Assign,
            rhs: vec![Expr::index(Expr::ident("ages"), Expr::string(key))],
            span: Span::default(),
        })
    };
    let output = run_file(vec![main(vec![
        Statement::define(&["ages"], vec![ages]),
        Statement::var("age", Some(int()), None),
        Statement::var("ok", Some(TypeExpr::named("bool")), None),
        lookup("ann"),
        println(vec![Expr::ident("age"), Expr::ident("ok")]),
        lookup("bob"),
        println(vec![Expr::ident("age"), Expr::ident("ok")]),
        Statement::expr(call("delete", vec![Expr::ident("ages"), Expr::string("ann")])),
        println(vec![call("len", vec![Expr::ident("ages")])]),
    ])]);
    assert_eq!(output, "31 true\n0 false\n0\n");
}

#[test]
fn deferred_call_runs_after_panic() {
    let mut interpreter = interpreter(Options::default());
    let file = File {
        decls: vec![main(vec![
            Statement::defer(call("println", vec![Expr::string("cleanup")])),
            Statement::expr(call("panic", vec![Expr::string("boom")])),
            println(vec![Expr::string("unreachable")]),
        ])],
    };
    interpreter.load(&file).expect("load");
    let err = interpreter.run().expect_err("main panics");
    assert!(err.to_string().contains("boom"));
    assert_eq!(interpreter.take_output(), "cleanup\n");
}

#[test]
fn host_functions_are_callable() {
    let mut interpreter = interpreter(Options::default().with_trace(true));
    interpreter.define_native(
        "double",
        FuncType::new(vec![Type::Int], vec![Type::Int]),
        |_, args| {
            let value = args.first().map_or(Ok(0), Value::as_int)?;
            Ok(vec![Value::Int(value * 2)])
        },
    );
    let file = File {
        decls: vec![main(vec![println(vec![call("double", vec![Expr::int(21)])])])],
    };
    interpreter.load(&file).expect("load");
    interpreter.run().expect("run");
    assert_eq!(interpreter.take_output(), "42\n");
}
