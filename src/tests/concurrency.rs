use super::*;

fn chan_of_int() -> TypeExpr {
    TypeExpr::chan(int())
}

/// `func worker(id int, results chan int) { results <- id * id }`
fn worker() -> Decl {
    func(
        "worker",
        FuncTypeExpr::new(
            vec![Field::named("id", int()), Field::named("results", chan_of_int())],
            vec![],
        ),
        vec![Statement::send(
            Expr::ident("results"),
            Expr::binary(BinaryOp::Mul, Expr::ident("id"), Expr::ident("id")),
        )],
    )
}

#[test]
fn workers_report_through_buffered_channel() {
    let output = run_file(vec![
        worker(),
        main(vec![
            Statement::define(&["results"], vec![make(chan_of_int(), Some(4))]),
            Statement::range(
                Some("i"),
                None,
                Expr::int(4),
                vec![Statement::go(call("worker", vec![Expr::ident("i"), Expr::ident("results")]))],
            ),
            Statement::define(&["total"], vec![Expr::int(0)]),
            Statement::range(
                Some("_"),
                None,
                Expr::int(4),
                vec![Statement::op_assign(
                    BinaryOp::Add,
                    Expr::ident("total"),
                    Expr::recv(Expr::ident("results")),
                )],
            ),
            println(vec![Expr::ident("total")]),
        ]),
    ]);
    assert_eq!(output, "14\n");
}

#[test]
fn go_evaluates_arguments_before_the_loop_moves_on() {
    let output = run_file(vec![
        worker(),
        main(vec![
            Statement::define(&["results"], vec![make(chan_of_int(), None)]),
            Statement::define(&["i"], vec![Expr::int(3)]),
            Statement::go(call("worker", vec![Expr::ident("i"), Expr::ident("results")])),
            Statement::assign(vec![Expr::ident("i")], vec![Expr::int(100)]),
            println(vec![Expr::recv(Expr::ident("results"))]),
        ]),
    ]);
    assert_eq!(output, "9\n");
}

#[test]
fn select_waits_for_the_ready_channel() {
    let sender = Expr::func_lit(
        FuncTypeExpr::default(),
        vec![Statement::send(Expr::ident("fast"), Expr::string("fast"))],
    );
    let select = Statement::Select(SelectStmt {
        clauses: vec![
            CommClause::case(
                Statement::define(&["msg"], vec![Expr::recv(Expr::ident("slow"))]),
                vec![println(vec![Expr::string("slow"), Expr::ident("msg")])],
            ),
            CommClause::case(
                Statement::define(&["msg"], vec![Expr::recv(Expr::ident("fast"))]),
                vec![println(vec![Expr::ident("msg")])],
            ),
        ],
        span: Span::default(),
    });
    let output = run_file(vec![main(vec![
        Statement::define(&["slow"], vec![make(TypeExpr::chan(TypeExpr::named("string")), None)]),
        Statement::define(&["fast"], vec![make(TypeExpr::chan(TypeExpr::named("string")), None)]),
        Statement::go(Expr::call(sender, vec![])),
        select,
    ])]);
    assert_eq!(output, "fast\n");
}

#[test]
fn select_send_meets_select_receive() {
    let sender = Expr::func_lit(
        FuncTypeExpr::default(),
        vec![Statement::Select(SelectStmt {
            clauses: vec![CommClause::case(
                Statement::send(Expr::ident("ch"), Expr::int(1)),
                vec![],
            )],
            span: Span::default(),
        })],
    );
    let receive = Statement::Select(SelectStmt {
        clauses: vec![CommClause::case(
            Statement::define(&["v"], vec![Expr::recv(Expr::ident("ch"))]),
            vec![println(vec![Expr::ident("v")])],
        )],
        span: Span::default(),
    });
    let output = run_file(vec![main(vec![
        Statement::define(&["ch"], vec![make(chan_of_int(), None)]),
        Statement::go(Expr::call(sender, vec![])),
        receive,
    ])]);
    assert_eq!(output, "1\n");
}

#[test]
fn goroutine_panic_does_not_stop_main() {
    let mut interpreter = interpreter(Options::default());
    let crash = Expr::func_lit(
        FuncTypeExpr::default(),
        vec![
            Statement::expr(call("close", vec![Expr::ident("done")])),
            Statement::expr(call("panic", vec![Expr::string("worker failed")])),
        ],
    );
    let file = File {
        decls: vec![main(vec![
            Statement::define(&["done"], vec![make(chan_of_int(), None)]),
            Statement::go(Expr::call(crash, vec![])),
            Statement::expr(Expr::recv(Expr::ident("done"))),
            println(vec![Expr::string("main done")]),
        ])],
    };
    interpreter.load(&file).expect("load");
    interpreter.run().expect("main survives");
    assert_eq!(interpreter.take_output(), "main done\n");
    assert_eq!(interpreter.globals().tasks().failed(), 1);
}
