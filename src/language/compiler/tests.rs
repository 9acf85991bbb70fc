use super::*;
use crate::config::Options;
use crate::runtime::Interpreter;

fn int() -> TypeExpr {
    TypeExpr::named("int")
}

fn func_decl(name: &str, sig: FuncTypeExpr, body: Vec<Statement>) -> Decl {
    Decl::Func(FuncDecl {
        name: Identifier::new(name),
        sig,
        body: Block::new(body),
        span: Span::default(),
    })
}

fn main_file(body: Vec<Statement>) -> File {
    File {
        decls: vec![func_decl("main", FuncTypeExpr::default(), body)],
    }
}

fn println(args: Vec<Expr>) -> Statement {
    Statement::expr(Expr::call(Expr::ident("println"), args))
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

/// `for name := 0; name < limit; name++ { body }`
fn count_loop(name: &str, limit: i64, body: Vec<Statement>) -> Statement {
    Statement::for_loop(
        Some(Statement::define(&[name], vec![Expr::int(0)])),
        Some(binary(BinaryOp::Lt, Expr::ident(name), Expr::int(limit))),
        Some(Statement::inc(Expr::ident(name))),
        body,
    )
}

fn load(file: &File) -> Interpreter {
    let mut interpreter = Interpreter::new(Options::default().capturing_output());
    interpreter.load(file).expect("load");
    interpreter
}

fn run(file: &File) -> (String, Interpreter) {
    let interpreter = load(file);
    interpreter.run().expect("run");
    (interpreter.take_output(), interpreter)
}

fn compile_error(file: &File) -> CompileError {
    match compile_file(file, &[]) {
        Ok(_) => panic!("expected a compile error"),
        Err(err) => err,
    }
}

/// Compiles `node` at file level and returns the number of instructions emitted.
fn emitted(node: &Statement) -> usize {
    let mut comp = Comp::new_file();
    comp.stmt(node).expect("compile");
    comp.code().len()
}

#[test]
fn counting_loop_accumulates() {
    let file = main_file(vec![
        Statement::define(&["sum"], vec![Expr::int(0)]),
        count_loop(
            "i",
            5,
            vec![Statement::op_assign(BinaryOp::Add, Expr::ident("sum"), Expr::ident("i"))],
        ),
        println(vec![Expr::ident("sum")]),
    ]);
    let (output, _) = run(&file);
    assert_eq!(output, "10\n");
}

#[test]
fn block_environments_are_balanced() {
    let file = main_file(vec![
        count_loop(
            "i",
            3,
            vec![
                Statement::define(&["x"], vec![Expr::ident("i")]),
                Statement::if_else(
                    binary(BinaryOp::Eq, Expr::ident("x"), Expr::int(1)),
                    vec![Statement::branch(BranchKind::Continue, None)],
                    None,
                ),
                Statement::block(vec![
                    Statement::define(&["y"], vec![Expr::ident("x")]),
                    println(vec![Expr::ident("y")]),
                ]),
            ],
        ),
        Statement::for_loop(
            None,
            None,
            None,
            vec![
                Statement::define(&["z"], vec![Expr::int(1)]),
                Statement::branch(BranchKind::Break, None),
            ],
        ),
    ]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "0\n2\n");
    let (pushed, popped) = interpreter.env_stats();
    assert!(pushed > 0);
    assert_eq!(pushed, popped);
}

#[test]
fn constant_false_loop_emits_nothing() {
    let node = Statement::for_loop(None, Some(Expr::bool(false)), None, vec![println(vec![Expr::int(1)])]);
    assert_eq!(emitted(&node), 0);
}

#[test]
fn constant_false_loop_keeps_its_init() {
    let node = Statement::for_loop(
        Some(Statement::define(&["i"], vec![Expr::int(0)])),
        Some(Expr::bool(false)),
        Some(Statement::inc(Expr::ident("i"))),
        vec![println(vec![Expr::ident("i")])],
    );
    // push, init, pop
    assert_eq!(emitted(&node), 3);
}

#[test]
fn constant_false_loop_body_is_still_checked() {
    let file = main_file(vec![Statement::for_loop(
        None,
        Some(Expr::bool(false)),
        None,
        vec![println(vec![Expr::ident("missing")])],
    )]);
    assert!(matches!(
        compile_error(&file),
        CompileError::Undefined { name, .. } if name == "missing"
    ));
}

#[test]
fn constant_false_loop_post_is_still_checked() {
    let file = main_file(vec![Statement::for_loop(
        Some(Statement::define(&["i"], vec![Expr::int(0)])),
        Some(Expr::bool(false)),
        Some(Statement::inc(Expr::ident("missing"))),
        vec![println(vec![Expr::ident("i")])],
    )]);
    assert!(matches!(
        compile_error(&file),
        CompileError::Undefined { name, .. } if name == "missing"
    ));
}

#[test]
fn constant_conditions_drop_the_dead_branch() {
    let both = Statement::if_else(
        Expr::bool(true),
        vec![println(vec![Expr::int(1)])],
        Some(Statement::block(vec![println(vec![Expr::int(2)])])),
    );
    assert_eq!(emitted(&both), 1);

    let never = Statement::if_else(Expr::bool(false), vec![println(vec![Expr::int(1)])], None);
    assert_eq!(emitted(&never), 0);
}

#[test]
fn dead_branch_is_still_checked() {
    let file = main_file(vec![Statement::if_else(
        Expr::bool(false),
        vec![println(vec![Expr::ident("missing")])],
        None,
    )]);
    assert!(matches!(
        compile_error(&file),
        CompileError::Undefined { name, .. } if name == "missing"
    ));
}

#[test]
fn declaring_else_statement_gets_its_own_scope() {
    let file = main_file(vec![
        Statement::define(&["x"], vec![Expr::int(1)]),
        Statement::if_else(
            binary(BinaryOp::Gt, Expr::ident("x"), Expr::int(5)),
            vec![println(vec![Expr::int(0)])],
            Some(Statement::define(&["x"], vec![Expr::int(7)])),
        ),
        println(vec![Expr::ident("x")]),
    ]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "1\n");
    let (pushed, popped) = interpreter.env_stats();
    assert!(pushed >= 1);
    assert_eq!(pushed, popped);
}

#[test]
fn labeled_continue_resumes_outer_loop() {
    let inner = count_loop(
        "j",
        3,
        vec![
            Statement::if_else(
                binary(BinaryOp::Eq, Expr::ident("j"), Expr::int(1)),
                vec![Statement::branch(BranchKind::Continue, Some("outer"))],
                None,
            ),
            println(vec![Expr::ident("i"), Expr::ident("j")]),
        ],
    );
    let file = main_file(vec![Statement::labeled("outer", count_loop("i", 3, vec![inner]))]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "0 0\n1 0\n2 0\n");
    let (pushed, popped) = interpreter.env_stats();
    assert_eq!(pushed, popped);
}

#[test]
fn labeled_break_leaves_both_loops() {
    let inner = count_loop(
        "j",
        3,
        vec![
            Statement::if_else(
                binary(BinaryOp::Eq, Expr::ident("i"), Expr::int(1)),
                vec![Statement::branch(BranchKind::Break, Some("outer"))],
                None,
            ),
            println(vec![Expr::ident("i"), Expr::ident("j")]),
        ],
    );
    let file = main_file(vec![
        Statement::labeled("outer", count_loop("i", 3, vec![inner])),
        println(vec![Expr::string("after")]),
    ]);
    let (output, _) = run(&file);
    assert_eq!(output, "0 0\n0 1\n0 2\nafter\n");
}

#[test]
fn unknown_label_is_reported() {
    let file = main_file(vec![Statement::for_loop(
        None,
        None,
        None,
        vec![Statement::branch(BranchKind::Break, Some("missing"))],
    )]);
    match compile_error(&file) {
        CompileError::UndefinedLabel { keyword, label, .. } => {
            assert_eq!(keyword, "break");
            assert_eq!(label, "missing");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn break_and_continue_need_an_enclosing_statement() {
    let file = main_file(vec![Statement::branch(BranchKind::Break, None)]);
    assert_eq!(compile_error(&file).to_string(), "break outside for/switch");

    let in_switch = main_file(vec![Statement::switch(
        Some(Expr::int(1)),
        vec![CaseClause::case(
            vec![Expr::int(1)],
            vec![Statement::branch(BranchKind::Continue, None)],
        )],
    )]);
    assert_eq!(compile_error(&in_switch).to_string(), "continue outside for");
}

#[test]
fn goto_is_not_supported() {
    let file = main_file(vec![Statement::branch(BranchKind::Goto, Some("end"))]);
    assert!(matches!(
        compile_error(&file),
        CompileError::UnimplementedBranch { keyword: "goto", .. }
    ));
}

#[test]
fn case_clause_outside_switch_is_misplaced() {
    let file = main_file(vec![Statement::Case(CaseClause::default(vec![]))]);
    assert!(matches!(
        compile_error(&file),
        CompileError::MisplacedCase { clause: "default", .. }
    ));
}

#[test]
fn post_statement_cannot_declare() {
    let file = main_file(vec![Statement::for_loop(
        Some(Statement::define(&["i"], vec![Expr::int(0)])),
        Some(binary(BinaryOp::Lt, Expr::ident("i"), Expr::int(3))),
        Some(Statement::define(&["j"], vec![Expr::int(1)])),
        vec![],
    )]);
    assert!(matches!(compile_error(&file), CompileError::DeclareInPost { .. }));
}

#[test]
fn naked_return_uses_named_results() {
    let sig = FuncTypeExpr::new(vec![], vec![Field::named("x", int())]);
    let file = File {
        decls: vec![func_decl(
            "three",
            sig,
            vec![
                Statement::assign(vec![Expr::ident("x")], vec![Expr::int(3)]),
                Statement::ret(vec![]),
            ],
        )],
    };
    let interpreter = load(&file);
    let results = interpreter.call("three", Vec::new()).expect("call");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_int(), Ok(3));
}

#[test]
fn naked_return_needs_named_results() {
    let sig = FuncTypeExpr::new(vec![], vec![Field::anon(int())]);
    let file = File {
        decls: vec![func_decl("f", sig, vec![Statement::ret(vec![])])],
    };
    assert!(matches!(
        compile_error(&file),
        CompileError::ReturnArity {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn return_count_must_match() {
    let sig = FuncTypeExpr::new(vec![], vec![Field::anon(int())]);
    let file = File {
        decls: vec![func_decl(
            "f",
            sig,
            vec![Statement::ret(vec![Expr::int(1), Expr::int(2)])],
        )],
    };
    assert_eq!(
        compile_error(&file).to_string(),
        "return: expecting 1 expressions, found 2"
    );
}

#[test]
fn forwarded_return_values_are_type_checked() {
    let pair = FuncTypeExpr::new(
        vec![],
        vec![Field::anon(int()), Field::anon(TypeExpr::named("string"))],
    );
    let ints = FuncTypeExpr::new(vec![], vec![Field::anon(int()), Field::anon(int())]);
    let file = File {
        decls: vec![
            func_decl(
                "pair",
                pair,
                vec![Statement::ret(vec![Expr::int(1), Expr::string("a")])],
            ),
            func_decl(
                "ints",
                ints,
                vec![Statement::ret(vec![Expr::call(Expr::ident("pair"), vec![])])],
            ),
        ],
    };
    assert!(matches!(
        compile_error(&file),
        CompileError::IncompatibleTypes { .. }
    ));
}

#[test]
fn forwarded_return_passes_every_value() {
    let sig = FuncTypeExpr::new(vec![], vec![Field::anon(int()), Field::anon(int())]);
    let file = File {
        decls: vec![
            func_decl(
                "pair",
                sig.clone(),
                vec![Statement::ret(vec![Expr::int(1), Expr::int(2)])],
            ),
            func_decl(
                "swap",
                sig,
                vec![
                    Statement::define(&["a", "b"], vec![Expr::call(Expr::ident("pair"), vec![])]),
                    Statement::ret(vec![Expr::ident("b"), Expr::ident("a")]),
                ],
            ),
        ],
    };
    let interpreter = load(&file);
    let results = interpreter.call("swap", Vec::new()).expect("call");
    assert_eq!(results[0].as_int(), Ok(2));
    assert_eq!(results[1].as_int(), Ok(1));
}

#[test]
fn deferred_calls_run_last_in_first_out_with_early_arguments() {
    let file = main_file(vec![
        count_loop(
            "i",
            3,
            vec![Statement::defer(Expr::call(Expr::ident("println"), vec![Expr::ident("i")]))],
        ),
        println(vec![Expr::string("done")]),
    ]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "done\n2\n1\n0\n");
    let (pushed, popped) = interpreter.env_stats();
    assert_eq!(pushed, popped);
}

#[test]
fn deferred_closure_sees_returned_value() {
    let sig = FuncTypeExpr::new(vec![], vec![Field::named("r", int())]);
    let double = Expr::func_lit(
        FuncTypeExpr::default(),
        vec![Statement::assign(
            vec![Expr::ident("r")],
            vec![binary(BinaryOp::Mul, Expr::ident("r"), Expr::int(2))],
        )],
    );
    let file = File {
        decls: vec![func_decl(
            "f",
            sig,
            vec![
                Statement::defer(Expr::call(double, vec![])),
                Statement::ret(vec![Expr::int(5)]),
            ],
        )],
    };
    let interpreter = load(&file);
    let results = interpreter.call("f", Vec::new()).expect("call");
    assert_eq!(results[0].as_int(), Ok(10));
}

#[test]
fn switch_falls_through_into_next_clause() {
    let file = main_file(vec![
        Statement::define(&["x"], vec![Expr::int(1)]),
        Statement::switch(
            Some(Expr::ident("x")),
            vec![
                CaseClause::case(
                    vec![Expr::int(1)],
                    vec![
                        println(vec![Expr::string("one")]),
                        Statement::branch(BranchKind::Fallthrough, None),
                    ],
                ),
                CaseClause::case(vec![Expr::int(2), Expr::int(3)], vec![println(vec![Expr::string("two")])]),
                CaseClause::default(vec![println(vec![Expr::string("other")])]),
            ],
        ),
    ]);
    let (output, _) = run(&file);
    assert_eq!(output, "one\ntwo\n");
}

#[test]
fn switch_without_match_takes_default() {
    let file = main_file(vec![Statement::switch(
        None,
        vec![
            CaseClause::default(vec![println(vec![Expr::string("default")])]),
            CaseClause::case(vec![Expr::bool(false)], vec![println(vec![Expr::string("false")])]),
        ],
    )]);
    let (output, _) = run(&file);
    assert_eq!(output, "default\n");
}

#[test]
fn fallthrough_in_final_case_is_rejected() {
    let file = main_file(vec![Statement::switch(
        Some(Expr::int(1)),
        vec![CaseClause::case(
            vec![Expr::int(1)],
            vec![Statement::branch(BranchKind::Fallthrough, None)],
        )],
    )]);
    assert_eq!(
        compile_error(&file).to_string(),
        "misplaced fallthrough: cannot fallthrough final case in switch"
    );
}

#[test]
fn fallthrough_outside_switch_is_rejected() {
    let file = main_file(vec![Statement::branch(BranchKind::Fallthrough, None)]);
    assert!(matches!(
        compile_error(&file),
        CompileError::MisplacedFallthrough { .. }
    ));
}

#[test]
fn type_switch_binds_per_clause() {
    let ret = |value: Expr| vec![Statement::ret(vec![value])];
    let switch = Statement::TypeSwitch(TypeSwitchStmt {
        init: None,
        binding: Some(Identifier::new("t")),
        subject: Expr::ident("v"),
        clauses: vec![
            CaseClause::case(vec![Expr::ident("int")], ret(Expr::string("int"))),
            CaseClause::case(vec![Expr::type_expr(TypeExpr::named("string"))], ret(Expr::ident("t"))),
            CaseClause::case(vec![Expr::ident("nil")], ret(Expr::string("nil"))),
            CaseClause::default(ret(Expr::string("other"))),
        ],
        span: Span::default(),
    });
    let sig = FuncTypeExpr::new(
        vec![Field::named("v", TypeExpr::named("any"))],
        vec![Field::anon(TypeExpr::named("string"))],
    );
    let file = File {
        decls: vec![func_decl(
            "describe",
            sig,
            vec![switch, Statement::ret(vec![Expr::string("unreachable")])],
        )],
    };
    let interpreter = load(&file);
    let describe = |value: Value| {
        let results = interpreter.call("describe", vec![value]).expect("call");
        results[0].as_str().map(str::to_string).expect("string")
    };
    assert_eq!(describe(Value::Int(4)), "int");
    assert_eq!(describe(Value::string("hi")), "hi");
    assert_eq!(describe(Value::Nil), "nil");
    assert_eq!(describe(Value::Bool(true)), "other");
}

#[test]
fn range_over_int_and_slice() {
    let numbers = Expr::slice_lit(int(), vec![Expr::int(4), Expr::int(5), Expr::int(6)]);
    let file = main_file(vec![
        Statement::range(Some("i"), None, Expr::int(2), vec![println(vec![Expr::ident("i")])]),
        Statement::define(&["total"], vec![Expr::int(0)]),
        Statement::range(
            Some("_"),
            Some("n"),
            numbers,
            vec![Statement::op_assign(BinaryOp::Add, Expr::ident("total"), Expr::ident("n"))],
        ),
        println(vec![Expr::ident("total")]),
    ]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "0\n1\n15\n");
    let (pushed, popped) = interpreter.env_stats();
    assert_eq!(pushed, popped);
}

#[test]
fn range_over_string_yields_byte_offsets_and_runes() {
    let file = main_file(vec![Statement::range(
        Some("i"),
        Some("r"),
        Expr::string("aé!"),
        vec![println(vec![Expr::ident("i"), Expr::ident("r")])],
    )]);
    let (output, _) = run(&file);
    assert_eq!(output, "0 97\n1 233\n3 33\n");
}

#[test]
fn range_over_map_visits_sorted_keys() {
    let entry = |key: &str, value: i64| MapLiteralEntry {
        key: Expr::string(key),
        value: Expr::int(value),
    };
    let ages = Expr::MapLiteral {
        key: TypeExpr::named("string"),
        value: int(),
        entries: vec![entry("bob", 2), entry("ann", 1)],
        span: Span::default(),
    };
    let file = main_file(vec![Statement::range(
        Some("k"),
        Some("v"),
        ages,
        vec![println(vec![Expr::ident("k"), Expr::ident("v")])],
    )]);
    let (output, _) = run(&file);
    assert_eq!(output, "ann 1\nbob 2\n");
}

#[test]
fn range_over_closed_channel_drains_it() {
    let make = Expr::call(
        Expr::ident("make"),
        vec![Expr::type_expr(TypeExpr::chan(int())), Expr::int(3)],
    );
    let file = main_file(vec![
        Statement::define(&["ch"], vec![make]),
        count_loop("i", 3, vec![Statement::send(Expr::ident("ch"), Expr::ident("i"))]),
        Statement::expr(Expr::call(Expr::ident("close"), vec![Expr::ident("ch")])),
        Statement::range(Some("v"), None, Expr::ident("ch"), vec![println(vec![Expr::ident("v")])]),
    ]);
    let (output, _) = run(&file);
    assert_eq!(output, "0\n1\n2\n");
}

#[test]
fn range_over_int_takes_one_variable() {
    let file = main_file(vec![Statement::range(Some("i"), Some("v"), Expr::int(3), vec![])]);
    assert_eq!(
        compile_error(&file).to_string(),
        "range over int permits only one iteration variable"
    );
}

#[test]
fn select_receives_or_falls_back_to_default() {
    let make = Expr::call(
        Expr::ident("make"),
        vec![Expr::type_expr(TypeExpr::chan(int())), Expr::int(1)],
    );
    let poll = || {
        Statement::Select(SelectStmt {
            clauses: vec![
                CommClause::case(
                    Statement::define(&["v", "ok"], vec![Expr::recv(Expr::ident("ch"))]),
                    vec![println(vec![Expr::string("got"), Expr::ident("v"), Expr::ident("ok")])],
                ),
                CommClause::default(vec![println(vec![Expr::string("none")])]),
            ],
            span: Span::default(),
        })
    };
    let file = main_file(vec![
        Statement::define(&["ch"], vec![make]),
        Statement::send(Expr::ident("ch"), Expr::int(7)),
        poll(),
        poll(),
    ]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "got 7 true\nnone\n");
    let (pushed, popped) = interpreter.env_stats();
    assert_eq!(pushed, popped);
}

#[test]
fn goroutine_feeds_channel() {
    let chan = |elem: TypeExpr| {
        Expr::call(Expr::ident("make"), vec![Expr::type_expr(TypeExpr::chan(elem))])
    };
    let consumer = Expr::func_lit(
        FuncTypeExpr::default(),
        vec![
            Statement::range(Some("v"), None, Expr::ident("ch"), vec![println(vec![Expr::ident("v")])]),
            Statement::send(Expr::ident("done"), Expr::bool(true)),
        ],
    );
    let file = main_file(vec![
        Statement::define(&["ch"], vec![chan(int())]),
        Statement::define(&["done"], vec![chan(TypeExpr::named("bool"))]),
        Statement::go(Expr::call(consumer, vec![])),
        count_loop("i", 3, vec![Statement::send(Expr::ident("ch"), Expr::ident("i"))]),
        Statement::expr(Expr::call(Expr::ident("close"), vec![Expr::ident("ch")])),
        Statement::expr(Expr::recv(Expr::ident("done"))),
    ]);
    let (output, interpreter) = run(&file);
    assert_eq!(output, "0\n1\n2\n");
    assert_eq!(interpreter.globals().tasks().spawned(), 1);
    assert_eq!(interpreter.globals().tasks().failed(), 0);
}

#[test]
fn init_runs_after_variables() {
    let file = File {
        decls: vec![
            Decl::Var(
                vec![ValueSpec {
                    names: vec![Identifier::new("count")],
                    ty: None,
                    values: vec![Expr::int(2)],
                    span: Span::default(),
                }],
                Span::default(),
            ),
            func_decl(
                "init",
                FuncTypeExpr::default(),
                vec![Statement::op_assign(BinaryOp::Mul, Expr::ident("count"), Expr::int(10))],
            ),
        ],
    };
    let interpreter = load(&file);
    assert_eq!(interpreter.global("count").map(|value| value.as_int()), Some(Ok(20)));
}

#[test]
fn runtime_panic_surfaces_from_run() {
    let file = main_file(vec![
        Statement::define(&["xs"], vec![Expr::slice_lit(int(), vec![Expr::int(1)])]),
        println(vec![Expr::index(Expr::ident("xs"), Expr::int(3))]),
    ]);
    let interpreter = load(&file);
    match interpreter.run() {
        Err(crate::runtime::InterpreterError::Runtime(err)) => {
            assert_eq!(err, RuntimeError::IndexOutOfRange { index: 3, len: 1 });
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
