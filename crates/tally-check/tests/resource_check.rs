//! Integration tests for straight-line code and branches.
//!
//! Every program shares one extern prelude: `alloc`/`free` hand out and
//! release a `Linear<Buffer>`, `open`/`close` an `Affine<Socket>`.

use tally_ast::ast::{BinOp, ExternDecl, Param, Program, Stmt};
use tally_ast::build::*;
use tally_ast::span::Span;
use tally_check::{check_program, DiagnosticKind, MalformedInput, Qualifier, Report, Verdict};

fn prelude() -> Vec<ExternDecl> {
    vec![
        extern_fn("alloc", vec![], Some(linear("Buffer"))),
        extern_fn("free", vec![param("b", linear("Buffer"))], None),
        extern_fn(
            "write",
            vec![param("b", by_ref(linear("Buffer"))), param("n", ty("Int"))],
            None,
        ),
        extern_fn("peek", vec![param("b", ty("Buffer"))], Some(ty("Int"))),
        extern_fn("wrap", vec![param("b", linear("Buffer"))], Some(linear("Buffer"))),
        extern_fn("open", vec![], Some(affine("Socket"))),
        extern_fn("close", vec![param("s", affine("Socket"))], None),
        extern_fn("ready", vec![], Some(ty("Bool"))),
        extern_fn("log", vec![param("n", ty("Int"))], None),
    ]
}

fn main_with(params: Vec<Param>, stmts: Vec<Stmt>) -> (Program, Report) {
    let p = program(prelude(), vec![func("main", params, None, stmts)]);
    let report = check_program(&p);
    (p, report)
}

fn check(stmts: Vec<Stmt>) -> (Program, Report) {
    main_with(vec![], stmts)
}

/// Helper: expect a clean verdict
fn check_ok(stmts: Vec<Stmt>) -> Report {
    let (_, report) = check(stmts);
    assert!(
        report.is_pass(),
        "expected Pass but got {:?} / {:?}",
        report.diagnostics,
        report.malformed
    );
    report
}

fn kinds(report: &Report) -> Vec<DiagnosticKind> {
    report.diagnostics.iter().map(|d| d.kind).collect()
}

fn free(name: &str) -> Stmt {
    expr(call("free", vec![var(name)]))
}

fn ready() -> tally_ast::ast::Expr {
    call("ready", vec![])
}

fn body_stmt(p: &Program, i: usize) -> Span {
    p.functions[0].body.stmts[i].span()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn allocated_written_and_freed_once_passes() {
    let report = check_ok(vec![
        let_("buf", call("alloc", vec![])),
        expr(call("write", vec![var("buf"), int(1)])),
        expr(call("write", vec![borrow("buf"), int(2)])),
        free("buf"),
    ]);
    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.audit.linear_vars, 1);
    assert_eq!(report.audit.consumed, 1);
    assert!(report.audit.is_clean());
}

#[test]
fn double_free_is_one_use_after_move_at_second_free() {
    let (p, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        free("buf"),
        free("buf"),
    ]);
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(kinds(&report), vec![DiagnosticKind::UseAfterMove]);

    let d = &report.diagnostics[0];
    assert_eq!(d.binding_name, "buf");
    assert!(body_stmt(&p, 2).contains(d.offending_at));
    let Stmt::Let { name, .. } = &p.functions[0].body.stmts[0] else {
        panic!("expected let");
    };
    assert_eq!(d.declared_at, name.span);
}

#[test]
fn never_freed_leaks_at_function_exit() {
    let (p, report) = check(vec![let_("buf", call("alloc", vec![]))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(
        report.diagnostics[0].offending_at,
        p.functions[0].body.span.closing()
    );
}

#[test]
fn never_freed_leaks_at_explicit_return() {
    let (p, report) = check(vec![let_("buf", call("alloc", vec![])), ret(None)]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].offending_at, body_stmt(&p, 1));
}

#[test]
fn consumed_in_then_only_with_both_arms_returning() {
    let (p, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        if_(ready(), vec![free("buf"), ret(None)], Some(vec![ret(None)])),
    ]);
    assert_eq!(
        kinds(&report),
        vec![DiagnosticKind::InconsistentBranchConsumption]
    );
    assert_eq!(report.diagnostics[0].binding_name, "buf");
    assert_eq!(report.diagnostics[0].offending_at, body_stmt(&p, 1));
}

#[test]
fn shared_value_used_three_times_passes() {
    let (_, report) = main_with(
        vec![param("n", ty("Int"))],
        vec![
            let_("x", var("n")),
            expr(call("log", vec![var("x")])),
            expr(call("log", vec![var("x")])),
            expr(call("log", vec![binary(var("x"), BinOp::Add, var("x"))])),
        ],
    );
    assert!(report.is_pass(), "{:?}", report.diagnostics);
    assert_eq!(report.audit.linear_vars, 0);
}

// ============================================================================
// MOVES, REASSIGNMENT, DISCARDS
// ============================================================================

#[test]
fn move_into_new_binding_transfers_the_obligation() {
    check_ok(vec![
        let_("a", call("alloc", vec![])),
        let_("b", var("a")),
        free("b"),
    ]);

    let (_, report) = check(vec![
        let_("a", call("alloc", vec![])),
        let_("b", var("a")),
        free("a"),
    ]);
    let mut got = kinds(&report);
    got.sort();
    assert_eq!(
        got,
        vec![DiagnosticKind::UseAfterMove, DiagnosticKind::ResourceLeak]
    );
    let leak = report
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::ResourceLeak)
        .unwrap();
    assert_eq!(leak.binding_name, "b");
}

#[test]
fn reassigning_a_live_buffer_leaks_it() {
    let (p, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        assign("buf", call("alloc", vec![])),
        free("buf"),
    ]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].offending_at, body_stmt(&p, 1));
}

#[test]
fn reassigning_after_consumption_is_a_fresh_resource() {
    check_ok(vec![
        let_("buf", call("alloc", vec![])),
        free("buf"),
        assign("buf", call("alloc", vec![])),
        free("buf"),
    ]);
    check_ok(vec![
        let_("buf", call("alloc", vec![])),
        assign("buf", call("wrap", vec![var("buf")])),
        free("buf"),
    ]);
}

#[test]
fn discarded_linear_results_leak() {
    let (_, report) = check(vec![expr(call("alloc", vec![]))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].binding_name, "alloc(..)");

    let (_, report) = check(vec![let_("_", call("alloc", vec![]))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);

    let (_, report) = check(vec![let_("buf", call("alloc", vec![])), expr(var("buf"))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].binding_name, "buf");
}

#[test]
fn shared_parameter_only_borrows() {
    check_ok(vec![
        let_("buf", call("alloc", vec![])),
        expr(call("peek", vec![var("buf")])),
        expr(call("peek", vec![var("buf")])),
        free("buf"),
    ]);
}

#[test]
fn borrow_after_move_is_rejected() {
    let (_, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        free("buf"),
        expr(call("write", vec![borrow("buf"), int(0)])),
    ]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::UseAfterMove]);
}

#[test]
fn linear_temporary_lent_to_a_shared_parameter_leaks() {
    let (_, report) = check(vec![expr(call("peek", vec![call("alloc", vec![])]))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].binding_name, "alloc(..)");

    let (_, report) = check(vec![expr(call(
        "write",
        vec![call("alloc", vec![]), int(0)],
    ))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
}

#[test]
fn closure_holding_a_capture_lent_to_a_shared_parameter_leaks() {
    let (p, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        expr(call("peek", vec![closure(vec![], None, vec![free("buf")])])),
    ]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].binding_name, "<closure>");
    let Stmt::Expr { expr: peek, .. } = &p.functions[0].body.stmts[1] else {
        panic!("expected expression statement");
    };
    let tally_ast::ast::Expr::Call { args, .. } = peek else {
        panic!("expected call");
    };
    assert_eq!(report.diagnostics[0].offending_at, args[0].span());
}

#[test]
fn linear_operands_and_conditions_leak() {
    let (_, report) = check(vec![let_(
        "n",
        binary(call("alloc", vec![]), BinOp::Add, int(1)),
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);

    let (_, report) = check(vec![expr(call("log", vec![not(call("alloc", vec![]))]))]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);

    let (_, report) = check(vec![if_(call("alloc", vec![]), vec![], None)]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);

    let (_, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        let_("n", binary(var("buf"), BinOp::Add, int(1))),
    ]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].binding_name, "buf");
}

#[test]
fn shadowing_in_an_inner_block() {
    check_ok(vec![
        let_("buf", call("alloc", vec![])),
        nested(vec![let_("buf", call("alloc", vec![])), free("buf")]),
        free("buf"),
    ]);
}

#[test]
fn inner_block_binding_leaks_at_block_end() {
    let (p, report) = check(vec![nested(vec![let_("tmp", call("alloc", vec![]))])]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    let Stmt::Block(inner) = &p.functions[0].body.stmts[0] else {
        panic!("expected block");
    };
    assert_eq!(report.diagnostics[0].offending_at, inner.span.closing());
}

#[test]
fn unreachable_statements_are_skipped_and_noted() {
    let report = check_ok(vec![
        let_("buf", call("alloc", vec![])),
        free("buf"),
        ret(None),
        free("buf"),
    ]);
    assert_eq!(report.audit.warnings.len(), 1);
}

#[test]
fn returning_the_resource_consumes_it() {
    let p = program(
        prelude(),
        vec![func(
            "make",
            vec![],
            Some(linear("Buffer")),
            vec![let_("b", call("alloc", vec![])), ret(Some(var("b")))],
        )],
    );
    assert!(check_program(&p).is_pass());
}

#[test]
fn returning_a_resource_from_a_shared_function_is_malformed() {
    let p = program(
        prelude(),
        vec![
            func(
                "launder",
                vec![param("b", linear("Buffer"))],
                Some(ty("Int")),
                vec![ret(Some(var("b")))],
            ),
            func(
                "main",
                vec![],
                None,
                vec![
                    let_("n", call("launder", vec![call("alloc", vec![])])),
                    expr(call("log", vec![var("n")])),
                ],
            ),
        ],
    );
    let report = check_program(&p);
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.malformed.len(), 1);
    assert_eq!(report.malformed[0].function, "launder");
    assert!(matches!(
        report.malformed[0].error,
        MalformedInput::QualifierMismatch {
            declared: Qualifier::Shared,
            found: Qualifier::Linear,
            ..
        }
    ));
}

#[test]
fn closure_return_is_held_to_its_declared_qualifier() {
    let (_, report) = check(vec![
        let_(
            "mk",
            closure(vec![], None, vec![ret(Some(call("alloc", vec![])))]),
        ),
        expr(call("mk", vec![])),
    ]);
    assert_eq!(report.malformed.len(), 1);
    assert!(matches!(
        report.malformed[0].error,
        MalformedInput::QualifierMismatch { .. }
    ));

    check_ok(vec![
        let_(
            "mk",
            closure(
                vec![],
                Some(linear("Buffer")),
                vec![ret(Some(call("alloc", vec![])))],
            ),
        ),
        let_("buf", call("mk", vec![])),
        free("buf"),
    ]);
}

#[test]
fn unconsumed_linear_parameter_leaks() {
    let p = program(
        prelude(),
        vec![func("sink", vec![param("b", linear("Buffer"))], None, vec![])],
    );
    let report = check_program(&p);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
    assert_eq!(report.diagnostics[0].binding_name, "b");
}

#[test]
fn mutual_recursion_uses_signatures_only() {
    let p = program(
        prelude(),
        vec![
            func(
                "ping",
                vec![param("b", linear("Buffer"))],
                None,
                vec![expr(call("pong", vec![var("b")]))],
            ),
            func(
                "pong",
                vec![param("b", linear("Buffer"))],
                None,
                vec![expr(call("ping", vec![var("b")]))],
            ),
        ],
    );
    let report = check_program(&p);
    assert!(report.is_pass(), "{:?}", report.diagnostics);
    assert_eq!(report.audit.functions_checked, 2);
}

// ============================================================================
// CONSERVATIVE REJECTION ACROSS BRANCH SHAPES
// ============================================================================

#[test]
fn used_twice_is_rejected_inside_a_branch() {
    let (_, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        if_(ready(), vec![free("buf"), free("buf")], Some(vec![free("buf")])),
    ]);
    assert!(!report.is_pass());
    assert!(kinds(&report).contains(&DiagnosticKind::UseAfterMove));
}

#[test]
fn consumed_in_one_arm_of_if_without_else() {
    let (_, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        if_(ready(), vec![free("buf")], None),
    ]);
    assert_eq!(
        kinds(&report),
        vec![DiagnosticKind::InconsistentBranchConsumption]
    );
}

#[test]
fn consumed_in_one_arm_of_if_else() {
    let (_, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        if_(ready(), vec![], Some(vec![free("buf")])),
    ]);
    assert_eq!(
        kinds(&report),
        vec![DiagnosticKind::InconsistentBranchConsumption]
    );
}

#[test]
fn consumed_in_one_arm_of_a_match() {
    for extra_arms in [0usize, 1, 3] {
        let mut arms = vec![arm(pat_int(0), vec![free("buf")])];
        for i in 0..extra_arms {
            arms.push(arm(pat_int(i as i64 + 1), vec![free("buf")]));
        }
        arms.push(arm(pat_wild(), vec![]));

        let (_, report) = main_with(
            vec![param("n", ty("Int"))],
            vec![let_("buf", call("alloc", vec![])), match_(var("n"), arms)],
        );
        assert_eq!(
            kinds(&report),
            vec![DiagnosticKind::InconsistentBranchConsumption],
            "with {} extra arms",
            extra_arms
        );
    }
}

#[test]
fn every_arm_consuming_passes() {
    let (_, report) = main_with(
        vec![param("n", ty("Int"))],
        vec![
            let_("buf", call("alloc", vec![])),
            match_(
                var("n"),
                vec![
                    arm(pat_int(0), vec![free("buf")]),
                    arm(pat_int(1), vec![free("buf")]),
                    arm(pat_wild(), vec![free("buf")]),
                ],
            ),
        ],
    );
    assert!(report.is_pass(), "{:?}", report.diagnostics);
}

#[test]
fn nested_branches_report_the_inner_disagreement_once() {
    check_ok(vec![
        let_("buf", call("alloc", vec![])),
        if_(
            ready(),
            vec![if_(ready(), vec![free("buf")], Some(vec![free("buf")]))],
            Some(vec![free("buf")]),
        ),
    ]);

    let (p, report) = check(vec![
        let_("buf", call("alloc", vec![])),
        if_(
            ready(),
            vec![if_(ready(), vec![free("buf")], None)],
            Some(vec![free("buf")]),
        ),
    ]);
    assert_eq!(
        kinds(&report),
        vec![DiagnosticKind::InconsistentBranchConsumption]
    );
    let Stmt::If { then_block, .. } = &p.functions[0].body.stmts[1] else {
        panic!("expected if");
    };
    assert_eq!(report.diagnostics[0].offending_at, then_block.stmts[0].span());
}

#[test]
fn early_return_leak_is_a_leak_whatever_the_sibling_arm_does() {
    for else_returns in [true, false] {
        let mut else_arm = vec![free("buf")];
        if else_returns {
            else_arm.push(ret(None));
        }
        let (p, report) = check(vec![
            let_("buf", call("alloc", vec![])),
            if_(
                ready(),
                vec![if_(ready(), vec![ret(None)], None), free("buf"), ret(None)],
                Some(else_arm),
            ),
        ]);
        assert_eq!(
            kinds(&report),
            vec![DiagnosticKind::ResourceLeak],
            "else returns: {}",
            else_returns
        );
        let Stmt::If { then_block, .. } = &p.functions[0].body.stmts[1] else {
            panic!("expected if");
        };
        let Stmt::If { then_block: early, .. } = &then_block.stmts[0] else {
            panic!("expected inner if");
        };
        assert_eq!(report.diagnostics[0].offending_at, early.stmts[0].span());
    }
}

#[test]
fn only_one_of_three_arms_consuming_is_reported_once() {
    let (_, report) = main_with(
        vec![param("n", ty("Int"))],
        vec![
            let_("buf", call("alloc", vec![])),
            match_(
                var("n"),
                vec![
                    arm(pat_int(0), vec![]),
                    arm(
                        pat_int(1),
                        vec![match_(
                            var("n"),
                            vec![
                                arm(pat_int(1), vec![free("buf")]),
                                arm(pat_int(2), vec![free("buf")]),
                                arm(pat_wild(), vec![free("buf")]),
                            ],
                        )],
                    ),
                    arm(pat_wild(), vec![]),
                ],
            ),
        ],
    );
    assert_eq!(
        kinds(&report),
        vec![DiagnosticKind::InconsistentBranchConsumption]
    );
    assert_eq!(report.diagnostics[0].binding_name, "buf");
}

#[test]
fn branch_local_bindings_do_not_join() {
    check_ok(vec![if_(
        ready(),
        vec![let_("tmp", call("alloc", vec![])), free("tmp")],
        None,
    )]);
}

#[test]
fn matching_a_tracked_binding_inspects_it() {
    check_ok(vec![
        let_("buf", call("alloc", vec![])),
        match_(
            var("buf"),
            vec![
                arm(pat_variant("Full", vec![pat_ident("len")]), vec![free("buf")]),
                arm(pat_wild(), vec![free("buf")]),
            ],
        ),
    ]);
}

#[test]
fn matching_a_fresh_linear_value() {
    check_ok(vec![match_(
        call("alloc", vec![]),
        vec![arm(pat_ident("b"), vec![free("b")])],
    )]);

    let (_, report) = check(vec![match_(
        call("alloc", vec![]),
        vec![arm(pat_wild(), vec![])],
    )]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ResourceLeak]);
}

// ============================================================================
// AFFINE LENIENCY
// ============================================================================

#[test]
fn affine_may_be_dropped() {
    check_ok(vec![let_("s", call("open", vec![]))]);
    check_ok(vec![
        let_("s", call("open", vec![])),
        if_(ready(), vec![expr(call("close", vec![var("s")]))], None),
    ]);
}

#[test]
fn affine_is_still_used_at_most_once() {
    let (_, report) = check(vec![
        let_("s", call("open", vec![])),
        expr(call("close", vec![var("s")])),
        expr(call("close", vec![var("s")])),
    ]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::UseAfterMove]);

    // possibly closed on one branch
    let (_, report) = check(vec![
        let_("s", call("open", vec![])),
        if_(ready(), vec![expr(call("close", vec![var("s")]))], None),
        expr(call("close", vec![var("s")])),
    ]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::UseAfterMove]);
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn checking_twice_gives_identical_results() {
    let p = program(
        prelude(),
        vec![func(
            "main",
            vec![],
            None,
            vec![
                let_("a", call("alloc", vec![])),
                let_("b", call("alloc", vec![])),
                free("a"),
                free("a"),
                if_(ready(), vec![free("b")], None),
            ],
        )],
    );
    let first = check_program(&p);
    let second = check_program(&p);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.malformed, second.malformed);
    assert_eq!(first.audit, second.audit);
}

#[test]
fn diagnostics_are_ordered_by_offending_site() {
    let (_, report) = check(vec![
        let_("a", call("alloc", vec![])),
        let_("b", call("alloc", vec![])),
        free("b"),
        free("b"),
        let_("c", call("alloc", vec![])),
        free("a"),
        free("a"),
    ]);
    assert_eq!(report.diagnostics.len(), 3);
    assert!(report
        .diagnostics
        .windows(2)
        .all(|w| w[0].offending_at <= w[1].offending_at));
}
