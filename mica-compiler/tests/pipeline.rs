//! Frontend scenarios: naming, typing, overloads, and lowering to core

use mica_compiler::{CompilerConfig, CompilerContext, Pipeline, Severity};
use mica_core::{Block, BlockLit, ModuleDecl, Pure, Stmt, Toplevel};
use mica_syntax::{
    CaptureTree, CtorDef, Definition, IdDef, IdRef, Literal, MatchClause, ModuleTree, NodeId,
    OpClauseTree, OperationDef, ParamDef, Pattern, Span, Stmt as SStmt, Stmts, Term, TermKind,
    TypeTree,
};
use mica_types::DisplayType;
use mica_annotations::{anns, AnnotationStore};

fn fun(
    name: &str,
    tparams: Vec<&str>,
    vparams: Vec<(&str, &str)>,
    ret: Option<&str>,
    body: Vec<SStmt>,
) -> Definition {
    Definition::Fun {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        binder: IdDef::new(name),
        tparams: tparams.into_iter().map(IdDef::new).collect(),
        vparams: vparams
            .into_iter()
            .map(|(n, t)| ParamDef::typed(n, TypeTree::reference(t)))
            .collect(),
        bparams: vec![],
        ret: ret.map(TypeTree::reference),
        effects: vec![],
        body: Stmts::of(body),
    }
}

/// extern def <name>(params) : ret {capture} = body
fn extern_fun(name: &str, params: Vec<(&str, &str)>, ret: &str, capture: Vec<&str>) -> Definition {
    let capture = CaptureTree {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        refs: capture.into_iter().map(IdRef::new).collect(),
    };
    Definition::ExternDef {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        binder: IdDef::new(name),
        capture,
        tparams: vec![],
        vparams: params
            .into_iter()
            .map(|(n, t)| ParamDef::typed(n, TypeTree::reference(t)))
            .collect(),
        bparams: vec![],
        ret: Some(TypeTree::reference(ret)),
        body: "<extern>".to_string(),
    }
}

fn compile(tree: &ModuleTree) -> (CompilerContext, Result<ModuleDecl, String>) {
    let mut ctx = CompilerContext::new();
    let pipeline = Pipeline::new(CompilerConfig::default());
    let outcome = pipeline
        .compile(&mut ctx, tree)
        .map(|o| o.core)
        .map_err(|e| e.to_string());
    (ctx, outcome)
}

fn toplevel_block<'a>(
    core: &'a ModuleDecl,
    ctx: &CompilerContext,
    name: &str,
) -> &'a Block {
    core.definitions
        .iter()
        .find_map(|d| match d {
            Toplevel::Def { id, block } if ctx.symbols.name(*id).qualified() == name => {
                Some(block)
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no top-level definition '{}'", name))
}

fn body_of<'a>(block: &'a Block) -> &'a Stmt {
    match block {
        Block::Lit(BlockLit { body, .. }) => body,
        other => panic!("expected a block literal, got {:?}", other),
    }
}

fn find_match(stmt: &Stmt) -> Option<&Stmt> {
    match stmt {
        Stmt::Match { .. } => Some(stmt),
        Stmt::Val { binding, body, .. } => find_match(binding).or_else(|| find_match(body)),
        Stmt::Let { body, .. } | Stmt::Def { body, .. } | Stmt::State { body, .. } => {
            find_match(body)
        }
        Stmt::If { thn, els, .. } => find_match(thn).or_else(|| find_match(els)),
        _ => None,
    }
}

fn count_in_stmt(stmt: &Stmt, pred: &dyn Fn(&Stmt) -> bool) -> usize {
    let mut n = if pred(stmt) { 1 } else { 0 };
    match stmt {
        Stmt::Val { binding, body, .. } => {
            n += count_in_stmt(binding, pred) + count_in_stmt(body, pred);
        }
        Stmt::Let { body, .. } | Stmt::State { body, .. } => n += count_in_stmt(body, pred),
        Stmt::Def { block, body, .. } => {
            if let Block::Lit(lit) = block {
                n += count_in_stmt(&lit.body, pred);
            }
            n += count_in_stmt(body, pred);
        }
        Stmt::If { thn, els, .. } => n += count_in_stmt(thn, pred) + count_in_stmt(els, pred),
        Stmt::Match { branches, default, .. } => {
            for (_, lit) in branches {
                n += count_in_stmt(&lit.body, pred);
            }
            if let Some(d) = default {
                n += count_in_stmt(d, pred);
            }
        }
        _ => {}
    }
    n
}

// -- scenario: pure identity ------------------------------------------------

#[test]
fn pure_identity_lowers_to_direct_style() {
    let tree = ModuleTree::new(
        "demo",
        vec![
            extern_fun("println", vec![("x", "Int")], "Unit", vec!["io"]),
            fun(
                "id",
                vec!["A"],
                vec![("x", "A")],
                Some("A"),
                vec![SStmt::Expr(Term::var("x"))],
            ),
            fun(
                "main",
                vec![],
                vec![],
                None,
                vec![SStmt::Expr(Term::call(
                    "println",
                    vec![Term::call("id", vec![Term::int(3)])],
                ))],
            ),
        ],
    );

    let (ctx, outcome) = compile(&tree);
    let core = outcome.expect("compiles");

    // id : [A](A) => A / {}
    let id_def = tree.defs[1].binder().unwrap();
    let id_sym = *ctx.db.require(anns::SYMBOL, id_def.id);
    let id_type = ctx.db.require(anns::BLOCK_TYPE, id_sym);
    assert_eq!(
        format!("{}", DisplayType { ty: id_type, symbols: &ctx.symbols }),
        "[A](A) => A / {}"
    );
    let id_capture = ctx.db.require(anns::CAPTURE, id_sym);
    assert!(id_capture.is_pure());

    // def id = { (x) => return x }
    let id_block = toplevel_block(&core, &ctx, "id");
    match body_of(id_block) {
        Stmt::Return(Pure::Var(x)) => {
            assert_eq!(ctx.symbols.name(*x).qualified(), "x");
        }
        other => panic!("expected `return x`, got {:?}", other),
    }

    // main stays direct style: the pure call runs, the io call is direct
    let main_body = body_of(toplevel_block(&core, &ctx, "main"));
    let runs = count_in_stmt(main_body, &|s| {
        matches!(s, Stmt::Let { expr: mica_core::Expr::Run(_), .. })
    });
    let directs = count_in_stmt(main_body, &|s| {
        matches!(s, Stmt::Let { expr: mica_core::Expr::DirectApp { .. }, .. })
    });
    assert!(runs >= 1, "the pure call to id should be embedded with run");
    assert!(directs >= 1, "the io call to println should stay direct");
    let suspends = count_in_stmt(main_body, &|s| matches!(s, Stmt::Val { .. }));
    assert_eq!(suspends, 0, "nothing in main may suspend");
}

// -- scenario: pattern matching ---------------------------------------------

#[test]
fn closed_match_compiles_without_default() {
    // type T { A(Int); B; C(T) }
    let data = Definition::Data {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        binder: IdDef::new("T"),
        tparams: vec![],
        ctors: vec![
            CtorDef { binder: IdDef::new("A"), fields: vec![TypeTree::reference("Int")] },
            CtorDef { binder: IdDef::new("B"), fields: vec![] },
            CtorDef { binder: IdDef::new("C"), fields: vec![TypeTree::reference("T")] },
        ],
    };

    // def f(t: T): Int = t match { A(n) => n; B => 0; C(A(n)) => add(n, 1); C(_) => neg }
    let clauses = vec![
        MatchClause::new(
            Pattern::tag("A", vec![Pattern::ident("n")]),
            Stmts::expr(Term::var("n")),
        ),
        MatchClause::new(Pattern::tag("B", vec![]), Stmts::expr(Term::int(0))),
        MatchClause::new(
            Pattern::tag("C", vec![Pattern::tag("A", vec![Pattern::ident("n")])]),
            Stmts::expr(Term::call("add", vec![Term::var("n"), Term::int(1)])),
        ),
        MatchClause::new(
            Pattern::tag("C", vec![Pattern::any()]),
            Stmts::expr(Term::int(-1)),
        ),
    ];
    let f = fun(
        "f",
        vec![],
        vec![("t", "T")],
        Some("Int"),
        vec![SStmt::Expr(Term::new(TermKind::Match {
            scrutinee: Box::new(Term::var("t")),
            clauses,
        }))],
    );

    let tree = ModuleTree::new(
        "demo",
        vec![
            data,
            extern_fun("add", vec![("x", "Int"), ("y", "Int")], "Int", vec![]),
            f,
        ],
    );

    let (ctx, outcome) = compile(&tree);
    let core = outcome.expect("compiles");

    let f_body = body_of(toplevel_block(&core, &ctx, "f"));
    let outer = find_match(f_body).expect("f compiles to a match");
    match outer {
        Stmt::Match { branches, default, .. } => {
            // All three constructors covered, in declaration order
            assert_eq!(branches.len(), 3);
            let names: Vec<String> =
                branches.iter().map(|(c, _)| ctx.symbols.name(*c).qualified()).collect();
            assert_eq!(names, vec!["A", "B", "C"]);
            assert!(default.is_none(), "a closed match needs no default");

            // The nested match on C's field covers only A, so it keeps one
            let (_, c_branch) = &branches[2];
            match find_match(&c_branch.body) {
                Some(Stmt::Match { branches, default, .. }) => {
                    assert_eq!(branches.len(), 1);
                    assert!(default.is_some());
                }
                other => panic!("expected a nested match, got {:?}", other),
            }
        }
        _ => unreachable!(),
    }

    // Every clause body became a join point: four labels, each applied
    let apps = count_in_stmt(f_body, &|s| matches!(s, Stmt::App { .. }));
    assert!(apps >= 4, "all four clause labels must be reachable, saw {}", apps);
}

// -- scenario: while with pure condition ------------------------------------

#[test]
fn pure_while_condition_warns() {
    // def spin(): Unit = { var i = 0; while (true) { i = add(i, 1) }; () }
    let body = vec![
        SStmt::Def(Definition::Var {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            binder: IdDef::new("i"),
            region: None,
            init: Term::int(0),
        }),
        SStmt::Expr(Term::new(TermKind::While {
            cond: Box::new(Term::literal(Literal::Bool(true))),
            body: Stmts::expr(Term::new(TermKind::Assign {
                target: IdRef::new("i"),
                value: Box::new(Term::call("add", vec![Term::var("i"), Term::int(1)])),
            })),
        })),
        SStmt::Expr(Term::unit()),
    ];
    let tree = ModuleTree::new(
        "demo",
        vec![
            extern_fun("add", vec![("x", "Int"), ("y", "Int")], "Int", vec![]),
            fun("spin", vec![], vec![], Some("Unit"), body),
        ],
    );

    let (ctx, outcome) = compile(&tree);
    outcome.expect("compiles despite the warning");

    let warnings: Vec<_> = ctx
        .messages
        .sorted_deduped()
        .into_iter()
        .filter(|m| m.severity == Severity::Warning)
        .collect();
    assert!(
        warnings
            .iter()
            .any(|m| m.text == "Condition to while loop is pure, which might not be intended"),
        "expected the pure-condition warning, got {:?}",
        warnings
    );
}

// -- scenario: overload ambiguity -------------------------------------------

#[test]
fn ambiguous_overload_is_reported_with_both_candidates() {
    let tree = ModuleTree::new(
        "demo",
        vec![
            extern_fun("log", vec![("x", "Int")], "Unit", vec!["io"]),
            extern_fun("log", vec![("x", "Double")], "Unit", vec!["io"]),
            fun(
                "main",
                vec![],
                vec![],
                None,
                vec![SStmt::Expr(Term::call("log", vec![Term::int(1)]))],
            ),
        ],
    );

    let (ctx, outcome) = compile(&tree);
    assert!(outcome.is_err(), "no core may be emitted");

    let errors: Vec<_> = ctx
        .messages
        .sorted_deduped()
        .into_iter()
        .filter(|m| m.severity == Severity::Error)
        .collect();
    let ambiguous = errors
        .iter()
        .find(|m| m.text.contains("ambiguous call to 'log'"))
        .expect("an ambiguous-overload error");
    // Both candidates are listed with their qualified names and types
    assert_eq!(ambiguous.notes.len(), 2);
    assert!(ambiguous.notes.iter().all(|n| n.starts_with("demo.log")));
    assert!(ambiguous.notes.iter().any(|n| n.contains("Int")));
    assert!(ambiguous.notes.iter().any(|n| n.contains("Double")));
}

// -- handler lowering --------------------------------------------------------

#[test]
fn handler_clauses_reorder_to_declaration_order() {
    // effect Amb { def flip(): Bool; def fail(): Unit }
    let effect = Definition::Effect {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        binder: IdDef::new("Amb"),
        tparams: vec![],
        ops: vec![
            OperationDef {
                binder: IdDef::new("flip"),
                tparams: vec![],
                vparams: vec![],
                ret: Some(TypeTree::reference("Bool")),
            },
            OperationDef {
                binder: IdDef::new("fail"),
                tparams: vec![],
                vparams: vec![],
                ret: Some(TypeTree::reference("Unit")),
            },
        ],
    };

    // Clauses written in the opposite order of the declaration
    let handler = mica_syntax::HandlerTree {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        effect: IdRef::new("Amb"),
        capability: None,
        clauses: vec![
            OpClauseTree {
                id: NodeId::fresh(),
                span: Span::synthetic(),
                op: IdRef::new("fail"),
                vparams: vec![],
                resume: IdDef::new("resume"),
                body: Stmts::expr(Term::unit()),
            },
            OpClauseTree {
                id: NodeId::fresh(),
                span: Span::synthetic(),
                op: IdRef::new("flip"),
                vparams: vec![],
                resume: IdDef::new("resume"),
                body: Stmts::expr(Term::literal(Literal::Bool(true))),
            },
        ],
    };

    let main = fun(
        "main",
        vec![],
        vec![],
        None,
        vec![SStmt::Expr(Term::new(TermKind::TryHandle {
            body: Stmts::expr(Term::literal(Literal::Bool(false))),
            handlers: vec![handler],
        }))],
    );

    let tree = ModuleTree::new("demo", vec![effect, main]);
    let (ctx, outcome) = compile(&tree);
    let core = outcome.expect("compiles");

    let main_body = body_of(toplevel_block(&core, &ctx, "main"));
    fn find_try(stmt: &Stmt) -> Option<&Stmt> {
        match stmt {
            Stmt::Try { .. } => Some(stmt),
            Stmt::Val { binding, body, .. } => find_try(binding).or_else(|| find_try(body)),
            Stmt::Let { body, .. } | Stmt::Def { body, .. } => find_try(body),
            _ => None,
        }
    }
    let Some(Stmt::Try { body, handlers }) = find_try(main_body) else {
        panic!("main must lower to a try");
    };

    // One capability block parameter for the one handler
    match body {
        Block::Lit(lit) => assert_eq!(lit.params.len(), 1),
        other => panic!("expected a block literal, got {:?}", other),
    }

    // Operations follow the effect's declaration order, not clause order
    assert_eq!(handlers.len(), 1);
    let ops: Vec<String> = handlers[0]
        .operations
        .iter()
        .map(|o| ctx.symbols.name(o.op).qualified())
        .collect();
    assert_eq!(ops, vec!["flip", "fail"]);
}

// -- error policy ------------------------------------------------------------

#[test]
fn effectful_toplevel_binding_is_fatal() {
    // effect Exc { def raise(): Unit }  +  val x = do raise()
    let effect = Definition::Effect {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        binder: IdDef::new("Exc"),
        tparams: vec![],
        ops: vec![OperationDef {
            binder: IdDef::new("raise"),
            tparams: vec![],
            vparams: vec![],
            ret: Some(TypeTree::reference("Unit")),
        }],
    };
    let toplevel_val = Definition::Val {
        id: NodeId::fresh(),
        span: Span::synthetic(),
        binder: IdDef::new("x"),
        binding: Term::new(TermKind::Do {
            effect: None,
            op: IdRef::new("raise"),
            vargs: vec![],
        }),
    };
    let tree = ModuleTree::new("demo", vec![effect, toplevel_val]);

    let (_ctx, outcome) = compile(&tree);
    let err = outcome.expect_err("an effectful top-level binding must be fatal");
    assert!(err.contains("top-level"), "unexpected error: {}", err);
}
