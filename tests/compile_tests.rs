//! End-to-end compilation tests
//!
//! Programs are built as ASTs, compiled for a chip model, and checked by
//! running the listing in the simulator and observing device parameters
//! and registers.

use emberc::ast::{BinOp, Block, Expr, Identifier, Program, Span, Stmt};
use emberc::compiler::{compile, CompileOptions, Compiler};
use emberc::error::Error;
use emberc::simulator::{DeviceKey, Simulator, TickResult};
use emberc::target::{Instr, JumpTarget, TargetSpec};

fn ident(name: &str) -> Identifier {
    Identifier::new(name, Span::default())
}

fn let_(name: &str, value: Expr) -> Stmt {
    Stmt::Let {
        name: ident(name),
        value,
    }
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        name: ident(name),
        value,
    }
}

fn device(name: &str, designator: &str) -> Stmt {
    Stmt::DeviceAlias {
        name: ident(name),
        designator: ident(designator),
    }
}

fn write(device: &str, param: &str, value: Expr) -> Stmt {
    Stmt::DeviceWrite {
        device: ident(device),
        param: ident(param),
        value,
    }
}

fn read(device: &str, param: &str) -> Expr {
    Expr::DeviceRead {
        device: ident(device),
        param: ident(param),
    }
}

fn var(name: &str) -> Expr {
    Expr::Ident(ident(name))
}

fn run_once(program: &Program) -> Simulator {
    let spec = TargetSpec::default();
    let listing = compile(program).unwrap();
    let mut sim = Simulator::new(spec, listing);
    sim.run(64);
    sim
}

/// Sign classifier: reads a sensor, writes 1 or -1 depending on sign.
fn sign_program() -> Program {
    Program::new(vec![
        device("sensor", "d0"),
        device("out", "d1"),
        let_("a", read("sensor", "Setting")),
        Stmt::If {
            cond: Expr::binary(BinOp::Gt, var("a"), Expr::number(0.0)),
            then_body: Block::new(vec![write("out", "Setting", Expr::number(1.0))]),
            else_body: Some(Block::new(vec![write(
                "out",
                "Setting",
                Expr::number(-1.0),
            )])),
        },
    ])
}

#[test]
fn test_if_else_takes_then_branch_on_positive_input() {
    let listing = compile(&sign_program()).unwrap();
    let mut sim = Simulator::new(TargetSpec::default(), listing);
    sim.set_param(DeviceKey::Port(0), "Setting", 5.0);
    sim.run(4);
    assert_eq!(sim.param(DeviceKey::Port(1), "Setting"), 1.0);
}

#[test]
fn test_if_else_takes_else_branch_on_negative_input() {
    let listing = compile(&sign_program()).unwrap();
    let mut sim = Simulator::new(TargetSpec::default(), listing);
    sim.set_param(DeviceKey::Port(0), "Setting", -3.0);
    sim.run(4);
    assert_eq!(sim.param(DeviceKey::Port(1), "Setting"), -1.0);
}

#[test]
fn test_while_loop_counts_to_ten() {
    let program = Program::new(vec![
        device("base", "db"),
        let_("x", Expr::number(0.0)),
        Stmt::While {
            cond: Expr::binary(BinOp::Lt, var("x"), Expr::number(10.0)),
            body: Block::new(vec![assign(
                "x",
                Expr::binary(BinOp::Add, var("x"), Expr::number(1.0)),
            )]),
        },
        write("base", "Setting", var("x")),
    ]);
    let sim = run_once(&program);
    assert_eq!(sim.param(DeviceKey::Housing, "Setting"), 10.0);
}

#[test]
fn test_loop_as_final_statement_keeps_its_back_edge() {
    // The back-edge jump is the last real instruction here; the loop must
    // still run all ten iterations.
    let program = Program::new(vec![
        device("base", "db"),
        let_("x", Expr::number(0.0)),
        Stmt::While {
            cond: Expr::binary(BinOp::Lt, var("x"), Expr::number(10.0)),
            body: Block::new(vec![
                write("base", "Setting", var("x")),
                assign("x", Expr::binary(BinOp::Add, var("x"), Expr::number(1.0))),
            ]),
        },
    ]);
    let sim = run_once(&program);
    assert_eq!(sim.param(DeviceKey::Housing, "Setting"), 9.0);
}

#[test]
fn test_for_loop_sums_first_four_integers() {
    let program = Program::new(vec![
        device("base", "db"),
        let_("sum", Expr::number(0.0)),
        Stmt::For {
            init: Box::new(let_("i", Expr::number(1.0))),
            cond: Expr::binary(BinOp::Le, var("i"), Expr::number(4.0)),
            step: Box::new(assign(
                "i",
                Expr::binary(BinOp::Add, var("i"), Expr::number(1.0)),
            )),
            body: Block::new(vec![assign(
                "sum",
                Expr::binary(BinOp::Add, var("sum"), var("i")),
            )]),
        },
        write("base", "Setting", var("sum")),
    ]);
    let sim = run_once(&program);
    assert_eq!(sim.param(DeviceKey::Housing, "Setting"), 10.0);
}

#[test]
fn test_register_pool_boundary() {
    let spec = TargetSpec::default();
    let pool = spec.pool();

    // n variables all live at once: declared up front, consumed after.
    let build = |n: usize| {
        let mut stmts = vec![device("base", "db")];
        for i in 0..n {
            stmts.push(let_(&format!("v{i}"), Expr::number(i as f64)));
        }
        for i in 0..n {
            stmts.push(write("base", &format!("P{i}"), var(&format!("v{i}"))));
        }
        Program::new(stmts)
    };

    assert!(Compiler::new(spec).compile(&build(pool)).is_ok());

    let err = Compiler::new(spec).compile(&build(pool + 1)).unwrap_err();
    assert!(
        matches!(err, Error::RegisterExhaustion { live, pool: p } if live == pool + 1 && p == pool),
        "expected exhaustion, got {err:?}"
    );
}

#[test]
fn test_line_limit_boundary() {
    let spec = TargetSpec {
        line_limit: 8,
        ..TargetSpec::default()
    };
    let build = |n: usize| {
        Program::new(
            (0..n)
                .map(|_| Stmt::Yield {
                    span: Span::default(),
                })
                .collect(),
        )
    };

    let listing = Compiler::new(spec).compile(&build(8)).unwrap();
    assert_eq!(listing.len(), 8);

    let err = Compiler::new(spec).compile(&build(9)).unwrap_err();
    assert_eq!(err, Error::LineLimitExceeded { lines: 9, limit: 8 });
}

#[test]
fn test_all_jump_targets_resolve_within_the_listing() {
    let program = Program::new(vec![
        device("base", "db"),
        let_("x", Expr::number(0.0)),
        Stmt::While {
            cond: Expr::binary(BinOp::Lt, var("x"), Expr::number(3.0)),
            body: Block::new(vec![
                Stmt::If {
                    cond: var("x"),
                    then_body: Block::new(vec![write("base", "Setting", var("x"))]),
                    else_body: None,
                },
                assign("x", Expr::binary(BinOp::Add, var("x"), Expr::number(1.0))),
            ]),
        },
    ]);
    let listing = compile(&program).unwrap();
    for line in &listing.lines {
        let target = match line {
            Instr::Jump { target }
            | Instr::BranchEqZero { target, .. }
            | Instr::BranchNeZero { target, .. } => target,
            _ => continue,
        };
        match target {
            // One past the end is legal: it means halt.
            JumpTarget::Line(n) => assert!(*n <= listing.len(), "target {n} out of range"),
            JumpTarget::Label(l) => panic!("unresolved label {l} in final listing"),
        }
    }
}

#[test]
fn test_nested_constant_expressions_fold_away() {
    // ((2 + 3) * 4) - 20 is 0; no arithmetic should survive.
    let program = Program::new(vec![
        device("base", "db"),
        let_(
            "x",
            Expr::binary(
                BinOp::Sub,
                Expr::binary(
                    BinOp::Mul,
                    Expr::binary(BinOp::Add, Expr::number(2.0), Expr::number(3.0)),
                    Expr::number(4.0),
                ),
                Expr::number(20.0),
            ),
        ),
        write("base", "Setting", var("x")),
    ]);
    let listing = compile(&program).unwrap();
    for line in &listing.lines {
        assert!(
            !matches!(
                line,
                Instr::Add { .. } | Instr::Sub { .. } | Instr::Mul { .. } | Instr::Div { .. }
            ),
            "arithmetic survived folding: {line}"
        );
    }
    let mut sim = Simulator::new(TargetSpec::default(), listing);
    sim.run(4);
    assert_eq!(sim.param(DeviceKey::Housing, "Setting"), 0.0);
}

#[test]
fn test_short_circuit_skips_device_read() {
    // b.Pressure would read 100, but the left operand is 0 so the read
    // never runs and the parameter write sees an untouched rhs.
    let program = Program::new(vec![
        device("base", "db"),
        device("b", "d0"),
        let_("zero", Expr::number(0.0)),
        let_(
            "r",
            Expr::binary(BinOp::And, var("zero"), read("b", "Pressure")),
        ),
        write("base", "Setting", var("r")),
    ]);
    let spec = TargetSpec::default();
    let listing = Compiler::with_options(spec, CompileOptions { optimize: false })
        .compile(&program)
        .unwrap();
    let mut sim = Simulator::new(spec, listing);
    sim.set_param(DeviceKey::Port(0), "Pressure", 100.0);
    sim.run(4);
    assert_eq!(sim.param(DeviceKey::Housing, "Setting"), 0.0);
}

#[test]
fn test_indirect_device_alias_retargets_through_register() {
    let spec = TargetSpec::default();
    let program = Program::new(vec![
        device("rov", "dr0"),
        assign("rov", Expr::number(42.0)),
        write("rov", "On", Expr::number(1.0)),
        assign("rov", Expr::number(7.0)),
        write("rov", "On", Expr::number(1.0)),
    ]);
    let listing = Compiler::new(spec).compile(&program).unwrap();
    let mut sim = Simulator::new(spec, listing);
    sim.run(4);
    assert_eq!(sim.param(DeviceKey::Id(42), "On"), 1.0);
    assert_eq!(sim.param(DeviceKey::Id(7), "On"), 1.0);
}

#[test]
fn test_yielding_control_loop_runs_across_ticks() {
    // Thermostat shape: every tick, mirror the sensor and yield.
    let program = Program::new(vec![
        device("sensor", "d0"),
        device("out", "d1"),
        Stmt::While {
            cond: Expr::number(1.0),
            body: Block::new(vec![
                write("out", "Setting", read("sensor", "Temperature")),
                Stmt::Yield {
                    span: Span::default(),
                },
            ]),
        },
    ]);
    let listing = compile(&program).unwrap();
    let mut sim = Simulator::new(TargetSpec::default(), listing);

    sim.set_param(DeviceKey::Port(0), "Temperature", 290.0);
    assert_eq!(sim.tick(), TickResult::Yield);
    assert_eq!(sim.param(DeviceKey::Port(1), "Setting"), 290.0);

    sim.set_param(DeviceKey::Port(0), "Temperature", 300.0);
    assert_eq!(sim.tick(), TickResult::Yield);
    assert_eq!(sim.param(DeviceKey::Port(1), "Setting"), 300.0);
}

#[test]
fn test_constants_cost_no_registers() {
    let spec = TargetSpec::default();
    let pool = spec.pool();
    // More constants than registers, one live variable.
    let mut stmts = vec![device("base", "db")];
    for i in 0..pool * 2 {
        stmts.push(Stmt::Const {
            name: ident(&format!("k{i}")),
            value: Expr::number(i as f64),
        });
    }
    stmts.push(let_("x", var(&format!("k{}", pool * 2 - 1))));
    stmts.push(write("base", "Setting", var("x")));
    let sim = run_once(&Program::new(stmts));
    assert_eq!(
        sim.param(DeviceKey::Housing, "Setting"),
        (pool * 2 - 1) as f64
    );
}

#[test]
fn test_errors_surface_with_source_spans() {
    let program = Program::new(vec![Stmt::Assign {
        name: Identifier::new("ghost", Span::new(3, 5)),
        value: Expr::number(1.0),
    }]);
    let err = compile(&program).unwrap_err();
    assert_eq!(err.to_string(), "unbound identifier `ghost` at 3:5");
}
