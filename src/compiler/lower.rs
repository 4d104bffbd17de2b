//! Control-flow lowering
//!
//! Flattens the resolved statement tree into the linear IR. Structured
//! constructs become conditional branches over fresh labels; `for` loops
//! desugar into their while form; short-circuit `and`/`or` become branch
//! sequences so the right operand is only evaluated when it can still
//! decide the result. Every label is bound exactly once, in the same
//! stream that jumps to it.

use crate::ast::{BinOp, UnOp};
use crate::compiler::ir::{IrProgram, Op, Value};
use crate::compiler::scope::{RExpr, RStmt, SymbolId, SymbolTable};
use crate::error::Result;
use crate::target::Label;

/// Lower a resolved statement tree into linear IR.
///
/// Takes the symbol table mutably: expression lowering mints temporaries.
pub fn lower(table: &mut SymbolTable, stmts: &[RStmt]) -> Result<IrProgram> {
    let mut lowerer = Lowerer {
        table,
        ops: Vec::new(),
        next_label: 0,
    };
    lowerer.lower_stmts(stmts)?;
    tracing::debug!(
        ops = lowerer.ops.len(),
        labels = lowerer.next_label,
        "lowering done"
    );
    Ok(IrProgram { ops: lowerer.ops })
}

struct Lowerer<'a> {
    table: &'a mut SymbolTable,
    ops: Vec<Op>,
    next_label: u32,
}

impl Lowerer<'_> {
    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn lower_stmts(&mut self, stmts: &[RStmt]) -> Result<()> {
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &RStmt) -> Result<()> {
        match stmt {
            RStmt::Assign { dst, value } => self.lower_expr_into(*dst, value),
            RStmt::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(cond, then_body, else_body),
            RStmt::While { cond, body } => self.lower_while(cond, body, None),
            RStmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.lower_stmt(init)?;
                self.lower_while(cond, body, Some(step))
            }
            RStmt::DeviceWrite {
                device,
                param,
                value,
            } => {
                let src = self.lower_expr(value)?;
                self.emit(Op::DeviceStore {
                    device: *device,
                    param: param.clone(),
                    src,
                });
                Ok(())
            }
            RStmt::Yield => {
                self.emit(Op::Yield);
                Ok(())
            }
        }
    }

    fn lower_if(&mut self, cond: &RExpr, then_body: &[RStmt], else_body: &[RStmt]) -> Result<()> {
        let c = self.lower_expr(cond)?;
        if else_body.is_empty() {
            let end = self.new_label();
            self.emit(Op::BranchZero { cond: c, target: end });
            self.lower_stmts(then_body)?;
            self.emit(Op::Bind(end));
        } else {
            let else_l = self.new_label();
            let end = self.new_label();
            self.emit(Op::BranchZero {
                cond: c,
                target: else_l,
            });
            self.lower_stmts(then_body)?;
            self.emit(Op::Jump(end));
            self.emit(Op::Bind(else_l));
            self.lower_stmts(else_body)?;
            self.emit(Op::Bind(end));
        }
        Ok(())
    }

    /// Pre-tested loop. `step`, when present, runs after the body; the
    /// condition is re-evaluated fresh on every iteration.
    fn lower_while(&mut self, cond: &RExpr, body: &[RStmt], step: Option<&RStmt>) -> Result<()> {
        let head = self.new_label();
        let end = self.new_label();
        self.emit(Op::Bind(head));
        let c = self.lower_expr(cond)?;
        self.emit(Op::BranchZero { cond: c, target: end });
        self.lower_stmts(body)?;
        if let Some(step) = step {
            self.lower_stmt(step)?;
        }
        self.emit(Op::Jump(head));
        self.emit(Op::Bind(end));
        Ok(())
    }

    /// Lower an expression, placing the result in `dst` without an
    /// intermediate temporary where the shape allows it.
    fn lower_expr_into(&mut self, dst: SymbolId, expr: &RExpr) -> Result<()> {
        match expr {
            RExpr::Binary { op, lhs, rhs } if !matches!(op, BinOp::And | BinOp::Or) => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                self.emit(Op::Bin {
                    dst,
                    op: *op,
                    lhs: l,
                    rhs: r,
                });
                Ok(())
            }
            RExpr::Binary { op, lhs, rhs } => self.lower_logical(dst, *op, lhs, rhs),
            RExpr::Unary { op, operand } => {
                let v = self.lower_expr(operand)?;
                self.emit(unary_op(dst, *op, v));
                Ok(())
            }
            RExpr::DeviceRead { device, param } => {
                self.emit(Op::DeviceLoad {
                    dst,
                    device: *device,
                    param: param.clone(),
                });
                Ok(())
            }
            _ => {
                let src = self.lower_expr(expr)?;
                self.emit(Op::Move { dst, src });
                Ok(())
            }
        }
    }

    fn lower_expr(&mut self, expr: &RExpr) -> Result<Value> {
        match expr {
            RExpr::Number(v) => Ok(Value::Imm(*v)),
            RExpr::Sym(s) => Ok(Value::Sym(*s)),
            _ => {
                let dst = self.table.temp();
                self.lower_expr_into(dst, expr)?;
                Ok(Value::Sym(dst))
            }
        }
    }

    /// Short-circuit `and`/`or`. The result is always an exact 0 or 1,
    /// and the right operand only runs when the left did not decide.
    fn lower_logical(&mut self, dst: SymbolId, op: BinOp, lhs: &RExpr, rhs: &RExpr) -> Result<()> {
        let short = self.new_label();
        let end = self.new_label();
        let (decided, fallthrough) = match op {
            // `and` short-circuits to 0 on a zero operand.
            BinOp::And => (0.0, 1.0),
            // `or` short-circuits to 1 on a non-zero operand.
            BinOp::Or => (1.0, 0.0),
            other => {
                return Err(crate::error::Error::internal(format!(
                    "{other} is not a logical operator"
                )))
            }
        };
        let branch = |cond: Value, target: Label| match op {
            BinOp::And => Op::BranchZero { cond, target },
            _ => Op::BranchNotZero { cond, target },
        };

        let l = self.lower_expr(lhs)?;
        self.emit(branch(l, short));
        let r = self.lower_expr(rhs)?;
        self.emit(branch(r, short));
        self.emit(Op::Move {
            dst,
            src: Value::Imm(fallthrough),
        });
        self.emit(Op::Jump(end));
        self.emit(Op::Bind(short));
        self.emit(Op::Move {
            dst,
            src: Value::Imm(decided),
        });
        self.emit(Op::Bind(end));
        Ok(())
    }
}

/// Select the IR shape for a unary operator.
fn unary_op(dst: SymbolId, op: UnOp, v: Value) -> Op {
    match op {
        // -v is 0 - v; the chip has no dedicated negate.
        UnOp::Neg => Op::Bin {
            dst,
            op: BinOp::Sub,
            lhs: Value::Imm(0.0),
            rhs: v,
        },
        // !v is v == 0, which normalizes to exact 0/1.
        UnOp::Not => Op::Bin {
            dst,
            op: BinOp::Eq,
            lhs: v,
            rhs: Value::Imm(0.0),
        },
    }
}
