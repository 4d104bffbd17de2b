//! Instruction selection
//!
//! Rewrites the linear IR into chip instructions using the register
//! assignment. Selection is total over everything lowering emits; an IR
//! shape with no mapping (a logical operator surviving lowering, a symbol
//! with no register) is a pipeline bug and surfaces as
//! [`Error::Internal`] rather than a panic.

use crate::ast::BinOp;
use crate::compiler::ir::{IrProgram, Op, Value};
use crate::compiler::regalloc::Allocation;
use crate::compiler::scope::{SymbolId, SymbolKind, SymbolTable};
use crate::error::{Error, Result};
use crate::target::{Device, Instr, JumpTarget, Operand, Register};

/// Select chip instructions for the whole program.
pub fn select(table: &SymbolTable, alloc: &Allocation, ir: &IrProgram) -> Result<Vec<Instr>> {
    let selector = Selector { table, alloc };
    let mut out = Vec::with_capacity(ir.ops.len());
    for op in &ir.ops {
        if let Some(instr) = selector.select_op(op)? {
            out.push(instr);
        }
    }
    tracing::debug!(instrs = out.len(), "instruction selection done");
    Ok(out)
}

struct Selector<'a> {
    table: &'a SymbolTable,
    alloc: &'a Allocation,
}

impl Selector<'_> {
    fn select_op(&self, op: &Op) -> Result<Option<Instr>> {
        let instr = match op {
            Op::Bin { dst, op, lhs, rhs } => {
                let dst = self.reg(*dst)?;
                let a = self.operand(*lhs)?;
                let b = self.operand(*rhs)?;
                binary_instr(*op, dst, a, b)?
            }
            Op::Move { dst, src } => Instr::Move {
                dst: self.reg(*dst)?,
                src: self.operand(*src)?,
            },
            Op::Bind(label) => Instr::Label(*label),
            Op::Jump(label) => Instr::Jump {
                target: JumpTarget::Label(*label),
            },
            Op::BranchZero { cond, target } => Instr::BranchEqZero {
                cond: self.operand(*cond)?,
                target: JumpTarget::Label(*target),
            },
            Op::BranchNotZero { cond, target } => Instr::BranchNeZero {
                cond: self.operand(*cond)?,
                target: JumpTarget::Label(*target),
            },
            Op::DeviceLoad { dst, device, param } => Instr::Load {
                dst: self.reg(*dst)?,
                device: self.device(*device)?,
                param: param.clone(),
            },
            Op::DeviceStore { device, param, src } => Instr::Store {
                device: self.device(*device)?,
                param: param.clone(),
                src: self.operand(*src)?,
            },
            Op::Yield => Instr::Yield,
            Op::Nop => return Ok(None),
        };
        Ok(Some(instr))
    }

    fn reg(&self, sym: SymbolId) -> Result<Register> {
        self.alloc
            .get(sym)
            .ok_or_else(|| Error::internal(format!("{sym} has no register assignment")))
    }

    fn operand(&self, value: Value) -> Result<Operand> {
        match value {
            Value::Sym(s) => Ok(Operand::Register(self.reg(s)?)),
            Value::Imm(v) => Ok(Operand::Imm(v)),
        }
    }

    /// The device port operand behind an alias symbol.
    fn device(&self, sym: SymbolId) -> Result<Device> {
        match self.table.get(sym).kind {
            SymbolKind::Device(d) => Ok(d),
            _ => Err(Error::internal(format!("{sym} is not a device alias"))),
        }
    }
}

fn binary_instr(op: BinOp, dst: Register, a: Operand, b: Operand) -> Result<Instr> {
    let instr = match op {
        BinOp::Add => Instr::Add { dst, a, b },
        BinOp::Sub => Instr::Sub { dst, a, b },
        BinOp::Mul => Instr::Mul { dst, a, b },
        BinOp::Div => Instr::Div { dst, a, b },
        BinOp::Eq => Instr::Seq { dst, a, b },
        BinOp::Ne => Instr::Sne { dst, a, b },
        BinOp::Lt => Instr::Slt { dst, a, b },
        BinOp::Le => Instr::Sle { dst, a, b },
        BinOp::Gt => Instr::Sgt { dst, a, b },
        BinOp::Ge => Instr::Sge { dst, a, b },
        // Lowering turns these into branches; none may survive to here.
        BinOp::And | BinOp::Or => {
            return Err(Error::internal(format!(
                "logical operator {op} reached instruction selection"
            )))
        }
    };
    Ok(instr)
}
