//! Linear IR produced by control-flow lowering
//!
//! One [`Op`] is one primitive action. Operands are symbols or immediate
//! constants, never raw registers, until the allocator has run; jumps
//! reference symbolic [`Label`]s that stay symbolic until assembly.

use crate::ast::BinOp;
use crate::compiler::scope::SymbolId;
use crate::target::Label;
use std::fmt;

/// An IR operand: a symbol's current value or an immediate constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The value held by a symbol
    Sym(SymbolId),
    /// A literal constant
    Imm(f64),
}

impl Value {
    /// The symbol this operand reads, if any.
    pub fn sym(&self) -> Option<SymbolId> {
        match self {
            Value::Sym(s) => Some(*s),
            Value::Imm(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Sym(s) => write!(f, "{s}"),
            Value::Imm(v) => write!(f, "{v}"),
        }
    }
}

/// One primitive IR operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// dst = lhs op rhs
    ///
    /// `op` is arithmetic or comparison; short-circuit `and`/`or` never
    /// reach the IR (lowering turns them into branches).
    Bin {
        /// Result symbol
        dst: SymbolId,
        /// The operator
        op: BinOp,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// dst = src
    Move {
        /// Destination symbol
        dst: SymbolId,
        /// Source operand
        src: Value,
    },
    /// Defines `label` at this position
    Bind(Label),
    /// Unconditional jump
    Jump(Label),
    /// Jump to `target` when `cond` is zero
    BranchZero {
        /// Tested operand
        cond: Value,
        /// Jump destination
        target: Label,
    },
    /// Jump to `target` when `cond` is non-zero
    BranchNotZero {
        /// Tested operand
        cond: Value,
        /// Jump destination
        target: Label,
    },
    /// dst = read of a device parameter through an alias symbol
    DeviceLoad {
        /// Result symbol
        dst: SymbolId,
        /// The device alias symbol
        device: SymbolId,
        /// Parameter name on the device
        param: String,
    },
    /// Write of a value to a device parameter through an alias symbol
    DeviceStore {
        /// The device alias symbol
        device: SymbolId,
        /// Parameter name on the device
        param: String,
        /// Value to write
        src: Value,
    },
    /// End the current chip tick
    Yield,
    /// Placeholder, dropped before selection
    Nop,
}

impl Op {
    /// The symbol this operation defines, if any.
    pub fn def(&self) -> Option<SymbolId> {
        match self {
            Op::Bin { dst, .. } | Op::Move { dst, .. } | Op::DeviceLoad { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// Symbols this operation reads.
    ///
    /// Pinned device-alias symbols show up here too; the allocator skips
    /// them since they never enter the general pool.
    pub fn uses(&self) -> Vec<SymbolId> {
        fn push(out: &mut Vec<SymbolId>, v: &Value) {
            if let Some(s) = v.sym() {
                out.push(s);
            }
        }
        let mut out = Vec::new();
        match self {
            Op::Bin { lhs, rhs, .. } => {
                push(&mut out, lhs);
                push(&mut out, rhs);
            }
            Op::Move { src, .. } => push(&mut out, src),
            Op::BranchZero { cond, .. } | Op::BranchNotZero { cond, .. } => push(&mut out, cond),
            Op::DeviceLoad { device, .. } => out.push(*device),
            Op::DeviceStore { device, src, .. } => {
                out.push(*device);
                push(&mut out, src);
            }
            Op::Bind(_) | Op::Jump(_) | Op::Yield | Op::Nop => {}
        }
        out
    }

    /// The label this operation jumps to, if any.
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Op::Jump(l) | Op::BranchZero { target: l, .. } | Op::BranchNotZero { target: l, .. } => {
                Some(*l)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Bin { dst, op, lhs, rhs } => write!(f, "{dst} = {lhs} {op} {rhs}"),
            Op::Move { dst, src } => write!(f, "{dst} = {src}"),
            Op::Bind(l) => write!(f, "{l}:"),
            Op::Jump(l) => write!(f, "jump {l}"),
            Op::BranchZero { cond, target } => write!(f, "if !{cond} jump {target}"),
            Op::BranchNotZero { cond, target } => write!(f, "if {cond} jump {target}"),
            Op::DeviceLoad { dst, device, param } => write!(f, "{dst} = load {device}.{param}"),
            Op::DeviceStore { device, param, src } => write!(f, "store {device}.{param} = {src}"),
            Op::Yield => f.write_str("yield"),
            Op::Nop => f.write_str("nop"),
        }
    }
}

/// The linear IR for one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    /// Operations in execution order
    pub ops: Vec<Op>,
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.ops {
            writeln!(f, "{op}")?;
        }
        Ok(())
    }
}
