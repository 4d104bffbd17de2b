//! Target machine model: the in-game logic chip
//!
//! Describes the device the compiler emits code for: its register file,
//! its instruction set, and the textual listing format the chip loads.
//! Instruction lines are addressed by absolute 0-based line number, which
//! is why jumps carry a [`JumpTarget`] that starts life as a symbolic
//! label and is rewritten to a line number by the assembler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a specific chip model.
///
/// Both limits are externally supplied constants fixed for the lifetime of
/// a [`Compiler`](crate::compiler::Compiler); device profiles can be
/// loaded from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Total general-purpose registers on the chip (`r0..r{n-1}`)
    pub register_count: u8,
    /// Registers at the top of the file reserved for indirect device
    /// addressing; never part of general allocation
    pub reserved_registers: u8,
    /// Hard maximum number of instruction lines the chip can store
    pub line_limit: usize,
}

impl Default for TargetSpec {
    fn default() -> Self {
        // The stock in-game chip.
        Self {
            register_count: 16,
            reserved_registers: 2,
            line_limit: 128,
        }
    }
}

impl TargetSpec {
    /// Registers available for general allocation (`r0..r{pool-1}`).
    pub fn pool(&self) -> usize {
        self.register_count.saturating_sub(self.reserved_registers) as usize
    }

    /// The reserved register backing indirect device slot `index`.
    ///
    /// Returns `None` when the index is outside the reserved range.
    pub fn reserved_register(&self, index: u8) -> Option<Register> {
        if index < self.reserved_registers {
            Some(Register(self.pool() as u8 + index))
        } else {
            None
        }
    }
}

/// A physical chip register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u8);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An instruction operand: a register or an immediate number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Read from a register
    Register(Register),
    /// A literal value baked into the instruction
    Imm(f64),
}

impl Operand {
    /// The register this operand reads, if any.
    pub fn register(&self) -> Option<Register> {
        match self {
            Operand::Register(r) => Some(*r),
            Operand::Imm(_) => None,
        }
    }

    /// The immediate value of this operand, if it is one.
    pub fn imm(&self) -> Option<f64> {
        match self {
            Operand::Imm(v) => Some(*v),
            Operand::Register(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{r}"),
            Operand::Imm(v) => write!(f, "{v}"),
        }
    }
}

/// A device port operand for `l`/`s` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// The chip's own housing (`db`)
    Housing,
    /// A numbered direct port (`d0..d5`)
    Port(u8),
    /// Indirect: the device whose id is held in a reserved register
    /// (`dr14` reads the id from `r14`)
    Indirect(Register),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Housing => f.write_str("db"),
            Device::Port(n) => write!(f, "d{n}"),
            Device::Indirect(r) => write!(f, "dr{}", r.0),
        }
    }
}

/// A symbolic jump target, created by lowering and resolved to an
/// absolute line number by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Where a jump goes: a symbolic label before assembly, an absolute line
/// number after.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpTarget {
    /// Unresolved symbolic target
    Label(Label),
    /// Resolved absolute 0-based line number
    Line(usize),
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::Label(l) => write!(f, "{l}"),
            JumpTarget::Line(n) => write!(f, "{n}"),
        }
    }
}

/// One chip instruction.
///
/// `Label` is a pseudo-instruction marking a position in the stream; it
/// occupies no line and is consumed by the assembler. Every other variant
/// is one line of chip code.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Position marker, removed at assembly
    Label(Label),
    /// `move dst a`: dst = a
    Move {
        /// Destination register
        dst: Register,
        /// Source operand
        src: Operand,
    },
    /// `add dst a b`: dst = a + b
    Add {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `sub dst a b`: dst = a - b
    Sub {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `mul dst a b`: dst = a * b
    Mul {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `div dst a b`: dst = a / b
    Div {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `seq dst a b`: dst = (a == b) as 0/1
    Seq {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `sne dst a b`: dst = (a != b) as 0/1
    Sne {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `slt dst a b`: dst = (a < b) as 0/1
    Slt {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `sle dst a b`: dst = (a <= b) as 0/1
    Sle {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `sgt dst a b`: dst = (a > b) as 0/1
    Sgt {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `sge dst a b`: dst = (a >= b) as 0/1
    Sge {
        /// Destination register
        dst: Register,
        /// Left operand
        a: Operand,
        /// Right operand
        b: Operand,
    },
    /// `l dst device Param`: read a device parameter
    Load {
        /// Destination register
        dst: Register,
        /// Device port to read from
        device: Device,
        /// Parameter name on the device
        param: String,
    },
    /// `s device Param src`: write a device parameter
    Store {
        /// Device port to write to
        device: Device,
        /// Parameter name on the device
        param: String,
        /// Value to write
        src: Operand,
    },
    /// `j target`: unconditional jump
    Jump {
        /// Jump destination
        target: JumpTarget,
    },
    /// `beqz cond target`: jump when cond == 0
    BranchEqZero {
        /// Tested operand
        cond: Operand,
        /// Jump destination
        target: JumpTarget,
    },
    /// `bnez cond target`: jump when cond != 0
    BranchNeZero {
        /// Tested operand
        cond: Operand,
        /// Jump destination
        target: JumpTarget,
    },
    /// `yield`: end the current tick
    Yield,
}

impl Instr {
    /// The register this instruction writes, if any.
    pub fn dst(&self) -> Option<Register> {
        match self {
            Instr::Move { dst, .. }
            | Instr::Add { dst, .. }
            | Instr::Sub { dst, .. }
            | Instr::Mul { dst, .. }
            | Instr::Div { dst, .. }
            | Instr::Seq { dst, .. }
            | Instr::Sne { dst, .. }
            | Instr::Slt { dst, .. }
            | Instr::Sle { dst, .. }
            | Instr::Sgt { dst, .. }
            | Instr::Sge { dst, .. }
            | Instr::Load { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// True when this instruction reads the given register.
    pub fn reads(&self, reg: Register) -> bool {
        let op_reads = |op: &Operand| op.register() == Some(reg);
        match self {
            Instr::Move { src, .. } => op_reads(src),
            Instr::Add { a, b, .. }
            | Instr::Sub { a, b, .. }
            | Instr::Mul { a, b, .. }
            | Instr::Div { a, b, .. }
            | Instr::Seq { a, b, .. }
            | Instr::Sne { a, b, .. }
            | Instr::Slt { a, b, .. }
            | Instr::Sle { a, b, .. }
            | Instr::Sgt { a, b, .. }
            | Instr::Sge { a, b, .. } => op_reads(a) || op_reads(b),
            Instr::Load { device, .. } => matches!(device, Device::Indirect(r) if *r == reg),
            Instr::Store { device, src, .. } => {
                op_reads(src) || matches!(device, Device::Indirect(r) if *r == reg)
            }
            Instr::BranchEqZero { cond, .. } | Instr::BranchNeZero { cond, .. } => op_reads(cond),
            Instr::Label(_) | Instr::Jump { .. } | Instr::Yield => false,
        }
    }

    /// The symbolic label this instruction jumps to, if unresolved.
    pub fn jump_label(&self) -> Option<Label> {
        match self {
            Instr::Jump { target }
            | Instr::BranchEqZero { target, .. }
            | Instr::BranchNeZero { target, .. } => match target {
                JumpTarget::Label(l) => Some(*l),
                JumpTarget::Line(_) => None,
            },
            _ => None,
        }
    }

    /// True for position markers that occupy no chip line.
    pub fn is_pseudo(&self) -> bool {
        matches!(self, Instr::Label(_))
    }

    /// True when removing this instruction cannot change observable
    /// behavior through devices or control flow.
    pub fn is_pure(&self) -> bool {
        self.dst().is_some() && !matches!(self, Instr::Load { .. })
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Label(l) => write!(f, "{l}:"),
            Instr::Move { dst, src } => write!(f, "move {dst} {src}"),
            Instr::Add { dst, a, b } => write!(f, "add {dst} {a} {b}"),
            Instr::Sub { dst, a, b } => write!(f, "sub {dst} {a} {b}"),
            Instr::Mul { dst, a, b } => write!(f, "mul {dst} {a} {b}"),
            Instr::Div { dst, a, b } => write!(f, "div {dst} {a} {b}"),
            Instr::Seq { dst, a, b } => write!(f, "seq {dst} {a} {b}"),
            Instr::Sne { dst, a, b } => write!(f, "sne {dst} {a} {b}"),
            Instr::Slt { dst, a, b } => write!(f, "slt {dst} {a} {b}"),
            Instr::Sle { dst, a, b } => write!(f, "sle {dst} {a} {b}"),
            Instr::Sgt { dst, a, b } => write!(f, "sgt {dst} {a} {b}"),
            Instr::Sge { dst, a, b } => write!(f, "sge {dst} {a} {b}"),
            Instr::Load { dst, device, param } => write!(f, "l {dst} {device} {param}"),
            Instr::Store { device, param, src } => write!(f, "s {device} {param} {src}"),
            Instr::Jump { target } => write!(f, "j {target}"),
            Instr::BranchEqZero { cond, target } => write!(f, "beqz {cond} {target}"),
            Instr::BranchNeZero { cond, target } => write!(f, "bnez {cond} {target}"),
            Instr::Yield => f.write_str("yield"),
        }
    }
}

/// The final assembled program: one instruction per line, 0-based.
///
/// Invariant: contains no pseudo-instructions and every jump target is a
/// resolved [`JumpTarget::Line`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    /// Instructions in execution order
    pub lines: Vec<Instr>,
}

impl Listing {
    /// Number of instruction lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the listing has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        let i = Instr::Add {
            dst: Register(0),
            a: Operand::Register(Register(1)),
            b: Operand::Imm(2.0),
        };
        assert_eq!(i.to_string(), "add r0 r1 2");

        let i = Instr::Load {
            dst: Register(3),
            device: Device::Port(0),
            param: "Temperature".to_string(),
        };
        assert_eq!(i.to_string(), "l r3 d0 Temperature");

        let i = Instr::Store {
            device: Device::Indirect(Register(14)),
            param: "Setting".to_string(),
            src: Operand::Imm(1.0),
        };
        assert_eq!(i.to_string(), "s dr14 Setting 1");

        let i = Instr::BranchEqZero {
            cond: Operand::Register(Register(0)),
            target: JumpTarget::Line(7),
        };
        assert_eq!(i.to_string(), "beqz r0 7");
    }

    #[test]
    fn test_target_spec_reserved_registers() {
        let spec = TargetSpec::default();
        assert_eq!(spec.pool(), 14);
        assert_eq!(spec.reserved_register(0), Some(Register(14)));
        assert_eq!(spec.reserved_register(1), Some(Register(15)));
        assert_eq!(spec.reserved_register(2), None);
    }

    #[test]
    fn test_target_spec_from_json() {
        let json = r#"{ "register_count": 8, "reserved_registers": 1, "line_limit": 64 }"#;
        let spec: TargetSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.pool(), 7);
        assert_eq!(spec.line_limit, 64);
    }

    #[test]
    fn test_reads_tracks_indirect_device_register() {
        let i = Instr::Store {
            device: Device::Indirect(Register(14)),
            param: "Setting".to_string(),
            src: Operand::Imm(0.0),
        };
        assert!(i.reads(Register(14)));
        assert!(!i.reads(Register(0)));
    }
}
