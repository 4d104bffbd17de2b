//! Chip simulator
//!
//! Executes an assembled [`Listing`] the way the in-game chip does: one
//! instruction per step, a budget of steps per tick, absolute line-number
//! jumps, and device parameters read and written by name. Used by the
//! test suites to check compiled programs by their observable effects
//! instead of their exact instruction text.

use crate::ast::BinOp;
use crate::compiler::scope::fold_binop;
use crate::target::{Device, Instr, JumpTarget, Listing, Operand, Register, TargetSpec};
use std::collections::HashMap;

/// Steps the chip executes per tick before forcing a pause.
pub const TICK_BUDGET: usize = 128;

/// How one tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// The program executed a `yield`; the next tick resumes after it
    Yield,
    /// Execution ran past the last line; the program is finished
    End,
    /// The step budget ran out before a `yield` or the end
    LimitHit,
}

/// Identity of a simulated device.
///
/// Direct ports and the housing are fixed; indirect references resolve at
/// execution time to the id held in their register, keyed here as `Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    /// The chip's own housing
    Housing,
    /// A numbered direct port
    Port(u8),
    /// A device addressed by numeric id through an indirect reference
    Id(i64),
}

/// A software model of the chip.
pub struct Simulator {
    listing: Listing,
    registers: Vec<f64>,
    devices: HashMap<DeviceKey, HashMap<String, f64>>,
    pc: usize,
}

impl Simulator {
    /// Create a simulator with zeroed registers and no device state.
    pub fn new(spec: TargetSpec, listing: Listing) -> Self {
        Self {
            listing,
            registers: vec![0.0; spec.register_count as usize],
            devices: HashMap::new(),
            pc: 0,
        }
    }

    /// Current value of a register.
    pub fn register(&self, reg: Register) -> f64 {
        self.registers[reg.0 as usize]
    }

    /// Set a register, e.g. to seed an indirect device id before running.
    pub fn set_register(&mut self, reg: Register, value: f64) {
        self.registers[reg.0 as usize] = value;
    }

    /// Current value of a device parameter (unset parameters read 0).
    pub fn param(&self, key: DeviceKey, param: &str) -> f64 {
        self.devices
            .get(&key)
            .and_then(|params| params.get(param))
            .copied()
            .unwrap_or(0.0)
    }

    /// Set a device parameter before or between ticks.
    pub fn set_param(&mut self, key: DeviceKey, param: &str, value: f64) {
        self.devices
            .entry(key)
            .or_default()
            .insert(param.to_string(), value);
    }

    /// Execute one tick: up to [`TICK_BUDGET`] steps, ending early at a
    /// `yield` or the end of the listing.
    pub fn tick(&mut self) -> TickResult {
        for _ in 0..TICK_BUDGET {
            if self.pc >= self.listing.len() {
                return TickResult::End;
            }
            let instr = self.listing.lines[self.pc].clone();
            if let Instr::Yield = instr {
                self.pc += 1;
                return TickResult::Yield;
            }
            self.step(&instr);
        }
        TickResult::LimitHit
    }

    /// Tick until the program ends or hits its budget, at most
    /// `max_ticks` times. Returns the last tick's result.
    pub fn run(&mut self, max_ticks: usize) -> TickResult {
        let mut last = TickResult::Yield;
        for _ in 0..max_ticks {
            last = self.tick();
            if last != TickResult::Yield {
                break;
            }
        }
        last
    }

    fn step(&mut self, instr: &Instr) {
        let mut next = self.pc + 1;
        match instr {
            Instr::Label(_) | Instr::Yield => {}
            Instr::Move { dst, src } => self.write(*dst, self.value(*src)),
            Instr::Add { dst, a, b } => self.binary(BinOp::Add, *dst, *a, *b),
            Instr::Sub { dst, a, b } => self.binary(BinOp::Sub, *dst, *a, *b),
            Instr::Mul { dst, a, b } => self.binary(BinOp::Mul, *dst, *a, *b),
            Instr::Div { dst, a, b } => self.binary(BinOp::Div, *dst, *a, *b),
            Instr::Seq { dst, a, b } => self.binary(BinOp::Eq, *dst, *a, *b),
            Instr::Sne { dst, a, b } => self.binary(BinOp::Ne, *dst, *a, *b),
            Instr::Slt { dst, a, b } => self.binary(BinOp::Lt, *dst, *a, *b),
            Instr::Sle { dst, a, b } => self.binary(BinOp::Le, *dst, *a, *b),
            Instr::Sgt { dst, a, b } => self.binary(BinOp::Gt, *dst, *a, *b),
            Instr::Sge { dst, a, b } => self.binary(BinOp::Ge, *dst, *a, *b),
            Instr::Load { dst, device, param } => {
                let key = self.device_key(*device);
                let value = self.param(key, param);
                self.write(*dst, value);
            }
            Instr::Store { device, param, src } => {
                let key = self.device_key(*device);
                let value = self.value(*src);
                self.set_param(key, param, value);
            }
            Instr::Jump { target } => next = self.target_line(*target),
            Instr::BranchEqZero { cond, target } => {
                if self.value(*cond) == 0.0 {
                    next = self.target_line(*target);
                }
            }
            Instr::BranchNeZero { cond, target } => {
                if self.value(*cond) != 0.0 {
                    next = self.target_line(*target);
                }
            }
        }
        self.pc = next;
    }

    fn binary(&mut self, op: BinOp, dst: Register, a: Operand, b: Operand) {
        let result = fold_binop(op, self.value(a), self.value(b));
        self.write(dst, result);
    }

    fn value(&self, operand: Operand) -> f64 {
        match operand {
            Operand::Register(r) => self.register(r),
            Operand::Imm(v) => v,
        }
    }

    fn write(&mut self, dst: Register, value: f64) {
        self.registers[dst.0 as usize] = value;
    }

    fn device_key(&self, device: Device) -> DeviceKey {
        match device {
            Device::Housing => DeviceKey::Housing,
            Device::Port(n) => DeviceKey::Port(n),
            Device::Indirect(reg) => DeviceKey::Id(self.register(reg) as i64),
        }
    }

    /// An unresolved label in a listing violates the listing invariant;
    /// jumping past the end halts, which makes the fault visible.
    fn target_line(&self, target: JumpTarget) -> usize {
        match target {
            JumpTarget::Line(n) => n,
            JumpTarget::Label(_) => self.listing.len(),
        }
    }
}
