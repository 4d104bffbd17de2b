//! Peephole optimization over the selected instruction stream
//!
//! The rewrites run to a fixpoint: constant folding, immediate
//! propagation, redundant-move and dead-write elimination, jump-to-next
//! elimination, and dead-label cleanup. Every rule removes an instruction
//! or replaces a register operand with an immediate, so the fixpoint
//! exists and the pass is idempotent.
//!
//! Rewrites never cross control-flow boundaries: a label is a potential
//! entry point and a jump a potential exit, so every scanning window ends
//! at either. Each line saved matters on a chip with a hard line ceiling.
//!
//! Observability is defined by device parameters and control flow.
//! Register values left behind by a finished program are not preserved;
//! a trailing write nothing reads gets removed.

use crate::ast::BinOp;
use crate::compiler::scope::fold_binop;
use crate::target::{Instr, Label, Operand};
use std::collections::HashSet;

/// Run all rewrites to a fixpoint.
pub fn optimize(mut instrs: Vec<Instr>) -> Vec<Instr> {
    let before = instrs.len();
    loop {
        let mut changed = false;
        changed |= fold_constants(&mut instrs);
        changed |= propagate_immediates(&mut instrs);
        changed |= eliminate_redundant_moves(&mut instrs);
        changed |= remove_dead_writes(&mut instrs);
        changed |= drop_jump_to_next(&mut instrs);
        changed |= drop_dead_labels(&mut instrs);
        if !changed {
            break;
        }
    }
    tracing::debug!(before, after = instrs.len(), "peephole done");
    instrs
}

/// Evaluate instructions whose operands are all immediates.
///
/// Arithmetic on two immediates becomes a `move` of the result; a branch
/// on an immediate condition becomes an unconditional jump or disappears.
/// Folding uses the same f64 arithmetic the chip runs, division by zero
/// included.
fn fold_constants(instrs: &mut Vec<Instr>) -> bool {
    let mut changed = false;
    let mut out = Vec::with_capacity(instrs.len());
    for instr in instrs.drain(..) {
        match folded_binary(&instr) {
            Some(instr) => {
                changed = true;
                out.push(instr);
            }
            None => match instr {
                Instr::BranchEqZero {
                    cond: Operand::Imm(v),
                    target,
                } => {
                    changed = true;
                    if v == 0.0 {
                        out.push(Instr::Jump { target });
                    }
                }
                Instr::BranchNeZero {
                    cond: Operand::Imm(v),
                    target,
                } => {
                    changed = true;
                    if v != 0.0 {
                        out.push(Instr::Jump { target });
                    }
                }
                other => out.push(other),
            },
        }
    }
    *instrs = out;
    changed
}

fn folded_binary(instr: &Instr) -> Option<Instr> {
    let (op, dst, a, b) = match instr {
        Instr::Add { dst, a, b } => (BinOp::Add, dst, a, b),
        Instr::Sub { dst, a, b } => (BinOp::Sub, dst, a, b),
        Instr::Mul { dst, a, b } => (BinOp::Mul, dst, a, b),
        Instr::Div { dst, a, b } => (BinOp::Div, dst, a, b),
        Instr::Seq { dst, a, b } => (BinOp::Eq, dst, a, b),
        Instr::Sne { dst, a, b } => (BinOp::Ne, dst, a, b),
        Instr::Slt { dst, a, b } => (BinOp::Lt, dst, a, b),
        Instr::Sle { dst, a, b } => (BinOp::Le, dst, a, b),
        Instr::Sgt { dst, a, b } => (BinOp::Gt, dst, a, b),
        Instr::Sge { dst, a, b } => (BinOp::Ge, dst, a, b),
        _ => return None,
    };
    let (a, b) = (a.imm()?, b.imm()?);
    Some(Instr::Move {
        dst: *dst,
        src: Operand::Imm(fold_binop(op, a, b)),
    })
}

/// Replace register operands with the immediate a preceding `move` put
/// there, within the same straight-line window.
///
/// Nested constant expressions fold completely through the interplay with
/// [`fold_constants`]: folding turns an op into a `move` of an immediate,
/// propagation pushes that immediate into the consumers, and the next
/// round folds those. A branch condition is substituted before the window
/// closes at the branch.
fn propagate_immediates(instrs: &mut [Instr]) -> bool {
    let mut changed = false;
    for i in 0..instrs.len() {
        let Instr::Move {
            dst,
            src: Operand::Imm(value),
        } = instrs[i]
        else {
            continue;
        };
        for j in i + 1..instrs.len() {
            if matches!(instrs[j], Instr::Label(_)) {
                break;
            }
            changed |= substitute(&mut instrs[j], dst, value);
            if matches!(
                instrs[j],
                Instr::Jump { .. } | Instr::BranchEqZero { .. } | Instr::BranchNeZero { .. }
            ) || instrs[j].dst() == Some(dst)
            {
                break;
            }
        }
    }
    changed
}

/// Rewrite every operand reading `reg` to the immediate `value`.
///
/// Indirect device references read their register too, but a device slot
/// cannot hold an immediate, so those reads stay.
fn substitute(instr: &mut Instr, reg: crate::target::Register, value: f64) -> bool {
    let mut changed = false;
    let mut sub = |op: &mut Operand| {
        if op.register() == Some(reg) {
            *op = Operand::Imm(value);
            changed = true;
        }
    };
    match instr {
        Instr::Move { src, .. } => sub(src),
        Instr::Add { a, b, .. }
        | Instr::Sub { a, b, .. }
        | Instr::Mul { a, b, .. }
        | Instr::Div { a, b, .. }
        | Instr::Seq { a, b, .. }
        | Instr::Sne { a, b, .. }
        | Instr::Slt { a, b, .. }
        | Instr::Sle { a, b, .. }
        | Instr::Sgt { a, b, .. }
        | Instr::Sge { a, b, .. } => {
            sub(a);
            sub(b);
        }
        Instr::Store { src, .. } => sub(src),
        Instr::BranchEqZero { cond, .. } | Instr::BranchNeZero { cond, .. } => sub(cond),
        Instr::Label(_) | Instr::Load { .. } | Instr::Jump { .. } | Instr::Yield => {}
    }
    changed
}

/// Remove pure writes whose destination is dead in the rest of the
/// straight-line window.
fn remove_dead_writes(instrs: &mut Vec<Instr>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < instrs.len() {
        let dead = instrs[i].is_pure()
            && instrs[i]
                .dst()
                .is_some_and(|dst| dead_in_window(instrs, i + 1, dst));
        if dead {
            instrs.remove(i);
            changed = true;
        } else {
            i += 1;
        }
    }
    changed
}

/// Remove self-moves and forward copies through dead temporaries.
///
/// The forwarding pattern is `op rT ...` immediately followed by
/// `move rD rT`: when rT is provably dead afterwards within the same
/// straight-line window, the op writes rD directly and the move goes.
fn eliminate_redundant_moves(instrs: &mut Vec<Instr>) -> bool {
    let mut changed = false;

    let len_before = instrs.len();
    instrs.retain(|instr| {
        !matches!(instr, Instr::Move { dst, src: Operand::Register(r) } if dst == r)
    });
    changed |= instrs.len() != len_before;

    let mut i = 0;
    while i + 1 < instrs.len() {
        let forward = match (&instrs[i], &instrs[i + 1]) {
            (producer, Instr::Move { dst, src: Operand::Register(src) }) => {
                producer.dst() == Some(*src)
                    && dst != src
                    && dead_in_window(instrs, i + 2, *src)
            }
            _ => false,
        };
        if forward {
            let Instr::Move { dst, .. } = instrs[i + 1] else {
                unreachable!()
            };
            retarget(&mut instrs[i], dst);
            instrs.remove(i + 1);
            changed = true;
        } else {
            i += 1;
        }
    }
    changed
}

/// True when `reg` is not read between `from` and the end of the current
/// straight-line window (next label, jump, or branch), or is overwritten
/// first.
fn dead_in_window(instrs: &[Instr], from: usize, reg: crate::target::Register) -> bool {
    for instr in &instrs[from..] {
        if instr.reads(reg) {
            return false;
        }
        if instr.dst() == Some(reg) {
            return true;
        }
        if matches!(
            instr,
            Instr::Label(_) | Instr::Jump { .. } | Instr::BranchEqZero { .. } | Instr::BranchNeZero { .. }
        ) {
            return false;
        }
    }
    true
}

fn retarget(instr: &mut Instr, new_dst: crate::target::Register) {
    match instr {
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
        | Instr::Load { dst, .. } => *dst = new_dst,
        _ => {}
    }
}

/// Remove jumps and branches whose target is the next real instruction.
///
/// Both outcomes of a conditional branch reach the same line in that
/// case, and the condition read has no side effect.
fn drop_jump_to_next(instrs: &mut Vec<Instr>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < instrs.len() {
        let falls_through = instrs[i]
            .jump_label()
            .is_some_and(|target| next_is_label(instrs, i + 1, target));
        if falls_through {
            instrs.remove(i);
            changed = true;
        } else {
            i += 1;
        }
    }
    changed
}

/// True when `target` binds before the next real instruction.
///
/// The scan only looks at the run of label markers directly after the
/// jump. A target not in that run binds somewhere else, possibly behind
/// the jump, and the jump stays.
fn next_is_label(instrs: &[Instr], from: usize, target: Label) -> bool {
    for instr in &instrs[from..] {
        match instr {
            Instr::Label(l) if *l == target => return true,
            Instr::Label(_) => continue,
            _ => return false,
        }
    }
    false
}

/// Drop label markers no jump references.
fn drop_dead_labels(instrs: &mut Vec<Instr>) -> bool {
    let referenced: HashSet<Label> = instrs.iter().filter_map(Instr::jump_label).collect();
    let len_before = instrs.len();
    instrs.retain(|instr| match instr {
        Instr::Label(l) => referenced.contains(l),
        _ => true,
    });
    instrs.len() != len_before
}
