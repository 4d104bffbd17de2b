//! Two-pass assembly
//!
//! Pass one numbers the real instructions and records the line each label
//! marks; pass two rewrites every symbolic jump target to its absolute
//! line and drops the label markers. A label bound at the very end of the
//! stream resolves to one past the last line, which the chip treats as
//! halt. The line-limit check runs last, against the final line count.

use crate::error::{Error, Result};
use crate::target::{Instr, JumpTarget, Label, Listing, TargetSpec};
use std::collections::HashMap;

/// Resolve labels and produce the final listing.
pub fn assemble(spec: &TargetSpec, instrs: Vec<Instr>) -> Result<Listing> {
    // Pass one: line number per label.
    let mut label_lines: HashMap<Label, usize> = HashMap::new();
    let mut line = 0usize;
    for instr in &instrs {
        match instr {
            Instr::Label(label) => {
                if label_lines.insert(*label, line).is_some() {
                    return Err(Error::internal(format!("{label} bound twice")));
                }
            }
            _ => line += 1,
        }
    }

    // Pass two: rewrite targets, drop markers.
    let mut lines = Vec::with_capacity(line);
    for instr in instrs {
        match instr {
            Instr::Label(_) => {}
            Instr::Jump { target } => lines.push(Instr::Jump {
                target: resolve(&label_lines, target)?,
            }),
            Instr::BranchEqZero { cond, target } => lines.push(Instr::BranchEqZero {
                cond,
                target: resolve(&label_lines, target)?,
            }),
            Instr::BranchNeZero { cond, target } => lines.push(Instr::BranchNeZero {
                cond,
                target: resolve(&label_lines, target)?,
            }),
            other => lines.push(other),
        }
    }

    if lines.len() > spec.line_limit {
        return Err(Error::LineLimitExceeded {
            lines: lines.len(),
            limit: spec.line_limit,
        });
    }
    tracing::debug!(
        lines = lines.len(),
        limit = spec.line_limit,
        labels = label_lines.len(),
        "assembly done"
    );
    Ok(Listing { lines })
}

fn resolve(label_lines: &HashMap<Label, usize>, target: JumpTarget) -> Result<JumpTarget> {
    match target {
        JumpTarget::Line(n) => Ok(JumpTarget::Line(n)),
        JumpTarget::Label(label) => label_lines
            .get(&label)
            .map(|n| JumpTarget::Line(*n))
            .ok_or_else(|| Error::UnresolvedLabel {
                label: label.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Operand, Register};

    fn mov(dst: u8, v: f64) -> Instr {
        Instr::Move {
            dst: Register(dst),
            src: Operand::Imm(v),
        }
    }

    #[test]
    fn test_labels_resolve_to_their_line() {
        let l = Label(0);
        let instrs = vec![
            mov(0, 1.0),
            Instr::Label(l),
            mov(1, 2.0),
            Instr::Jump {
                target: JumpTarget::Label(l),
            },
        ];
        let listing = assemble(&TargetSpec::default(), instrs).unwrap();
        assert_eq!(listing.len(), 3);
        // The label marked the second real line.
        assert_eq!(
            listing.lines[2],
            Instr::Jump {
                target: JumpTarget::Line(1),
            }
        );
    }

    #[test]
    fn test_end_label_is_one_past_last_line() {
        let end = Label(0);
        let instrs = vec![
            Instr::BranchEqZero {
                cond: Operand::Register(Register(0)),
                target: JumpTarget::Label(end),
            },
            mov(0, 1.0),
            Instr::Label(end),
        ];
        let listing = assemble(&TargetSpec::default(), instrs).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(
            listing.lines[0],
            Instr::BranchEqZero {
                cond: Operand::Register(Register(0)),
                target: JumpTarget::Line(2),
            }
        );
    }

    #[test]
    fn test_line_limit_boundary() {
        let spec = TargetSpec {
            line_limit: 4,
            ..TargetSpec::default()
        };
        let at_limit: Vec<Instr> = (0..4).map(|_| mov(0, 0.0)).collect();
        assert!(assemble(&spec, at_limit).is_ok());

        let over: Vec<Instr> = (0..5).map(|_| mov(0, 0.0)).collect();
        let err = assemble(&spec, over).unwrap_err();
        assert_eq!(err, Error::LineLimitExceeded { lines: 5, limit: 4 });
    }

    #[test]
    fn test_labels_do_not_count_toward_the_limit() {
        let spec = TargetSpec {
            line_limit: 2,
            ..TargetSpec::default()
        };
        let l = Label(0);
        let instrs = vec![
            Instr::Label(l),
            mov(0, 0.0),
            Instr::BranchNeZero {
                cond: Operand::Register(Register(0)),
                target: JumpTarget::Label(l),
            },
        ];
        assert!(assemble(&spec, instrs).is_ok());
    }

    #[test]
    fn test_unresolved_label_is_an_error() {
        let instrs = vec![Instr::Jump {
            target: JumpTarget::Label(Label(9)),
        }];
        let err = assemble(&TargetSpec::default(), instrs).unwrap_err();
        assert_eq!(
            err,
            Error::UnresolvedLabel {
                label: "L9".to_string()
            }
        );
    }
}
