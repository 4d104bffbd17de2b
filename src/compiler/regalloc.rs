//! Linear-scan register allocation
//!
//! Assigns every scalar symbol a general-purpose register for its whole
//! live range. The chip has no stack or heap, so there is no spill path:
//! when more values are simultaneously live than the pool holds, the
//! program is over budget and compilation fails with
//! [`Error::RegisterExhaustion`].
//!
//! Live ranges are index intervals over the linear IR. A range that is
//! live at a loop head must survive the loop's back edge, so ranges are
//! widened across back edges to a fixpoint before scanning.

use crate::compiler::ir::{IrProgram, Op};
use crate::compiler::scope::{SymbolId, SymbolTable};
use crate::error::{Error, Result};
use crate::target::{Label, Register, TargetSpec};
use std::collections::HashMap;

/// The half-open result of allocation: symbol to register.
///
/// Pinned symbols (indirect device aliases) appear here too, mapped to
/// their reserved registers; they never occupied the general pool.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    map: HashMap<SymbolId, Register>,
    /// Peak number of simultaneously live values, for diagnostics.
    pub peak_live: usize,
}

impl Allocation {
    /// The register assigned to a symbol.
    pub fn get(&self, sym: SymbolId) -> Option<Register> {
        self.map.get(&sym).copied()
    }
}

/// A symbol's live interval over IR indices, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiveRange {
    sym: SymbolId,
    start: usize,
    end: usize,
}

/// Allocate registers for every allocatable symbol in the program.
pub fn allocate(spec: &TargetSpec, table: &SymbolTable, ir: &IrProgram) -> Result<Allocation> {
    let mut ranges = live_ranges(table, ir);
    widen_across_back_edges(ir, &mut ranges);
    ranges.sort_by_key(|r| (r.start, r.end, r.sym));
    let mut alloc = scan(spec, &ranges)?;
    for sym in table.iter() {
        if let Some(reg) = sym.pinned {
            alloc.map.insert(sym.id, reg);
        }
    }
    tracing::debug!(
        ranges = ranges.len(),
        peak_live = alloc.peak_live,
        pool = spec.pool(),
        "register allocation done"
    );
    Ok(alloc)
}

/// First-def to last-use interval per allocatable symbol.
fn live_ranges(table: &SymbolTable, ir: &IrProgram) -> Vec<LiveRange> {
    let mut ranges: HashMap<SymbolId, LiveRange> = HashMap::new();
    let mut touch = |sym: SymbolId, index: usize| {
        ranges
            .entry(sym)
            .and_modify(|r| r.end = index)
            .or_insert(LiveRange {
                sym,
                start: index,
                end: index,
            });
    };
    for (index, op) in ir.ops.iter().enumerate() {
        for used in op.uses() {
            if table.get(used).is_allocatable() {
                touch(used, index);
            }
        }
        if let Some(def) = op.def() {
            if table.get(def).is_allocatable() {
                touch(def, index);
            }
        }
    }
    ranges.into_values().collect()
}

/// Extend ranges that are live at a loop head to cover the back edge.
///
/// A back edge is a jump whose target label binds earlier in the stream.
/// Any range entering the loop from above (start before the head, end at
/// or past it) holds a value the next iteration may read, so it must stay
/// live through the jump. Widening can make a range newly cross another
/// loop's head, so the pass repeats until nothing changes.
fn widen_across_back_edges(ir: &IrProgram, ranges: &mut [LiveRange]) {
    let mut bind_index: HashMap<Label, usize> = HashMap::new();
    for (index, op) in ir.ops.iter().enumerate() {
        if let Op::Bind(label) = op {
            bind_index.insert(*label, index);
        }
    }
    let back_edges: Vec<(usize, usize)> = ir
        .ops
        .iter()
        .enumerate()
        .filter_map(|(index, op)| {
            let target = op.jump_target()?;
            let head = *bind_index.get(&target)?;
            (head < index).then_some((head, index))
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for range in ranges.iter_mut() {
            for &(head, jump) in &back_edges {
                if range.start < head && range.end >= head && range.end < jump {
                    range.end = jump;
                    changed = true;
                }
            }
        }
    }
}

/// Classic linear scan without spilling.
fn scan(spec: &TargetSpec, ranges: &[LiveRange]) -> Result<Allocation> {
    let pool = spec.pool();
    let mut free: Vec<Register> = (0..pool as u8).rev().map(Register).collect();
    let mut active: Vec<LiveRange> = Vec::new();
    let mut alloc = Allocation::default();

    for range in ranges {
        // Expire intervals that ended before this one starts.
        active.retain(|a| {
            if a.end < range.start {
                let reg = alloc.map[&a.sym];
                free.push(reg);
                false
            } else {
                true
            }
        });
        // Descending order so pop() hands out the lowest-numbered free
        // register.
        free.sort_unstable_by(|a, b| b.cmp(a));
        let Some(reg) = free.pop() else {
            return Err(Error::RegisterExhaustion {
                live: active.len() + 1,
                pool,
            });
        };
        alloc.map.insert(range.sym, reg);
        active.push(*range);
        alloc.peak_live = alloc.peak_live.max(active.len());
    }
    Ok(alloc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Span};
    use crate::compiler::ir::Value;
    use crate::compiler::scope::SymbolKind;
    use crate::target::Device;

    fn table_with_scalars(n: usize) -> (SymbolTable, Vec<SymbolId>) {
        let mut table = SymbolTable::default();
        let ids = (0..n)
            .map(|i| table.declare(format!("v{i}"), SymbolKind::Scalar, Span::default()))
            .collect();
        (table, ids)
    }

    #[test]
    fn test_overlapping_ranges_get_distinct_registers() {
        let (table, ids) = table_with_scalars(3);
        // All three live across the final op.
        let mut ops: Vec<Op> = ids
            .iter()
            .map(|&id| Op::Move {
                dst: id,
                src: Value::Imm(1.0),
            })
            .collect();
        ops.push(Op::Bin {
            dst: ids[0],
            op: BinOp::Add,
            lhs: Value::Sym(ids[1]),
            rhs: Value::Sym(ids[2]),
        });
        let ir = IrProgram { ops };
        let alloc = allocate(&TargetSpec::default(), &table, &ir).unwrap();
        let regs: std::collections::HashSet<_> =
            ids.iter().map(|&id| alloc.get(id).unwrap()).collect();
        assert_eq!(regs.len(), 3);
    }

    #[test]
    fn test_pool_boundary() {
        let spec = TargetSpec::default();
        let pool = spec.pool();

        // Exactly `pool` simultaneously live values allocate.
        let build = |n: usize| {
            let (table, ids) = table_with_scalars(n);
            let mut ops: Vec<Op> = ids
                .iter()
                .map(|&id| Op::Move {
                    dst: id,
                    src: Value::Imm(0.0),
                })
                .collect();
            for &id in &ids {
                ops.push(Op::BranchNotZero {
                    cond: Value::Sym(id),
                    target: crate::target::Label(0),
                });
            }
            ops.push(Op::Bind(crate::target::Label(0)));
            (table, IrProgram { ops })
        };

        let (table, ir) = build(pool);
        assert!(allocate(&spec, &table, &ir).is_ok());

        let (table, ir) = build(pool + 1);
        let err = allocate(&spec, &table, &ir).unwrap_err();
        assert_eq!(
            err,
            Error::RegisterExhaustion {
                live: pool + 1,
                pool
            }
        );
    }

    #[test]
    fn test_disjoint_ranges_reuse_registers() {
        let (table, ids) = table_with_scalars(2);
        let ops = vec![
            Op::Move {
                dst: ids[0],
                src: Value::Imm(1.0),
            },
            Op::BranchNotZero {
                cond: Value::Sym(ids[0]),
                target: Label(0),
            },
            Op::Bind(Label(0)),
            // ids[0] is dead here; ids[1] can take its register.
            Op::Move {
                dst: ids[1],
                src: Value::Imm(2.0),
            },
            Op::BranchNotZero {
                cond: Value::Sym(ids[1]),
                target: Label(1),
            },
            Op::Bind(Label(1)),
        ];
        let ir = IrProgram { ops };
        let alloc = allocate(&TargetSpec::default(), &table, &ir).unwrap();
        assert_eq!(alloc.get(ids[0]), alloc.get(ids[1]));
    }

    #[test]
    fn test_lowest_numbered_register_is_reused_first() {
        let (table, ids) = table_with_scalars(3);
        let l0 = Label(0);
        let l1 = Label(1);
        // v0 and v1 both expire before v2 starts; v2 must get r0 back,
        // not whichever register was freed last.
        let ops = vec![
            Op::Move {
                dst: ids[0],
                src: Value::Imm(0.0),
            },
            Op::Move {
                dst: ids[1],
                src: Value::Imm(0.0),
            },
            Op::BranchNotZero {
                cond: Value::Sym(ids[0]),
                target: l0,
            },
            Op::BranchNotZero {
                cond: Value::Sym(ids[1]),
                target: l0,
            },
            Op::Bind(l0),
            Op::Move {
                dst: ids[2],
                src: Value::Imm(0.0),
            },
            Op::BranchNotZero {
                cond: Value::Sym(ids[2]),
                target: l1,
            },
            Op::Bind(l1),
        ];
        let ir = IrProgram { ops };
        let alloc = allocate(&TargetSpec::default(), &table, &ir).unwrap();
        assert_eq!(alloc.get(ids[0]), Some(Register(0)));
        assert_eq!(alloc.get(ids[1]), Some(Register(1)));
        assert_eq!(alloc.get(ids[2]), Some(Register(0)));
    }

    #[test]
    fn test_back_edge_keeps_loop_variable_alive() {
        let (mut table, ids) = table_with_scalars(1);
        let x = ids[0];
        let temp = table.temp();
        let head = Label(0);
        let end = Label(1);
        // x = 0; loop { if x >= 3 break; t = x + 1; x = t }
        let ops = vec![
            Op::Move {
                dst: x,
                src: Value::Imm(0.0),
            },
            Op::Bind(head),
            Op::Bin {
                dst: temp,
                op: BinOp::Lt,
                lhs: Value::Sym(x),
                rhs: Value::Imm(3.0),
            },
            Op::BranchZero {
                cond: Value::Sym(temp),
                target: end,
            },
            Op::Bin {
                dst: x,
                op: BinOp::Add,
                lhs: Value::Sym(x),
                rhs: Value::Imm(1.0),
            },
            Op::Jump(head),
            Op::Bind(end),
        ];
        let ir = IrProgram { ops };
        let mut ranges = live_ranges(&table, &ir);
        widen_across_back_edges(&ir, &mut ranges);
        let x_range = ranges.iter().find(|r| r.sym == x).unwrap();
        // x must survive the back-edge jump at index 5.
        assert!(x_range.end >= 5, "x dies at {} before the back edge", x_range.end);
    }

    #[test]
    fn test_pinned_symbol_keeps_reserved_register() {
        let spec = TargetSpec::default();
        let mut table = SymbolTable::default();
        let reg = spec.reserved_register(0).unwrap();
        let dev = table.declare_pinned(
            "roving",
            SymbolKind::Device(Device::Indirect(reg)),
            reg,
            Span::default(),
        );
        let val = table.declare("v", SymbolKind::Scalar, Span::default());
        let ops = vec![
            Op::Move {
                dst: dev,
                src: Value::Imm(0.0),
            },
            Op::DeviceLoad {
                dst: val,
                device: dev,
                param: "Temperature".into(),
            },
            Op::DeviceStore {
                device: dev,
                param: "Setting".into(),
                src: Value::Sym(val),
            },
        ];
        let ir = IrProgram { ops };
        let alloc = allocate(&spec, &table, &ir).unwrap();
        assert_eq!(alloc.get(dev), Some(reg));
        // The scalar gets a pool register, never the reserved one.
        assert!(alloc.get(val).unwrap().0 < spec.pool() as u8);
    }
}
