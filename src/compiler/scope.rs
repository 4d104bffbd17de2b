//! Symbol table and scope resolution
//!
//! Walks the AST in lexical order, creating one scope per block construct
//! and binding each declaration to a fresh [`Symbol`]. Every identifier
//! reference is resolved to the nearest enclosing binding, producing a
//! decorated tree ([`RStmt`]/[`RExpr`]) in which names have been replaced
//! by [`SymbolId`]s. Named constants are folded to numbers here and never
//! reach the register world.

use crate::ast::{BinOp, Block, Expr, Identifier, Program, Span, Stmt, UnOp};
use crate::error::{Error, Result};
use crate::target::{Device, Register, TargetSpec};
use std::collections::HashMap;
use std::fmt;

/// Index of a symbol in the [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolKind {
    /// A register-allocated scalar (source variable or lowering temp)
    Scalar,
    /// A device alias bound to a concrete port operand
    Device(Device),
    /// A named constant, folded at resolution
    Const(f64),
}

/// Identity for one variable, device alias, or constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    /// The symbol's id (its index in the table)
    pub id: SymbolId,
    /// Source name, or a generated name for lowering temps
    pub name: String,
    /// What the symbol names
    pub kind: SymbolKind,
    /// The reserved register an indirect device alias is pinned to
    ///
    /// Pinned symbols hold their register for their entire declared scope
    /// and are excluded from general allocation.
    pub pinned: Option<Register>,
    /// Where the symbol was declared
    pub span: Span,
}

impl Symbol {
    /// True for symbols that compete for general-purpose registers.
    pub fn is_allocatable(&self) -> bool {
        matches!(self.kind, SymbolKind::Scalar) && self.pinned.is_none()
    }
}

/// All symbols of one compilation unit, indexed by [`SymbolId`].
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    temps: u32,
}

impl SymbolTable {
    /// Declare a named symbol and return its id.
    pub fn declare(&mut self, name: impl Into<String>, kind: SymbolKind, span: Span) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            id,
            name: name.into(),
            kind,
            pinned: None,
            span,
        });
        id
    }

    /// Declare a pinned symbol (indirect device alias).
    pub fn declare_pinned(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        pinned: Register,
        span: Span,
    ) -> SymbolId {
        let id = self.declare(name, kind, span);
        self.symbols[id.0 as usize].pinned = Some(pinned);
        id
    }

    /// Create a fresh scalar temporary for lowering.
    pub fn temp(&mut self) -> SymbolId {
        let name = format!("%t{}", self.temps);
        self.temps += 1;
        self.declare(name, SymbolKind::Scalar, Span::default())
    }

    /// Look up a symbol by id.
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// Iterate over all symbols.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Number of symbols in the table.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when no symbols have been declared.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A statement with every name resolved to a [`SymbolId`].
#[derive(Debug, Clone)]
pub enum RStmt {
    /// Store a value into a scalar or pinned-alias symbol
    Assign {
        /// Destination symbol
        dst: SymbolId,
        /// Right-hand side
        value: RExpr,
    },
    /// Conditional with both branches (absent else = empty branch)
    If {
        /// Branch condition
        cond: RExpr,
        /// Taken when the condition is non-zero
        then_body: Vec<RStmt>,
        /// Taken otherwise
        else_body: Vec<RStmt>,
    },
    /// Pre-tested loop
    While {
        /// Loop condition
        cond: RExpr,
        /// Loop body
        body: Vec<RStmt>,
    },
    /// Counted loop, desugared to a while during lowering
    For {
        /// Run once before the loop
        init: Box<RStmt>,
        /// Tested before each iteration
        cond: RExpr,
        /// Run after each iteration
        step: Box<RStmt>,
        /// Loop body
        body: Vec<RStmt>,
    },
    /// Write a device parameter through an alias
    DeviceWrite {
        /// The alias symbol
        device: SymbolId,
        /// Parameter name
        param: String,
        /// Value to write
        value: RExpr,
    },
    /// End the current tick
    Yield,
}

/// An expression with every name resolved.
#[derive(Debug, Clone)]
pub enum RExpr {
    /// Literal (includes folded named constants)
    Number(f64),
    /// Read a scalar or pinned-alias symbol
    Sym(SymbolId),
    /// Binary operation (short-circuit `and`/`or` still structured here)
    Binary {
        /// The operator
        op: BinOp,
        /// Left operand
        lhs: Box<RExpr>,
        /// Right operand
        rhs: Box<RExpr>,
    },
    /// Unary operation
    Unary {
        /// The operator
        op: UnOp,
        /// The operand
        operand: Box<RExpr>,
    },
    /// Read a device parameter through an alias
    DeviceRead {
        /// The alias symbol
        device: SymbolId,
        /// Parameter name
        param: String,
    },
}

/// Output of scope resolution: the symbol table plus the decorated tree.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// All symbols of the unit
    pub table: SymbolTable,
    /// The program with names replaced by symbol ids
    pub stmts: Vec<RStmt>,
}

/// Number of direct device ports on the chip (`d0..d5`).
const DIRECT_PORTS: u8 = 6;

/// Resolve a program against a target spec.
pub fn resolve(spec: &TargetSpec, program: &Program) -> Result<Resolved> {
    let mut resolver = Resolver {
        spec,
        table: SymbolTable::default(),
        scopes: vec![HashMap::new()],
    };
    let stmts = resolver.resolve_stmts(&program.stmts)?;
    tracing::debug!(symbols = resolver.table.len(), "scope resolution done");
    Ok(Resolved {
        table: resolver.table,
        stmts,
    })
}

struct Resolver<'a> {
    spec: &'a TargetSpec,
    table: SymbolTable,
    /// Innermost scope last; lookups walk outward.
    scopes: Vec<HashMap<String, SymbolId>>,
}

impl Resolver<'_> {
    fn resolve_stmts(&mut self, stmts: &[Stmt]) -> Result<Vec<RStmt>> {
        let mut out = Vec::new();
        for stmt in stmts {
            // Nested blocks open a scope but contribute no control flow;
            // their statements flatten into the surrounding sequence.
            if let Stmt::Block(block) = stmt {
                out.extend(self.resolve_block(block)?);
                continue;
            }
            if let Some(r) = self.resolve_stmt(stmt)? {
                out.push(r);
            }
        }
        Ok(out)
    }

    fn resolve_block(&mut self, block: &Block) -> Result<Vec<RStmt>> {
        self.scopes.push(HashMap::new());
        let out = self.resolve_stmts(&block.stmts);
        self.scopes.pop();
        out
    }

    /// Resolve one statement. Declarations that produce no runtime effect
    /// (aliases, constants) return `None`.
    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<Option<RStmt>> {
        match stmt {
            Stmt::Let { name, value } => {
                // Initializer sees the outer binding, not the new one.
                let value = self.resolve_expr(value)?;
                let id = self.declare(name, SymbolKind::Scalar)?;
                Ok(Some(RStmt::Assign { dst: id, value }))
            }
            Stmt::Assign { name, value } => {
                let value = self.resolve_expr(value)?;
                let id = self.lookup(name)?;
                let sym = self.table.get(id);
                match sym.kind {
                    SymbolKind::Scalar => Ok(Some(RStmt::Assign { dst: id, value })),
                    // Assigning an indirect alias retargets it: the device
                    // id lands in the pinned register.
                    SymbolKind::Device(_) if sym.pinned.is_some() => {
                        Ok(Some(RStmt::Assign { dst: id, value }))
                    }
                    SymbolKind::Device(_) => Err(self.misuse(name, "direct device aliases cannot be reassigned")),
                    SymbolKind::Const(_) => Err(self.misuse(name, "constants cannot be reassigned")),
                }
            }
            Stmt::DeviceAlias { name, designator } => {
                let (device, pinned) = self.parse_designator(designator)?;
                match pinned {
                    Some(reg) => {
                        self.declare_with(name, |t, n, s| {
                            t.declare_pinned(n, SymbolKind::Device(device), reg, s)
                        })?;
                    }
                    None => {
                        self.declare(name, SymbolKind::Device(device))?;
                    }
                }
                Ok(None)
            }
            Stmt::Const { name, value } => {
                let folded = self.eval_const(name, value)?;
                self.declare(name, SymbolKind::Const(folded))?;
                Ok(None)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.resolve_expr(cond)?;
                let then_body = self.resolve_block(then_body)?;
                let else_body = match else_body {
                    Some(b) => self.resolve_block(b)?,
                    None => Vec::new(),
                };
                Ok(Some(RStmt::If {
                    cond,
                    then_body,
                    else_body,
                }))
            }
            Stmt::While { cond, body } => {
                let cond = self.resolve_expr(cond)?;
                let body = self.resolve_block(body)?;
                Ok(Some(RStmt::While { cond, body }))
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                // The loop variable lives in a scope that spans the whole
                // construct, with the body nested inside it.
                self.scopes.push(HashMap::new());
                let result = (|| {
                    let init = self
                        .resolve_stmt(init)?
                        .ok_or_else(|| Error::internal("for initializer resolved to nothing"))?;
                    let cond = self.resolve_expr(cond)?;
                    let step = self
                        .resolve_stmt(step)?
                        .ok_or_else(|| Error::internal("for step resolved to nothing"))?;
                    let body = self.resolve_block(body)?;
                    Ok(RStmt::For {
                        init: Box::new(init),
                        cond,
                        step: Box::new(step),
                        body,
                    })
                })();
                self.scopes.pop();
                result.map(Some)
            }
            Stmt::DeviceWrite {
                device,
                param,
                value,
            } => {
                let value = self.resolve_expr(value)?;
                let id = self.lookup_device(device)?;
                Ok(Some(RStmt::DeviceWrite {
                    device: id,
                    param: param.name.clone(),
                    value,
                }))
            }
            Stmt::Yield { .. } => Ok(Some(RStmt::Yield)),
            Stmt::Block(_) => Err(Error::internal("nested block not flattened by caller")),
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<RExpr> {
        match expr {
            Expr::Number { value, .. } => Ok(RExpr::Number(*value)),
            Expr::Ident(id) => {
                let sym_id = self.lookup(id)?;
                let sym = self.table.get(sym_id);
                match sym.kind {
                    SymbolKind::Scalar => Ok(RExpr::Sym(sym_id)),
                    SymbolKind::Const(v) => Ok(RExpr::Number(v)),
                    // Reading an indirect alias yields the device id held
                    // in its pinned register.
                    SymbolKind::Device(_) if sym.pinned.is_some() => Ok(RExpr::Sym(sym_id)),
                    SymbolKind::Device(_) => {
                        Err(self.misuse(id, "direct device aliases have no numeric value"))
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => Ok(RExpr::Binary {
                op: *op,
                lhs: Box::new(self.resolve_expr(lhs)?),
                rhs: Box::new(self.resolve_expr(rhs)?),
            }),
            Expr::Unary { op, operand } => Ok(RExpr::Unary {
                op: *op,
                operand: Box::new(self.resolve_expr(operand)?),
            }),
            Expr::DeviceRead { device, param } => {
                let id = self.lookup_device(device)?;
                Ok(RExpr::DeviceRead {
                    device: id,
                    param: param.name.clone(),
                })
            }
        }
    }

    /// Fold a `const` initializer to a number.
    fn eval_const(&mut self, name: &Identifier, expr: &Expr) -> Result<f64> {
        match expr {
            Expr::Number { value, .. } => Ok(*value),
            Expr::Ident(id) => {
                let sym_id = self.lookup(id)?;
                match self.table.get(sym_id).kind {
                    SymbolKind::Const(v) => Ok(v),
                    _ => Err(self.misuse(name, "constant initializers may only use literals and constants")),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval_const(name, lhs)?;
                let r = self.eval_const(name, rhs)?;
                Ok(fold_binop(*op, l, r))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval_const(name, operand)?;
                Ok(match op {
                    UnOp::Neg => -v,
                    UnOp::Not => {
                        if v == 0.0 {
                            1.0
                        } else {
                            0.0
                        }
                    }
                })
            }
            Expr::DeviceRead { .. } => {
                Err(self.misuse(name, "constant initializers may only use literals and constants"))
            }
        }
    }

    fn declare(&mut self, name: &Identifier, kind: SymbolKind) -> Result<SymbolId> {
        self.declare_with(name, |t, n, s| t.declare(n, kind, s))
    }

    fn declare_with(
        &mut self,
        name: &Identifier,
        f: impl FnOnce(&mut SymbolTable, &str, Span) -> SymbolId,
    ) -> Result<SymbolId> {
        let scope = self
            .scopes
            .last_mut()
            .expect("scope stack is never empty");
        if scope.contains_key(&name.name) {
            return Err(Error::DuplicateBinding {
                name: name.name.clone(),
                span: name.span,
            });
        }
        let id = f(&mut self.table, &name.name, name.span);
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.name.clone(), id);
        Ok(id)
    }

    fn lookup(&self, name: &Identifier) -> Result<SymbolId> {
        for scope in self.scopes.iter().rev() {
            if let Some(id) = scope.get(&name.name) {
                return Ok(*id);
            }
        }
        Err(Error::UnboundIdentifier {
            name: name.name.clone(),
            span: name.span,
        })
    }

    fn lookup_device(&self, name: &Identifier) -> Result<SymbolId> {
        let id = self.lookup(name)?;
        match self.table.get(id).kind {
            SymbolKind::Device(_) => Ok(id),
            _ => Err(self.misuse(name, "device I/O requires a device alias")),
        }
    }

    /// Map a designator to a device operand, with the pinned register for
    /// indirect forms.
    fn parse_designator(&self, designator: &Identifier) -> Result<(Device, Option<Register>)> {
        let text = designator.name.as_str();
        let invalid = || Error::InvalidDeviceAlias {
            designator: text.to_string(),
            span: designator.span,
        };
        if text == "db" {
            return Ok((Device::Housing, None));
        }
        if let Some(rest) = text.strip_prefix("dr") {
            let index: u8 = rest.parse().map_err(|_| invalid())?;
            let reg = self.spec.reserved_register(index).ok_or_else(invalid)?;
            return Ok((Device::Indirect(reg), Some(reg)));
        }
        if let Some(rest) = text.strip_prefix('d') {
            let index: u8 = rest.parse().map_err(|_| invalid())?;
            if index < DIRECT_PORTS {
                return Ok((Device::Port(index), None));
            }
        }
        Err(invalid())
    }

    fn misuse(&self, name: &Identifier, reason: &str) -> Error {
        Error::InvalidBindingUse {
            name: name.name.clone(),
            span: name.span,
            reason: reason.to_string(),
        }
    }
}

/// Evaluate a binary operator on two known numbers.
///
/// Shared with the peephole folder so resolution-time and
/// optimization-time folding cannot disagree.
pub fn fold_binop(op: BinOp, l: f64, r: f64) -> f64 {
    let bool_to_num = |b: bool| if b { 1.0 } else { 0.0 };
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::And => bool_to_num(l != 0.0 && r != 0.0),
        BinOp::Or => bool_to_num(l != 0.0 || r != 0.0),
        BinOp::Eq => bool_to_num(l == r),
        BinOp::Ne => bool_to_num(l != r),
        BinOp::Lt => bool_to_num(l < r),
        BinOp::Le => bool_to_num(l <= r),
        BinOp::Gt => bool_to_num(l > r),
        BinOp::Ge => bool_to_num(l >= r),
    }
}
