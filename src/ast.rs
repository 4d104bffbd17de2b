//! Abstract syntax tree for Ember programs
//!
//! The AST is the contract boundary with the external parser: `emberc`
//! consumes an already syntactically-valid [`Program`] and never re-checks
//! surface syntax, only semantics (binding, device designators, resource
//! limits). Every statement and identifier carries a [`Span`] so compile
//! errors can point back at source.

use std::fmt;

/// Source position (1-based line and column) attached to AST nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Line number in the source file (1-based)
    pub line: u32,
    /// Column number in the source line (1-based)
    pub column: u32,
}

impl Span {
    /// Create a span at the given line and column
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source-level name together with where it appeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// The name as written in source
    pub name: String,
    /// Where the name appeared
    pub span: Span,
}

impl Identifier {
    /// Create an identifier with a span
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A complete Ember program: the top-level statement block.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Top-level statements in source order
    pub stmts: Vec<Stmt>,
}

impl Program {
    /// Create a program from a statement list
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

/// A braced statement list. Introduces a lexical scope.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Statements in source order
    pub stmts: Vec<Stmt>,
}

impl Block {
    /// Create a block from a statement list
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

/// Ember statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `let name = expr;`: declares a scalar variable in the current scope
    Let {
        /// The declared name
        name: Identifier,
        /// Initializer expression
        value: Expr,
    },
    /// `name = expr;`: assigns to an existing binding
    Assign {
        /// The assigned name (scalar variable or indirect device alias)
        name: Identifier,
        /// Right-hand side
        value: Expr,
    },
    /// `device name = d0;`: binds a name to a device port designator
    ///
    /// Direct designators are `db` and `d0..d5`; indirect designators
    /// `dr<n>` address the device whose id is held in reserved register n.
    DeviceAlias {
        /// The alias name
        name: Identifier,
        /// The port designator as written (`db`, `d3`, `dr0`, ...)
        designator: Identifier,
    },
    /// `const name = expr;`: a named compile-time constant
    ///
    /// The initializer must fold to a number at resolution time; constants
    /// never occupy a register.
    Const {
        /// The constant's name
        name: Identifier,
        /// Constant initializer (literals and other constants only)
        value: Expr,
    },
    /// `if (cond) { .. } else { .. }` with the else branch optional
    If {
        /// Branch condition
        cond: Expr,
        /// Statements executed when the condition is non-zero
        then_body: Block,
        /// Statements executed otherwise, if present
        else_body: Option<Block>,
    },
    /// `while (cond) { .. }`
    While {
        /// Loop condition, tested before each iteration
        cond: Expr,
        /// Loop body
        body: Block,
    },
    /// `for (init; cond; step) { .. }`: desugars to a while loop
    For {
        /// Initializer, run once before the loop
        init: Box<Stmt>,
        /// Loop condition, tested before each iteration
        cond: Expr,
        /// Step statement, run after each iteration
        step: Box<Stmt>,
        /// Loop body
        body: Block,
    },
    /// `alias.Param = expr;`: writes a device parameter
    DeviceWrite {
        /// The device alias being written through
        device: Identifier,
        /// The parameter name on the device (`Setting`, `On`, ...)
        param: Identifier,
        /// The value to write
        value: Expr,
    },
    /// `yield;`: ends the current chip tick
    Yield {
        /// Where the yield appeared
        span: Span,
    },
    /// A nested `{ .. }` block
    Block(Block),
}

impl Stmt {
    /// The span of the statement, for error attribution.
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { name, .. }
            | Stmt::Assign { name, .. }
            | Stmt::DeviceAlias { name, .. }
            | Stmt::Const { name, .. }
            | Stmt::DeviceWrite { device: name, .. } => name.span,
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => cond.span(),
            Stmt::For { init, .. } => init.span(),
            Stmt::Yield { span } => *span,
            Stmt::Block(block) => block.stmts.first().map(Stmt::span).unwrap_or_default(),
        }
    }
}

/// Ember expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Numeric literal (all chip values are floats)
    Number {
        /// The literal value
        value: f64,
        /// Where the literal appeared
        span: Span,
    },
    /// Reference to a variable, constant, or device alias
    Ident(Identifier),
    /// Binary operation
    Binary {
        /// The operator
        op: BinOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary operation
    Unary {
        /// The operator
        op: UnOp,
        /// The operand
        operand: Box<Expr>,
    },
    /// `alias.Param`: reads a device parameter
    DeviceRead {
        /// The device alias being read through
        device: Identifier,
        /// The parameter name on the device
        param: Identifier,
    },
}

impl Expr {
    /// The span of the expression, for error attribution.
    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. } => *span,
            Expr::Ident(id) => id.span,
            Expr::Binary { lhs, .. } => lhs.span(),
            Expr::Unary { operand, .. } => operand.span(),
            Expr::DeviceRead { device, .. } => device.span,
        }
    }

    /// Convenience constructor for a literal with no useful span.
    pub fn number(value: f64) -> Self {
        Expr::Number {
            value,
            span: Span::default(),
        }
    }

    /// Convenience constructor for a binary operation.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// Binary operators.
///
/// Comparison operators produce exactly 0.0 or 1.0. `And`/`Or` are
/// short-circuiting: the right operand is not evaluated when the left
/// already decides the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Short-circuit logical and
    And,
    /// Short-circuit logical or
    Or,
    /// Equality comparison
    Eq,
    /// Inequality comparison
    Ne,
    /// Less-than comparison
    Lt,
    /// Less-or-equal comparison
    Le,
    /// Greater-than comparison
    Gt,
    /// Greater-or-equal comparison
    Ge,
}

impl BinOp {
    /// True for operators whose result is a 0/1 boolean.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation
    Neg,
    /// Logical not (non-zero becomes 0, zero becomes 1)
    Not,
}
