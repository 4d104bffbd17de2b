//! Ember: a compiler for in-game programmable logic chips
//!
//! Translates structured Ember programs (variables, device aliases,
//! `if`/`while`/`for`, device parameter reads and writes) into the flat
//! assembly dialect the chip loads: a small register file, absolute
//! line-number jumps, and a hard ceiling on program length.
//!
//! The crate consumes an already-parsed [`ast::Program`] and produces a
//! [`target::Listing`]; parsing and file handling live with the caller.
//!
//! ```
//! use emberc::ast::{Expr, Identifier, Program, Span, Stmt};
//! use emberc::compiler::compile;
//!
//! let span = Span::default();
//! let program = Program::new(vec![
//!     Stmt::DeviceAlias {
//!         name: Identifier::new("base", span),
//!         designator: Identifier::new("db", span),
//!     },
//!     Stmt::DeviceWrite {
//!         device: Identifier::new("base", span),
//!         param: Identifier::new("Setting", span),
//!         value: Expr::number(1.0),
//!     },
//! ]);
//! let listing = compile(&program).unwrap();
//! assert_eq!(listing.to_string(), "s db Setting 1\n");
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod simulator;
pub mod target;

pub use compiler::{compile, CompileOptions, Compiler};
pub use error::{Error, Result};
pub use target::{Listing, TargetSpec};
