//! The Ember compilation pipeline
//!
//! Six stages run in a fixed order: scope resolution, control-flow
//! lowering, register allocation, instruction selection, peephole
//! optimization, and assembly. Each stage consumes the previous stage's
//! output whole; the first error aborts the pipeline.

pub mod assemble;
pub mod ir;
pub mod lower;
pub mod peephole;
pub mod regalloc;
pub mod scope;
pub mod select;

use crate::ast::Program;
use crate::error::Result;
use crate::target::{Listing, TargetSpec};

/// Knobs for a compilation run.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Run the peephole optimizer. Off, the selected instructions go to
    /// the assembler untouched; useful when inspecting pipeline output.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// The Ember compiler for one chip model.
#[derive(Debug, Clone)]
pub struct Compiler {
    spec: TargetSpec,
    options: CompileOptions,
}

impl Compiler {
    /// Create a compiler for a chip with default options.
    pub fn new(spec: TargetSpec) -> Self {
        Self::with_options(spec, CompileOptions::default())
    }

    /// Create a compiler with explicit options.
    pub fn with_options(spec: TargetSpec, options: CompileOptions) -> Self {
        Self { spec, options }
    }

    /// The chip model this compiler targets.
    pub fn spec(&self) -> &TargetSpec {
        &self.spec
    }

    /// Compile a program to a chip listing.
    pub fn compile(&self, program: &Program) -> Result<Listing> {
        tracing::info!(stmts = program.stmts.len(), "compiling program");
        let resolved = scope::resolve(&self.spec, program)?;
        let scope::Resolved { mut table, stmts } = resolved;
        let ir = lower::lower(&mut table, &stmts)?;
        let alloc = regalloc::allocate(&self.spec, &table, &ir)?;
        let instrs = select::select(&table, &alloc, &ir)?;
        let instrs = if self.options.optimize {
            peephole::optimize(instrs)
        } else {
            instrs
        };
        let listing = assemble::assemble(&self.spec, instrs)?;
        tracing::info!(lines = listing.len(), "compilation finished");
        Ok(listing)
    }
}

/// Compile a program for the stock chip with default options.
pub fn compile(program: &Program) -> Result<Listing> {
    Compiler::new(TargetSpec::default()).compile(program)
}
