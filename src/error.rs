//! Error types for the Ember compiler

use crate::ast::Span;
use thiserror::Error;

/// Ember compile errors
///
/// Every failure the pipeline can produce is a value of this enum; the
/// compiler never panics on a structurally valid AST. Each stage fails
/// fast: the first error stops the pipeline and no partial listing is
/// emitted, since a partially resolved program is meaningless to the chip.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Scope and binding errors (detected by the resolver)
    /// Reference to a name with no visible binding
    ///
    /// **Triggered by:** using a variable, constant, or device alias that
    /// was never declared in this or any enclosing scope.
    #[error("unbound identifier `{name}` at {span}")]
    UnboundIdentifier {
        /// The unresolved name
        name: String,
        /// Where the reference appeared
        span: Span,
    },

    /// A name redeclared in the same scope
    ///
    /// Shadowing an outer scope's binding is legal; redeclaring within the
    /// same scope is not.
    #[error("duplicate binding `{name}` at {span}")]
    DuplicateBinding {
        /// The redeclared name
        name: String,
        /// Where the second declaration appeared
        span: Span,
    },

    /// A device alias bound to an unrecognized port designator
    ///
    /// Legal designators are `db`, `d0..d5`, and `dr<n>` where n is below
    /// the target's reserved-register count.
    #[error("invalid device designator `{designator}` at {span}")]
    InvalidDeviceAlias {
        /// The designator as written
        designator: String,
        /// Where the alias declaration appeared
        span: Span,
    },

    /// A name used in a role its binding does not support
    ///
    /// **Triggered by:** assigning to a constant or a direct device
    /// alias, reading a direct device alias as a number, a non-constant
    /// `const` initializer, or device I/O through a non-alias binding.
    #[error("invalid use of `{name}` at {span}: {reason}")]
    InvalidBindingUse {
        /// The misused name
        name: String,
        /// Where the misuse appeared
        span: Span,
        /// What was wrong with the use
        reason: String,
    },

    // Resource errors
    /// More symbols simultaneously live than the register pool can hold
    ///
    /// The chip has no stack or heap, so there is nowhere to spill:
    /// running out of registers is a normal compile outcome, not a
    /// compiler fault. The counts tell the user how far over budget the
    /// program is.
    #[error("register pool exhausted: {live} values live at once, pool holds {pool}")]
    RegisterExhaustion {
        /// Simultaneously live symbols at the point of failure
        live: usize,
        /// General-purpose registers available for allocation
        pool: usize,
    },

    /// The assembled program is longer than the chip can store
    #[error("program is {lines} lines, chip limit is {limit}")]
    LineLimitExceeded {
        /// Assembled instruction count
        lines: usize,
        /// The target's maximum line count
        limit: usize,
    },

    // Internal-consistency faults (surfaced rather than swallowed)
    /// A jump references a label never defined in the instruction stream
    ///
    /// Lowering guarantees every generated label is bound exactly once, so
    /// this indicates a compiler bug; it is surfaced as an error to catch
    /// lowering regressions instead of emitting a broken listing.
    #[error("unresolved label `{label}` (compiler bug)")]
    UnresolvedLabel {
        /// The symbolic label that never got a line number
        label: String,
    },

    /// Malformed intermediate state reached a later stage
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal-consistency error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;
