//! Error types for the analysis core
//!
//! Every variant of [`TightenError`] signals a violated contract (malformed
//! collaborator output, a defect in constraint extraction, or a propagation loop
//! that never settles). None of them is a recoverable condition for end users;
//! callers are expected to abort the compilation unit.

use crate::dataflow::ScopeId;
use crate::hir::{FunctionId, ShapeId};
use thiserror::Error;

/// Result of analysis operations
pub type Result<T, E = TightenError> = std::result::Result<T, E>;

/// Fatal analysis defects
#[derive(Debug, Error)]
pub enum TightenError {
    /// A scope declared the same name twice
    #[error("slot `{name}` is already declared in scope {scope:?}")]
    DuplicateSlot { name: String, scope: ScopeId },

    /// `new` on a callee that may be anything
    #[error("`new` applied to a callee whose concrete type is ALL")]
    NewOnAllType,

    /// The registry has no such function
    #[error("no declaration for function {0:?}")]
    UnknownFunction(FunctionId),

    /// The registry has no such shape
    #[error("no declaration for shape {0:?}")]
    UnknownShape(ShapeId),

    /// A shape inherits from itself
    #[error("prototype chain of shape {0:?} is cyclic")]
    CyclicPrototype(ShapeId),

    /// `return` in the global body
    #[error("`return` outside of a function body")]
    ReturnOutsideFunction,

    /// [`process`](crate::TightenTypes::process) called twice on one context
    #[error("analysis context has already processed a program")]
    AlreadyProcessed,

    /// The pass ceiling was reached while slots were still growing
    #[error("no fixed point after {passes} passes (limit {limit}): probable infinite propagation loop")]
    IterationLimitExceeded { passes: usize, limit: usize },
}

impl TightenError {
    /// Whether this error came from the fixed-point ceiling rather than a contract violation
    pub fn is_iteration_limit(&self) -> bool {
        matches!(self, TightenError::IterationLimitExceeded { .. })
    }
}

/// Failure to load an [`AnalysisConfig`](crate::AnalysisConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid configuration
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
