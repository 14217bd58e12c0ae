//! # Tighten Core
//!
//! Concrete-type flow analysis for a prototype-based, dynamically typed language.
//!
//! Starting from the declared type of every expression, the analysis computes a
//! conservative set of concrete functions and object shapes each variable,
//! property and expression may evaluate to. Optimizations such as
//! devirtualization and dead-code removal consume the result.
//!
//! ## Modules
//!
//! - **[`hir`]** - Program model handed over by the parser and type checker
//! - **[`registry`]** - Declared-type queries ([`TypeRegistry`])
//! - **[`dataflow`]** - Lattice, scopes, constraint extraction and the fixpoint solver
//! - **[`analysis`]** - The [`TightenTypes`] context and result reports
//!
//! ## Quick Start
//!
//! ```rust
//! use tighten_core::hir::{Expr, Program, Stmt};
//! use tighten_core::{AnalysisConfig, TightenTypes};
//!
//! let mut program = Program::new();
//! let foo = program.add_class("Foo", None, &[], vec![], &[]);
//! program.body = vec![
//!     Stmt::Function(foo.ctor),
//!     Stmt::var("x", Expr::construct(Expr::name("Foo"), vec![])),
//! ];
//!
//! let analysis = TightenTypes::analyze(&program, AnalysisConfig::default()).unwrap();
//! let x = analysis.global_type("x").unwrap();
//! assert_eq!(analysis.describe(x), "instance Foo");
//! ```

pub mod analysis;
pub mod config;
pub mod dataflow;
pub mod error;
pub mod hir;
mod interprocedural;
pub mod registry;

pub use analysis::{AnalysisReport, ScopeReport, SlotReport, TightenTypes};
pub use config::{AnalysisConfig, WorklistOrder};
pub use dataflow::{ConcreteType, ConcreteTypeFactory, Converged};
pub use error::{ConfigError, Result, TightenError};
pub use hir::Program;
pub use registry::TypeRegistry;
