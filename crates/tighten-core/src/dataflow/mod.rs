//! Concrete-type flow analysis
//!
//! This module implements the analysis framework:
//! - Concrete-type lattice with union/intersection
//! - Scope/slot arena mirroring program nesting
//! - Constraint extraction into replayable actions
//! - Worklist-based fixpoint solver

mod actions;
mod factory;
mod lattice;
mod scope;
mod solver;
mod type_inference;

pub use actions::{Action, ActionCollector, Assignment, Assignments};
pub use factory::{ConcreteFunction, ConcreteInstance, ConcreteTypeFactory};
pub use lattice::{ConcreteFunctionId, ConcreteInstanceId, ConcreteType, Members, Singleton};
pub use scope::{Scope, ScopeGraph, ScopeId, ScopeKind, Slot, SlotId, CALLEE_SLOT, RETURN_SLOT, THIS_SLOT};
pub use solver::{ConstraintSystem, Converged, FixpointSolver, Replay};
pub use type_inference::{CALL_PROPERTY, PROTOTYPE_PROPERTY, SUPERCLASS_PROPERTY};
