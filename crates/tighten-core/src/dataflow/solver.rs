//! Worklist-based fixpoint solver
//!
//! The solver is generic over a [`ConstraintSystem`]: a set of units (scopes)
//! whose replay unions new facts into monotone cells. A unit stays queued for the
//! whole run once seen, and each outer pass replays every queued unit once, in
//! round-robin. Actions read cells owned by other units, so the owner of a grown
//! cell is not the only unit that may need another replay; [`Replay::dirty`] only
//! queues owners the solver has not seen yet (instance and static property scopes).
//!
//! A pass that changes nothing ends the run; reaching the pass ceiling while still
//! changing is reported as [`TightenError::IterationLimitExceeded`].

use crate::config::{AnalysisConfig, WorklistOrder};
use crate::error::{Result, TightenError};
use indexmap::IndexSet;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{error, info, trace};

/// Outcome of replaying one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay<U> {
    /// Units owning a cell that grew during the replay
    pub dirty: Vec<U>,
    /// Number of actions evaluated
    pub actions: usize,
    /// Analysis-wide state grew (for example the allocation set)
    pub widened: bool,
}

impl<U> Replay<U> {
    /// No cell grew; `actions` were evaluated
    pub fn unchanged(actions: usize) -> Self {
        Self {
            dirty: Vec::new(),
            actions,
            widened: false,
        }
    }

    /// Whether the replay made any progress
    pub fn changed(&self) -> bool {
        self.widened || !self.dirty.is_empty()
    }
}

/// A monotone constraint system driven to a fixed point by [`FixpointSolver`]
pub trait ConstraintSystem {
    /// Replayable group of actions
    type Unit: Copy + Eq + Hash + Debug;

    /// Units queued before the first pass
    fn roots(&self) -> Vec<Self::Unit>;

    /// Replay every action of `unit` against the current cells
    fn replay(&mut self, unit: Self::Unit) -> Result<Replay<Self::Unit>>;

    /// Units created since the last call
    fn take_discovered(&mut self) -> Vec<Self::Unit>;
}

/// Statistics of a converged run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Converged {
    /// Outer passes, including the final unchanged one
    pub passes: usize,
    /// Actions evaluated over all passes
    pub actions: usize,
    /// Units queued at the end
    pub units: usize,
}

/// Drives a [`ConstraintSystem`] to its least fixed point
#[derive(Debug, Clone)]
pub struct FixpointSolver {
    max_iterations: usize,
    order: WorklistOrder,
}

impl FixpointSolver {
    /// Solver with the ceiling and order of `config`
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            order: config.worklist_order,
        }
    }

    /// Run `system` until a pass makes no progress
    pub fn solve<S: ConstraintSystem>(&self, system: &mut S) -> Result<Converged> {
        self.solve_observed(system, |_, _| {})
    }

    /// Like [`FixpointSolver::solve`], calling `observe` with the pass number after
    /// every pass.
    pub fn solve_observed<S, F>(&self, system: &mut S, mut observe: F) -> Result<Converged>
    where
        S: ConstraintSystem,
        F: FnMut(usize, &S),
    {
        let mut queued: IndexSet<S::Unit> = system.roots().into_iter().collect();
        queued.extend(system.take_discovered());

        let mut stats = Converged::default();
        while stats.passes < self.max_iterations {
            let mut pending: Vec<S::Unit> = queued.iter().copied().collect();
            if self.order == WorklistOrder::Reverse {
                pending.reverse();
            }

            let mut changed = false;
            for unit in pending {
                trace!(?unit, "replaying");
                let replay = system.replay(unit)?;
                stats.actions += replay.actions;
                changed |= replay.changed();
                queued.extend(replay.dirty);
            }
            for unit in system.take_discovered() {
                changed |= queued.insert(unit);
            }

            stats.passes += 1;
            observe(stats.passes, &*system);
            if !changed {
                stats.units = queued.len();
                info!(
                    passes = stats.passes,
                    actions = stats.actions,
                    units = stats.units,
                    "reached fixed point"
                );
                return Ok(stats);
            }
        }

        error!(
            passes = stats.passes,
            limit = self.max_iterations,
            "fixed point not reached; probable infinite propagation loop"
        );
        Err(TightenError::IterationLimitExceeded {
            passes: stats.passes,
            limit: self.max_iterations,
        })
    }
}
