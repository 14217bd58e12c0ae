//! The analysis context
//!
//! [`TightenTypes`] owns every piece of analysis-lifetime state: the scope/slot
//! arena, the canonical function and instance tables, the allocation set and the
//! declared-type intersection cache. A context analyzes one program once.
//!
//! ```rust,ignore
//! let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());
//! analysis.process(&program.externs, &program.body)?;
//! let x = analysis.global_type("x");
//! ```

use crate::config::AnalysisConfig;
use crate::dataflow::{
    ActionCollector, Assignment, ConcreteFunction, ConcreteFunctionId, ConcreteInstance, ConcreteInstanceId,
    ConcreteType, ConcreteTypeFactory, ConstraintSystem, Converged, FixpointSolver, Replay, ScopeGraph, ScopeId,
    ScopeKind, Singleton, RETURN_SLOT, THIS_SLOT,
};
use crate::error::{Result, TightenError};
use crate::hir::{DeclaredType, FunctionDecl, FunctionId, Program, ShapeDecl, ShapeId, Stmt};
use crate::registry::TypeRegistry;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Analysis context for one program: scopes, slots, canonical tables and the allocation set
pub struct TightenTypes<'p> {
    pub(crate) registry: &'p dyn TypeRegistry,
    pub(crate) config: AnalysisConfig,
    pub(crate) graph: ScopeGraph<'p>,
    /// Canonical functions; the map index is the [`ConcreteFunctionId`]
    pub(crate) functions: IndexMap<FunctionId, ConcreteFunction>,
    /// Canonical instances; the map index is the [`ConcreteInstanceId`]
    pub(crate) instances: IndexMap<ShapeId, ConcreteInstance>,
    /// Instances created by `new`, literals, or extern values
    pub(crate) allocated: IndexSet<ConcreteInstanceId>,
    pub(crate) intersections: HashMap<(ConcreteType, DeclaredType), ConcreteType>,
    pub(crate) top_scope: ScopeId,
    /// Function scopes created since the solver last asked
    pub(crate) discovered: Vec<ScopeId>,
    /// Shapes whose instance scope is under construction
    pub(crate) pending_shapes: Vec<ShapeId>,
    widened: bool,
    processed: bool,
    converged: Option<Converged>,
}

impl<'p> TightenTypes<'p> {
    /// Fresh context over `registry`; only the global scope exists
    pub fn new(registry: &'p dyn TypeRegistry, config: AnalysisConfig) -> Self {
        let mut graph = ScopeGraph::new();
        let top_scope = graph.new_scope(ScopeKind::Global, None);
        Self {
            registry,
            config,
            graph,
            functions: IndexMap::new(),
            instances: IndexMap::new(),
            allocated: IndexSet::new(),
            intersections: HashMap::new(),
            top_scope,
            discovered: Vec::new(),
            pending_shapes: Vec::new(),
            widened: false,
            processed: false,
            converged: None,
        }
    }

    /// Build a context for `program` and run it to a fixed point
    pub fn analyze(program: &'p Program, config: AnalysisConfig) -> Result<Self> {
        let mut analysis = Self::new(program, config);
        analysis.process(&program.externs, &program.body)?;
        Ok(analysis)
    }

    /// Extract constraints from the externs and the program, then iterate them
    /// to a fixed point.
    pub fn process(&mut self, externs: &'p [Stmt], root: &'p [Stmt]) -> Result<Converged> {
        self.process_observed(externs, root, |_, _| {})
    }

    /// Like [`TightenTypes::process`], calling `observe` after every solver pass
    pub fn process_observed<F>(&mut self, externs: &'p [Stmt], root: &'p [Stmt], observe: F) -> Result<Converged>
    where
        F: FnMut(usize, &TightenTypes<'p>),
    {
        if self.processed {
            return Err(TightenError::AlreadyProcessed);
        }
        self.processed = true;

        let top = self.top_scope;
        let mut collector = ActionCollector::new(self.registry, &mut self.graph, top, top).for_externs();
        collector.hoist(externs)?;
        collector.hoist(root)?;
        collector.declare_implicit_globals(root)?;
        collector.visit_stmts(externs)?;
        ActionCollector::new(self.registry, &mut self.graph, top, top).visit_stmts(root)?;
        debug!(
            actions = self.graph.scope(top).actions().len(),
            slots = self.graph.slot_count(),
            "collected global constraints"
        );

        let stats = FixpointSolver::new(&self.config).solve_observed(self, observe)?;
        self.converged = Some(stats);
        Ok(stats)
    }

    /// The global scope, the entry point for name resolution
    pub fn top_scope(&self) -> ScopeId {
        self.top_scope
    }

    /// Scope/slot arena
    pub fn graph(&self) -> &ScopeGraph<'p> {
        &self.graph
    }

    /// Configuration the context runs with
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Statistics of the converged run, once [`TightenTypes::process`] succeeded
    pub fn converged(&self) -> Option<Converged> {
        self.converged
    }

    /// Canonical function for `id`
    pub fn concrete_function(&self, id: ConcreteFunctionId) -> &ConcreteFunction {
        &self.functions[id.index()]
    }

    /// Canonical instance for `id`
    pub fn concrete_instance(&self, id: ConcreteInstanceId) -> &ConcreteInstance {
        &self.instances[id.index()]
    }

    /// Every canonical function in creation order
    pub fn concrete_functions(&self) -> impl Iterator<Item = (ConcreteFunctionId, &ConcreteFunction)> + '_ {
        self.functions
            .values()
            .enumerate()
            .map(|(index, function)| (ConcreteFunctionId(index as u32), function))
    }

    /// Every canonical instance in creation order
    pub fn concrete_instances(&self) -> impl Iterator<Item = (ConcreteInstanceId, &ConcreteInstance)> + '_ {
        self.instances
            .values()
            .enumerate()
            .map(|(index, instance)| (ConcreteInstanceId(index as u32), instance))
    }

    /// Whether `instance` is in the allocation set
    pub fn is_allocated(&self, instance: ConcreteInstanceId) -> bool {
        self.allocated.contains(&instance)
    }

    /// Allocation set in insertion order
    pub fn allocated(&self) -> impl Iterator<Item = ConcreteInstanceId> + '_ {
        self.allocated.iter().copied()
    }

    /// Type of `name` resolved from `scope`
    pub fn slot_type(&self, scope: ScopeId, name: &str) -> Option<&ConcreteType> {
        self.graph.lookup(scope, name).map(|slot| self.graph.slot_type(slot))
    }

    /// Type of global `name`
    pub fn global_type(&self, name: &str) -> Option<&ConcreteType> {
        self.slot_type(self.top_scope, name)
    }

    /// Concrete function created for `decl`, as a singleton type
    pub fn function_type(&self, decl: FunctionId) -> Option<ConcreteType> {
        self.get_concrete_function(decl).map(ConcreteType::Function)
    }

    /// Concrete instance created for `shape`, as a singleton type
    pub fn instance_type(&self, shape: ShapeId) -> Option<ConcreteType> {
        self.get_concrete_instance(shape).map(ConcreteType::Instance)
    }

    /// Own slot `name` of the body scope of `decl`
    pub fn function_slot_type(&self, decl: FunctionId, name: &str) -> Option<&ConcreteType> {
        let function = self.get_concrete_function(decl)?;
        let slot = self.graph.own_slot(self.functions[function.index()].body_scope, name)?;
        Some(self.graph.slot_type(slot))
    }

    /// Union of every value `decl` returns
    pub fn function_return_type(&self, decl: FunctionId) -> Option<&ConcreteType> {
        self.function_slot_type(decl, RETURN_SLOT)
    }

    /// Receiver bound into `decl` by calls and allocations
    pub fn this_type(&self, decl: FunctionId) -> Option<&ConcreteType> {
        self.function_slot_type(decl, THIS_SLOT)
    }

    /// Formal parameter `index` of `decl`
    pub fn parameter_type(&self, decl: FunctionId, index: usize) -> Option<&ConcreteType> {
        let function = self.get_concrete_function(decl)?;
        let slot = *self.graph.params(self.functions[function.index()].body_scope).get(index)?;
        Some(self.graph.slot_type(slot))
    }

    /// Property `name` as seen on instances of `shape`, prototype chain included
    pub fn instance_property_type(&self, shape: ShapeId, name: &str) -> Option<&ConcreteType> {
        let instance = self.get_concrete_instance(shape)?;
        self.slot_type(self.instances[instance.index()].scope, name)
    }

    pub(crate) fn function_decl(&self, decl: FunctionId) -> Result<&'p FunctionDecl> {
        let registry = self.registry;
        registry.function(decl).ok_or(TightenError::UnknownFunction(decl))
    }

    pub(crate) fn shape_decl(&self, shape: ShapeId) -> Result<&'p ShapeDecl> {
        let registry = self.registry;
        registry.shape(shape).ok_or(TightenError::UnknownShape(shape))
    }

    /// Add `instance` to the allocation set. Returns whether the set grew.
    pub(crate) fn record_allocation(&mut self, instance: ConcreteInstanceId) -> bool {
        if !self.allocated.insert(instance) {
            return false;
        }
        self.widened = true;
        self.invalidate_intersections();
        debug!(
            instance = %self.describe(&ConcreteType::Instance(instance)),
            allocated = self.allocated.len(),
            "allocation set grew"
        );
        true
    }

    pub(crate) fn invalidate_intersections(&mut self) {
        self.intersections.clear();
    }

    /// Render a concrete type with declaration names, members sorted by name
    pub fn describe(&self, ty: &ConcreteType) -> String {
        match ty {
            ConcreteType::None => "NONE".to_string(),
            ConcreteType::All => "ALL".to_string(),
            other => {
                let mut names: Vec<String> = other.members().into_iter().map(|m| self.describe_member(m)).collect();
                names.sort();
                if names.len() == 1 {
                    names.remove(0)
                } else {
                    format!("({})", names.join(", "))
                }
            }
        }
    }

    fn describe_member(&self, member: Singleton) -> String {
        match member {
            Singleton::Function(id) => format!("function {}", self.function_name(self.functions[id.index()].decl)),
            Singleton::Instance(id) => format!("instance {}", self.shape_name(self.instances[id.index()].shape)),
        }
    }

    fn function_name(&self, decl: FunctionId) -> &'p str {
        let registry = self.registry;
        registry
            .function(decl)
            .map(FunctionDecl::display_name)
            .unwrap_or("<unknown>")
    }

    fn shape_name(&self, shape: ShapeId) -> &'p str {
        let registry = self.registry;
        registry
            .shape(shape)
            .map(|decl| decl.name.as_str())
            .unwrap_or("<unknown>")
    }

    fn scope_name(&self, kind: ScopeKind) -> String {
        match kind {
            ScopeKind::Global => "<global>".to_string(),
            ScopeKind::Function(decl) => self.function_name(decl).to_string(),
            ScopeKind::FunctionProperties(decl) => format!("{} (static)", self.function_name(decl)),
            ScopeKind::Instance(shape) => self.shape_name(shape).to_string(),
        }
    }

    /// Every non-empty scope with its slots rendered by [`TightenTypes::describe`]
    pub fn report(&self) -> AnalysisReport {
        let stats = self.converged.unwrap_or_default();
        let scopes = self
            .graph
            .scopes()
            .filter(|(_, scope)| scope.slots().next().is_some())
            .map(|(_, scope)| ScopeReport {
                name: self.scope_name(scope.kind),
                kind: match scope.kind {
                    ScopeKind::Global => "global",
                    ScopeKind::Function(_) => "function",
                    ScopeKind::FunctionProperties(_) => "statics",
                    ScopeKind::Instance(_) => "instance",
                },
                slots: scope
                    .slots()
                    .map(|(name, slot)| SlotReport {
                        name: name.to_string(),
                        ty: self.describe(self.graph.slot_type(slot)),
                    })
                    .collect(),
            })
            .collect();
        let mut allocated: Vec<String> = self
            .allocated
            .iter()
            .map(|id| self.shape_name(self.instances[id.index()].shape).to_string())
            .collect();
        allocated.sort();

        AnalysisReport {
            passes: stats.passes,
            actions: stats.actions,
            allocated,
            scopes,
        }
    }
}

impl<'p> ConstraintSystem for TightenTypes<'p> {
    type Unit = ScopeId;

    fn roots(&self) -> Vec<ScopeId> {
        vec![self.top_scope]
    }

    fn replay(&mut self, scope: ScopeId) -> Result<Replay<ScopeId>> {
        self.widened = false;
        let mut replay = Replay::unchanged(0);
        let mut index = 0;
        while let Some(action) = self.graph.action(scope, index) {
            for Assignment { slot, ty } in self.evaluate(scope, action)? {
                if self.graph.union_into(slot, &ty) {
                    let owner = self.graph.slot(slot).scope;
                    if !replay.dirty.contains(&owner) {
                        replay.dirty.push(owner);
                    }
                }
            }
            index += 1;
        }
        replay.actions = index;
        replay.widened = self.widened;
        Ok(replay)
    }

    fn take_discovered(&mut self) -> Vec<ScopeId> {
        std::mem::take(&mut self.discovered)
    }
}

/// Converged slot types of a run, rendered for people and tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    /// Outer solver passes
    pub passes: usize,
    /// Actions evaluated over all passes
    pub actions: usize,
    /// Shape names of every allocated instance
    pub allocated: Vec<String>,
    /// Scopes with at least one slot
    pub scopes: Vec<ScopeReport>,
}

/// One scope and its slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    /// Display name of the owner
    pub name: String,
    /// `global`, `function`, `statics` or `instance`
    pub kind: &'static str,
    /// Own slots in declaration order
    pub slots: Vec<SlotReport>,
}

/// One slot rendered by [`TightenTypes::describe`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    /// Slot name
    pub name: String,
    /// Rendered concrete type
    #[serde(rename = "type")]
    pub ty: String,
}

impl AnalysisReport {
    /// Scope named `name`, if it has any slots
    pub fn scope(&self, name: &str) -> Option<&ScopeReport> {
        self.scopes.iter().find(|scope| scope.name == name)
    }
}

impl ScopeReport {
    /// Rendered type of slot `name`
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.ty.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::Expr;

    #[test]
    fn test_second_process_is_rejected() {
        let program = Program::new();
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());
        analysis.process(&program.externs, &program.body).unwrap();
        let err = analysis.process(&program.externs, &program.body).unwrap_err();
        assert!(matches!(err, TightenError::AlreadyProcessed));
    }

    #[test]
    fn test_describe_sorts_by_name() {
        let mut program = Program::new();
        let zed = program.add_class("Zed", None, &[], vec![], &[]);
        let abe = program.add_class("Abe", None, &[], vec![], &[]);
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());
        let z = analysis.create_concrete_instance(zed.instance).unwrap();
        let a = analysis.create_concrete_instance(abe.instance).unwrap();
        let both = ConcreteType::Instance(z).union_with(&ConcreteType::Instance(a));

        assert_eq!(analysis.describe(&both), "(instance Abe, instance Zed)");
        assert_eq!(analysis.describe(&ConcreteType::All), "ALL");
    }

    #[test]
    fn test_report_lists_global_slots() {
        let mut program = Program::new();
        let foo = program.add_class("Foo", None, &[], vec![], &[]);
        program.body = vec![
            Stmt::Function(foo.ctor),
            Stmt::var("x", Expr::construct(Expr::name("Foo"), vec![])),
        ];
        let analysis = TightenTypes::analyze(&program, AnalysisConfig::default()).unwrap();
        let report = analysis.report();

        let global = report.scope("<global>").unwrap();
        assert_eq!(global.slot("x"), Some("instance Foo"));
        assert_eq!(global.slot("Foo"), Some("function Foo"));
        assert_eq!(report.allocated, vec!["Foo".to_string()]);
        assert!(report.passes >= 2);
    }
}
