//! Canonical concrete functions and instances
//!
//! A concrete function or instance is created at most once per declaration; every
//! later request returns the same id. Creating one also builds its scopes: a body
//! scope with hoisted slots and extracted actions for functions, a property scope
//! chained to the prototype's property scope for instances.

use super::actions::{Action, ActionCollector};
use super::lattice::{ConcreteFunctionId, ConcreteInstanceId, ConcreteType};
use super::scope::{ScopeId, ScopeKind, CALLEE_SLOT, RETURN_SLOT, THIS_SLOT};
use crate::analysis::TightenTypes;
use crate::error::{Result, TightenError};
use crate::hir::{FunctionId, ShapeId};
use tracing::debug;

/// A function declaration seen as a runtime value
#[derive(Debug, Clone)]
pub struct ConcreteFunction {
    /// Declaration this function was created for
    pub decl: FunctionId,
    /// Scope enclosing the declaration site
    pub parent_scope: ScopeId,
    /// Scope holding the callee, `this`, return, parameter and local slots
    pub body_scope: ScopeId,
    /// Static properties assigned onto the function value
    pub property_scope: ScopeId,
    /// Objects created by `new`
    pub instance: Option<ConcreteInstanceId>,
    /// `F.prototype`
    pub prototype: Option<ConcreteInstanceId>,
}

/// An object shape seen as a runtime value
#[derive(Debug, Clone)]
pub struct ConcreteInstance {
    /// Declared shape
    pub shape: ShapeId,
    /// Property scope, parented to the prototype's property scope
    pub scope: ScopeId,
}

/// Construction and lookup of canonical concrete types, keyed by declaration identity
pub trait ConcreteTypeFactory {
    /// Canonical function for `decl`, created with `parent` as its enclosing scope on first request
    fn create_concrete_function(&mut self, decl: FunctionId, parent: ScopeId) -> Result<ConcreteFunctionId>;

    /// Canonical function for `decl`, if already created
    fn get_concrete_function(&self, decl: FunctionId) -> Option<ConcreteFunctionId>;

    /// Canonical instance for `shape`, created with its prototype chain on first request
    fn create_concrete_instance(&mut self, shape: ShapeId) -> Result<ConcreteInstanceId>;

    /// Canonical instance for `shape`, if already created
    fn get_concrete_instance(&self, shape: ShapeId) -> Option<ConcreteInstanceId>;

    /// Body scope of `decl` nested in `parent`, with its actions extracted
    fn create_function_scope(&mut self, decl: FunctionId, parent: ScopeId) -> Result<ScopeId>;

    /// Property scope of `shape`, chained to its prototype's property scope
    fn create_instance_scope(&mut self, shape: ShapeId) -> Result<ScopeId>;
}

impl<'p> ConcreteTypeFactory for TightenTypes<'p> {
    fn create_concrete_function(&mut self, decl: FunctionId, parent: ScopeId) -> Result<ConcreteFunctionId> {
        if let Some(existing) = self.get_concrete_function(decl) {
            return Ok(existing);
        }
        let declaration = self.function_decl(decl)?;
        let prototype = declaration
            .prototype_shape
            .map(|shape| self.create_concrete_instance(shape))
            .transpose()?;
        let instance = declaration
            .instance_shape
            .map(|shape| self.create_concrete_instance(shape))
            .transpose()?;

        let id = ConcreteFunctionId(self.functions.len() as u32);
        let property_scope = self.graph.new_scope(ScopeKind::FunctionProperties(decl), None);
        let body_scope = self.create_function_scope(decl, parent)?;
        if let Some(callee) = self.graph.own_slot(body_scope, CALLEE_SLOT) {
            self.graph.union_into(callee, &ConcreteType::Function(id));
        }

        self.functions.insert(
            decl,
            ConcreteFunction {
                decl,
                parent_scope: parent,
                body_scope,
                property_scope,
                instance,
                prototype,
            },
        );
        self.invalidate_intersections();
        debug!(
            function = declaration.display_name(),
            id = id.0,
            scope = body_scope.0,
            "created concrete function"
        );
        Ok(id)
    }

    fn get_concrete_function(&self, decl: FunctionId) -> Option<ConcreteFunctionId> {
        self.functions
            .get_index_of(&decl)
            .map(|index| ConcreteFunctionId(index as u32))
    }

    fn create_concrete_instance(&mut self, shape: ShapeId) -> Result<ConcreteInstanceId> {
        if let Some(existing) = self.get_concrete_instance(shape) {
            return Ok(existing);
        }
        if self.pending_shapes.contains(&shape) {
            return Err(TightenError::CyclicPrototype(shape));
        }
        self.pending_shapes.push(shape);
        let scope = self.create_instance_scope(shape);
        self.pending_shapes.pop();
        let scope = scope?;

        let (index, _) = self.instances.insert_full(shape, ConcreteInstance { shape, scope });
        let id = ConcreteInstanceId(index as u32);
        debug!(shape = %self.shape_decl(shape)?.name, id = id.0, "created concrete instance");
        Ok(id)
    }

    fn get_concrete_instance(&self, shape: ShapeId) -> Option<ConcreteInstanceId> {
        self.instances
            .get_index_of(&shape)
            .map(|index| ConcreteInstanceId(index as u32))
    }

    fn create_function_scope(&mut self, decl: FunctionId, parent: ScopeId) -> Result<ScopeId> {
        let declaration = self.function_decl(decl)?;
        let scope = self.graph.new_scope(ScopeKind::Function(decl), Some(parent));
        self.graph.declare_slot(scope, CALLEE_SLOT)?;
        self.graph.declare_slot(scope, THIS_SLOT)?;
        let ret = self.graph.declare_slot(scope, RETURN_SLOT)?;
        for param in &declaration.params {
            self.graph.declare_param(scope, param)?;
        }

        match &declaration.body {
            Some(body) => {
                ActionCollector::new(self.registry, &mut self.graph, self.top_scope, scope).collect_body(body)?;
            }
            None => self.graph.add_action(
                scope,
                Action::DeclaredFlow {
                    slot: ret,
                    declared: &declaration.signature.ret,
                },
            ),
        }

        self.discovered.push(scope);
        debug!(
            function = declaration.display_name(),
            scope = scope.0,
            actions = self.graph.scope(scope).actions().len(),
            "created function scope"
        );
        Ok(scope)
    }

    fn create_instance_scope(&mut self, shape: ShapeId) -> Result<ScopeId> {
        let declaration = self.shape_decl(shape)?;
        let parent = match declaration.implicit_prototype {
            Some(prototype) => {
                let instance = self.create_concrete_instance(prototype)?;
                Some(self.instances[instance.index()].scope)
            }
            None => None,
        };

        let scope = self.graph.new_scope(ScopeKind::Instance(shape), parent);
        for property in &declaration.properties {
            self.graph.declare_slot(scope, property)?;
        }
        Ok(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::hir::{Program, ShapeDecl, Stmt};

    #[test]
    fn test_functions_are_canonical() {
        let mut program = Program::new();
        let f = program.add_function(crate::hir::FunctionDecl::new(Some("f"), &["a"], vec![]));
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());
        let top = analysis.top_scope();

        let first = analysis.create_concrete_function(f, top).unwrap();
        let second = analysis.create_concrete_function(f, top).unwrap();
        assert_eq!(first, second);
        assert_eq!(analysis.get_concrete_function(f), Some(first));
    }

    #[test]
    fn test_instances_are_canonical() {
        let mut program = Program::new();
        let foo = program.add_class("Foo", None, &[], vec![], &["x"]);
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());

        let first = analysis.create_concrete_instance(foo.instance).unwrap();
        let scopes = analysis.graph().scope_count();
        let second = analysis.create_concrete_instance(foo.instance).unwrap();
        assert_eq!(first, second);
        assert_eq!(analysis.get_concrete_instance(foo.instance), Some(first));
        assert_eq!(analysis.graph().scope_count(), scopes);
        assert_eq!(analysis.concrete_instances().count(), 2);
    }

    #[test]
    fn test_function_scope_layout() {
        let mut program = Program::new();
        let f = program.add_function(crate::hir::FunctionDecl::new(
            Some("f"),
            &["a", "b"],
            vec![Stmt::declare("local")],
        ));
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());
        let top = analysis.top_scope();
        let id = analysis.create_concrete_function(f, top).unwrap();
        let body = analysis.concrete_function(id).body_scope;

        let graph = analysis.graph();
        let names: Vec<&str> = graph.scope(body).slots().map(|(name, _)| name).collect();
        assert_eq!(names, vec![CALLEE_SLOT, THIS_SLOT, RETURN_SLOT, "a", "b", "local"]);
        assert_eq!(graph.params(body).len(), 2);
        let callee = graph.own_slot(body, CALLEE_SLOT).unwrap();
        assert_eq!(graph.slot_type(callee), &ConcreteType::Function(id));
        assert_eq!(graph.scope(body).parent, Some(top));
    }

    #[test]
    fn test_instances_chain_to_prototype_scope() {
        let mut program = Program::new();
        let base = program.add_class("Base", None, &[], vec![], &["x"]);
        let derived = program.add_class("Derived", Some(base.ctor), &[], vec![], &["y"]);
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());

        let instance = analysis.create_concrete_instance(derived.instance).unwrap();
        let base_proto = analysis.get_concrete_instance(base.prototype).unwrap();
        let derived_proto = analysis.get_concrete_instance(derived.prototype).unwrap();
        let scope = analysis.concrete_instance(instance).scope;
        let graph = analysis.graph();

        assert_eq!(graph.scope(scope).parent, Some(analysis.concrete_instance(derived_proto).scope));
        assert_eq!(
            graph.scope(analysis.concrete_instance(derived_proto).scope).parent,
            Some(analysis.concrete_instance(base_proto).scope)
        );
        assert!(graph.own_slot(scope, "y").is_some());
        assert!(graph.lookup(scope, "x").is_none());
    }

    #[test]
    fn test_cyclic_prototype_is_rejected() {
        let mut program = Program::new();
        let a = program.add_shape(ShapeDecl::instance("A"));
        let b = program.add_shape(ShapeDecl::instance("B").with_prototype(a));
        program.shapes[a.index()].implicit_prototype = Some(b);
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());

        let err = analysis.create_concrete_instance(a).unwrap_err();
        assert!(matches!(err, TightenError::CyclicPrototype(_)));
    }

    #[test]
    fn test_unknown_declarations_are_rejected() {
        let program = Program::new();
        let mut analysis = TightenTypes::new(&program, AnalysisConfig::default());
        let top = analysis.top_scope();
        assert!(matches!(
            analysis.create_concrete_function(FunctionId(3), top),
            Err(TightenError::UnknownFunction(_))
        ));
        assert!(matches!(
            analysis.create_concrete_instance(ShapeId(0)),
            Err(TightenError::UnknownShape(_))
        ));
    }
}
