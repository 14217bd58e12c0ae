//! Concrete-type inference over expressions
//!
//! [`TightenTypes::infer_concrete_type`] evaluates an expression against the
//! current slot types and narrows the result by the checker's declared type.
//! Declared types are also widened into concrete types for values whose
//! definitions are not analyzed (externs, callbacks handed to externs).

use super::factory::ConcreteTypeFactory;
use super::lattice::{ConcreteFunctionId, ConcreteType, Singleton};
use super::scope::{ScopeId, RETURN_SLOT, THIS_SLOT};
use crate::analysis::TightenTypes;
use crate::error::{Result, TightenError};
use crate::hir::{DeclaredType, Expr, ExprKind, FunctionId, ShapeId, ShapeKind};
use crate::registry::TypeRegistry;
use indexmap::IndexSet;

/// `F.prototype`
pub const PROTOTYPE_PROPERTY: &str = "prototype";
/// `f.call(receiver, ...)`
pub const CALL_PROPERTY: &str = "call";
/// Superclass prototype reference installed by class inheritance helpers
pub const SUPERCLASS_PROPERTY: &str = "superClass_";

/// Concrete entities admitted by a declared type
#[derive(Debug, Default)]
struct DeclaredFilter {
    everything: bool,
    any_function: bool,
    shapes: IndexSet<ShapeId>,
    functions: IndexSet<FunctionId>,
}

impl DeclaredFilter {
    fn new(registry: &dyn TypeRegistry, declared: &DeclaredType) -> Self {
        let mut filter = Self::default();
        filter.add(registry, declared);
        filter
    }

    fn add(&mut self, registry: &dyn TypeRegistry, declared: &DeclaredType) {
        match declared {
            DeclaredType::Unknown | DeclaredType::AnyObject => self.everything = true,
            DeclaredType::Primitive => {}
            DeclaredType::Object(shape) => self.shapes.extend(registry.subtype_closure(*shape)),
            DeclaredType::Function { decl: Some(decl), .. } => {
                self.functions.insert(*decl);
            }
            DeclaredType::Function { decl: None, .. } => self.any_function = true,
            DeclaredType::Union(members) => {
                for member in members {
                    self.add(registry, member);
                }
            }
        }
    }
}

impl<'p> TightenTypes<'p> {
    /// Concrete type of `expr` evaluated in `scope`, narrowed by its declared type.
    ///
    /// Only meaningful once the fixed point has converged; earlier calls see partial
    /// slot types.
    pub fn infer_concrete_type(&mut self, scope: ScopeId, expr: &Expr) -> Result<ConcreteType> {
        let ty = self.infer_unnarrowed(scope, expr)?;
        match self.registry.declared_type(expr) {
            Some(declared) => Ok(self.intersect_with_declared(&ty, declared)),
            None => Ok(ty),
        }
    }

    fn infer_unnarrowed(&mut self, scope: ScopeId, expr: &Expr) -> Result<ConcreteType> {
        let ty = match &expr.kind {
            ExprKind::Name(name) => match self.graph.lookup(scope, name) {
                Some(slot) => self.graph.slot_type(slot).clone(),
                None => ConcreteType::All,
            },
            ExprKind::This => match self.graph.own_slot(scope, THIS_SLOT) {
                Some(slot) => self.graph.slot_type(slot).clone(),
                None => ConcreteType::All,
            },
            ExprKind::Literal => ConcreteType::None,
            ExprKind::Function(decl) => ConcreteType::Function(self.create_concrete_function(*decl, scope)?),
            ExprKind::ObjectLit(_) => match self.registry.declared_type(expr) {
                Some(DeclaredType::Object(shape)) => ConcreteType::Instance(self.create_concrete_instance(*shape)?),
                _ => ConcreteType::All,
            },
            ExprKind::ArrayLit(_) => match self.registry.array_shape() {
                Some(shape) => ConcreteType::Instance(self.create_concrete_instance(shape)?),
                None => ConcreteType::All,
            },
            ExprKind::GetProp { receiver, property } => {
                let receiver = self.infer_concrete_type(scope, receiver)?;
                self.property_type(&receiver, property)?
            }
            ExprKind::GetElem { .. } | ExprKind::Unknown(_) => ConcreteType::All,
            ExprKind::Call { callee, .. } => {
                let callee = self.infer_concrete_type(scope, callee)?;
                self.return_type(&callee)
            }
            ExprKind::New { callee, .. } => {
                let callee = self.infer_concrete_type(scope, callee)?;
                if callee.is_all() {
                    return Err(TightenError::NewOnAllType);
                }
                self.function_instance_types(&callee)
            }
            ExprKind::Assign { value, .. } => self.infer_concrete_type(scope, value)?,
            ExprKind::Comma(exprs) => match exprs.last() {
                Some(last) => self.infer_concrete_type(scope, last)?,
                None => ConcreteType::None,
            },
            ExprKind::And(left, right) | ExprKind::Or(left, right) => {
                let left = self.infer_concrete_type(scope, left)?;
                let right = self.infer_concrete_type(scope, right)?;
                left.union_with(&right)
            }
            ExprKind::Hook {
                then_expr, else_expr, ..
            } => {
                let then_ty = self.infer_concrete_type(scope, then_expr)?;
                let else_ty = self.infer_concrete_type(scope, else_expr)?;
                then_ty.union_with(&else_ty)
            }
        };
        Ok(ty)
    }

    /// Union of `name` over every member of `receiver`
    pub fn property_type(&mut self, receiver: &ConcreteType, name: &str) -> Result<ConcreteType> {
        if receiver.is_all() {
            return Ok(ConcreteType::All);
        }
        let mut result = ConcreteType::None;
        for member in receiver.members() {
            let ty = match member {
                Singleton::Instance(id) => {
                    let scope = self.instances[id.index()].scope;
                    match self.graph.lookup(scope, name) {
                        Some(slot) => self.graph.slot_type(slot).clone(),
                        None => ConcreteType::None,
                    }
                }
                Singleton::Function(id) => self.function_property_type(id, name)?,
            };
            result = result.union_with(&ty);
        }
        Ok(result)
    }

    fn function_property_type(&mut self, id: ConcreteFunctionId, name: &str) -> Result<ConcreteType> {
        let function = &self.functions[id.index()];
        let (decl, property_scope, prototype) = (function.decl, function.property_scope, function.prototype);
        match name {
            PROTOTYPE_PROPERTY => {
                if let Some(prototype) = prototype {
                    return Ok(ConcreteType::Instance(prototype));
                }
            }
            CALL_PROPERTY => return Ok(ConcreteType::Function(id)),
            SUPERCLASS_PROPERTY => {
                if let Some(superclass) = self.function_decl(decl)?.superclass {
                    if let Some(shape) = self.function_decl(superclass)?.prototype_shape {
                        return Ok(ConcreteType::Instance(self.create_concrete_instance(shape)?));
                    }
                }
            }
            _ => {}
        }
        Ok(match self.graph.own_slot(property_scope, name) {
            Some(slot) => self.graph.slot_type(slot).clone(),
            None => ConcreteType::None,
        })
    }

    /// Instances constructed by `new` over every function in `ty`
    pub fn function_instance_types(&self, ty: &ConcreteType) -> ConcreteType {
        ConcreteType::from_members(
            ty.functions()
                .into_iter()
                .filter_map(|function| self.functions[function.index()].instance)
                .map(Singleton::Instance),
        )
    }

    /// Union of the return slots of every function in `callee`
    pub fn return_type(&self, callee: &ConcreteType) -> ConcreteType {
        if callee.is_all() {
            return ConcreteType::All;
        }
        callee
            .functions()
            .into_iter()
            .filter_map(|function| self.graph.own_slot(self.functions[function.index()].body_scope, RETURN_SLOT))
            .fold(ConcreteType::None, |acc, slot| acc.union_with(self.graph.slot_type(slot)))
    }

    /// Narrow `ty` to the entities `declared` admits.
    ///
    /// `All` expands to every allocated instance and canonical function the declared
    /// type admits. Results are cached until the allocation set or the function table
    /// grows.
    pub fn intersect_with_declared(&mut self, ty: &ConcreteType, declared: &DeclaredType) -> ConcreteType {
        if declared.is_unknown() || ty.is_none() {
            return ty.clone();
        }
        let key = self
            .config
            .memoize_intersections
            .then(|| (ty.clone(), declared.clone()));
        if let Some(hit) = key.as_ref().and_then(|key| self.intersections.get(key)) {
            return hit.clone();
        }

        let filter = DeclaredFilter::new(self.registry, declared);
        let result = if filter.everything {
            ty.clone()
        } else if ty.is_all() {
            self.expand(&filter)
        } else {
            ty.filter(|member| self.admits(&filter, member))
        };

        if let Some(key) = key {
            self.intersections.insert(key, result.clone());
        }
        result
    }

    /// Conservative concrete type for a value known only by its declared type.
    ///
    /// A declared non-extern function contributes nothing until its declaration has
    /// been evaluated; every queued scope is replayed again after that pass.
    pub fn create_type(&mut self, declared: &DeclaredType) -> Result<ConcreteType> {
        let ty = match declared {
            DeclaredType::Unknown | DeclaredType::AnyObject => ConcreteType::All,
            DeclaredType::Primitive => ConcreteType::None,
            DeclaredType::Object(shape) => {
                let mut ty = ConcreteType::None;
                if self.shape_decl(*shape)?.kind != ShapeKind::Interface {
                    let instance = self.create_concrete_instance(*shape)?;
                    self.record_allocation(instance);
                    ty = ConcreteType::Instance(instance);
                }
                let filter = DeclaredFilter::new(self.registry, declared);
                ty.union_with(&self.expand(&filter))
            }
            DeclaredType::Function { decl: Some(decl), .. } => match self.get_concrete_function(*decl) {
                Some(id) => ConcreteType::Function(id),
                None if self.function_decl(*decl)?.is_extern() => {
                    let top = self.top_scope;
                    ConcreteType::Function(self.create_concrete_function(*decl, top)?)
                }
                None => ConcreteType::None,
            },
            DeclaredType::Function { decl: None, .. } => ConcreteType::All,
            DeclaredType::Union(members) => {
                let mut ty = ConcreteType::None;
                for member in members {
                    ty = ty.union_with(&self.create_type(member)?);
                }
                ty
            }
        };
        Ok(ty)
    }

    fn expand(&self, filter: &DeclaredFilter) -> ConcreteType {
        let instances = self
            .allocated
            .iter()
            .copied()
            .filter(|id| self.shape_admitted(filter, self.instances[id.index()].shape))
            .map(Singleton::Instance);
        let functions = self
            .functions
            .values()
            .enumerate()
            .filter(|(_, function)| filter.any_function || filter.functions.contains(&function.decl))
            .map(|(index, _)| Singleton::Function(ConcreteFunctionId(index as u32)));
        ConcreteType::from_members(instances.chain(functions))
    }

    fn admits(&self, filter: &DeclaredFilter, member: Singleton) -> bool {
        match member {
            Singleton::Function(id) => {
                filter.any_function || filter.functions.contains(&self.functions[id.index()].decl)
            }
            Singleton::Instance(id) => self.shape_admitted(filter, self.instances[id.index()].shape),
        }
    }

    /// Prototype objects are admitted through their prototype chain as well
    fn shape_admitted(&self, filter: &DeclaredFilter, shape: ShapeId) -> bool {
        let mut current = Some(shape);
        while let Some(shape) = current {
            if filter.shapes.contains(&shape) {
                return true;
            }
            current = match self.registry.shape(shape) {
                Some(decl) if decl.kind == ShapeKind::Prototype => decl.implicit_prototype,
                _ => None,
            };
        }
        false
    }
}
