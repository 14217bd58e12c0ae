//! Declared-type collaborator interface
//!
//! The analysis never inspects the checker's internals; it asks a [`TypeRegistry`]
//! for shape and declaration metadata, per-expression declared types, and the
//! subtype/implementor relations used to expand interface and superclass references.

use crate::hir::{DeclaredType, Expr, FunctionDecl, FunctionId, Program, ShapeDecl, ShapeId};
use indexmap::IndexSet;

/// Declared-type metadata the analysis consults
pub trait TypeRegistry {
    /// Declaration of shape `id`
    fn shape(&self, id: ShapeId) -> Option<&ShapeDecl>;

    /// Declaration of function `id`
    fn function(&self, id: FunctionId) -> Option<&FunctionDecl>;

    /// Instance shape of native array objects, if the environment declares one
    fn array_shape(&self) -> Option<ShapeId>;

    /// Checker-supplied static type of an expression
    fn declared_type<'e>(&self, expr: &'e Expr) -> Option<&'e DeclaredType> {
        expr.declared.as_ref()
    }

    /// Shapes that directly extend `shape`
    fn direct_subtypes(&self, shape: ShapeId) -> &[ShapeId] {
        self.shape(shape).map(|decl| decl.subtypes.as_slice()).unwrap_or(&[])
    }

    /// Constructors implementing `interface`
    fn implementors(&self, interface: ShapeId) -> &[FunctionId] {
        self.shape(interface)
            .map(|decl| decl.implementors.as_slice())
            .unwrap_or(&[])
    }

    /// The shape itself plus every shape reachable through direct subtypes and
    /// the instance shapes of implementing constructors, recursively.
    fn subtype_closure(&self, root: ShapeId) -> IndexSet<ShapeId> {
        let mut closure = IndexSet::new();
        let mut stack = vec![root];
        while let Some(shape) = stack.pop() {
            if !closure.insert(shape) {
                continue;
            }
            stack.extend(self.direct_subtypes(shape).iter().copied());
            stack.extend(
                self.implementors(shape)
                    .iter()
                    .filter_map(|ctor| self.function(*ctor))
                    .filter_map(|decl| decl.instance_shape),
            );
        }
        closure
    }
}

impl TypeRegistry for Program {
    fn shape(&self, id: ShapeId) -> Option<&ShapeDecl> {
        self.shapes.get(id.index())
    }

    fn function(&self, id: FunctionId) -> Option<&FunctionDecl> {
        self.functions.get(id.index())
    }

    fn array_shape(&self) -> Option<ShapeId> {
        self.array_shape
    }
}
