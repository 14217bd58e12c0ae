//! Interprocedural flow: call, allocation, and property-assignment binding
//!
//! Calls bind argument types into the parameter slots of every function the callee
//! may be, and the effective receiver into each `this` slot:
//!
//! - `recv.m(args)` binds `recv` as the receiver
//! - `f.call(recv, args)` binds `recv` and shifts the arguments
//! - `f(args)` binds no receiver
//! - a callee of `ALL` lets every function passed as an argument escape
//!
//! Functions handed to extern code are assumed to be called back with the
//! parameter types their declared callback signature names, or with anything.

mod properties;

use crate::analysis::TightenTypes;
use crate::dataflow::{
    Assignment, Assignments, ConcreteFunctionId, ConcreteType, ScopeId, Singleton, CALL_PROPERTY, THIS_SLOT,
};
use crate::error::{Result, TightenError};
use crate::hir::{DeclaredType, Expr, ExprKind};

impl<'p> TightenTypes<'p> {
    pub(crate) fn bind_call(
        &mut self,
        scope: ScopeId,
        callee: &'p Expr,
        args: &'p [Expr],
        out: &mut Assignments,
    ) -> Result<()> {
        let ExprKind::GetProp { receiver, property } = &callee.kind else {
            let callee = self.infer_concrete_type(scope, callee)?;
            return self.bind_callees(scope, &callee, ConcreteType::None, args, out);
        };

        let receiver = self.infer_concrete_type(scope, receiver)?;
        if receiver.is_all() {
            return self.escape_arguments(scope, args, out);
        }
        let callees = self.infer_concrete_type(scope, callee)?;
        if property != CALL_PROPERTY {
            return self.bind_callees(scope, &callees, receiver, args, out);
        }

        // `f.call(recv, ...)` on the function values themselves
        let direct = receiver.functions();
        let this_type = match args.first() {
            Some(first) => self.infer_concrete_type(scope, first)?,
            None => ConcreteType::All,
        };
        let shifted = args.get(1..).unwrap_or_default();
        for &function in &direct {
            self.bind_function(scope, function, this_type.clone(), shifted, out)?;
        }

        // methods named `call` on instances
        let methods = callees.filter(|member| match member {
            Singleton::Function(function) => !direct.contains(&function),
            Singleton::Instance(_) => true,
        });
        let instances = receiver.filter(|member| matches!(member, Singleton::Instance(_)));
        self.bind_callees(scope, &methods, instances, args, out)
    }

    /// `new callee(args)`: allocate the constructed instance and bind it as receiver
    pub(crate) fn bind_allocation(
        &mut self,
        scope: ScopeId,
        callee: &'p Expr,
        args: &'p [Expr],
        out: &mut Assignments,
    ) -> Result<()> {
        let callee = self.infer_concrete_type(scope, callee)?;
        if callee.is_all() {
            return Err(TightenError::NewOnAllType);
        }
        for function in callee.functions() {
            let this_type = match self.functions[function.index()].instance {
                Some(instance) => {
                    self.record_allocation(instance);
                    ConcreteType::Instance(instance)
                }
                None => ConcreteType::None,
            };
            self.bind_function(scope, function, this_type, args, out)?;
        }
        Ok(())
    }

    fn bind_callees(
        &mut self,
        scope: ScopeId,
        callees: &ConcreteType,
        this_type: ConcreteType,
        args: &'p [Expr],
        out: &mut Assignments,
    ) -> Result<()> {
        if callees.is_all() {
            return self.escape_arguments(scope, args, out);
        }
        for function in callees.functions() {
            self.bind_function(scope, function, this_type.clone(), args, out)?;
        }
        Ok(())
    }

    fn bind_function(
        &mut self,
        scope: ScopeId,
        function: ConcreteFunctionId,
        this_type: ConcreteType,
        args: &'p [Expr],
        out: &mut Assignments,
    ) -> Result<()> {
        let (decl, body) = {
            let function = &self.functions[function.index()];
            (function.decl, function.body_scope)
        };
        let declaration = self.function_decl(decl)?;
        let params = self.graph.params(body).to_vec();

        if let Some(this_slot) = self.graph.own_slot(body, THIS_SLOT) {
            if !this_type.is_none() {
                out.push(Assignment::new(this_slot, this_type));
            }
        }
        for (index, arg) in args.iter().enumerate() {
            let ty = self.infer_concrete_type(scope, arg)?;
            if declaration.is_extern() {
                self.bind_callback(declaration.signature.params.get(index), &ty, out)?;
            }
            if let Some(&param) = params.get(index) {
                out.push(Assignment::new(param, ty));
            }
        }
        Ok(())
    }

    /// Functions passed to extern code: bind what the declared callback signature
    /// promises, or `ALL` when there is none.
    fn bind_callback(
        &mut self,
        declared: Option<&'p DeclaredType>,
        arg: &ConcreteType,
        out: &mut Assignments,
    ) -> Result<()> {
        let signature = declared.and_then(DeclaredType::signature);
        for function in arg.functions() {
            let body = self.functions[function.index()].body_scope;
            let params = self.graph.params(body).to_vec();
            for (index, param) in params.into_iter().enumerate() {
                let ty = match signature.and_then(|sig| sig.params.get(index)) {
                    Some(declared) => self.create_type(declared)?,
                    None => ConcreteType::All,
                };
                out.push(Assignment::new(param, ty));
            }
            if let Some(this_slot) = self.graph.own_slot(body, THIS_SLOT) {
                let ty = match signature.and_then(|sig| sig.this_type.as_ref()) {
                    Some(declared) => self.create_type(declared)?,
                    None => ConcreteType::All,
                };
                out.push(Assignment::new(this_slot, ty));
            }
        }
        Ok(())
    }

    /// Arguments of a call whose callee is unknown may be invoked with anything
    fn escape_arguments(&mut self, scope: ScopeId, args: &'p [Expr], out: &mut Assignments) -> Result<()> {
        for arg in args {
            let ty = self.infer_concrete_type(scope, arg)?;
            self.bind_callback(None, &ty, out)?;
        }
        Ok(())
    }
}
