//! Constraint extraction
//!
//! [`ActionCollector`] walks a function body (or the global program) once,
//! declaring hoisted slots and recording one [`Action`] per flow-relevant construct
//! in the enclosing scope. Actions borrow the program; they are replayed by the
//! solver every pass and turned into [`Assignment`]s by [`TightenTypes::evaluate`].

use super::factory::ConcreteTypeFactory;
use super::lattice::ConcreteType;
use super::scope::{ScopeGraph, ScopeId, SlotId, RETURN_SLOT};
use crate::analysis::TightenTypes;
use crate::error::{Result, TightenError};
use crate::hir::{DeclaredType, Expr, ExprKind, FunctionId, Stmt};
use crate::registry::TypeRegistry;
use smallvec::SmallVec;
use std::collections::HashSet;

/// Deferred type flow recorded for one syntactic occurrence
#[derive(Debug, Clone, Copy)]
pub enum Action<'p> {
    /// `name = value` and `var name = value`
    VariableAssign { slot: SlotId, value: &'p Expr },
    /// `receiver.property = value`, and each `key: value` of an object literal
    PropertyAssign {
        receiver: &'p Expr,
        property: &'p str,
        value: &'p Expr,
    },
    /// Binds arguments and receiver into every possible callee
    Call { callee: &'p Expr, args: &'p [Expr] },
    /// `new callee(args)`: allocates and binds like a call
    Allocation { callee: &'p Expr, args: &'p [Expr] },
    /// Object and array literals allocate their instance
    LiteralAllocation { literal: &'p Expr },
    Return { slot: SlotId, value: &'p Expr },
    /// Function declaration statement
    DeclareFunction { slot: SlotId, decl: FunctionId },
    /// Value described only by a declared type (externs)
    DeclaredFlow { slot: SlotId, declared: &'p DeclaredType },
}

/// `(slot, type)` pair to union into the slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Slot receiving `ty`
    pub slot: SlotId,
    /// Type to union in
    pub ty: ConcreteType,
}

impl Assignment {
    /// Pair `slot` with `ty`
    pub fn new(slot: SlotId, ty: ConcreteType) -> Self {
        Self { slot, ty }
    }
}

/// Assignments produced by one action; most actions yield one or two
pub type Assignments = SmallVec<[Assignment; 4]>;

/// Single pass over program text that declares slots and records actions
pub struct ActionCollector<'g, 'p> {
    registry: &'p dyn TypeRegistry,
    graph: &'g mut ScopeGraph<'p>,
    global: ScopeId,
    scope: ScopeId,
    externs: bool,
}

impl<'g, 'p> ActionCollector<'g, 'p> {
    /// Collector recording into `scope`; implicit globals go to `global`
    pub fn new(registry: &'p dyn TypeRegistry, graph: &'g mut ScopeGraph<'p>, global: ScopeId, scope: ScopeId) -> Self {
        Self {
            registry,
            graph,
            global,
            scope,
            externs: false,
        }
    }

    /// Extern declarations: typed `var`s flow their declared type
    pub fn for_externs(mut self) -> Self {
        self.externs = true;
        self
    }

    /// Hoist then extract a whole body
    pub fn collect_body(&mut self, body: &'p [Stmt]) -> Result<()> {
        self.hoist(body)?;
        self.visit_stmts(body)
    }

    /// Declare every `var` and function-declaration name of `body` in the current
    /// scope, without descending into nested functions.
    pub fn hoist(&mut self, body: &'p [Stmt]) -> Result<()> {
        for stmt in body {
            match stmt {
                Stmt::Var { name, .. } => self.declare_once(name)?,
                Stmt::Function(decl) => {
                    if let Some(name) = self.function_name(*decl)? {
                        self.declare_once(name)?;
                    }
                }
                Stmt::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.hoist(then_branch)?;
                    self.hoist(else_branch)?;
                }
                Stmt::While { body, .. } | Stmt::Block(body) => self.hoist(body)?,
                Stmt::Expr(_) | Stmt::Return(_) => {}
            }
        }
        Ok(())
    }

    /// Declare in the global scope every name assigned anywhere in `body`, nested
    /// function bodies included, that no enclosing scope binds.
    ///
    /// Runs after hoisting and before solving, so a read of such a name resolves to
    /// the same global slot whichever body is extracted first.
    pub fn declare_implicit_globals(&mut self, body: &'p [Stmt]) -> Result<()> {
        ImplicitGlobals {
            registry: self.registry,
            graph: &mut *self.graph,
            global: self.global,
            bound: Vec::new(),
            visited: HashSet::new(),
        }
        .stmts(body)
    }

    /// Record actions for `stmts` without hoisting
    pub fn visit_stmts(&mut self, stmts: &'p [Stmt]) -> Result<()> {
        stmts.iter().try_for_each(|stmt| self.visit_stmt(stmt))
    }

    fn visit_stmt(&mut self, stmt: &'p Stmt) -> Result<()> {
        match stmt {
            Stmt::Var { name, init, declared } => {
                let Some(slot) = self.graph.own_slot(self.scope, name) else {
                    return Ok(());
                };
                match (init, declared) {
                    (Some(init), _) => {
                        self.visit_expr(init)?;
                        self.emit(Action::VariableAssign { slot, value: init });
                    }
                    (None, Some(declared)) if self.externs => {
                        self.emit(Action::DeclaredFlow { slot, declared });
                    }
                    (None, _) => {}
                }
            }
            Stmt::Function(decl) => {
                let slot = match self.function_name(*decl)? {
                    Some(name) => self.graph.own_slot(self.scope, name),
                    None => None,
                };
                if let Some(slot) = slot {
                    self.emit(Action::DeclareFunction { slot, decl: *decl });
                }
            }
            Stmt::Expr(expr) => self.visit_expr(expr)?,
            Stmt::Return(value) => {
                let slot = self
                    .graph
                    .own_slot(self.scope, RETURN_SLOT)
                    .ok_or(TightenError::ReturnOutsideFunction)?;
                if let Some(value) = value {
                    self.visit_expr(value)?;
                    self.emit(Action::Return { slot, value });
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(cond)?;
                self.visit_stmts(then_branch)?;
                self.visit_stmts(else_branch)?;
            }
            Stmt::While { cond, body } => {
                self.visit_expr(cond)?;
                self.visit_stmts(body)?;
            }
            Stmt::Block(body) => self.visit_stmts(body)?,
        }
        Ok(())
    }

    fn visit_expr(&mut self, expr: &'p Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::This | ExprKind::Literal | ExprKind::Function(_) => {}
            ExprKind::Assign { target, value } => {
                self.visit_expr(value)?;
                match &target.kind {
                    ExprKind::Name(name) => {
                        let slot = match self.graph.lookup(self.scope, name) {
                            Some(slot) => slot,
                            None => self.graph.declare_slot(self.global, name)?,
                        };
                        self.emit(Action::VariableAssign { slot, value });
                    }
                    ExprKind::GetProp { receiver, property } => {
                        self.visit_expr(receiver)?;
                        self.emit(Action::PropertyAssign {
                            receiver,
                            property,
                            value,
                        });
                    }
                    _ => self.visit_expr(target)?,
                }
            }
            ExprKind::Call { callee, args } => {
                self.visit_expr(callee)?;
                self.visit_exprs(args)?;
                self.emit(Action::Call { callee, args });
            }
            ExprKind::New { callee, args } => {
                self.visit_expr(callee)?;
                self.visit_exprs(args)?;
                self.emit(Action::Allocation { callee, args });
            }
            ExprKind::ObjectLit(properties) => {
                self.emit(Action::LiteralAllocation { literal: expr });
                for init in properties {
                    self.visit_expr(&init.value)?;
                    self.emit(Action::PropertyAssign {
                        receiver: expr,
                        property: &init.key,
                        value: &init.value,
                    });
                }
            }
            ExprKind::ArrayLit(elements) => {
                self.emit(Action::LiteralAllocation { literal: expr });
                self.visit_exprs(elements)?;
            }
            ExprKind::GetProp { receiver, .. } => self.visit_expr(receiver)?,
            ExprKind::GetElem { receiver, index } => {
                self.visit_expr(receiver)?;
                self.visit_expr(index)?;
            }
            ExprKind::Comma(exprs) | ExprKind::Unknown(exprs) => self.visit_exprs(exprs)?,
            ExprKind::And(left, right) | ExprKind::Or(left, right) => {
                self.visit_expr(left)?;
                self.visit_expr(right)?;
            }
            ExprKind::Hook {
                cond,
                then_expr,
                else_expr,
            } => {
                self.visit_expr(cond)?;
                self.visit_expr(then_expr)?;
                self.visit_expr(else_expr)?;
            }
        }
        Ok(())
    }

    fn visit_exprs(&mut self, exprs: &'p [Expr]) -> Result<()> {
        exprs.iter().try_for_each(|expr| self.visit_expr(expr))
    }

    fn emit(&mut self, action: Action<'p>) {
        self.graph.add_action(self.scope, action);
    }

    fn declare_once(&mut self, name: &str) -> Result<()> {
        if self.graph.own_slot(self.scope, name).is_none() {
            self.graph.declare_slot(self.scope, name)?;
        }
        Ok(())
    }

    fn function_name(&self, decl: FunctionId) -> Result<Option<&'p str>> {
        let registry = self.registry;
        let decl = registry
            .function(decl)
            .ok_or(TightenError::UnknownFunction(decl))?;
        Ok(decl.name.as_deref())
    }
}

/// Lexical walk over a body and every function nested in it
struct ImplicitGlobals<'g, 'p> {
    registry: &'p dyn TypeRegistry,
    graph: &'g mut ScopeGraph<'p>,
    global: ScopeId,
    /// Names bound by each enclosing function body, innermost last
    bound: Vec<HashSet<&'p str>>,
    visited: HashSet<FunctionId>,
}

impl<'g, 'p> ImplicitGlobals<'g, 'p> {
    fn stmts(&mut self, stmts: &'p [Stmt]) -> Result<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &'p Stmt) -> Result<()> {
        match stmt {
            Stmt::Var { init, .. } => {
                if let Some(init) = init {
                    self.expr(init)?;
                }
            }
            Stmt::Function(decl) => self.function(*decl)?,
            Stmt::Expr(expr) => self.expr(expr)?,
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond)?;
                self.stmts(then_branch)?;
                self.stmts(else_branch)?;
            }
            Stmt::While { cond, body } => {
                self.expr(cond)?;
                self.stmts(body)?;
            }
            Stmt::Block(body) => self.stmts(body)?,
        }
        Ok(())
    }

    fn expr(&mut self, expr: &'p Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::This | ExprKind::Literal => {}
            ExprKind::Function(decl) => self.function(*decl)?,
            ExprKind::Assign { target, value } => {
                self.expr(value)?;
                match &target.kind {
                    ExprKind::Name(name) => self.assigned(name)?,
                    _ => self.expr(target)?,
                }
            }
            ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
                self.expr(callee)?;
                self.exprs(args)?;
            }
            ExprKind::ObjectLit(properties) => {
                for init in properties {
                    self.expr(&init.value)?;
                }
            }
            ExprKind::ArrayLit(exprs) | ExprKind::Comma(exprs) | ExprKind::Unknown(exprs) => self.exprs(exprs)?,
            ExprKind::GetProp { receiver, .. } => self.expr(receiver)?,
            ExprKind::GetElem { receiver, index } => {
                self.expr(receiver)?;
                self.expr(index)?;
            }
            ExprKind::And(left, right) | ExprKind::Or(left, right) => {
                self.expr(left)?;
                self.expr(right)?;
            }
            ExprKind::Hook {
                cond,
                then_expr,
                else_expr,
            } => {
                self.expr(cond)?;
                self.expr(then_expr)?;
                self.expr(else_expr)?;
            }
        }
        Ok(())
    }

    fn exprs(&mut self, exprs: &'p [Expr]) -> Result<()> {
        exprs.iter().try_for_each(|expr| self.expr(expr))
    }

    fn function(&mut self, decl: FunctionId) -> Result<()> {
        if !self.visited.insert(decl) {
            return Ok(());
        }
        let registry = self.registry;
        let declaration = registry.function(decl).ok_or(TightenError::UnknownFunction(decl))?;
        let Some(body) = &declaration.body else {
            return Ok(());
        };

        let mut names: HashSet<&'p str> = declaration.params.iter().map(String::as_str).collect();
        self.hoisted(body, &mut names)?;
        self.bound.push(names);
        let result = self.stmts(body);
        self.bound.pop();
        result
    }

    /// Same names [`ActionCollector::hoist`] declares in a body scope
    fn hoisted(&self, body: &'p [Stmt], names: &mut HashSet<&'p str>) -> Result<()> {
        for stmt in body {
            match stmt {
                Stmt::Var { name, .. } => {
                    names.insert(name);
                }
                Stmt::Function(decl) => {
                    let registry = self.registry;
                    let declaration = registry.function(*decl).ok_or(TightenError::UnknownFunction(*decl))?;
                    if let Some(name) = declaration.name.as_deref() {
                        names.insert(name);
                    }
                }
                Stmt::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.hoisted(then_branch, names)?;
                    self.hoisted(else_branch, names)?;
                }
                Stmt::While { body, .. } | Stmt::Block(body) => self.hoisted(body, names)?,
                Stmt::Expr(_) | Stmt::Return(_) => {}
            }
        }
        Ok(())
    }

    fn assigned(&mut self, name: &str) -> Result<()> {
        if self.bound.iter().any(|names| names.contains(name)) || self.graph.own_slot(self.global, name).is_some() {
            return Ok(());
        }
        self.graph.declare_slot(self.global, name)?;
        Ok(())
    }
}

impl<'p> TightenTypes<'p> {
    /// Evaluate one action against the current slot types of `scope`
    pub(crate) fn evaluate(&mut self, scope: ScopeId, action: Action<'p>) -> Result<Assignments> {
        let mut out = Assignments::new();
        match action {
            Action::VariableAssign { slot, value } | Action::Return { slot, value } => {
                let ty = self.infer_concrete_type(scope, value)?;
                out.push(Assignment::new(slot, ty));
            }
            Action::PropertyAssign {
                receiver,
                property,
                value,
            } => {
                let receiver = self.infer_concrete_type(scope, receiver)?;
                let ty = self.infer_concrete_type(scope, value)?;
                if ty.is_none() {
                    return Ok(out);
                }
                for slot in self.property_slots(&receiver, property)? {
                    out.push(Assignment::new(slot, ty.clone()));
                }
            }
            Action::Call { callee, args } => self.bind_call(scope, callee, args, &mut out)?,
            Action::Allocation { callee, args } => self.bind_allocation(scope, callee, args, &mut out)?,
            Action::LiteralAllocation { literal } => {
                let ty = self.infer_concrete_type(scope, literal)?;
                for instance in ty.instances() {
                    self.record_allocation(instance);
                }
            }
            Action::DeclareFunction { slot, decl } => {
                let function = self.create_concrete_function(decl, scope)?;
                out.push(Assignment::new(slot, ConcreteType::Function(function)));
            }
            Action::DeclaredFlow { slot, declared } => {
                let ty = self.create_type(declared)?;
                out.push(Assignment::new(slot, ty));
            }
        }
        Ok(out)
    }
}
