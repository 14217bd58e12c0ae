//! Scope/slot arena
//!
//! Scopes mirror program nesting: the global scope, one body scope per concrete
//! function, and one property scope per concrete instance or function. Every scope
//! and slot lives in [`ScopeGraph`] and is addressed by index; parent links are
//! plain ids, so the graph never owns a cycle.

use super::actions::Action;
use super::lattice::ConcreteType;
use crate::error::{Result, TightenError};
use crate::hir::{FunctionId, ShapeId};
use indexmap::IndexMap;

/// Slot holding the function value itself inside its body scope
pub const CALLEE_SLOT: &str = ":callee";
/// Slot holding the receiver bound by calls and allocations
pub const THIS_SLOT: &str = ":this";
/// Slot collecting every returned value
pub const RETURN_SLOT: &str = ":return";

/// Index of a scope in [`ScopeGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// Position in the arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a slot in [`ScopeGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Position in the arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a scope belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Top-level program scope
    Global,
    /// Body scope of a function declaration
    Function(FunctionId),
    /// Static properties of a function value
    FunctionProperties(FunctionId),
    /// Property namespace of an object shape
    Instance(ShapeId),
}

/// Named slots plus the actions replayed for this scope
#[derive(Debug)]
pub struct Scope<'p> {
    /// What the scope belongs to
    pub kind: ScopeKind,
    /// Lexical parent, or the prototype's property scope for instances
    pub parent: Option<ScopeId>,
    slots: IndexMap<String, SlotId>,
    params: Vec<SlotId>,
    actions: Vec<Action<'p>>,
}

impl<'p> Scope<'p> {
    /// Own slots in declaration order
    pub fn slots(&self) -> impl Iterator<Item = (&str, SlotId)> + '_ {
        self.slots.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Formal parameter slots in declaration order
    pub fn params(&self) -> &[SlotId] {
        &self.params
    }

    /// Actions extracted for this scope
    pub fn actions(&self) -> &[Action<'p>] {
        &self.actions
    }
}

/// A named cell whose type only grows
#[derive(Debug, Clone)]
pub struct Slot {
    /// Name the slot is declared under
    pub name: String,
    /// Scope declaring the slot
    pub scope: ScopeId,
    ty: ConcreteType,
}

impl Slot {
    /// Current type
    pub fn ty(&self) -> &ConcreteType {
        &self.ty
    }
}

/// Arena owning every scope and slot of an analysis
#[derive(Debug, Default)]
pub struct ScopeGraph<'p> {
    scopes: Vec<Scope<'p>>,
    slots: Vec<Slot>,
}

impl<'p> ScopeGraph<'p> {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty scope
    pub fn new_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            parent,
            slots: IndexMap::new(),
            params: Vec::new(),
            actions: Vec::new(),
        });
        id
    }

    /// Declare `name` in `scope`. A second declaration of the same name is a defect.
    pub fn declare_slot(&mut self, scope: ScopeId, name: &str) -> Result<SlotId> {
        if self.scopes[scope.index()].slots.contains_key(name) {
            return Err(TightenError::DuplicateSlot {
                name: name.to_string(),
                scope,
            });
        }
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(Slot {
            name: name.to_string(),
            scope,
            ty: ConcreteType::None,
        });
        self.scopes[scope.index()].slots.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare a formal parameter; parameters keep declaration order
    pub fn declare_param(&mut self, scope: ScopeId, name: &str) -> Result<SlotId> {
        let id = self.declare_slot(scope, name)?;
        self.scopes[scope.index()].params.push(id);
        Ok(id)
    }

    /// Slot `name` declared directly in `scope`
    pub fn own_slot(&self, scope: ScopeId, name: &str) -> Option<SlotId> {
        self.scopes[scope.index()].slots.get(name).copied()
    }

    /// Resolve `name` in `scope`, falling back through parent scopes
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SlotId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(slot) = self.own_slot(id, name) {
                return Some(slot);
            }
            current = self.scopes[id.index()].parent;
        }
        None
    }

    /// Union `ty` into the slot. Returns whether the slot grew.
    pub fn union_into(&mut self, slot: SlotId, ty: &ConcreteType) -> bool {
        let cell = &mut self.slots[slot.index()];
        let joined = cell.ty.union_with(ty);
        if joined == cell.ty {
            return false;
        }
        cell.ty = joined;
        true
    }

    /// Register an action to replay for `scope`
    pub fn add_action(&mut self, scope: ScopeId, action: Action<'p>) {
        self.scopes[scope.index()].actions.push(action);
    }

    /// Action `index` of `scope`, copied out so the graph can be mutated while evaluating
    pub fn action(&self, scope: ScopeId, index: usize) -> Option<Action<'p>> {
        self.scopes[scope.index()].actions.get(index).copied()
    }

    /// Scope with id `id`
    pub fn scope(&self, id: ScopeId) -> &Scope<'p> {
        &self.scopes[id.index()]
    }

    /// Slot receiving `ty`
    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    /// Current type of slot `id`
    pub fn slot_type(&self, id: SlotId) -> &ConcreteType {
        &self.slots[id.index()].ty
    }

    /// Formal parameter slots of `scope`
    pub fn params(&self, scope: ScopeId) -> &[SlotId] {
        &self.scopes[scope.index()].params
    }

    /// Every scope in creation order
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope<'p>)> + '_ {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, scope)| (ScopeId(i as u32), scope))
    }

    /// Every slot in creation order
    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &Slot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (SlotId(i as u32), slot))
    }

    /// Number of scopes
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
