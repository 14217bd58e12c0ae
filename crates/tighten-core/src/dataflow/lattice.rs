//! Concrete-type lattice
//!
//! Elements are sets of runtime entities a value may evaluate to:
//! - `None` (⊥) = no value observed yet
//! - `All` (⊤) = any value at all
//! - `Function` / `Instance` = a single canonical function or object shape
//! - `Union` = two or more distinct singletons
//!
//! Singletons are arena ids handed out by the analysis context, so equality is
//! identity of the underlying declaration.

use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// Index of a canonical concrete function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcreteFunctionId(pub u32);

impl ConcreteFunctionId {
    /// Position in the owning table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a canonical concrete instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcreteInstanceId(pub u32);

impl ConcreteInstanceId {
    /// Position in the owning table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single member of a concrete type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Singleton {
    /// A canonical function value
    Function(ConcreteFunctionId),
    /// A canonical object
    Instance(ConcreteInstanceId),
}

impl From<Singleton> for ConcreteType {
    fn from(singleton: Singleton) -> Self {
        match singleton {
            Singleton::Function(id) => ConcreteType::Function(id),
            Singleton::Instance(id) => ConcreteType::Instance(id),
        }
    }
}

/// Singletons of a concrete type in canonical order
pub type Members = SmallVec<[Singleton; 4]>;

/// Set of runtime entities a value may evaluate to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ConcreteType {
    /// No value observed yet
    #[default]
    None,
    /// Any value at all
    All,
    Function(ConcreteFunctionId),
    Instance(ConcreteInstanceId),
    /// Sorted, deduplicated, at least two members
    Union(Rc<[Singleton]>),
}

impl ConcreteType {
    /// Canonical type holding exactly the given singletons
    pub fn from_members<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Singleton>,
    {
        let mut members: Members = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        match members.len() {
            0 => ConcreteType::None,
            1 => members[0].into(),
            _ => ConcreteType::Union(Rc::from(members.as_slice())),
        }
    }

    /// Bottom: no value observed
    pub fn is_none(&self) -> bool {
        matches!(self, ConcreteType::None)
    }

    /// Top: any value
    pub fn is_all(&self) -> bool {
        matches!(self, ConcreteType::All)
    }

    /// Exactly one function
    pub fn is_function(&self) -> bool {
        matches!(self, ConcreteType::Function(_))
    }

    /// Exactly one instance
    pub fn is_instance(&self) -> bool {
        matches!(self, ConcreteType::Instance(_))
    }

    /// Two or more members
    pub fn is_union(&self) -> bool {
        matches!(self, ConcreteType::Union(_))
    }

    /// Flattened singleton members. Empty for `None` and `All`.
    pub fn members(&self) -> Members {
        match self {
            ConcreteType::None | ConcreteType::All => Members::new(),
            ConcreteType::Function(id) => smallvec::smallvec![Singleton::Function(*id)],
            ConcreteType::Instance(id) => smallvec::smallvec![Singleton::Instance(*id)],
            ConcreteType::Union(members) => members.iter().copied().collect(),
        }
    }

    /// Function members; empty for `All`
    pub fn functions(&self) -> SmallVec<[ConcreteFunctionId; 4]> {
        self.members()
            .into_iter()
            .filter_map(|member| match member {
                Singleton::Function(id) => Some(id),
                Singleton::Instance(_) => None,
            })
            .collect()
    }

    /// Instance members; empty for `All`
    pub fn instances(&self) -> SmallVec<[ConcreteInstanceId; 4]> {
        self.members()
            .into_iter()
            .filter_map(|member| match member {
                Singleton::Instance(id) => Some(id),
                Singleton::Function(_) => None,
            })
            .collect()
    }

    /// Least upper bound
    pub fn union_with(&self, other: &ConcreteType) -> ConcreteType {
        match (self, other) {
            (ConcreteType::All, _) | (_, ConcreteType::All) => ConcreteType::All,
            (ConcreteType::None, t) | (t, ConcreteType::None) => t.clone(),
            (a, b) if a == b => a.clone(),
            (a, b) => ConcreteType::from_members(a.members().into_iter().chain(b.members())),
        }
    }

    /// Greatest lower bound
    pub fn intersect_with(&self, other: &ConcreteType) -> ConcreteType {
        match (self, other) {
            (ConcreteType::All, t) | (t, ConcreteType::All) => t.clone(),
            (ConcreteType::None, _) | (_, ConcreteType::None) => ConcreteType::None,
            (a, b) if a == b => a.clone(),
            (a, b) => {
                let theirs = b.members();
                ConcreteType::from_members(a.members().into_iter().filter(|m| theirs.contains(m)))
            }
        }
    }

    /// Lattice order: `self ⊑ other`
    pub fn is_subset_of(&self, other: &ConcreteType) -> bool {
        match (self, other) {
            (ConcreteType::None, _) | (_, ConcreteType::All) => true,
            (ConcreteType::All, _) => false,
            (a, b) => {
                let theirs = b.members();
                a.members().iter().all(|m| theirs.contains(m))
            }
        }
    }

    /// Keep the members accepted by `keep`. `All` has no enumerable members and
    /// passes through unchanged.
    pub fn filter<F>(&self, mut keep: F) -> ConcreteType
    where
        F: FnMut(Singleton) -> bool,
    {
        match self {
            ConcreteType::All => ConcreteType::All,
            other => ConcreteType::from_members(other.members().into_iter().filter(|m| keep(*m))),
        }
    }
}

impl fmt::Display for Singleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Singleton::Function(id) => write!(f, "function#{}", id.0),
            Singleton::Instance(id) => write!(f, "instance#{}", id.0),
        }
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::None => write!(f, "NONE"),
            ConcreteType::All => write!(f, "ALL"),
            ConcreteType::Function(id) => Singleton::Function(*id).fmt(f),
            ConcreteType::Instance(id) => Singleton::Instance(*id).fmt(f),
            ConcreteType::Union(members) => {
                write!(f, "(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    member.fmt(f)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(n: u32) -> ConcreteType {
        ConcreteType::Function(ConcreteFunctionId(n))
    }

    fn inst(n: u32) -> ConcreteType {
        ConcreteType::Instance(ConcreteInstanceId(n))
    }

    #[test]
    fn test_union_identity_and_absorber() {
        assert_eq!(ConcreteType::None.union_with(&func(0)), func(0));
        assert_eq!(inst(1).union_with(&ConcreteType::None), inst(1));
        assert_eq!(func(0).union_with(&ConcreteType::All), ConcreteType::All);
    }

    #[test]
    fn test_union_of_distinct_singletons() {
        let union = inst(2).union_with(&func(1));
        assert!(union.is_union());
        assert_eq!(union.members().len(), 2);
        assert_eq!(union, func(1).union_with(&inst(2)));
    }

    #[test]
    fn test_union_flattens_nested_unions() {
        let ab = inst(0).union_with(&inst(1));
        let bc = inst(1).union_with(&inst(2));
        let abc = ab.union_with(&bc);
        assert_eq!(abc.instances().as_slice(), &[ConcreteInstanceId(0), ConcreteInstanceId(1), ConcreteInstanceId(2)]);
    }

    #[test]
    fn test_intersect_collapses_to_singleton() {
        let ab = inst(0).union_with(&inst(1));
        let bc = inst(1).union_with(&inst(2));
        assert_eq!(ab.intersect_with(&bc), inst(1));
        assert_eq!(inst(0).intersect_with(&inst(1)), ConcreteType::None);
        assert_eq!(ab.intersect_with(&ConcreteType::All), ab);
        assert_eq!(ab.intersect_with(&ConcreteType::None), ConcreteType::None);
    }

    #[test]
    fn test_from_members_canonicalizes() {
        assert_eq!(ConcreteType::from_members([]), ConcreteType::None);
        let single = ConcreteType::from_members([Singleton::Function(ConcreteFunctionId(3)); 3]);
        assert_eq!(single, func(3));
    }

    #[test]
    fn test_accessors_on_non_matching_variants() {
        assert!(func(0).instances().is_empty());
        assert!(ConcreteType::All.functions().is_empty());
        assert!(ConcreteType::None.members().is_empty());
    }

    #[test]
    fn test_subset_order() {
        let ab = inst(0).union_with(&inst(1));
        assert!(inst(0).is_subset_of(&ab));
        assert!(!ab.is_subset_of(&inst(0)));
        assert!(ConcreteType::None.is_subset_of(&inst(0)));
        assert!(ab.is_subset_of(&ConcreteType::All));
        assert!(!ConcreteType::All.is_subset_of(&ab));
    }

    #[test]
    fn test_filter_keeps_all() {
        let mixed = func(0).union_with(&inst(0));
        assert_eq!(mixed.filter(|m| matches!(m, Singleton::Instance(_))), inst(0));
        assert_eq!(ConcreteType::All.filter(|_| false), ConcreteType::All);
    }

    #[test]
    fn test_display() {
        assert_eq!(func(1).union_with(&inst(0)).to_string(), "(function#1, instance#0)");
        assert_eq!(ConcreteType::All.to_string(), "ALL");
    }
}
