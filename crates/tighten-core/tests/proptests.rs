use proptest::prelude::*;
use tighten_core::dataflow::{ConcreteFunctionId, ConcreteInstanceId, ConcreteType, Singleton};

fn arb_singleton() -> impl Strategy<Value = Singleton> {
    prop_oneof![
        (0u32..6).prop_map(|id| Singleton::Function(ConcreteFunctionId(id))),
        (0u32..6).prop_map(|id| Singleton::Instance(ConcreteInstanceId(id))),
    ]
}

fn arb_type() -> impl Strategy<Value = ConcreteType> {
    prop_oneof![
        1 => Just(ConcreteType::None),
        1 => Just(ConcreteType::All),
        6 => prop::collection::vec(arb_singleton(), 0..6).prop_map(ConcreteType::from_members),
    ]
}

fn is_canonical(ty: &ConcreteType) -> bool {
    match ty {
        ConcreteType::Union(members) => members.len() >= 2 && members.windows(2).all(|pair| pair[0] < pair[1]),
        _ => true,
    }
}

proptest! {
    #[test]
    fn union_is_commutative(a in arb_type(), b in arb_type()) {
        prop_assert_eq!(a.union_with(&b), b.union_with(&a));
    }

    #[test]
    fn union_is_associative(a in arb_type(), b in arb_type(), c in arb_type()) {
        prop_assert_eq!(a.union_with(&b).union_with(&c), a.union_with(&b.union_with(&c)));
    }

    #[test]
    fn union_identity_and_absorber(a in arb_type()) {
        prop_assert_eq!(a.union_with(&ConcreteType::None), a.clone());
        prop_assert_eq!(a.union_with(&ConcreteType::All), ConcreteType::All);
        prop_assert_eq!(a.union_with(&a), a);
    }

    #[test]
    fn intersection_is_commutative(a in arb_type(), b in arb_type()) {
        prop_assert_eq!(a.intersect_with(&b), b.intersect_with(&a));
    }

    #[test]
    fn intersection_is_associative(a in arb_type(), b in arb_type(), c in arb_type()) {
        prop_assert_eq!(
            a.intersect_with(&b).intersect_with(&c),
            a.intersect_with(&b.intersect_with(&c))
        );
    }

    #[test]
    fn intersection_identity_and_absorber(a in arb_type()) {
        prop_assert_eq!(a.intersect_with(&ConcreteType::All), a.clone());
        prop_assert_eq!(a.intersect_with(&ConcreteType::None), ConcreteType::None);
        prop_assert_eq!(a.intersect_with(&a), a);
    }

    #[test]
    fn results_stay_canonical(a in arb_type(), b in arb_type()) {
        prop_assert!(is_canonical(&a.union_with(&b)));
        prop_assert!(is_canonical(&a.intersect_with(&b)));
    }

    #[test]
    fn union_is_an_upper_bound(a in arb_type(), b in arb_type()) {
        let joined = a.union_with(&b);
        prop_assert!(a.is_subset_of(&joined));
        prop_assert!(b.is_subset_of(&joined));
    }

    #[test]
    fn intersection_is_a_lower_bound(a in arb_type(), b in arb_type()) {
        let met = a.intersect_with(&b);
        prop_assert!(met.is_subset_of(&a));
        prop_assert!(met.is_subset_of(&b));
    }

    #[test]
    fn subset_agrees_with_union(a in arb_type(), b in arb_type()) {
        prop_assert_eq!(a.is_subset_of(&b), a.union_with(&b) == b);
    }

    #[test]
    fn member_order_does_not_matter(mut members in prop::collection::vec(arb_singleton(), 0..8)) {
        let forward = ConcreteType::from_members(members.clone());
        members.reverse();
        prop_assert_eq!(forward, ConcreteType::from_members(members));
    }
}
