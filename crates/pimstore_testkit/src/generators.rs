//! Property-based test generators using proptest.
//!
//! Provides strategies for selectors and collection trees that respect the
//! protocol's rules: ids are 1-based and names are non-empty.

use pimstore_protocol::{Id, Interval, RangeSet};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for valid entity ids.
pub fn id_strategy() -> impl Strategy<Value = Id> {
    1..=500u64
}

/// Strategy for sets of ids.
pub fn id_set_strategy() -> impl Strategy<Value = BTreeSet<Id>> {
    prop::collection::btree_set(id_strategy(), 1..40)
}

/// Strategy for bounded intervals.
pub fn interval_strategy() -> impl Strategy<Value = Interval> {
    (id_strategy(), 0..20u64).prop_map(|(begin, len)| Interval::new(begin, begin + len))
}

/// Strategy for range sets, optionally ending with an open interval.
pub fn range_set_strategy() -> impl Strategy<Value = RangeSet> {
    (
        prop::collection::vec(interval_strategy(), 1..6),
        prop::option::of(id_strategy()),
    )
        .prop_map(|(intervals, open)| {
            let mut set = RangeSet::new();
            for interval in intervals {
                set.add_interval(interval);
            }
            if let Some(begin) = open {
                set.add_interval(Interval::open(begin));
            }
            set
        })
}

/// Strategy for collection and resource names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_ ]{0,15}").expect("Invalid regex")
}

/// Strategy for flag sets.
pub fn flag_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(
        prop::sample::select(vec!["\\SEEN", "\\FLAGGED", "\\ANSWERED", "\\DELETED", "$TODO"])
            .prop_map(str::to_string),
        0..5,
    )
}

/// Strategy for collection tree shapes.
///
/// Entry `i` is the index of the parent of node `i`, always less than `i`,
/// or `None` for a top-level collection.
pub fn tree_shape_strategy() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(any::<prop::sample::Index>(), 1..15).prop_map(|picks| {
        picks
            .iter()
            .enumerate()
            .map(|(i, pick)| {
                // One slot past the existing nodes stands for the root.
                let choice = pick.index(i + 1);
                (choice < i).then_some(choice)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn range_sets_survive_the_wire(set in range_set_strategy()) {
            let decoded = RangeSet::parse(&set.encode()).unwrap();
            prop_assert_eq!(decoded, set);
        }

        #[test]
        fn tree_parents_come_first(shape in tree_shape_strategy()) {
            for (i, parent) in shape.iter().enumerate() {
                if let Some(p) = parent {
                    prop_assert!(*p < i);
                }
            }
        }

        #[test]
        fn id_sets_are_covered_exactly(ids in id_set_strategy()) {
            let set = RangeSet::from_ids(ids.iter().copied());
            prop_assert_eq!(set.to_ids().unwrap(), ids);
        }
    }
}
