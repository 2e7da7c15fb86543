//! Property-based tests for cache eviction and static attribute matching.
//!
//! These tests use proptest to drive caches with random operation sequences
//! and verify that the eviction invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::cache::{AccessOrderedCache, Cache};
    use crate::policy::StaticAttributes;
    use crate::tree::{NodeId, Tree};
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Add(usize),
        Touch(usize),
        Remove(usize),
    }

    fn op(count: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..count).prop_map(Op::Add),
            (0..count).prop_map(Op::Touch),
            (0..count).prop_map(Op::Remove),
        ]
    }

    /// Two levels of clean references: `groups` parents with `per_group`
    /// children each, under a plain root. Returns parents then children.
    fn forest(groups: usize, per_group: usize) -> (Tree, Vec<NodeId>) {
        let mut tree = Tree::new();
        let root = tree.create("root");
        let mut parents = Vec::new();
        let mut children = Vec::new();
        for g in 0..groups {
            let parent = tree.create_reference(&format!("p{}", g), None, false);
            tree.insert_child(root, parent, None).unwrap();
            for c in 0..per_group {
                let child = tree.create_reference(&format!("c{}", c), None, false);
                tree.insert_child(parent, child, None).unwrap();
                children.push(child);
            }
            parents.push(parent);
        }
        parents.extend(children);
        (tree, parents)
    }

    fn run(cache: &mut AccessOrderedCache, tree: &Tree, refs: &[NodeId], ops: &[Op]) -> Vec<NodeId> {
        let mut victims = Vec::new();
        for op in ops {
            match *op {
                Op::Add(i) => victims.extend(cache.add(tree, refs[i])),
                Op::Touch(i) => cache.touch(refs[i]),
                Op::Remove(i) => victims.extend(cache.remove(tree, refs[i])),
            }
        }
        victims
    }

    // ============================================================================
    // AccessOrderedCache property tests
    // ============================================================================

    proptest! {
        /// Property: without pinning or observers the capacity is a hard bound
        #[test]
        fn flat_cache_never_exceeds_capacity(
            capacity in 1usize..6,
            ops in prop::collection::vec(op(8), 0..64),
        ) {
            let (tree, refs) = forest(8, 0);
            let mut cache = AccessOrderedCache::new(capacity);
            for op in &ops {
                run(&mut cache, &tree, &refs, std::slice::from_ref(op));
                prop_assert!(cache.size().unwrap() <= capacity);
            }
        }

        /// Property: an entry is never listed twice
        #[test]
        fn entries_are_unique(
            capacity in 0usize..6,
            ops in prop::collection::vec(op(12), 0..64),
        ) {
            let (tree, refs) = forest(3, 3);
            let mut cache = AccessOrderedCache::new(capacity);
            run(&mut cache, &tree, &refs, &ops);
            let mut seen = cache.entries().to_vec();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), cache.entries().len());
        }

        /// Property: no evictable entry is an ancestor of another one
        #[test]
        fn resident_descendants_pin_ancestors(
            capacity in 0usize..6,
            ops in prop::collection::vec(op(12), 0..64),
        ) {
            let (tree, refs) = forest(3, 3);
            let mut cache = AccessOrderedCache::new(capacity);
            run(&mut cache, &tree, &refs, &ops);
            for a in cache.entries() {
                for b in cache.entries() {
                    prop_assert!(!tree.is_ancestor(*a, *b).unwrap(), "{} pins {}", b, a);
                }
            }
        }

        /// Property: victims are no longer evictable
        #[test]
        fn victims_leave_the_cache(
            capacity in 1usize..4,
            ops in prop::collection::vec(op(6), 0..32),
        ) {
            let (tree, refs) = forest(6, 0);
            let mut cache = AccessOrderedCache::new(capacity);
            for op in &ops {
                for victim in run(&mut cache, &tree, &refs, std::slice::from_ref(op)) {
                    prop_assert!(!cache.contains(victim));
                }
            }
        }

        /// Property: touching never changes membership
        #[test]
        fn touch_preserves_membership(
            adds in prop::collection::vec(0usize..6, 0..12),
            touched in 0usize..6,
        ) {
            let (tree, refs) = forest(6, 0);
            let mut cache = AccessOrderedCache::new(0);
            for i in &adds {
                cache.add(&tree, refs[*i]);
            }
            let mut before = cache.entries().to_vec();
            cache.touch(refs[touched]);
            let mut after = cache.entries().to_vec();
            before.sort();
            after.sort();
            prop_assert_eq!(before, after);
        }
    }

    // ============================================================================
    // StaticAttributes property tests
    // ============================================================================

    proptest! {
        /// Property: the catch-all matches every name and the value
        #[test]
        fn wildcard_matches_everything(name in "[a-z][a-z0-9:_-]{0,12}") {
            let statics = StaticAttributes::parse("*");
            prop_assert!(statics.matches(Some(&name)));
            prop_assert!(statics.matches(None));
        }

        /// Property: an exact pattern matches only itself
        #[test]
        fn exact_matches_only_itself(
            pattern in "[a-z]{1,8}",
            name in "[a-z]{1,8}",
        ) {
            let statics = StaticAttributes::parse(&pattern);
            prop_assert_eq!(statics.matches(Some(&name)), pattern == name);
            prop_assert!(!statics.matches(None));
        }

        /// Property: a namespace pattern matches exactly the prefixed names
        #[test]
        fn namespace_matches_prefixed_names(
            prefix in "[a-z]{1,4}",
            local in "[a-z]{1,8}",
            other in "[a-z]{1,4}",
        ) {
            let statics = StaticAttributes::parse(&format!("{}:*", prefix));
            let prefixed = format!("{}:{}", prefix, local);
            let elsewhere = format!("{}:{}", other, local);
            prop_assert!(statics.matches(Some(&prefixed)));
            prop_assert_eq!(statics.matches(Some(&elsewhere)), prefix == other);
        }
    }
}
