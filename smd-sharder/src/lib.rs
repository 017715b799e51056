//! Deterministic `stable_hash(namespace) mod N` shard assignment.
//!
//! The hash must be stable across client and server, so this crate fixes
//! both the hash family (`SipHash-1-3`, via `siphasher`) and a constant
//! seed — changing either would silently re-route every namespace.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// The fixed keys `stable_hash` seeds its hasher with. Any two builds of
/// this crate must agree on these for a namespace to route identically.
const HASH_KEY_0: u64 = 0x736d645f7368726b; // "smd_shrk"
const HASH_KEY_1: u64 = 0x6861726465725f31; // "harder_1"

/// Hash `namespace` with the fixed SipHash-1-3 key this crate commits to.
///
/// Exposed separately from [`shard_for`] so callers (and tests) can compare
/// the raw hash across processes without re-deriving the modulus.
pub fn stable_hash(namespace: &str) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(HASH_KEY_0, HASH_KEY_1);
    hasher.write(namespace.as_bytes());
    hasher.finish()
}

/// The zero-based shard index `namespace` is authoritative on, out of
/// `shard_count` total shards.
///
/// # Panics
///
/// Panics if `shard_count` is `0` — there is no valid assignment to make.
pub fn shard_for(namespace: &str, shard_count: usize) -> usize {
    assert!(shard_count > 0, "shard_count must be nonzero");
    (stable_hash(namespace) % shard_count as u64) as usize
}

/// A fixed-size shard topology: just the count `N`, plus the lookup this
/// crate provides. Kept as a small value type so the dispatch engine can
/// thread a single topology handle through without repeating `shard_count`
/// everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    shard_count: usize,
}

impl Topology {
    /// A topology of `shard_count` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is `0`.
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count > 0, "shard_count must be nonzero");
        Self { shard_count }
    }

    /// Total number of shards.
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// The shard `namespace` is authoritative on.
    pub fn shard_for(&self, namespace: &str) -> usize {
        shard_for(namespace, self.shard_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_namespace_always_hashes_to_the_same_shard() {
        let topology = Topology::new(16);
        let a = topology.shard_for("__t_smd__");
        let b = topology.shard_for("__t_smd__");
        assert_eq!(a, b);
    }

    #[test]
    fn shard_index_is_always_in_range() {
        let topology = Topology::new(7);
        for ns in ["a", "b", "ns-with-dashes", "__t_smd__", ""] {
            assert!(topology.shard_for(ns) < 7);
        }
    }

    #[test]
    #[should_panic(expected = "shard_count must be nonzero")]
    fn zero_shards_panics() {
        Topology::new(0);
    }

    #[test]
    fn different_namespaces_are_not_trivially_all_the_same_shard() {
        let topology = Topology::new(4);
        let shards: std::collections::HashSet<_> = (0..64)
            .map(|i| topology.shard_for(&format!("ns-{i}")))
            .collect();
        assert!(shards.len() > 1, "expected spread across shards, got {shards:?}");
    }

    proptest::proptest! {
        #[test]
        fn hash_is_deterministic(s in ".*") {
            proptest::prop_assert_eq!(stable_hash(&s), stable_hash(&s));
        }

        #[test]
        fn shard_for_is_always_in_range(s in ".*", n in 1usize..64) {
            proptest::prop_assert!(shard_for(&s, n) < n);
        }
    }
}
