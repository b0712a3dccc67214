//! Aliases for the map and set types used throughout the crate.
//!
//! Learning must be deterministic: the sequence of membership queries is
//! required to be a pure function of the counterexamples the oracle hands
//! out. All iteration therefore goes through insertion-ordered or
//! key-ordered collections.

/// An insertion-ordered map.
pub type Map<K, V> = indexmap::IndexMap<K, V>;

/// An insertion-ordered set.
pub type Set<S> = indexmap::IndexSet<S>;

/// A map ordered by its keys.
pub type OrderedMap<K, V> = std::collections::BTreeMap<K, V>;
