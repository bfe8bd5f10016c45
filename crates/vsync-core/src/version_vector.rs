//! Version vectors: the only causality oracle in the system.
//!
//! A vector maps replica IDs to counters. A missing key means zero and is
//! never stored. All operations take `&self` and return a fresh vector.

use crate::replica_id::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// A counter is already at its maximum and cannot be advanced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("version vector counter for \"{0}\" is exhausted")]
pub struct CounterOverflow(pub ReplicaId);

/// Map from replica ID to counter, ordered by ID so that serialization is
/// deterministic.
///
/// Deserialization is the validation step: keys must be valid [`ReplicaId`]s
/// and counters non-negative integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<ReplicaId, u64>);

impl VersionVector {
    /// The empty vector, as created by `init`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `id`, zero when absent.
    pub fn get(&self, id: &ReplicaId) -> u64 {
        self.0.get(id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.0.iter().map(|(id, counter)| (id, *counter))
    }

    /// Return a copy with `id`'s counter incremented (or set to 1 if absent).
    ///
    /// Fails instead of wrapping when the counter is `u64::MAX`.
    pub fn advance(&self, id: &ReplicaId) -> Result<Self, CounterOverflow> {
        let next = self
            .get(id)
            .checked_add(1)
            .ok_or_else(|| CounterOverflow(id.clone()))?;
        let mut counters = self.0.clone();
        counters.insert(id.clone(), next);
        Ok(Self(counters))
    }

    /// `self ⊑ other`: every key of `self` is in `other` with a counter at
    /// least as large.
    pub fn leq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .all(|(id, counter)| other.0.get(id).is_some_and(|theirs| counter <= theirs))
    }

    /// Strict variant of [`leq`](Self::leq).
    pub fn less(&self, other: &Self) -> bool {
        self != other && self.leq(other)
    }

    /// Key-wise maximum over the union of both key sets.
    pub fn join(&self, other: &Self) -> Self {
        let mut counters = self.0.clone();
        for (id, theirs) in &other.0 {
            counters
                .entry(id.clone())
                .and_modify(|ours| *ours = (*ours).max(*theirs))
                .or_insert(*theirs);
        }
        Self(counters)
    }
}

impl<const N: usize> From<[(ReplicaId, u64); N]> for VersionVector {
    fn from(entries: [(ReplicaId, u64); N]) -> Self {
        Self(entries.into_iter().collect())
    }
}

impl FromIterator<(ReplicaId, u64)> for VersionVector {
    fn from_iter<I: IntoIterator<Item = (ReplicaId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for VersionVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, counter)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", id, counter)?;
        }
        f.write_str("}")
    }
}
