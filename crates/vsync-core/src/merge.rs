//! Two-replica merge decision.
//!
//! Given each side's current vector and tree, decide which state both
//! replicas converge to, or refuse because neither side dominates.

use crate::hash_tree::HashTree;
use crate::replica_id::ReplicaId;
use crate::version_vector::VersionVector;

use std::fmt;
use thiserror::Error;

/// Which of the two replicas in a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// One replica's contribution to the decision.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub id: &'a ReplicaId,
    pub version_vector: &'a VersionVector,
    pub file_hashes: &'a HashTree,
}

/// The state both replicas converge to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub version_vector: VersionVector,
    pub file_hashes: HashTree,
    /// Replica whose tree is the source of the content
    pub winner: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    /// Same vector, different content
    ConflictingContent,
    /// Neither vector dominates the other
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Replicas \"{a}\" and \"{b}\" have diverged: {kind}")]
pub struct Diverged {
    pub a: ReplicaId,
    pub b: ReplicaId,
    pub kind: DivergenceKind,
}

impl fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceKind::ConflictingContent => {
                write!(f, "same version vector but different files")
            }
            DivergenceKind::Concurrent => write!(f, "concurrent edits on both sides"),
        }
    }
}

/// Decide the merged state of `a` and `b`. The first matching rule wins.
pub fn decide(a: MergeInput<'_>, b: MergeInput<'_>) -> Result<MergeResult, Diverged> {
    if a.file_hashes == b.file_hashes {
        let winner = if b.id < a.id { Side::B } else { Side::A };
        return Ok(MergeResult {
            version_vector: a.version_vector.join(b.version_vector),
            file_hashes: a.file_hashes.clone(),
            winner,
        });
    }

    if a.version_vector == b.version_vector {
        return Err(diverged(a, b, DivergenceKind::ConflictingContent));
    }

    if a.version_vector.leq(b.version_vector) {
        return Ok(take(b, Side::B));
    }
    if b.version_vector.leq(a.version_vector) {
        return Ok(take(a, Side::A));
    }

    Err(diverged(a, b, DivergenceKind::Concurrent))
}

fn take(input: MergeInput<'_>, side: Side) -> MergeResult {
    MergeResult {
        version_vector: input.version_vector.clone(),
        file_hashes: input.file_hashes.clone(),
        winner: side,
    }
}

fn diverged(a: MergeInput<'_>, b: MergeInput<'_>, kind: DivergenceKind) -> Diverged {
    Diverged {
        a: a.id.clone(),
        b: b.id.clone(),
        kind,
    }
}
