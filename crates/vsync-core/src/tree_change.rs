//! Diff between two hash trees, its rendering, and applying it to a replica.

use crate::fs::{parent_path, FileSystem, FsError, Result};
use crate::hash_tree::HashTree;
use crate::prompt::Prompt;
use crate::replica_id::ReplicaId;

use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// The edits that turn one tree into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeChange {
    /// Paths present before but not after
    pub delete: BTreeSet<String>,
    /// Paths present in both with different digests
    pub overwrite: BTreeSet<String>,
    /// Paths present after but not before
    pub add: BTreeSet<String>,
}

impl TreeChange {
    /// Compute the change from `before` to `after`.
    pub fn between(before: &HashTree, after: &HashTree) -> Self {
        let mut change = TreeChange::default();

        for (path, digest) in before.iter() {
            match after.get(path) {
                None => {
                    change.delete.insert(path.to_string());
                }
                Some(other) if other != digest => {
                    change.overwrite.insert(path.to_string());
                }
                Some(_) => {}
            }
        }
        for path in after.paths() {
            if !before.contains(path) {
                change.add.insert(path.to_string());
            }
        }

        change
    }

    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.overwrite.is_empty() && self.add.is_empty()
    }

    /// Total number of paths touched.
    pub fn len(&self) -> usize {
        self.delete.len() + self.overwrite.len() + self.add.len()
    }

    /// Make `dest` match the tree this change was computed towards, reading
    /// new content from `src`.
    ///
    /// Deletes run first so a path can switch between file and directory.
    pub async fn apply<S, D>(&self, src: &S, dest: &D) -> Result<()>
    where
        S: FileSystem + ?Sized,
        D: FileSystem + ?Sized,
    {
        for path in &self.delete {
            dest.delete(path).await?;
            debug!("Deleted {}", path);
            prune_empty_parents(dest, path).await?;
        }

        // Sorted union; overwrite and add are disjoint
        let copies: BTreeSet<&String> = self.overwrite.iter().chain(&self.add).collect();
        for path in copies {
            let reader = src.open(path).await?;
            let bytes = dest.write_from(path, reader).await?;
            debug!("Copied {} ({} bytes)", path, bytes);
        }

        Ok(())
    }
}

/// Remove ancestors of `path` left empty, stopping below the root.
async fn prune_empty_parents<D: FileSystem + ?Sized>(dest: &D, path: &str) -> Result<()> {
    let mut current = path;
    while let Some(parent) = parent_path(current) {
        if parent.is_empty() {
            break;
        }
        match dest.list(parent).await {
            Ok(children) if children.is_empty() => {
                dest.delete(parent).await?;
                debug!("Removed empty directory {}", parent);
            }
            Ok(_) | Err(FsError::NotFound(_)) => break,
            Err(e) => return Err(e),
        }
        current = parent;
    }
    Ok(())
}

fn quoted(path: &str) -> String {
    serde_json::to_string(path).unwrap_or_else(|_| format!("{:?}", path))
}

impl fmt::Display for TreeChange {
    /// Grouped listing: Add, Delete, then Overwrite, separated by blank lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = [
            ("Add", '+', &self.add),
            ("Delete", '-', &self.delete),
            ("Overwrite", '≠', &self.overwrite),
        ];

        let mut first = true;
        for (title, marker, paths) in groups {
            if paths.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
                writeln!(f)?;
            }
            first = false;

            write!(f, "• {}:", title)?;
            for path in paths {
                write!(f, "\n{} {}", marker, quoted(path))?;
            }
        }
        Ok(())
    }
}

/// Ask whether `change` may be applied to the replica named `target`.
///
/// An empty change is approved without asking.
pub async fn confirm_change<P: Prompt + ?Sized>(
    change: &TreeChange,
    target: &ReplicaId,
    prompt: &P,
) -> bool {
    if change.is_empty() {
        return true;
    }
    let question = format!("Change {}?", quoted(target.as_str()));
    prompt.confirm(&change.to_string(), &question).await
}
