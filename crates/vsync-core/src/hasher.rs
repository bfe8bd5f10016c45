//! Content hashing: file digests and whole-tree scans.
//!
//! Files are streamed through SHA-512 by default and hex-encoded. A scan
//! either produces the complete [`HashTree`] or fails; there is no partial
//! result.

use crate::config::is_staging_file;
use crate::fs::{join_path, EntryKind, FileSystem, FsError};
use crate::hash_tree::HashTree;
use crate::replica::Replica;

use futures::future::BoxFuture;
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Read buffer size for streaming file content into the digest.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("forbidden tree item: {0:?}")]
    ForbiddenItem(String),

    #[error("forbidden empty directory: {0:?}")]
    ForbiddenEmptyDirectory(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// Hex digest of an in-memory buffer, same algorithm as a default scan.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}

/// Walks a replica tree and maps every tracked file to its digest.
///
/// The reserved metadata file is skipped only as a regular file directly at
/// the root, as are staging files an interrupted metadata write left there.
/// Any other occurrence is a [`TreeError::ForbiddenItem`], and a
/// directory without tracked files is a [`TreeError::ForbiddenEmptyDirectory`].
pub struct TreeHasher<'a, F: FileSystem + ?Sized, D = Sha512> {
    fs: &'a F,
    meta_file: &'a str,
    _digest: PhantomData<fn() -> D>,
}

impl<'a, F: FileSystem + ?Sized> TreeHasher<'a, F> {
    pub fn new(fs: &'a F, meta_file: &'a str) -> Self {
        Self::with_digest(fs, meta_file)
    }
}

impl<'a, F, D> TreeHasher<'a, F, D>
where
    F: FileSystem + ?Sized,
    D: Digest + Send,
{
    /// Hasher using digest algorithm `D` instead of SHA-512.
    pub fn with_digest(fs: &'a F, meta_file: &'a str) -> Self {
        Self {
            fs,
            meta_file,
            _digest: PhantomData,
        }
    }

    /// Digest of one file, streamed in fixed-size chunks.
    pub async fn hash_file(&self, path: &str) -> Result<String> {
        let mut reader = self.fs.open(path).await?;
        let mut hasher = D::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| FsError::Io(format!("{}: {}", path, e)))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Hash every tracked file under the root.
    pub async fn hash_tree(&self) -> Result<HashTree> {
        let root = self.fs.stat("").await?;
        if !root.is_dir {
            return Err(FsError::NotDirectory(".".to_string()).into());
        }

        let mut entries = BTreeMap::new();
        self.scan_dir("", &mut entries).await?;
        debug!("Hashed {} file(s)", entries.len());
        Ok(HashTree::from_scan(entries))
    }

    fn scan_dir<'b>(
        &'b self,
        dir: &'b str,
        out: &'b mut BTreeMap<String, String>,
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            let is_root = dir.is_empty();
            let mut children = self.fs.list(dir).await?;
            // Name order keeps the first reported violation deterministic
            children.sort_by(|a, b| a.name.cmp(&b.name));

            let tracked_before = out.len();
            for child in children {
                let path = join_path(dir, &child.name);

                if child.name == self.meta_file {
                    if is_root && child.is_file() {
                        continue;
                    }
                    return Err(TreeError::ForbiddenItem(path));
                }
                if is_root && child.is_file() && is_staging_file(self.meta_file, &child.name) {
                    warn!("Ignoring leftover metadata staging file {}", path);
                    continue;
                }

                match child.kind {
                    EntryKind::File => {
                        let digest = self.hash_file(&path).await?;
                        out.insert(path, digest);
                    }
                    EntryKind::Dir => self.scan_dir(&path, out).await?,
                    EntryKind::Other => debug!("Skipping special file {}", path),
                }
            }

            if !is_root && out.len() == tracked_before {
                return Err(TreeError::ForbiddenEmptyDirectory(dir.to_string()));
            }
            Ok(())
        })
    }
}

impl<F: FileSystem> Replica<F> {
    /// Scan this replica's tree from disk.
    pub async fn hash_tree(&self) -> Result<HashTree> {
        TreeHasher::new(self.fs(), self.meta_file()).hash_tree().await
    }
}
