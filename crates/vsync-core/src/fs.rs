//! FileSystem trait abstraction for replica-rooted file operations.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in vsync) - Uses tokio::fs
//!
//! Every path is relative to the replica root and uses `/` as separator,
//! whatever the host convention. The empty string names the root itself.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::RwLock;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("File name is not valid UTF-8: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Streaming reader handed out by [`FileSystem::open`].
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// What a directory entry turned out to be (symlinks are followed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    File,
    Dir,
    /// Sockets, fifos, dangling symlinks and the like
    Other,
}

/// File metadata
#[derive(Debug, Clone)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    pub kind: EntryKind,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Join a relative directory path and an entry name with `/`.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent of a relative path (`""` for top-level entries, `None` for the root).
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(pos) => Some(&path[..pos]),
        None => Some(""),
    }
}

/// Filesystem abstraction rooted at one replica.
///
/// Implementations must be `Send + Sync`; the sync engine scans both replicas
/// concurrently.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Open a file for streaming reads
    async fn open(&self, path: &str) -> Result<ByteStream>;

    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Like [`write`](Self::write), but the content has reached stable
    /// storage when this returns
    async fn write_synced(&self, path: &str, content: &[u8]) -> Result<()> {
        self.write(path, content).await
    }

    /// Stream `reader` into a file (creates parent directories if needed).
    /// Returns the number of bytes written.
    async fn write_from(&self, path: &str, reader: ByteStream) -> Result<u64>;

    /// Create a file that must not exist yet. The parent directory must exist.
    async fn create_new(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Delete file or empty directory
    async fn delete(&self, path: &str) -> Result<()>;

    /// Get file metadata
    async fn stat(&self, path: &str) -> Result<FileStat>;

    /// Replace the file at `to` with the file at `from` in one step
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}

#[derive(Default)]
struct Entries {
    files: BTreeMap<String, Vec<u8>>,
    /// Every directory except the root, which always exists
    dirs: BTreeSet<String>,
}

impl Entries {
    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }

    /// Create `path` and all its ancestors as directories.
    fn ensure_dir(&mut self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        if let Some(parent) = parent_path(path) {
            self.ensure_dir(parent)?;
        }
        if self.files.contains_key(path) {
            return Err(FsError::NotDirectory(path.to_string()));
        }
        self.dirs.insert(path.to_string());
        Ok(())
    }

    fn has_children(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir);
        self.files.keys().any(|p| p.starts_with(&prefix))
            || self.dirs.iter().any(|p| p.starts_with(&prefix))
    }

    fn put_file(&mut self, path: &str, content: Vec<u8>) -> Result<()> {
        if self.is_dir(path) {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        if let Some(parent) = parent_path(path) {
            self.ensure_dir(parent)?;
        }
        self.files.insert(path.to_string(), content);
        Ok(())
    }

    /// Fail unless the parent of `path` already exists as a directory.
    fn require_parent(&self, path: &str) -> Result<()> {
        let parent = parent_path(path).unwrap_or("");
        if self.files.contains_key(parent) {
            return Err(FsError::NotDirectory(parent.to_string()));
        }
        if !self.is_dir(parent) {
            return Err(FsError::NotFound(parent.to_string()));
        }
        Ok(())
    }
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    entries: RwLock<Entries>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
        }
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn read_sync(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap();
        if let Some(content) = entries.files.get(&path) {
            return Ok(content.clone());
        }
        if entries.is_dir(&path) {
            return Err(FsError::IsDirectory(path));
        }
        Err(FsError::NotFound(path))
    }

    fn store_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let path = Self::normalize_path(path);
        self.entries.write().unwrap().put_file(&path, content)
    }

    /// Create directory (and parents if needed)
    #[cfg(test)]
    pub(crate) async fn mkdir(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        self.entries.write().unwrap().ensure_dir(&path)
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn open(&self, path: &str) -> Result<ByteStream> {
        let content = self.read_sync(path)?;
        Ok(Box::new(Cursor::new(content)))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.read_sync(path)
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        self.store_file(path, content.to_vec())
    }

    async fn write_from(&self, path: &str, mut reader: ByteStream) -> Result<u64> {
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .await
            .map_err(|e| FsError::Io(e.to_string()))?;
        let len = content.len() as u64;
        self.store_file(path, content)?;
        Ok(len)
    }

    async fn create_new(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut entries = self.entries.write().unwrap();
        if entries.files.contains_key(&path) || entries.is_dir(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        entries.require_parent(&path)?;
        entries.files.insert(path, content.to_vec());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap();
        if entries.files.contains_key(&path) {
            return Err(FsError::NotDirectory(path));
        }
        if !entries.is_dir(&path) {
            return Err(FsError::NotFound(path));
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let direct_child = |p: &String| -> Option<String> {
            p.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_string)
        };

        let files = entries.files.keys().filter_map(direct_child).map(|name| FileEntry {
            name,
            kind: EntryKind::File,
        });
        let dirs = entries.dirs.iter().filter_map(direct_child).map(|name| FileEntry {
            name,
            kind: EntryKind::Dir,
        });
        Ok(files.chain(dirs).collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut entries = self.entries.write().unwrap();

        if entries.files.remove(&path).is_some() {
            return Ok(());
        }
        if path.is_empty() {
            return Err(FsError::Io("refusing to delete the root directory".to_string()));
        }
        if entries.dirs.contains(&path) {
            if entries.has_children(&path) {
                return Err(FsError::NotEmpty(path));
            }
            entries.dirs.remove(&path);
            return Ok(());
        }
        Err(FsError::NotFound(path))
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let path = Self::normalize_path(path);
        let entries = self.entries.read().unwrap();

        if let Some(content) = entries.files.get(&path) {
            return Ok(FileStat {
                size: content.len() as u64,
                is_dir: false,
            });
        }
        if entries.is_dir(&path) {
            return Ok(FileStat {
                size: 0,
                is_dir: true,
            });
        }
        Err(FsError::NotFound(path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalize_path(from);
        let to = Self::normalize_path(to);
        let mut entries = self.entries.write().unwrap();

        if entries.is_dir(&to) {
            return Err(FsError::IsDirectory(to));
        }
        entries.require_parent(&to)?;
        let content = match entries.files.remove(&from) {
            Some(content) => content,
            None if entries.is_dir(&from) => return Err(FsError::IsDirectory(from)),
            None => return Err(FsError::NotFound(from)),
        };
        entries.files.insert(to, content);
        Ok(())
    }
}
