//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use vsync_core::fs::{ByteStream, EntryKind, FileEntry, FileStat, FileSystem, FsError, Result};

/// Filesystem rooted at a replica directory on disk
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.base_path.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    async fn create_parents(&self, full_path: &Path) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(parent, e))?;
        }
        Ok(())
    }
}

/// Map an io error to the matching `FsError`, keeping the path.
fn map_io(path: &Path, e: io::Error) -> FsError {
    let shown = path.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(shown),
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists(shown),
        io::ErrorKind::IsADirectory => FsError::IsDirectory(shown),
        io::ErrorKind::NotADirectory => FsError::NotDirectory(shown),
        io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty(shown),
        _ => FsError::Io(format!("{}: {}", shown, e)),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn open(&self, path: &str) -> Result<ByteStream> {
        let full_path = self.full_path(path);
        // Opening a directory succeeds on some platforms; reject it up front
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        if metadata.is_dir() {
            return Err(FsError::IsDirectory(full_path.display().to_string()));
        }

        let file = fs::File::open(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        Ok(Box::new(file))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        fs::read(&full_path).await.map_err(|e| map_io(&full_path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        self.create_parents(&full_path).await?;

        fs::write(&full_path, content)
            .await
            .map_err(|e| map_io(&full_path, e))
    }

    async fn write_synced(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        self.create_parents(&full_path).await?;

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        file.write_all(content)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        file.sync_all().await.map_err(|e| map_io(&full_path, e))
    }

    async fn write_from(&self, path: &str, mut reader: ByteStream) -> Result<u64> {
        let full_path = self.full_path(path);
        self.create_parents(&full_path).await?;

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        let copied = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        file.flush().await.map_err(|e| map_io(&full_path, e))?;
        Ok(copied)
    }

    async fn create_new(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;

        file.write_all(content)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        file.flush().await.map_err(|e| map_io(&full_path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| map_io(&full_path, e))?
        {
            // Lossy conversion could merge two distinct names into one
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| FsError::InvalidName(entry.path().display().to_string()))?;
            // Follow symlinks; a dangling one is neither file nor directory
            let kind = match fs::metadata(entry.path()).await {
                Ok(m) if m.is_file() => EntryKind::File,
                Ok(m) if m.is_dir() => EntryKind::Dir,
                Ok(_) => EntryKind::Other,
                Err(e) if e.kind() == io::ErrorKind::NotFound => EntryKind::Other,
                Err(e) => return Err(map_io(&entry.path(), e)),
            };

            entries.push(FileEntry { name, kind });
        }

        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        let metadata = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;

        if metadata.is_dir() {
            fs::remove_dir(&full_path)
                .await
                .map_err(|e| map_io(&full_path, e))
        } else {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| map_io(&full_path, e))
        }
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let full_path = self.full_path(path);
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;

        Ok(FileStat {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.full_path(from);
        let to_path = self.full_path(to);
        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| map_io(&from_path, e))
    }
}
