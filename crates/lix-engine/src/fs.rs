//! Moving files between a directory tree and a version.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use lix_core::{FileSystem, LixError, Result};

use crate::engine::Lix;
use crate::session::Session;

/// The local filesystem, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

#[async_trait]
impl FileSystem for StdFileSystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    async fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![PathBuf::new()];

        while let Some(relative) = pending.pop() {
            let mut entries = tokio::fs::read_dir(root.join(&relative)).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let child = relative.join(entry.file_name());
                if file_type.is_dir() {
                    pending.push(child);
                } else if file_type.is_file() {
                    files.push(child);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Decorator adding tracing and path context to another filesystem.
#[derive(Debug, Clone, Default)]
pub struct TracingFileSystem<F> {
    inner: F,
}

impl<F: FileSystem> TracingFileSystem<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

/// Name the path in IO errors; other errors pass through.
fn with_path(path: &Path, err: LixError) -> LixError {
    match err {
        LixError::Io(e) => LixError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))),
        other => other,
    }
}

#[async_trait]
impl<F: FileSystem> FileSystem for TracingFileSystem<F> {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let data = self.inner.read(path).await.map_err(|e| with_path(path, e))?;
        debug!("Read {:?} ({} bytes)", path, data.len());
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.inner
            .write(path, data)
            .await
            .map_err(|e| with_path(path, e))?;
        debug!("Wrote {:?} ({} bytes)", path, data.len());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        self.inner.remove(path).await.map_err(|e| with_path(path, e))?;
        debug!("Removed {:?}", path);
        Ok(())
    }

    async fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let files = self.inner.list_files(root).await.map_err(|e| with_path(root, e))?;
        debug!("Listed {} file(s) under {:?}", files.len(), root);
        Ok(files)
    }
}

/// Lix path of a file relative to a synced root.
fn lix_path(relative: &Path) -> Option<String> {
    let mut path = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                path.push('/');
                path.push_str(part.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!path.is_empty()).then_some(path)
}

impl Lix {
    /// Write every file below `root` that a plugin handles into the active
    /// version, in one transaction. Returns the number of files written.
    pub async fn sync_from_fs(&self, session: &Session, fs: &dyn FileSystem, root: &Path) -> Result<usize> {
        let mut files = Vec::new();
        for relative in fs.list_files(root).await? {
            let Some(path) = lix_path(&relative) else {
                warn!("Skipping {:?}: not representable as a lix path", relative);
                continue;
            };
            if self.plugins.for_path(&path).is_none() {
                warn!("Skipping {}: no plugin handles it", path);
                continue;
            }
            let data = fs.read(&root.join(&relative)).await?;
            files.push((path, data));
        }

        let count = files.len();
        self.transaction(session, |tx| {
            for (path, data) in &files {
                tx.write_file(path, data)?;
            }
            Ok(())
        })
        .await?;

        info!("Synced {} file(s) from {:?}", count, root);
        Ok(count)
    }

    /// Write every file of the active version below `root`. Returns the
    /// number of files written.
    pub async fn export_to_fs(&self, session: &Session, fs: &dyn FileSystem, root: &Path) -> Result<usize> {
        let files = self
            .transaction(session, |tx| {
                tx.list_files()?
                    .into_iter()
                    .map(|descriptor| tx.read_file(&descriptor.path))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;

        for file in &files {
            let relative = file.path.trim_start_matches('/');
            fs.write(&root.join(relative), &file.data).await?;
        }

        info!("Exported {} file(s) to {:?}", files.len(), root);
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lix_path() {
        assert_eq!(lix_path(Path::new("a.json")), Some("/a.json".to_string()));
        assert_eq!(lix_path(Path::new("docs/b.md")), Some("/docs/b.md".to_string()));
        assert_eq!(lix_path(Path::new("../x")), None);
        assert_eq!(lix_path(Path::new("")), None);
    }

    #[tokio::test]
    async fn test_std_fs_lists_relative_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TracingFileSystem::new(StdFileSystem);
        fs.write(&dir.path().join("b/c.txt"), b"c").await.unwrap();
        fs.write(&dir.path().join("a.txt"), b"a").await.unwrap();

        let files = fs.list_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b/c.txt")]);
        assert_eq!(fs.read(&dir.path().join("b/c.txt")).await.unwrap(), b"c");

        fs.remove(&dir.path().join("a.txt")).await.unwrap();
        let err = fs.read(&dir.path().join("a.txt")).await.unwrap_err();
        assert!(err.to_string().contains("a.txt"));
    }
}
