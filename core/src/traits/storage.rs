use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Blob storage addressed by path. Every per-user artifact goes through this
/// seam so the store can run against the filesystem or an in-memory double.
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `None` when the blob does not exist.
    async fn read(&self, path: &Path) -> io::Result<Option<String>>;

    /// Replaces the whole blob. Either the new content lands or the old
    /// content is left as it was.
    async fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Writes `contents` only if nothing exists at `path`. Returns whether
    /// the blob was created.
    async fn create_new(&self, path: &Path, contents: &str) -> io::Result<bool>;

    async fn append(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Deletes the blob. Removing a missing blob is not an error.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.read(path).await?.is_some())
    }
}
