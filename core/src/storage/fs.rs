use crate::traits::Storage;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Default, Clone)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn write_temp(path: &Path, contents: &str) -> io::Result<PathBuf> {
    let tmp = temp_sibling(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    let written = async {
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(tmp)
}

#[async_trait]
impl Storage for FsStorage {
    fn name(&self) -> &str {
        "fs"
    }

    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        ensure_parent(path).await?;
        let tmp = write_temp(path, contents).await?;

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn create_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
        ensure_parent(path).await?;
        if tokio::fs::try_exists(path).await? {
            return Ok(false);
        }

        // hard_link refuses to replace an existing file, so a racing creator
        // never gets its content overwritten.
        let tmp = write_temp(path, contents).await?;
        let linked = tokio::fs::hard_link(&tmp, path).await;
        let _ = tokio::fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
        ensure_parent(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }
}
