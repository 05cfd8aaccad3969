use crate::traits::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    blobs: Mutex<HashMap<PathBuf, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.blobs.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.blobs.lock().await.get(path).cloned())
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.blobs
            .lock()
            .await
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn create_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
        let mut blobs = self.blobs.lock().await;
        if blobs.contains_key(path) {
            return Ok(false);
        }
        blobs.insert(path.to_path_buf(), contents.to_string());
        Ok(true)
    }

    async fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.blobs
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.blobs.lock().await.remove(path);
        Ok(())
    }
}
