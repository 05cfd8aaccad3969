use super::UserKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// One async mutex per user key. Different keys never wait on each other.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<UserKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &UserKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the map still holds are idle.
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        tracing::debug!(user_key = %key, "Acquiring user lock");
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
