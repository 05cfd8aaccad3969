use super::history::{self, HistoryEntry};
use super::{KeyedLocks, Operation, Profile, ProfilePatch, StoreError, StoreResult, UserKey, UserPaths};
use crate::storage::create_storage;
use crate::traits::Storage;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-customer profile, narrative memory and history under
/// `<workspace>/memory/users/<key>/`. Every operation resolves its own key
/// from `(channel, sender_id)` and touches nothing outside that directory.
///
/// A call that fails leaves storage as it found it: blobs it created are
/// removed and a profile it replaced is written back.
pub struct UserProfileStore {
    workspace_dir: PathBuf,
    storage: Arc<dyn Storage>,
    locks: KeyedLocks,
}

/// What a profile write changed.
struct ProfileWrite {
    profile: Profile,
    previous: Option<String>,
    created: Vec<PathBuf>,
}

impl UserProfileStore {
    pub fn new(workspace_dir: impl AsRef<Path>, storage: Arc<dyn Storage>) -> Self {
        Self {
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
            storage,
            locks: KeyedLocks::new(),
        }
    }

    pub fn open(workspace_dir: impl AsRef<Path>) -> Self {
        Self::new(workspace_dir, create_storage())
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn resolve_key(channel: &str, sender_id: &str) -> UserKey {
        UserKey::resolve(channel, sender_id)
    }

    pub fn paths(&self, channel: &str, sender_id: &str) -> UserPaths {
        UserPaths::new(&self.workspace_dir, &Self::resolve_key(channel, sender_id))
    }

    pub async fn ensure(&self, channel: &str, sender_id: &str) -> StoreResult<UserKey> {
        let paths = self.paths(channel, sender_id);
        let _guard = self.locks.acquire(&paths.user_key).await;
        self.ensure_artifacts(&paths, Operation::Ensure).await?;
        Ok(paths.user_key)
    }

    /// Never creates anything; a missing profile reads as the default.
    pub async fn get_profile(&self, channel: &str, sender_id: &str) -> StoreResult<Profile> {
        let paths = self.paths(channel, sender_id);
        let (profile, _) = self.load_profile(&paths, Operation::GetProfile).await?;
        Ok(profile)
    }

    pub async fn upsert_profile(
        &self,
        channel: &str,
        sender_id: &str,
        patch: &ProfilePatch,
    ) -> StoreResult<Profile> {
        let paths = self.paths(channel, sender_id);
        let _guard = self.locks.acquire(&paths.user_key).await;
        let write = self
            .merge_and_write(&paths, patch, Operation::UpsertProfile)
            .await?;
        Ok(write.profile)
    }

    /// Same as [`Self::upsert_profile`], validating raw JSON first. A bad
    /// patch is rejected before any storage access.
    pub async fn upsert_profile_json(
        &self,
        channel: &str,
        sender_id: &str,
        patch_json: &str,
    ) -> StoreResult<Profile> {
        let patch = ProfilePatch::from_json(patch_json).map_err(|e| StoreError::InvalidPatch {
            user_key: Self::resolve_key(channel, sender_id),
            operation: Operation::UpsertProfile,
            reason: e.to_string(),
        })?;
        self.upsert_profile(channel, sender_id, &patch).await
    }

    pub async fn append_history(
        &self,
        channel: &str,
        sender_id: &str,
        entry: &str,
    ) -> StoreResult<()> {
        let paths = self.paths(channel, sender_id);
        let Some(entry) = history::normalize_entry(entry) else {
            return Err(StoreError::EmptyEntry {
                user_key: paths.user_key,
                operation: Operation::AppendHistory,
            });
        };

        let _guard = self.locks.acquire(&paths.user_key).await;
        let created = self
            .ensure_artifacts(&paths, Operation::AppendHistory)
            .await?;
        if let Err(e) = self
            .append_entry(&paths, &entry, Operation::AppendHistory)
            .await
        {
            self.discard(&paths, &created).await;
            return Err(e);
        }
        Ok(())
    }

    /// `upsert_profile` with only `next_step`, plus a history line recording
    /// the change. Both land or neither does.
    pub async fn set_next_step(
        &self,
        channel: &str,
        sender_id: &str,
        next_step: &str,
    ) -> StoreResult<Profile> {
        let paths = self.paths(channel, sender_id);
        if next_step.trim().is_empty() {
            return Err(StoreError::InvalidPatch {
                user_key: paths.user_key,
                operation: Operation::SetNextStep,
                reason: "next_step must not be blank".to_string(),
            });
        }

        let _guard = self.locks.acquire(&paths.user_key).await;
        let write = self
            .merge_and_write(
                &paths,
                &ProfilePatch::next_step(next_step),
                Operation::SetNextStep,
            )
            .await?;
        let entry = format!("next_step updated: {}", next_step.trim());
        if let Err(e) = self
            .append_entry(&paths, &entry, Operation::SetNextStep)
            .await
        {
            self.restore(&paths, &write).await;
            return Err(e);
        }
        Ok(write.profile)
    }

    pub async fn read_history(
        &self,
        channel: &str,
        sender_id: &str,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let paths = self.paths(channel, sender_id);
        let content = self
            .storage
            .read(&paths.history)
            .await
            .map_err(|e| io_error(&paths, Operation::GetHistory, e))?;
        Ok(content
            .map(|c| history::parse_history(&c))
            .unwrap_or_default())
    }

    /// Returns the artifacts this call created. On failure the ones already
    /// created are removed again.
    async fn ensure_artifacts(
        &self,
        paths: &UserPaths,
        operation: Operation,
    ) -> StoreResult<Vec<PathBuf>> {
        let default_profile = serialize(paths, operation, &Profile::default())?;
        let artifacts = [
            (&paths.profile, default_profile.as_str()),
            (&paths.memory, ""),
            (&paths.history, ""),
        ];

        let mut created = Vec::new();
        for (path, initial) in artifacts {
            match self.storage.create_new(path, initial).await {
                Ok(true) => {
                    tracing::debug!(
                        user_key = %paths.user_key,
                        path = %path.display(),
                        "Created user artifact"
                    );
                    created.push(path.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    self.discard(paths, &created).await;
                    return Err(io_error(paths, operation, e));
                }
            }
        }
        Ok(created)
    }

    /// The stored profile and its raw content, if any.
    async fn load_profile(
        &self,
        paths: &UserPaths,
        operation: Operation,
    ) -> StoreResult<(Profile, Option<String>)> {
        let content = match self.storage.read(&paths.profile).await {
            Ok(content) => content,
            // Not UTF-8: the content is damaged, the storage is fine.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(corrupt(paths, operation, e.to_string()));
            }
            Err(e) => return Err(io_error(paths, operation, e)),
        };

        let Some(content) = content else {
            return Ok((Profile::default(), None));
        };

        let profile =
            Profile::from_json(&content).map_err(|e| corrupt(paths, operation, e.to_string()))?;
        Ok((profile, Some(content)))
    }

    /// Caller holds the key's lock. The stored profile is read before
    /// anything is created, so a corrupt profile leaves storage untouched.
    async fn merge_and_write(
        &self,
        paths: &UserPaths,
        patch: &ProfilePatch,
        operation: Operation,
    ) -> StoreResult<ProfileWrite> {
        let (mut profile, previous) = self.load_profile(paths, operation).await?;
        profile.merge(patch);
        let content = serialize(paths, operation, &profile)?;

        let created = self.ensure_artifacts(paths, operation).await?;
        if let Err(e) = self.storage.write(&paths.profile, &content).await {
            self.discard(paths, &created).await;
            return Err(io_error(paths, operation, e));
        }

        tracing::info!(user_key = %paths.user_key, %operation, "Profile updated");
        Ok(ProfileWrite {
            profile,
            previous,
            created,
        })
    }

    async fn append_entry(
        &self,
        paths: &UserPaths,
        entry: &str,
        operation: Operation,
    ) -> StoreResult<()> {
        let line = history::format_entry(entry, chrono::Local::now());
        self.storage
            .append(&paths.history, &line)
            .await
            .map_err(|e| io_error(paths, operation, e))?;

        tracing::info!(user_key = %paths.user_key, %operation, "History appended");
        Ok(())
    }

    /// Undoes a profile write: the replaced content goes back, created
    /// artifacts go away.
    async fn restore(&self, paths: &UserPaths, write: &ProfileWrite) {
        if let Some(previous) = &write.previous
            && let Err(e) = self.storage.write(&paths.profile, previous).await
        {
            tracing::warn!(user_key = %paths.user_key, error = %e, "Failed to restore profile");
        }
        self.discard(paths, &write.created).await;
    }

    async fn discard(&self, paths: &UserPaths, created: &[PathBuf]) {
        for path in created.iter().rev() {
            if let Err(e) = self.storage.remove(path).await {
                tracing::warn!(
                    user_key = %paths.user_key,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove artifact"
                );
            }
        }
    }
}

fn serialize(paths: &UserPaths, operation: Operation, profile: &Profile) -> StoreResult<String> {
    profile
        .to_json()
        .map_err(|e| io_error(paths, operation, io::Error::other(e)))
}

fn corrupt(paths: &UserPaths, operation: Operation, reason: String) -> StoreError {
    tracing::warn!(user_key = %paths.user_key, %operation, "Stored profile is corrupt");
    StoreError::CorruptProfile {
        user_key: paths.user_key.clone(),
        operation,
        reason,
    }
}

fn io_error(paths: &UserPaths, operation: Operation, source: io::Error) -> StoreError {
    StoreError::Io {
        user_key: paths.user_key.clone(),
        operation,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use std::io;
    use tempfile::TempDir;

    const WS: &str = "/ws";

    fn in_memory() -> (UserProfileStore, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        (UserProfileStore::new(WS, storage.clone()), storage)
    }

    fn read_all(paths: &UserPaths) -> [String; 3] {
        [&paths.profile, &paths.memory, &paths.history]
            .map(|p| std::fs::read_to_string(p).unwrap())
    }

    #[tokio::test]
    async fn ensure_creates_default_artifacts() {
        let tmp = TempDir::new().unwrap();
        let store = UserProfileStore::open(tmp.path());

        let key = store.ensure("telegram", "10001|alice").await.unwrap();
        assert_eq!(key.as_str(), "telegram__10001");

        let dir = tmp.path().join("memory/users/telegram__10001");
        let profile = std::fs::read_to_string(dir.join("PROFILE.json")).unwrap();
        assert_eq!(Profile::from_json(&profile).unwrap(), Profile::default());
        assert_eq!(std::fs::read_to_string(dir.join("MEMORY.md")).unwrap(), "");
        assert_eq!(std::fs::read_to_string(dir.join("HISTORY.md")).unwrap(), "");
    }

    #[tokio::test]
    async fn ensure_twice_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = UserProfileStore::open(tmp.path());
        let paths = store.paths("telegram", "10001|alice");

        store.ensure("telegram", "10001|alice").await.unwrap();
        let first = read_all(&paths);
        store.ensure("telegram", "10001|alice").await.unwrap();
        assert_eq!(read_all(&paths), first);
    }

    #[tokio::test]
    async fn ensure_never_overwrites_existing_content() {
        let tmp = TempDir::new().unwrap();
        let store = UserProfileStore::open(tmp.path());
        let paths = store.paths("dingtalk", "staff01");

        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(&paths.memory, "prefers email\n").unwrap();
        store.ensure("dingtalk", "staff01").await.unwrap();

        assert_eq!(std::fs::read_to_string(&paths.memory).unwrap(), "prefers email\n");
        assert!(paths.profile.exists());
        assert!(paths.history.exists());
    }

    #[tokio::test]
    async fn get_profile_on_fresh_key_is_default_and_read_only() {
        let (store, storage) = in_memory();
        let profile = store.get_profile("telegram", "555").await.unwrap();
        assert_eq!(profile, Profile::default());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_profile_is_reported_not_repaired() {
        let (store, storage) = in_memory();
        let paths = store.paths("telegram", "555");
        storage.write(&paths.profile, "{ not json").await.unwrap();

        let err = store.get_profile("telegram", "555").await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptProfile { .. }));
        assert_eq!(err.user_key().as_str(), "telegram__555");

        let patch = ProfilePatch::from_json(r#"{"role": "CTO"}"#).unwrap();
        let err = store
            .upsert_profile("telegram", "555", &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptProfile { .. }));
        assert_eq!(
            storage.read(&paths.profile).await.unwrap().as_deref(),
            Some("{ not json")
        );
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn scenario_ensure_upsert_get() {
        let tmp = TempDir::new().unwrap();
        let store = UserProfileStore::open(tmp.path());
        store.ensure("telegram", "10001|alice").await.unwrap();

        let updated = store
            .upsert_profile_json(
                "telegram",
                "10001|alice",
                r#"{"company":"ACME","next_step":"book 30-min demo"}"#,
            )
            .await
            .unwrap();
        let expected = Profile {
            company: Some("ACME".to_string()),
            next_step: Some("book 30-min demo".to_string()),
            ..Profile::default()
        };
        assert_eq!(updated, expected);

        // Display name changed, same customer.
        let read = store.get_profile("telegram", "10001|alice2").await.unwrap();
        assert_eq!(read, expected);
    }

    #[tokio::test]
    async fn upsert_preserves_unmentioned_fields() {
        let (store, _) = in_memory();
        let base = ProfilePatch::from_json(
            r#"{"company":"ACME","role":"VP","pains":["reporting"],"timeline":"Q3"}"#,
        )
        .unwrap();
        let before = store.upsert_profile("slack", "U1", &base).await.unwrap();

        let after = store
            .upsert_profile_json("slack", "U1", r#"{"role": null}"#)
            .await
            .unwrap();
        assert_eq!(after, before);

        let after = store
            .upsert_profile_json("slack", "U1", r#"{"role": "CTO"}"#)
            .await
            .unwrap();
        assert_eq!(
            store.get_profile("slack", "U1").await.unwrap(),
            Profile {
                role: Some("CTO".to_string()),
                ..before
            }
        );
        assert_eq!(after.role.as_deref(), Some("CTO"));
    }

    #[tokio::test]
    async fn upsert_creates_missing_artifacts() {
        let (store, storage) = in_memory();
        store
            .upsert_profile("telegram", "9", &ProfilePatch::next_step("call back"))
            .await
            .unwrap();
        let paths = store.paths("telegram", "9");
        assert_eq!(
            storage.paths().await,
            {
                let mut v = vec![paths.history.clone(), paths.memory.clone(), paths.profile.clone()];
                v.sort();
                v
            }
        );
    }

    #[tokio::test]
    async fn invalid_patch_writes_nothing() {
        let (store, storage) = in_memory();
        for bad in [
            r#"{"confidence": {"role": 0.8}}"#,
            r#"{"pains": "too slow"}"#,
            r#"["ACME"]"#,
            "{",
        ] {
            let err = store
                .upsert_profile_json("telegram", "1", bad)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidPatch { .. }), "{bad}");
            assert_eq!(err.operation(), Operation::UpsertProfile);
        }
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn customers_are_isolated() {
        let (store, _) = in_memory();
        store
            .upsert_profile_json("telegram", "100|a", r#"{"company":"ACME"}"#)
            .await
            .unwrap();
        store
            .append_history("telegram", "100|a", "asked for pricing")
            .await
            .unwrap();

        assert_eq!(
            store.get_profile("telegram", "101|b").await.unwrap(),
            Profile::default()
        );
        assert_eq!(
            store.get_profile("discord", "100").await.unwrap(),
            Profile::default()
        );
        assert!(store.read_history("telegram", "101").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_append_only_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let store = UserProfileStore::open(tmp.path());
        let paths = store.paths("telegram", "7");

        store.append_history("telegram", "7", "first contact").await.unwrap();
        let after_first = std::fs::read_to_string(&paths.history).unwrap();
        store
            .append_history("telegram", "7", "shared\nrequirements")
            .await
            .unwrap();
        let after_second = std::fs::read_to_string(&paths.history).unwrap();

        assert!(after_second.starts_with(&after_first));
        let texts: Vec<_> = store
            .read_history("telegram", "7")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["first contact", "shared requirements"]);
    }

    #[tokio::test]
    async fn blank_history_entry_is_rejected() {
        let (store, storage) = in_memory();
        let err = store.append_history("telegram", "7", " \n ").await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyEntry { .. }));
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn set_next_step_updates_profile_and_history() {
        let (store, _) = in_memory();
        store
            .upsert_profile_json("telegram", "7", r#"{"company":"ACME"}"#)
            .await
            .unwrap();

        let profile = store
            .set_next_step("telegram", "7", "send proposal Friday")
            .await
            .unwrap();
        assert_eq!(profile.company.as_deref(), Some("ACME"));
        assert_eq!(profile.next_step.as_deref(), Some("send proposal Friday"));

        let history = store.read_history("telegram", "7").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "next_step updated: send proposal Friday");

        let err = store.set_next_step("telegram", "7", "  ").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPatch { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_on_one_key_lose_nothing() {
        let store = Arc::new(UserProfileStore::new(WS, Arc::new(InMemoryStorage::new())));
        let patches = [
            r#"{"company":"ACME"}"#,
            r#"{"role":"CTO"}"#,
            r#"{"budget_signal":"approved"}"#,
            r#"{"timeline":"this quarter"}"#,
            r#"{"next_step":"demo"}"#,
            r#"{"pains":["churn"]}"#,
            r#"{"objections":["price"]}"#,
        ];

        let tasks: Vec<_> = patches
            .into_iter()
            .map(|patch| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert_profile_json("telegram", "42|x", patch)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let profile = store.get_profile("telegram", "42").await.unwrap();
        assert_eq!(profile.company.as_deref(), Some("ACME"));
        assert_eq!(profile.role.as_deref(), Some("CTO"));
        assert_eq!(profile.budget_signal.as_deref(), Some("approved"));
        assert_eq!(profile.timeline.as_deref(), Some("this quarter"));
        assert_eq!(profile.next_step.as_deref(), Some("demo"));
        assert_eq!(profile.pains, vec!["churn"]);
        assert_eq!(profile.objections, vec!["price"]);
    }

    struct ReadOnlyStorage;

    #[async_trait]
    impl Storage for ReadOnlyStorage {
        fn name(&self) -> &str {
            "read_only"
        }

        async fn read(&self, _path: &Path) -> io::Result<Option<String>> {
            Ok(None)
        }

        async fn write(&self, _path: &Path, _contents: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }

        async fn create_new(&self, _path: &Path, _contents: &str) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }

        async fn append(&self, _path: &Path, _contents: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }

        async fn remove(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[tokio::test]
    async fn storage_failures_surface_as_io_errors() {
        let store = UserProfileStore::new(WS, Arc::new(ReadOnlyStorage));

        let err = store.ensure("telegram", "3").await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(err.operation(), Operation::Ensure);
        assert!(err.to_string().contains("telegram__3"));

        let err = store
            .append_history("telegram", "3", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));

        // Reads still work against a storage that refuses writes.
        assert_eq!(
            store.get_profile("telegram", "3").await.unwrap(),
            Profile::default()
        );
    }

    /// In-memory storage that fails selected calls.
    #[derive(Default)]
    struct FlakyStorage {
        inner: InMemoryStorage,
        fail_create_at: Option<usize>,
        fail_write: bool,
        fail_append: bool,
        creates: std::sync::atomic::AtomicUsize,
    }

    fn disk_full() -> io::Error {
        io::Error::other("disk full")
    }

    #[async_trait]
    impl Storage for FlakyStorage {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn read(&self, path: &Path) -> io::Result<Option<String>> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
            if self.fail_write {
                return Err(disk_full());
            }
            self.inner.write(path, contents).await
        }

        async fn create_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
            let n = self
                .creates
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail_create_at == Some(n) {
                return Err(disk_full());
            }
            self.inner.create_new(path, contents).await
        }

        async fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
            if self.fail_append {
                return Err(disk_full());
            }
            self.inner.append(path, contents).await
        }

        async fn remove(&self, path: &Path) -> io::Result<()> {
            self.inner.remove(path).await
        }
    }

    #[tokio::test]
    async fn failed_history_append_undoes_next_step() {
        let storage = Arc::new(FlakyStorage {
            fail_append: true,
            ..FlakyStorage::default()
        });
        let store = UserProfileStore::new(WS, storage.clone());
        let paths = store.paths("telegram", "1");
        let stored = "{\n  \"company\": \"ACME\",\n  \"next_step\": \"send deck\"\n}\n";
        storage.inner.create_new(&paths.profile, stored).await.unwrap();
        storage.inner.create_new(&paths.memory, "").await.unwrap();
        storage.inner.create_new(&paths.history, "").await.unwrap();

        let err = store
            .set_next_step("telegram", "1", "demo")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(err.operation(), Operation::SetNextStep);

        assert_eq!(
            storage.inner.read(&paths.profile).await.unwrap().as_deref(),
            Some(stored)
        );
        let profile = store.get_profile("telegram", "1").await.unwrap();
        assert_eq!(profile.next_step.as_deref(), Some("send deck"));
    }

    #[tokio::test]
    async fn failed_history_append_on_new_key_leaves_nothing() {
        let storage = Arc::new(FlakyStorage {
            fail_append: true,
            ..FlakyStorage::default()
        });
        let store = UserProfileStore::new(WS, storage.clone());

        assert!(store.set_next_step("telegram", "1", "demo").await.is_err());
        assert!(store.append_history("telegram", "1", "hello").await.is_err());
        assert!(storage.inner.is_empty().await);
    }

    #[tokio::test]
    async fn partial_ensure_removes_what_it_created() {
        let storage = Arc::new(FlakyStorage {
            fail_create_at: Some(1),
            ..FlakyStorage::default()
        });
        let store = UserProfileStore::new(WS, storage.clone());

        let err = store.ensure("telegram", "1").await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(storage.inner.is_empty().await);
    }

    #[tokio::test]
    async fn failed_profile_write_leaves_no_default_profile() {
        let storage = Arc::new(FlakyStorage {
            fail_write: true,
            ..FlakyStorage::default()
        });
        let store = UserProfileStore::new(WS, storage.clone());

        let err = store
            .upsert_profile_json("telegram", "1", r#"{"company":"ACME"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(storage.inner.is_empty().await);
    }

    #[tokio::test]
    async fn non_utf8_profile_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = UserProfileStore::open(tmp.path());
        let paths = store.paths("telegram", "1");
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(&paths.profile, [0xff, 0xfe, b'{', b'}']).unwrap();

        let err = store.get_profile("telegram", "1").await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptProfile { .. }));

        let err = store
            .set_next_step("telegram", "1", "demo")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptProfile { .. }));
        assert_eq!(
            std::fs::read(&paths.profile).unwrap(),
            vec![0xff, 0xfe, b'{', b'}']
        );
        assert!(!paths.history.exists());
    }

    #[tokio::test]
    async fn set_next_step_stores_what_upsert_stores() {
        let (store, _) = in_memory();
        let text = "  call   Mon\n 9am ";

        let via_shortcut = store.set_next_step("telegram", "1", text).await.unwrap();
        let via_upsert = store
            .upsert_profile("telegram", "2", &ProfilePatch::next_step(text))
            .await
            .unwrap();
        assert_eq!(via_shortcut, via_upsert);
        assert_eq!(via_shortcut.next_step.as_deref(), Some("call   Mon\n 9am"));

        let history = store.read_history("telegram", "1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "next_step updated: call Mon 9am");
    }
}
