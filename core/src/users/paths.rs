use super::UserKey;
use std::path::{Path, PathBuf};

pub const PROFILE_FILE: &str = "PROFILE.json";
pub const MEMORY_FILE: &str = "MEMORY.md";
pub const HISTORY_FILE: &str = "HISTORY.md";

pub fn users_dir(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join("memory").join("users")
}

/// Locations of one customer's artifacts. All three share `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    pub user_key: UserKey,
    pub dir: PathBuf,
    pub profile: PathBuf,
    pub memory: PathBuf,
    pub history: PathBuf,
}

impl UserPaths {
    pub fn new(workspace_dir: &Path, user_key: &UserKey) -> Self {
        let dir = users_dir(workspace_dir).join(user_key.as_str());
        Self {
            user_key: user_key.clone(),
            profile: dir.join(PROFILE_FILE),
            memory: dir.join(MEMORY_FILE),
            history: dir.join(HISTORY_FILE),
            dir,
        }
    }
}
