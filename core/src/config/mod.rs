use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SDR_MEMORY_DIR: &str = ".sdr-memory";
pub const WORKSPACE_ENV: &str = "SDR_MEMORY_WORKSPACE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub workspace_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace_dir: home_dir().join(".nanobot").join("workspace"),
        }
    }
}

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

pub fn get_sdr_memory_dir() -> PathBuf {
    home_dir().join(SDR_MEMORY_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_sdr_memory_dir().join("config.toml")
}

/// `~` and `~/...` expand against `$HOME`; anything else is returned as is.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    /// Picks the workspace: explicit flag, then `SDR_MEMORY_WORKSPACE`, then
    /// the configured directory.
    pub fn resolve_workspace(&self, flag: Option<&Path>) -> PathBuf {
        let env = std::env::var_os(WORKSPACE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let chosen = flag
            .map(Path::to_path_buf)
            .or(env)
            .unwrap_or_else(|| self.workspace_dir.clone());
        expand_home(&chosen)
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

    config.workspace_dir = expand_home(&config.workspace_dir);

    Ok(config)
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
