use crate::{Commands, Identity, PatchSource};
use anyhow::{Context, Result};
use sdr_memory_core::{Profile, UserKey, UserProfileStore};
use std::fmt::Write;
use std::path::Path;

pub fn resolve_key(identity: &Identity) -> UserKey {
    UserProfileStore::resolve_key(&identity.channel, &identity.sender_id)
}

pub async fn run(workspace: &Path, command: Commands) -> Result<()> {
    let store = UserProfileStore::open(workspace);
    let output = execute(&store, command).await?;
    print!("{}", output);
    Ok(())
}

/// Runs one command and returns what goes to stdout. Store errors pass
/// through untouched so the caller can map them to exit codes.
pub async fn execute(store: &UserProfileStore, command: Commands) -> Result<String> {
    let mut out = String::new();

    match command {
        Commands::ResolveKey { identity } => {
            writeln!(out, "{}", resolve_key(&identity))?;
        }
        Commands::ShowPath { identity } => {
            let paths = store.paths(&identity.channel, &identity.sender_id);
            writeln!(out, "USER_KEY={}", paths.user_key)?;
            writeln!(out, "USER_DIR={}", paths.dir.display())?;
            writeln!(out, "PROFILE_FILE={}", paths.profile.display())?;
            writeln!(out, "MEMORY_FILE={}", paths.memory.display())?;
            writeln!(out, "HISTORY_FILE={}", paths.history.display())?;
        }
        Commands::Ensure { identity } => {
            let user_key = store.ensure(&identity.channel, &identity.sender_id).await?;
            let paths = store.paths(&identity.channel, &identity.sender_id);
            writeln!(out, "USER_KEY={}", user_key)?;
            writeln!(out, "PROFILE_FILE={}", paths.profile.display())?;
        }
        Commands::GetProfile { identity } => {
            let profile = store
                .get_profile(&identity.channel, &identity.sender_id)
                .await?;
            out.push_str(&render_profile(&profile)?);
        }
        Commands::UpsertProfile { identity, patch } => {
            let patch_json = read_patch(&patch)?;
            let profile = store
                .upsert_profile_json(&identity.channel, &identity.sender_id, &patch_json)
                .await?;
            out.push_str(&render_profile(&profile)?);
        }
        Commands::AppendHistory { identity, entry } => {
            store
                .append_history(&identity.channel, &identity.sender_id, &entry)
                .await?;
            let paths = store.paths(&identity.channel, &identity.sender_id);
            writeln!(out, "HISTORY_FILE={}", paths.history.display())?;
        }
        Commands::SetNextStep {
            identity,
            next_step,
        } => {
            let profile = store
                .set_next_step(&identity.channel, &identity.sender_id, &next_step)
                .await?;
            out.push_str(&render_profile(&profile)?);
        }
        Commands::GetHistory { identity } => {
            let entries = store
                .read_history(&identity.channel, &identity.sender_id)
                .await?;
            for entry in entries {
                writeln!(out, "[{}] {}", entry.timestamp, entry.text)?;
            }
        }
    }

    Ok(out)
}

fn read_patch(source: &PatchSource) -> Result<String> {
    match (&source.json, &source.file) {
        (Some(json), _) => Ok(json.clone()),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read patch from {}", file.display())),
        (None, None) => anyhow::bail!("Either --json or --file is required"),
    }
}

fn render_profile(profile: &Profile) -> Result<String> {
    profile
        .to_json()
        .with_context(|| "Failed to serialize profile")
}
