use std::fmt;

pub const CLI_KEY: &str = "cli";
pub const SYSTEM_KEY: &str = "system";
pub const UNKNOWN_KEY: &str = "unknown";

const KEY_SEPARATOR: &str = "__";
const PLACEHOLDER_SENDERS: &[&str] = &["unknown", "user"];

/// Canonical per-customer identity. Only ever built by [`UserKey::resolve`],
/// so the inner string is always a safe path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(String);

impl UserKey {
    /// Maps `(channel, sender_id)` to a key. Total: malformed input falls
    /// back to `"unknown"` instead of failing.
    pub fn resolve(channel: &str, sender_id: &str) -> Self {
        let channel = channel.trim().to_lowercase();
        match channel.as_str() {
            CLI_KEY => return Self(CLI_KEY.to_string()),
            SYSTEM_KEY => return Self(SYSTEM_KEY.to_string()),
            "" => return Self::unknown(),
            _ => {}
        }

        let sender = sender_id.trim();
        if sender.is_empty()
            || PLACEHOLDER_SENDERS
                .iter()
                .any(|p| sender.eq_ignore_ascii_case(p))
        {
            return Self::unknown();
        }

        let sender = numeric_prefix(sender).unwrap_or(sender);
        Self(format!(
            "{}{KEY_SEPARATOR}{}",
            sanitize_channel(&channel),
            sanitize(sender)
        ))
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `"7981415175|alice"` -> `Some("7981415175")`. Display names change, the
/// numeric id does not.
fn numeric_prefix(sender: &str) -> Option<&str> {
    let (prefix, _) = sender.split_once('|')?;
    let prefix = prefix.trim();
    if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
        Some(prefix)
    } else {
        None
    }
}

/// Channels never contain `_`, so the first `_` of a key always starts the
/// separator and `(channel, sender)` pairs cannot run into each other.
fn sanitize_channel(channel: &str) -> String {
    channel
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

pub fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        UNKNOWN_KEY.to_string()
    } else {
        cleaned
    }
}

pub fn is_path_safe(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
