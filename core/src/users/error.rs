use super::UserKey;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ensure,
    GetProfile,
    UpsertProfile,
    AppendHistory,
    SetNextStep,
    GetHistory,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ensure => write!(f, "ensure"),
            Self::GetProfile => write!(f, "get-profile"),
            Self::UpsertProfile => write!(f, "upsert-profile"),
            Self::AppendHistory => write!(f, "append-history"),
            Self::SetNextStep => write!(f, "set-next-step"),
            Self::GetHistory => write!(f, "get-history"),
        }
    }
}

/// Failures carry the key and operation they were raised for and nothing
/// read from storage beyond the parser's own message.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} for '{user_key}': corrupt profile: {reason}")]
    CorruptProfile {
        user_key: UserKey,
        operation: Operation,
        reason: String,
    },
    #[error("{operation} for '{user_key}': invalid patch: {reason}")]
    InvalidPatch {
        user_key: UserKey,
        operation: Operation,
        reason: String,
    },
    #[error("{operation} for '{user_key}': history entry is empty")]
    EmptyEntry {
        user_key: UserKey,
        operation: Operation,
    },
    #[error("{operation} for '{user_key}': storage failure: {source}")]
    Io {
        user_key: UserKey,
        operation: Operation,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn user_key(&self) -> &UserKey {
        match self {
            Self::CorruptProfile { user_key, .. }
            | Self::InvalidPatch { user_key, .. }
            | Self::EmptyEntry { user_key, .. }
            | Self::Io { user_key, .. } => user_key,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::CorruptProfile { operation, .. }
            | Self::InvalidPatch { operation, .. }
            | Self::EmptyEntry { operation, .. }
            | Self::Io { operation, .. } => *operation,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
