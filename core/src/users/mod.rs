pub mod error;
pub mod history;
pub mod key;
pub mod locks;
pub mod paths;
pub mod profile;
pub mod store;

pub use error::{Operation, StoreError, StoreResult};
pub use history::HistoryEntry;
pub use key::UserKey;
pub use locks::KeyedLocks;
pub use paths::UserPaths;
pub use profile::{Profile, ProfilePatch};
pub use store::UserProfileStore;
