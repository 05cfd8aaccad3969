use crate::storage::FsStorage;
use crate::traits::Storage;
use std::sync::Arc;

pub fn create_storage() -> Arc<dyn Storage> {
    Arc::new(FsStorage::new())
}
