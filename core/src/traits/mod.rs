mod storage;

pub use storage::Storage;
