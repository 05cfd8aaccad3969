pub mod factory;
pub mod fs;
pub mod in_memory;

pub use factory::create_storage;
pub use fs::FsStorage;
pub use in_memory::InMemoryStorage;
