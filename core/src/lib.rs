pub mod config;
pub mod storage;
pub mod traits;
pub mod users;

pub use config::*;
pub use storage::*;
pub use traits::*;
pub use users::*;
