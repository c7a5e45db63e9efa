pub mod memory_cache;
pub mod sqlite_cache;

pub use memory_cache::MemoryEntityCache;
pub use sqlite_cache::SqliteEntityCache;
