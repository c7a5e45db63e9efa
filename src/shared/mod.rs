pub mod config;
pub mod error;

pub use config::{AppConfig, CacheBackend, CacheConfig, DatabaseConfig, SyncConfig};
pub use error::{AppError, Result};
