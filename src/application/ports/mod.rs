pub mod alerts;
pub mod cache;
pub mod session;
pub mod transport;

pub use alerts::{AlertLevel, AlertSink, UserAlert};
pub use cache::{CacheQuery, EntityCache, cache_key};
pub use session::SessionProvider;
pub use transport::SyncTransport;
