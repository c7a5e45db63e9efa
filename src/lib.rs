// モジュール定義
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
mod state;

pub use application::ports::{AlertSink, EntityCache, SessionProvider, SyncTransport};
pub use application::services::{
    CloseOutcome, EntityCollection, MergeSummary, MutationController, ReconciliationService,
    SubmissionCoordinator, SubmissionOutcome, TransactionLedger, UserDirectory,
};
pub use domain::sync::{SyncError, TransportError, ValidationError};
pub use infrastructure::cache::{MemoryEntityCache, SqliteEntityCache};
pub use infrastructure::database::ConnectionPool;
pub use shared::config::{AppConfig, CacheBackend};
pub use shared::error::AppError;
pub use state::AppState;

/// ログ設定の初期化。`RUST_LOG` が無ければ自クレートを debug で出す
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warikan_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
