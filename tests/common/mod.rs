use std::path::Path;
use std::sync::Arc;

use warikan_sync::application::services::{
    EntityCollection, MutationController, ReconciliationService, SubmissionCoordinator,
    TransactionLedger,
};
use warikan_sync::domain::entities::Event;
use warikan_sync::domain::value_objects::{SessionContext, UserId};
use warikan_sync::infrastructure::alerts::AlertInbox;
use warikan_sync::infrastructure::cache::SqliteEntityCache;
use warikan_sync::infrastructure::database::ConnectionPool;
use warikan_sync::infrastructure::transport::InMemoryServer;
use warikan_sync::shared::config::SyncConfig;

pub struct SyncHarness {
    pub server: Arc<InMemoryServer>,
    pub cache: Arc<SqliteEntityCache>,
    pub alerts: Arc<AlertInbox>,
    pub ledger: Arc<TransactionLedger>,
    pub events: MutationController<Event>,
    pub reconciliation: ReconciliationService,
}

pub fn context() -> SessionContext {
    SessionContext::new(
        UserId::new("user-1".into()).expect("user id"),
        "account-1",
        "device-1",
    )
}

pub async fn memory_pool() -> ConnectionPool {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    pool
}

pub async fn file_pool(path: &Path) -> ConnectionPool {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = ConnectionPool::new(&url, 1).await.expect("file sqlite");
    pool.migrate().await.expect("migrations");
    pool
}

pub fn harness(pool: ConnectionPool, server: Arc<InMemoryServer>) -> SyncHarness {
    let cache = Arc::new(SqliteEntityCache::new(pool));
    let alerts = Arc::new(AlertInbox::default());
    let coordinator = Arc::new(SubmissionCoordinator::new(
        server.clone(),
        cache.clone(),
        alerts.clone(),
        SyncConfig::default(),
    ));
    let ledger = Arc::new(TransactionLedger::new(coordinator.clone()));
    let events = MutationController::new(EntityCollection::new(), coordinator, alerts.clone())
        .with_ledger(ledger.clone(), Event::ledger_entries);
    let reconciliation = ReconciliationService::new(server.clone(), cache.clone(), alerts.clone());

    SyncHarness {
        server,
        cache,
        alerts,
        ledger,
        events,
        reconciliation,
    }
}
