use crate::application::ports::{AlertSink, EntityCache, SessionProvider, SyncTransport};
use crate::application::services::{
    EntityCollection, MergeSummary, MutationController, ReconciliationService,
    SubmissionCoordinator, TransactionLedger, UserDirectory,
};
use crate::domain::entities::{Event, PaymentMethod, User};
use crate::domain::value_objects::{LocalId, SessionContext};
use crate::infrastructure::alerts::{AlertInbox, TracingAlertSink};
use crate::infrastructure::cache::{MemoryEntityCache, SqliteEntityCache};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::session::StaticSessionProvider;
use crate::infrastructure::transport::InMemoryServer;
use crate::shared::config::{AppConfig, CacheBackend};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<ConnectionPool>,
    pub cache: Arc<dyn EntityCache>,
    pub alerts: Arc<AlertInbox>,
    pub session: Arc<StaticSessionProvider>,
    pub coordinator: Arc<SubmissionCoordinator>,
    pub ledger: Arc<TransactionLedger>,
    pub events: Arc<MutationController<Event>>,
    pub payment_methods: Arc<MutationController<PaymentMethod>>,
    pub reconciliation: Arc<ReconciliationService>,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    /// サーバー実装を差し込まない場合はプロセス内サーバーで動かす
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        Self::with_transport(config, Arc::new(InMemoryServer::new())).await
    }

    pub async fn with_transport(
        config: AppConfig,
        transport: Arc<dyn SyncTransport>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

        let (db_pool, cache): (Option<ConnectionPool>, Arc<dyn EntityCache>) =
            match config.cache.backend {
                CacheBackend::Memory => (None, Arc::new(MemoryEntityCache::new(config.cache.capacity))),
                CacheBackend::Sqlite => {
                    ensure_database_dir(&config.database.url)?;
                    let pool = ConnectionPool::from_config(&config.database)
                        .await
                        .with_context(|| format!("Failed to open {}", config.database.url))?;
                    pool.migrate().await.context("Failed to run cache migrations")?;
                    (Some(pool.clone()), Arc::new(SqliteEntityCache::new(pool)))
                }
            };
        tracing::info!(backend = config.cache.backend.as_str(), "Entity cache ready");

        let alerts = Arc::new(AlertInbox::default());
        let sinks: Vec<Arc<dyn AlertSink>> = vec![alerts.clone(), Arc::new(TracingAlertSink)];
        let sink: Arc<dyn AlertSink> = Arc::new(sinks);

        let coordinator = Arc::new(SubmissionCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&cache),
            Arc::clone(&sink),
            config.sync.clone(),
        ));
        let ledger = Arc::new(TransactionLedger::new(Arc::clone(&coordinator)));

        let events = MutationController::new(
            EntityCollection::new(),
            Arc::clone(&coordinator),
            Arc::clone(&sink),
        )
        .with_ledger(Arc::clone(&ledger), Event::ledger_entries);
        let payment_methods = MutationController::new(
            EntityCollection::new(),
            Arc::clone(&coordinator),
            Arc::clone(&sink),
        );
        let reconciliation = Arc::new(ReconciliationService::new(
            transport,
            Arc::clone(&cache),
            sink,
        ));

        Ok(Self {
            config,
            db_pool,
            cache,
            alerts,
            session: Arc::new(StaticSessionProvider::default()),
            coordinator,
            ledger,
            events: Arc::new(events),
            payment_methods: Arc::new(payment_methods),
            reconciliation,
            users: Arc::new(UserDirectory::new()),
        })
    }

    /// 起動直後の読み込み。先にキャッシュを出してからサーバーと突き合わせる
    pub async fn load(&self) -> anyhow::Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        summary.restored += self
            .reconciliation
            .restore_from_cache(self.events.collection())
            .await?;
        summary.restored += self
            .reconciliation
            .restore_from_cache(self.payment_methods.collection())
            .await?;
        summary.restored += self
            .reconciliation
            .restore_ledger_from_cache(&self.ledger)
            .await?;

        let context = match self.session.current_session() {
            Ok(context) => context,
            Err(err) => {
                tracing::info!(error = %err, "Not signed in, using cached data only");
                return Ok(summary);
            }
        };

        // 片方の取得に失敗してももう片方は進める
        match self.reconciliation.refresh(self.events.collection(), &context).await {
            Ok(report) => summary.absorb(&report),
            Err(err) => tracing::warn!(error = %err, "Event refresh failed"),
        }
        match self
            .reconciliation
            .refresh(self.payment_methods.collection(), &context)
            .await
        {
            Ok(report) => summary.absorb(&report),
            Err(err) => tracing::warn!(error = %err, "Payment method refresh failed"),
        }
        match self.reconciliation.refresh_ledger(&self.ledger, &context).await {
            Ok(report) => summary.absorb(&report),
            Err(err) => tracing::warn!(error = %err, "Ledger refresh failed"),
        }

        // 前回の起動で送れなかった明細をここで送る
        let drained = self.ledger.submit_unsent(&context).await;
        if drained.submitted > 0 || drained.failed > 0 {
            tracing::info!(
                submitted = drained.submitted,
                failed = drained.failed,
                "Unsent ledger entries retried"
            );
        }
        Ok(summary)
    }

    /// サインインしたユーザーを名簿にも載せる。作成者・更新者の表示はここから引く
    pub async fn sign_in(&self, context: SessionContext, display_name: impl Into<String>) {
        self.users
            .upsert(User::new(context.user_id.clone(), display_name))
            .await;
        tracing::info!(user_id = %context.user_id, "Signed in");
        self.session.sign_in(context);
    }

    pub async fn sign_out(&self) {
        self.session.sign_out();
        tracing::info!("Signed out");
    }

    /// イベントを作った人と最後に更新した人
    pub async fn event_authors(&self, local_id: &LocalId) -> Option<(Option<User>, Option<User>)> {
        let event = self.events.collection().get(local_id).await?;
        Some((
            self.users.entered_by(&event).await,
            self.users.updated_by(&event).await,
        ))
    }

    pub async fn shutdown(&self) {
        if let Some(pool) = &self.db_pool {
            pool.close().await;
        }
    }
}

fn ensure_database_dir(url: &str) -> anyhow::Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}
