use super::entity_collection::EntityCollection;
use super::transaction_ledger::TransactionLedger;
use crate::application::ports::{AlertSink, CacheQuery, EntityCache, SyncTransport, UserAlert};
use crate::domain::entities::Transaction;
use crate::domain::sync::{
    MergeGuard, MergeReport, Origin, SyncError, Syncable, WireRecord, decode_record,
    reconcile,
};
use crate::domain::value_objects::{EntityKind, RemoteId, SessionContext};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// 起動時の読み込み結果を種別をまたいで合算したもの
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub restored: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl MergeSummary {
    pub fn absorb(&mut self, report: &MergeReport) {
        self.added += report.added;
        self.updated += report.updated;
        self.removed += report.removed;
    }
}

/// サーバーの一覧を取得してローカルのコレクションとキャッシュへ取り込む
pub struct ReconciliationService {
    transport: Arc<dyn SyncTransport>,
    cache: Arc<dyn EntityCache>,
    alerts: Arc<dyn AlertSink>,
}

impl ReconciliationService {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        cache: Arc<dyn EntityCache>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            transport,
            cache,
            alerts,
        }
    }

    pub async fn refresh<E: Syncable>(
        &self,
        collection: &EntityCollection<E>,
        context: &SessionContext,
    ) -> Result<MergeReport, SyncError> {
        let (entities, guard, rejected) = self.fetch::<E>(context).await?;
        let merged = self.merge_into(collection, entities, &guard).await?;
        self.mirror_merge::<E>(merged.removed, merged.records).await;
        self.report_rejected(rejected);

        let report = merged.report;
        tracing::info!(
            kind = %E::KIND,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            rejected,
            "Collection reconciled"
        );
        Ok(report)
    }

    /// 家計簿は月ごとのバケットに分かれているので、サーバーの一覧を月で振り分けてから突き合わせる
    pub async fn refresh_ledger(
        &self,
        ledger: &TransactionLedger,
        context: &SessionContext,
    ) -> Result<MergeReport, SyncError> {
        let (transactions, guard, rejected) = self.fetch::<Transaction>(context).await?;

        let mut by_month: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
        for key in ledger.bucket_keys().await {
            by_month.entry(key).or_default();
        }
        for transaction in transactions {
            by_month
                .entry(transaction.bucket_key())
                .or_default()
                .push(transaction);
        }

        let mut report = MergeReport::default();
        let mut removed = Vec::new();
        let mut records = Vec::new();
        for (key, transactions) in by_month {
            let bucket = ledger.bucket(&key).await;
            let merged = self.merge_into(&bucket, transactions, &guard).await?;
            report.added += merged.report.added;
            report.updated += merged.report.updated;
            report.removed += merged.report.removed;
            removed.extend(merged.removed);
            records.extend(merged.records);
        }
        // 月をまたいで移動したものは片方で消えて片方で増えるので、キャッシュ操作は最後にまとめる
        self.mirror_merge::<Transaction>(removed, records).await;
        self.report_rejected(rejected);

        tracing::info!(
            kind = %EntityKind::Transaction,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            rejected,
            "Ledger reconciled"
        );
        Ok(report)
    }

    async fn fetch<E: Syncable>(
        &self,
        context: &SessionContext,
    ) -> Result<(Vec<E>, MergeGuard, usize), SyncError> {
        match self.transport.fetch(E::KIND, context).await {
            Ok(records) => Ok(decode_all::<E>(records)),
            Err(err) => {
                if err.is_cancelled() {
                    tracing::debug!(kind = %E::KIND, "Fetch cancelled");
                } else {
                    tracing::warn!(kind = %E::KIND, error = %err, "Fetch failed");
                    self.alerts.notify(UserAlert::warning(
                        "Sync problem",
                        "Could not load the latest data. Showing what is saved on this device.",
                    ));
                }
                Err(err.into())
            }
        }
    }

    async fn merge_into<E: Syncable>(
        &self,
        collection: &EntityCollection<E>,
        entities: Vec<E>,
        guard: &MergeGuard,
    ) -> Result<Merged, SyncError> {
        let merged = collection
            .with_all_mut(|local| {
                let before = remote_ids(local.iter());
                let report = reconcile::merge_collection_guarded(local, entities, guard)?;
                let after = remote_ids(local.iter());
                let removed: Vec<RemoteId> = before.difference(&after).cloned().collect();
                let records = local
                    .iter()
                    .map(|entity| WireRecord::from_node(entity))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, SyncError>(Merged {
                    report,
                    removed,
                    records,
                })
            })
            .await;

        merged.inspect_err(|err| {
            tracing::error!(kind = %E::KIND, error = %err, "Merge failed");
            self.alerts.notify(UserAlert::error(
                "Sync problem",
                "Some data could not be merged. Please try again later.",
            ));
        })
    }

    async fn mirror_merge<E: Syncable>(&self, removed: Vec<RemoteId>, records: Vec<WireRecord>) {
        let kept: HashSet<&RemoteId> = records.iter().filter_map(|r| r.id.as_ref()).collect();
        for remote_id in removed.iter().filter(|id| !kept.contains(id)) {
            if let Err(err) = self
                .cache
                .delete(E::KIND, &CacheQuery::RemoteId(remote_id.clone()))
                .await
            {
                tracing::error!(kind = %E::KIND, error = %err, "Failed to drop tombstoned entity");
            }
        }
        for record in records {
            if let Err(err) = self.cache.save(record).await {
                tracing::error!(kind = %E::KIND, error = %err, "Failed to mirror merged entity");
            }
        }
    }

    fn report_rejected(&self, rejected: usize) {
        if rejected > 0 {
            self.alerts.notify(UserAlert::warning(
                "Sync problem",
                format!("{rejected} record(s) could not be loaded and were skipped."),
            ));
        }
    }

    /// オフライン起動時にキャッシュのミラーを空のコレクションへ読み込む
    pub async fn restore_from_cache<E: Syncable>(
        &self,
        collection: &EntityCollection<E>,
    ) -> Result<usize, SyncError> {
        if !collection.is_empty().await {
            tracing::debug!(kind = %E::KIND, "Collection already populated, skipping cache restore");
            return Ok(0);
        }

        let restored = self.read_cache::<E>().await?;
        let count = restored.len();
        collection
            .with_all_mut(|local| local.extend(restored))
            .await;
        tracing::info!(kind = %E::KIND, count, "Collection restored from cache");
        Ok(count)
    }

    /// キャッシュ上のトランザクションを月のバケットへ戻す。既に載っているものはそのまま
    pub async fn restore_ledger_from_cache(
        &self,
        ledger: &TransactionLedger,
    ) -> Result<usize, SyncError> {
        let mut adopted = 0;
        for transaction in self.read_cache::<Transaction>().await? {
            if ledger.adopt(transaction).await {
                adopted += 1;
            }
        }
        tracing::info!(kind = %EntityKind::Transaction, count = adopted, "Ledger restored from cache");
        Ok(adopted)
    }

    async fn read_cache<E: Syncable>(&self) -> Result<Vec<E>, SyncError> {
        let records = self.cache.list(E::KIND).await?;
        let mut restored = Vec::with_capacity(records.len());
        for record in records {
            match decode_record::<E>(record, Origin::Cache) {
                Ok(entity) => restored.push(entity),
                Err(err) => {
                    tracing::warn!(kind = %E::KIND, error = %err, "Skipping unreadable cache entry")
                }
            }
        }
        Ok(restored)
    }
}

struct Merged {
    report: MergeReport,
    removed: Vec<RemoteId>,
    records: Vec<WireRecord>,
}

/// 1 件の不正レコードで全体を止めない。弾いたレコードの分は削除判定から守る
fn decode_all<E: Syncable>(records: Vec<WireRecord>) -> (Vec<E>, MergeGuard, usize) {
    let mut entities = Vec::with_capacity(records.len());
    let mut guard = MergeGuard::default();
    let mut rejected = 0;

    for record in records {
        let id = record.id.clone();
        match decode_record::<E>(record, Origin::Server) {
            Ok(entity) => entities.push(entity),
            Err(err) => {
                rejected += 1;
                tracing::warn!(kind = %E::KIND, error = %err, "Rejected server record");
                match id {
                    Some(id) => {
                        guard.keep.insert(id);
                    }
                    None => guard.skip_tombstones = true,
                }
            }
        }
    }
    (entities, guard, rejected)
}

fn remote_ids<'a, E: Syncable>(entities: impl Iterator<Item = &'a E>) -> HashSet<RemoteId> {
    entities
        .filter_map(|entity| entity.meta().remote_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AlertLevel;
    use crate::domain::entities::{Event, EventFields};
    use crate::domain::sync::{SubmissionRequest, SubmissionResponse, SyncMeta, TransportError};
    use crate::domain::value_objects::{EntityKind, Intent, UserId};
    use crate::infrastructure::alerts::AlertInbox;
    use crate::infrastructure::cache::MemoryEntityCache;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;
    use serde_json::json;

    mock! {
        pub Transport {}

        #[async_trait]
        impl SyncTransport for Transport {
            async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionResponse, TransportError>;
            async fn fetch(
                &self,
                kind: EntityKind,
                context: &SessionContext,
            ) -> Result<Vec<WireRecord>, TransportError>;
        }
    }

    fn context() -> SessionContext {
        SessionContext::new(UserId::new("user-1".into()).unwrap(), "acc-1", "device-1")
    }

    fn record(id: Option<&str>, title: &str, with_timestamp: bool) -> WireRecord {
        let updated_at = with_timestamp.then_some("2024-05-01T00:00:00Z");
        serde_json::from_value(json!({
            "kind": "event",
            "id": id,
            "intent": "edit",
            "updated_at": updated_at,
            "fields": {"title": title, "currency": "JPY"},
        }))
        .unwrap()
    }

    fn synced(id: &str, title: &str) -> Event {
        Event::from_parts(
            SyncMeta::synced(RemoteId::new(id.into()).unwrap(), None, Utc::now()),
            EventFields::titled(title),
        )
    }

    fn service(transport: MockTransport) -> (ReconciliationService, Arc<MemoryEntityCache>, Arc<AlertInbox>) {
        let cache = Arc::new(MemoryEntityCache::new(64));
        let alerts = Arc::new(AlertInbox::default());
        let service = ReconciliationService::new(Arc::new(transport), cache.clone(), alerts.clone());
        (service, cache, alerts)
    }

    #[tokio::test]
    async fn test_refresh_merges_and_mirrors() {
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(vec![record(Some("2"), "two*", true), record(Some("4"), "four", true)]));
        let (service, cache, alerts) = service(transport);
        let collection = EntityCollection::from_vec(vec![synced("1", "one"), synced("2", "two")]);
        cache
            .save(WireRecord::from_node(&synced("1", "one")).unwrap())
            .await
            .unwrap();

        let report = service.refresh(&collection, &context()).await.unwrap();

        assert_eq!(report, MergeReport { added: 1, updated: 1, removed: 1 });
        let titles: Vec<String> = collection
            .snapshot_all()
            .await
            .into_iter()
            .map(|e| e.fields.title)
            .collect();
        assert_eq!(titles, vec!["two*", "four"]);
        let cached = cache.list(EntityKind::Event).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert!(cached.iter().all(|r| r.id.as_ref().map(|id| id.as_str()) != Some("1")));
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped_not_fatal() {
        let mut transport = MockTransport::new();
        transport.expect_fetch().returning(|_, _| {
            Ok(vec![record(Some("1"), "one", false), record(Some("2"), "two", true)])
        });
        let (service, _cache, alerts) = service(transport);
        let collection = EntityCollection::from_vec(vec![synced("1", "one (local)")]);

        let report = service.refresh(&collection, &context()).await.unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(collection.len().await, 2);
        assert_eq!(alerts.drain()[0].level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn test_record_without_id_disables_tombstoning() {
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .returning(|_, _| Ok(vec![record(None, "mystery", true)]));
        let (service, _cache, _alerts) = service(transport);
        let collection = EntityCollection::from_vec(vec![synced("1", "one")]);

        let report = service.refresh(&collection, &context()).await.unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(collection.len().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_not_alerted() {
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .returning(|_, _| Err(TransportError::Cancelled));
        let (service, _cache, alerts) = service(transport);
        let collection = EntityCollection::from_vec(vec![synced("1", "one")]);

        let err = service.refresh(&collection, &context()).await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(TransportError::Cancelled)));
        assert!(alerts.is_empty());
        assert_eq!(collection.len().await, 1);
    }

    #[tokio::test]
    async fn test_restore_from_cache_keeps_drafts() {
        let (service, cache, _alerts) = service(MockTransport::new());
        let draft = Event::draft(EventFields::titled("Offline trip"), None);
        cache.save(WireRecord::from_node(&draft).unwrap()).await.unwrap();
        cache
            .save(WireRecord::from_node(&synced("7", "seven")).unwrap())
            .await
            .unwrap();

        let collection = EntityCollection::<Event>::new();
        assert_eq!(service.restore_from_cache(&collection).await.unwrap(), 2);

        let restored = collection.get(&draft.meta.local_id).await.unwrap();
        assert_eq!(restored.meta.intent, Intent::Add);
        assert_eq!(service.restore_from_cache(&collection).await.unwrap(), 0);
    }
}
