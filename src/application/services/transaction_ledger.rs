use super::entity_collection::EntityCollection;
use super::pending_queue::DrainReport;
use super::submission_coordinator::{SubmissionCoordinator, SubmissionOutcome};
use crate::domain::entities::Transaction;
use crate::domain::sync::{SyncError, Syncable};
use crate::domain::value_objects::{Amount, EntityKind, Intent, LocalId, SessionContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 個人の家計簿。トランザクションを月（`YYYY-MM`）ごとのバケットに分けて持つ
pub struct TransactionLedger {
    buckets: RwLock<BTreeMap<String, EntityCollection<Transaction>>>,
    coordinator: Arc<SubmissionCoordinator>,
}

impl TransactionLedger {
    pub fn new(coordinator: Arc<SubmissionCoordinator>) -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            coordinator,
        }
    }

    /// バケットが無ければ作る。作成は書き込みロック 1 回の中で行うので二重に作られない
    pub async fn bucket(&self, key: &str) -> EntityCollection<Transaction> {
        if let Some(bucket) = self.buckets.read().await.get(key) {
            return bucket.clone();
        }
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(bucket = key, "Creating ledger bucket");
                EntityCollection::new()
            })
            .clone()
    }

    /// 該当月のバケットに追加して送信する。失敗してもバケットには残る。
    /// 同じローカル ID が既にあれば追加せず、バケット内のものを再送する
    pub async fn record(
        &self,
        transaction: Transaction,
        context: &SessionContext,
    ) -> Result<SubmissionOutcome, SyncError> {
        let bucket = self.bucket(&transaction.bucket_key()).await;
        let local_id = transaction.local_id().clone();
        if !bucket.insert_if_absent(transaction).await {
            tracing::debug!(local_id = %local_id, "Transaction already in ledger, resubmitting");
        }
        self.coordinator.submit(&bucket, &local_id, context).await
    }

    /// キャッシュなどから読み戻したトランザクションを送信せずに置く
    pub async fn adopt(&self, transaction: Transaction) -> bool {
        self.bucket(&transaction.bucket_key())
            .await
            .insert_if_absent(transaction)
            .await
    }

    /// 指定の明細から作られたトランザクションが既に載っているか
    pub async fn has_entry_for_item(&self, item: &LocalId) -> bool {
        let buckets: Vec<_> = self.buckets.read().await.values().cloned().collect();
        for bucket in buckets {
            if bucket
                .any(|tx| tx.fields.source_item.as_ref() == Some(item))
                .await
            {
                return true;
            }
        }
        false
    }

    /// 未送信（作成・削除待ち）のものを月の古い順に 1 件ずつ送る
    pub async fn submit_unsent(&self, context: &SessionContext) -> DrainReport {
        let buckets: Vec<_> = self.buckets.read().await.values().cloned().collect();
        let mut report = DrainReport::default();

        for bucket in buckets {
            let unsent: Vec<LocalId> = bucket
                .snapshot_all()
                .await
                .into_iter()
                .filter(|tx| matches!(tx.meta.intent, Intent::Add | Intent::Delete))
                .map(|tx| tx.meta.local_id)
                .filter(|id| !self.coordinator.is_in_flight(EntityKind::Transaction, id))
                .collect();

            for local_id in unsent {
                match self.coordinator.submit(&bucket, &local_id, context).await {
                    Ok(_) => report.submitted += 1,
                    Err(err) => {
                        tracing::warn!(local_id = %local_id, error = %err, "Unsent transaction still pending");
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }

    pub async fn bucket_keys(&self) -> Vec<String> {
        self.buckets.read().await.keys().cloned().collect()
    }

    pub async fn month(&self, key: &str) -> Vec<Transaction> {
        let bucket = self.buckets.read().await.get(key).cloned();
        match bucket {
            Some(bucket) => bucket.snapshot_all().await,
            None => Vec::new(),
        }
    }

    pub async fn month_total(&self, key: &str) -> Amount {
        self.month(key)
            .await
            .iter()
            .filter(|tx| !tx.meta.intent.is_delete())
            .map(|tx| tx.fields.amount)
            .sum()
    }
}
