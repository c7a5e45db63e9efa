use super::entity_collection::EntityCollection;
use super::pending_queue::PendingSubmissionQueue;
use super::submission_coordinator::{SubmissionCoordinator, SubmissionOutcome};
use super::transaction_ledger::TransactionLedger;
use crate::application::ports::{AlertSink, UserAlert};
use crate::domain::entities::Transaction;
use crate::domain::sync::{
    SyncError, Syncable, TrackedFields, ValidationError, lifecycle, snapshot,
};
use crate::domain::value_objects::{Intent, LocalId, SessionContext};
use crate::shared::config::SyncConfig;
use chrono::Utc;
use std::sync::Arc;

/// `close_edit` / `delete` の結果
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// 未送信のエンティティをその場で破棄した
    Discarded,
    /// 変更が無いので送信しなかった
    Unchanged,
    /// 入力エラー。値はスナップショットから戻してある
    Rejected(ValidationError),
    Submitted(SubmissionOutcome),
    /// 送信に失敗した。ローカルの変更は残っているので後で再送できる
    Deferred(SyncError),
}

impl CloseOutcome {
    pub fn submitted(&self) -> bool {
        matches!(self, CloseOutcome::Submitted(_))
    }
}

type Materializer<E> = fn(&E, &SessionContext) -> Vec<Transaction>;

struct LedgerHook<E> {
    ledger: Arc<TransactionLedger>,
    materialize: Materializer<E>,
}

enum CloseStep {
    Discard,
    Unchanged,
    Rejected(ValidationError),
    Submit(Vec<Transaction>),
}

/// 1 種類のエンティティについて、編集開始から保存・削除までを受け持つ
pub struct MutationController<E: Syncable> {
    collection: EntityCollection<E>,
    coordinator: Arc<SubmissionCoordinator>,
    alerts: Arc<dyn AlertSink>,
    config: SyncConfig,
    pending: PendingSubmissionQueue<Transaction>,
    ledger: Option<LedgerHook<E>>,
}

impl<E: Syncable> MutationController<E> {
    pub fn new(
        collection: EntityCollection<E>,
        coordinator: Arc<SubmissionCoordinator>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let config = coordinator.config().clone();
        Self {
            collection,
            coordinator,
            alerts,
            config,
            pending: PendingSubmissionQueue::new(),
            ledger: None,
        }
    }

    /// 保存時に家計簿側のトランザクションを作る場合に設定する
    pub fn with_ledger(mut self, ledger: Arc<TransactionLedger>, materialize: Materializer<E>) -> Self {
        self.ledger = Some(LedgerHook {
            ledger,
            materialize,
        });
        self
    }

    pub fn collection(&self) -> &EntityCollection<E> {
        &self.collection
    }

    pub fn pending(&self) -> &PendingSubmissionQueue<Transaction> {
        &self.pending
    }

    /// 新規作成。そのまま編集セッションを開く
    pub async fn create(
        &self,
        fields: E::Fields,
        context: &SessionContext,
    ) -> Result<LocalId, SyncError> {
        let mut entity = E::draft(fields, Some(context.user_id.clone()));
        snapshot::begin_snapshot(&mut entity)?;
        let local_id = self.collection.insert(entity).await;
        tracing::debug!(kind = %E::KIND, local_id = %local_id, "Entity drafted");
        Ok(local_id)
    }

    pub async fn begin_edit(&self, local_id: &LocalId) -> Result<(), SyncError> {
        self.collection
            .update(local_id, |entity| snapshot::begin_snapshot(entity))
            .await
            .ok_or_else(|| self.not_found(local_id))?
    }

    /// エンティティをその場で書き換える。セッションが無ければ先にスナップショットを取る
    pub async fn edit(
        &self,
        local_id: &LocalId,
        mutate: impl FnOnce(&mut E),
    ) -> Result<(), SyncError> {
        self.collection
            .update(local_id, |entity| {
                if entity.shadow().is_none() {
                    snapshot::begin_snapshot(entity)?;
                }
                mutate(entity);
                Ok::<_, SyncError>(())
            })
            .await
            .ok_or_else(|| self.not_found(local_id))?
    }

    /// 編集の取り消し。作成途中のものは破棄する
    pub async fn cancel_edit(&self, local_id: &LocalId) -> Result<(), SyncError> {
        let discard = self
            .collection
            .update(local_id, |entity| {
                if entity.meta().intent == Intent::Add {
                    return Ok(true);
                }
                if entity.shadow().is_some() {
                    snapshot::restore(entity)?;
                    snapshot::clear_snapshot(entity);
                }
                Ok::<_, SyncError>(false)
            })
            .await
            .ok_or_else(|| self.not_found(local_id))??;

        if discard {
            self.discard(local_id).await;
        }
        Ok(())
    }

    /// 編集セッションを閉じ、必要なら送信する
    pub async fn close_edit(
        &self,
        local_id: &LocalId,
        context: &SessionContext,
    ) -> Result<CloseOutcome, SyncError> {
        self.ensure_idle(local_id)?;

        let materialize = self.ledger.as_ref().map(|hook| hook.materialize);
        let step = self
            .collection
            .update(local_id, |entity| prepare_close(entity, context, materialize))
            .await
            .ok_or_else(|| self.not_found(local_id))??;

        match step {
            CloseStep::Discard => {
                tracing::debug!(kind = %E::KIND, local_id = %local_id, "Blank draft discarded");
                self.discard(local_id).await;
                Ok(CloseOutcome::Discarded)
            }
            CloseStep::Unchanged => {
                tracing::debug!(kind = %E::KIND, local_id = %local_id, "No changes to submit");
                Ok(CloseOutcome::Unchanged)
            }
            CloseStep::Rejected(err) => {
                tracing::info!(kind = %E::KIND, local_id = %local_id, error = %err, "Edit rejected");
                self.alerts
                    .notify(UserAlert::warning("Please check your input", err.to_string()));
                Ok(CloseOutcome::Rejected(err))
            }
            CloseStep::Submit(entries) => {
                let entries = self.unrecorded(entries).await;
                self.submit(local_id, context, entries).await
            }
        }
    }

    /// 削除。サーバー未登録のものは通信せずに捨てる
    pub async fn delete(
        &self,
        local_id: &LocalId,
        context: &SessionContext,
    ) -> Result<CloseOutcome, SyncError> {
        self.ensure_idle(local_id)?;

        let is_new = self
            .collection
            .update(local_id, |entity| {
                if entity.meta().intent == Intent::Add {
                    return true;
                }
                lifecycle::mark_for_deletion(entity);
                entity.meta_mut().stamp_update(&context.user_id, Utc::now());
                false
            })
            .await
            .ok_or_else(|| self.not_found(local_id))?;

        if is_new {
            self.discard(local_id).await;
            return Ok(CloseOutcome::Discarded);
        }
        self.submit(local_id, context, Vec::new()).await
    }

    /// 親の送信が通ったときだけ、この保存で作ったものを保留キューに載せる。
    /// 失敗時は捨てるだけで、キューに残っている他の保存の分には触らない
    async fn submit(
        &self,
        local_id: &LocalId,
        context: &SessionContext,
        entries: Vec<Transaction>,
    ) -> Result<CloseOutcome, SyncError> {
        match self.coordinator.submit(&self.collection, local_id, context).await {
            Ok(outcome) => {
                self.finish_session(local_id).await;
                self.pending.extend(entries).await;
                self.drain_pending(context).await;
                Ok(CloseOutcome::Submitted(outcome))
            }
            Err(err @ SyncError::ReconciliationIntegrity { .. }) => {
                // 親は作成済みなので、依存する保存は進める
                self.finish_session(local_id).await;
                self.pending.extend(entries).await;
                self.drain_pending(context).await;
                Ok(CloseOutcome::Deferred(err))
            }
            Err(err @ SyncError::Transport(_)) => {
                if !entries.is_empty() {
                    tracing::debug!(
                        dropped = entries.len(),
                        "Ledger entries dropped after failed save"
                    );
                }
                Ok(CloseOutcome::Deferred(err))
            }
            Err(err) => Err(err),
        }
    }

    /// 同じ明細から既に作ったトランザクションを除く
    async fn unrecorded(&self, entries: Vec<Transaction>) -> Vec<Transaction> {
        let Some(hook) = &self.ledger else {
            return entries;
        };
        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            let recorded = match &entry.fields.source_item {
                Some(item) => hook.ledger.has_entry_for_item(item).await,
                None => false,
            };
            if recorded {
                tracing::debug!(source_item = ?entry.fields.source_item, "Ledger entry already recorded");
            } else {
                fresh.push(entry);
            }
        }
        fresh
    }

    async fn finish_session(&self, local_id: &LocalId) {
        self.collection
            .update(local_id, |entity| snapshot::clear_snapshot(entity))
            .await;
    }

    async fn drain_pending(&self, context: &SessionContext) {
        if !self.config.drain_pending_after_submit {
            return;
        }
        let Some(hook) = &self.ledger else {
            return;
        };

        let report = self
            .pending
            .drain_sequential(|transaction| {
                let ledger = Arc::clone(&hook.ledger);
                async move {
                    let backup = transaction.clone();
                    ledger
                        .record(transaction, context)
                        .await
                        .map(|_| ())
                        .map_err(|err| (backup, err))
                }
            })
            .await;

        if report.submitted + report.failed > 0 {
            tracing::info!(
                submitted = report.submitted,
                failed = report.failed,
                "Pending submissions drained"
            );
        }
    }

    async fn discard(&self, local_id: &LocalId) {
        if let Some(entity) = self.collection.remove(local_id).await {
            self.coordinator.discard_local(&entity).await;
        }
    }

    /// 送信中のものに触るとスナップショットも保留キューも壊れる
    fn ensure_idle(&self, local_id: &LocalId) -> Result<(), SyncError> {
        if self.coordinator.is_in_flight(E::KIND, local_id) {
            return Err(SyncError::AlreadyInFlight {
                kind: E::KIND,
                local_id: local_id.clone(),
            });
        }
        Ok(())
    }

    fn not_found(&self, local_id: &LocalId) -> SyncError {
        SyncError::NotFound {
            kind: E::KIND,
            local_id: local_id.clone(),
        }
    }
}

/// ロックを保持したまま検証と差分判定を行う
fn prepare_close<E: Syncable>(
    entity: &mut E,
    context: &SessionContext,
    materialize: Option<Materializer<E>>,
) -> Result<CloseStep, SyncError> {
    let intent = entity.meta().intent;

    if lifecycle::is_blank(entity.title()) {
        if intent == Intent::Add {
            return Ok(CloseStep::Discard);
        }
        if entity.shadow().is_some() {
            snapshot::restore_title(entity)?;
        }
        return Ok(CloseStep::Rejected(ValidationError::BlankTitle {
            kind: E::KIND,
            local_id: entity.local_id().clone(),
        }));
    }

    if let Err(reason) = entity.fields().validate() {
        return Ok(CloseStep::Rejected(ValidationError::InvalidField {
            kind: E::KIND,
            local_id: entity.local_id().clone(),
            reason,
        }));
    }

    let pruned = lifecycle::prune_cancelled_children(entity);
    if pruned > 0 {
        tracing::debug!(kind = %E::KIND, pruned, "Blank child drafts pruned");
    }

    let blanks = lifecycle::blank_existing_children(entity);
    if !blanks.is_empty() {
        if let Some(shadow) = entity.shadow().map(|s| s.state().clone()) {
            lifecycle::restore_blank_children(entity, &shadow);
        }
        return Ok(CloseStep::Rejected(ValidationError::BlankChildTitle {
            count: blanks.len(),
            local_ids: blanks,
        }));
    }

    let dirty = matches!(intent, Intent::Add | Intent::Delete) || snapshot::has_changes(entity);
    if !dirty {
        snapshot::clear_snapshot(entity);
        return Ok(CloseStep::Unchanged);
    }

    entity.meta_mut().stamp_update(&context.user_id, Utc::now());
    let entries = materialize
        .map(|materialize| materialize(entity, context))
        .unwrap_or_default();
    Ok(CloseStep::Submit(entries))
}
