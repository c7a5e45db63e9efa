use super::entity_collection::EntityCollection;
use crate::application::ports::{AlertSink, CacheQuery, EntityCache, SyncTransport, UserAlert};
use crate::domain::sync::{
    SubmissionRequest, SubmissionResponse, SyncError, SyncNode, Syncable, TransportError,
    WireRecord, identity, lifecycle,
};
use crate::domain::value_objects::{EntityKind, Intent, LocalId, RemoteId, SessionContext};
use crate::shared::config::SyncConfig;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Created { remote_id: RemoteId },
    Updated { remote_id: RemoteId },
    /// 呼び出し側のコレクションからは既に取り除かれている
    Deleted { remote_id: RemoteId },
}

impl SubmissionOutcome {
    pub fn remote_id(&self) -> &RemoteId {
        match self {
            SubmissionOutcome::Created { remote_id }
            | SubmissionOutcome::Updated { remote_id }
            | SubmissionOutcome::Deleted { remote_id } => remote_id,
        }
    }
}

type InFlightKey = (EntityKind, LocalId);

struct InFlightGuard {
    registry: Arc<Mutex<HashSet<InFlightKey>>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// エンティティとその子をまとめて 1 リクエストで送信し、結果をコレクションとキャッシュへ反映する
pub struct SubmissionCoordinator {
    transport: Arc<dyn SyncTransport>,
    cache: Arc<dyn EntityCache>,
    alerts: Arc<dyn AlertSink>,
    config: SyncConfig,
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
}

impl SubmissionCoordinator {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        cache: Arc<dyn EntityCache>,
        alerts: Arc<dyn AlertSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            alerts,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_in_flight(&self, kind: EntityKind, local_id: &LocalId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(kind, local_id.clone()))
    }

    fn acquire(&self, kind: EntityKind, local_id: &LocalId) -> Result<InFlightGuard, SyncError> {
        let key = (kind, local_id.clone());
        let mut registry = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !registry.insert(key.clone()) {
            return Err(SyncError::AlreadyInFlight {
                kind,
                local_id: local_id.clone(),
            });
        }
        Ok(InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// intent に応じて作成・更新・削除を送信する。
    ///
    /// コレクションのロックはリクエスト組み立てと結果反映の間だけ保持し、通信中は手放す。
    pub async fn submit<E: Syncable>(
        &self,
        collection: &EntityCollection<E>,
        local_id: &LocalId,
        context: &SessionContext,
    ) -> Result<SubmissionOutcome, SyncError> {
        let _guard = self.acquire(E::KIND, local_id)?;

        let request = collection
            .update(local_id, |entity| {
                identity::ensure_unique_temporary_ids(entity)?;
                SubmissionRequest::for_node(entity, context)
            })
            .await
            .ok_or_else(|| not_found::<E>(local_id))??;
        let intent = request.record.intent;

        self.mirror(&request.record).await;

        tracing::debug!(
            kind = %E::KIND,
            local_id = %local_id,
            operation = %request.operation,
            "Submitting entity"
        );

        match self.transport.submit(request).await {
            Ok(response) => {
                self.apply_success(collection, local_id, intent, response)
                    .await
            }
            Err(err) => self.apply_failure(collection, local_id, err).await,
        }
    }

    async fn apply_success<E: Syncable>(
        &self,
        collection: &EntityCollection<E>,
        local_id: &LocalId,
        intent: Intent,
        response: SubmissionResponse,
    ) -> Result<SubmissionOutcome, SyncError> {
        let remote_id = response.remote_id.clone();

        if intent == Intent::Delete {
            if let Some(removed) = collection.remove(local_id).await {
                self.forget(&removed).await;
            }
            tracing::info!(kind = %E::KIND, remote_id = %remote_id, "Entity deleted");
            return Ok(SubmissionOutcome::Deleted { remote_id });
        }

        let applied = collection
            .update(local_id, |entity| {
                let rewritten = identity::rewrite_graph(entity, &response);
                lifecycle::remove_deleted_children(entity);
                (rewritten, WireRecord::from_node(entity))
            })
            .await;

        let Some((rewritten, record)) = applied else {
            tracing::warn!(
                kind = %E::KIND,
                local_id = %local_id,
                "Entity left the collection while its submission was in flight"
            );
            return Err(not_found::<E>(local_id));
        };

        self.mirror(&record?).await;

        if let Err(err) = rewritten {
            tracing::error!(
                kind = %E::KIND,
                local_id = %local_id,
                error = %err,
                "Server response does not account for every created record"
            );
            self.alerts.notify(UserAlert::error(
                "Sync problem",
                "Some records may not have been saved on the server. Please check and try again.",
            ));
            return Err(err);
        }

        tracing::info!(
            kind = %E::KIND,
            local_id = %local_id,
            remote_id = %remote_id,
            "Entity submitted"
        );

        Ok(match intent {
            Intent::Add => SubmissionOutcome::Created { remote_id },
            _ => SubmissionOutcome::Updated { remote_id },
        })
    }

    async fn apply_failure<E: Syncable>(
        &self,
        collection: &EntityCollection<E>,
        local_id: &LocalId,
        err: TransportError,
    ) -> Result<SubmissionOutcome, SyncError> {
        let preserve_add = self.config.preserve_add_on_create_failure;
        let reverted = collection
            .update(local_id, |entity| {
                lifecycle::revert_after_failure(entity, preserve_add);
                WireRecord::from_node(entity)
            })
            .await;
        if let Some(Ok(record)) = reverted {
            self.mirror(&record).await;
        }

        if err.is_cancelled() {
            tracing::debug!(kind = %E::KIND, local_id = %local_id, "Submission cancelled");
        } else {
            tracing::warn!(
                kind = %E::KIND,
                local_id = %local_id,
                error = %err,
                "Submission failed"
            );
            self.alerts.notify(UserAlert::warning(
                "Could not reach the server",
                format!("Your changes are kept on this device and will be sent later. ({err})"),
            ));
        }

        Err(SyncError::Transport(err))
    }

    /// 未送信のエンティティを破棄したときにキャッシュからも消す
    pub async fn discard_local<E: Syncable>(&self, entity: &E) {
        self.forget(entity).await;
    }

    async fn forget(&self, node: &dyn SyncNode) {
        let Some(query) = CacheQuery::for_meta(node.meta()) else {
            return;
        };
        if let Err(err) = self.cache.delete(node.kind(), &query).await {
            tracing::error!(kind = %node.kind(), error = %err, "Failed to drop cached entity");
        }
    }

    /// キャッシュはミラーなので、書き込みに失敗しても送信自体は続ける
    async fn mirror(&self, record: &WireRecord) {
        if let Err(err) = self.cache.save(record.clone()).await {
            tracing::error!(kind = %record.kind, error = %err, "Failed to mirror entity to cache");
        }
    }
}

fn not_found<E: Syncable>(local_id: &LocalId) -> SyncError {
    SyncError::NotFound {
        kind: E::KIND,
        local_id: local_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AlertLevel;
    use crate::domain::entities::{Event, EventFields, Participant, ParticipantFields};
    use crate::domain::sync::CreatedIdentity;
    use crate::domain::value_objects::UserId;
    use crate::infrastructure::alerts::AlertInbox;
    use crate::infrastructure::cache::MemoryEntityCache;
    use async_trait::async_trait;
    use mockall::mock;
    use std::time::Duration;

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

    fn remote(id: &str) -> RemoteId {
        RemoteId::new(id.into()).unwrap()
    }

    fn coordinator(
        transport: MockTransport,
        cache: Arc<MemoryEntityCache>,
        alerts: Arc<AlertInbox>,
    ) -> SubmissionCoordinator {
        SubmissionCoordinator::new(Arc::new(transport), cache, alerts, SyncConfig::default())
    }

    fn echo_created(request: &SubmissionRequest) -> Vec<CreatedIdentity> {
        request
            .record
            .created_temporary_ids()
            .into_iter()
            .enumerate()
            .map(|(i, temporary_id)| CreatedIdentity {
                temporary_id,
                remote_id: remote(&format!("child-{i}")),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_rewrites_graph_and_mirrors_cache() {
        let mut transport = MockTransport::new();
        transport
            .expect_submit()
            .times(1)
            .withf(|request| request.operation == crate::domain::value_objects::OperationTag::Create)
            .returning(|request| {
                Ok(SubmissionResponse {
                    remote_id: remote("ev-1"),
                    updated_at: Some(chrono::Utc::now()),
                    created: echo_created(&request),
                })
            });
        let cache = Arc::new(MemoryEntityCache::new(16));
        let alerts = Arc::new(AlertInbox::default());
        let coordinator = coordinator(transport, Arc::clone(&cache), Arc::clone(&alerts));

        let mut event = Event::draft(EventFields::titled("Trip"), None);
        event
            .participants
            .push(Participant::draft(ParticipantFields::titled("Aki"), None));
        let collection = EntityCollection::new();
        let id = collection.insert(event).await;

        let outcome = coordinator.submit(&collection, &id, &context()).await.unwrap();

        assert_eq!(outcome, SubmissionOutcome::Created { remote_id: remote("ev-1") });
        let stored = collection.get(&id).await.unwrap();
        assert_eq!(stored.meta.intent, Intent::Edit);
        assert_eq!(stored.participants[0].meta.remote_id, Some(remote("child-0")));
        let cached = cache
            .get_one(EntityKind::Event, &CacheQuery::RemoteId(remote("ev-1")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.intent, Intent::Edit);
        assert_eq!(cache.list(EntityKind::Event).await.unwrap().len(), 1);
        assert!(alerts.is_empty());
        assert!(!coordinator.is_in_flight(EntityKind::Event, &id));
    }

    #[tokio::test]
    async fn test_failure_reverts_and_alerts() {
        let mut transport = MockTransport::new();
        transport
            .expect_submit()
            .returning(|_| Err(TransportError::Server { status: 503, message: "busy".into() }));
        let alerts = Arc::new(AlertInbox::default());
        let coordinator = coordinator(
            transport,
            Arc::new(MemoryEntityCache::new(16)),
            Arc::clone(&alerts),
        );

        let mut event = Event::draft(EventFields::titled("Trip"), None);
        event.meta.intent = Intent::Delete;
        event.meta.remote_id = Some(remote("ev-9"));
        let collection = EntityCollection::new();
        let id = collection.insert(event).await;

        let err = coordinator.submit(&collection, &id, &context()).await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(TransportError::Server { status: 503, .. })));
        assert_eq!(collection.get(&id).await.unwrap().meta.intent, Intent::Edit);
        let delivered = alerts.drain();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn test_cancellation_is_silent_and_keeps_add() {
        let mut transport = MockTransport::new();
        transport
            .expect_submit()
            .returning(|_| Err(TransportError::Cancelled));
        let alerts = Arc::new(AlertInbox::default());
        let coordinator = coordinator(
            transport,
            Arc::new(MemoryEntityCache::new(16)),
            Arc::clone(&alerts),
        );
        let collection = EntityCollection::new();
        let id = collection
            .insert(Event::draft(EventFields::titled("Trip"), None))
            .await;

        assert!(coordinator.submit(&collection, &id, &context()).await.is_err());
        assert_eq!(collection.get(&id).await.unwrap().meta.intent, Intent::Add);
        assert!(alerts.is_empty());
    }

    struct SlowTransport;

    #[async_trait]
    impl SyncTransport for SlowTransport {
        async fn submit(
            &self,
            _request: SubmissionRequest,
        ) -> Result<SubmissionResponse, TransportError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(SubmissionResponse {
                remote_id: remote("ev-1"),
                updated_at: None,
                created: vec![],
            })
        }

        async fn fetch(
            &self,
            _kind: EntityKind,
            _context: &SessionContext,
        ) -> Result<Vec<WireRecord>, TransportError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_second_submission_is_rejected_while_in_flight() {
        let coordinator = Arc::new(SubmissionCoordinator::new(
            Arc::new(SlowTransport),
            Arc::new(MemoryEntityCache::new(16)),
            Arc::new(AlertInbox::default()),
            SyncConfig::default(),
        ));
        let collection = EntityCollection::new();
        let id = collection
            .insert(Event::draft(EventFields::titled("Trip"), None))
            .await;

        let first = {
            let coordinator = Arc::clone(&coordinator);
            let collection = collection.clone();
            let id = id.clone();
            tokio::spawn(async move { coordinator.submit(&collection, &id, &context()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coordinator.is_in_flight(EntityKind::Event, &id));
        let second = coordinator.submit(&collection, &id, &context()).await;

        assert!(matches!(second, Err(SyncError::AlreadyInFlight { .. })));
        assert!(first.await.unwrap().is_ok());
        assert!(!coordinator.is_in_flight(EntityKind::Event, &id));
    }

    #[tokio::test]
    async fn test_delete_removes_entity_and_cache_entry() {
        let mut transport = MockTransport::new();
        transport.expect_submit().returning(|request| {
            Ok(SubmissionResponse {
                remote_id: request.record.id.clone().unwrap(),
                updated_at: None,
                created: vec![],
            })
        });
        let cache = Arc::new(MemoryEntityCache::new(16));
        let coordinator = coordinator(transport, Arc::clone(&cache), Arc::new(AlertInbox::default()));

        let mut event = Event::draft(EventFields::titled("Trip"), None);
        identity::rewrite(&mut event, remote("ev-5"));
        lifecycle::mark_for_deletion(&mut event);
        let collection = EntityCollection::new();
        let id = collection.insert(event).await;

        let outcome = coordinator.submit(&collection, &id, &context()).await.unwrap();

        assert_eq!(outcome, SubmissionOutcome::Deleted { remote_id: remote("ev-5") });
        assert!(collection.is_empty().await);
        assert!(cache.list(EntityKind::Event).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_child_raises_integrity_alert() {
        let mut transport = MockTransport::new();
        transport.expect_submit().returning(|_| {
            Ok(SubmissionResponse {
                remote_id: remote("ev-1"),
                updated_at: None,
                created: vec![],
            })
        });
        let alerts = Arc::new(AlertInbox::default());
        let coordinator = coordinator(
            transport,
            Arc::new(MemoryEntityCache::new(16)),
            Arc::clone(&alerts),
        );
        let mut event = Event::draft(EventFields::titled("Trip"), None);
        event
            .participants
            .push(Participant::draft(ParticipantFields::titled("Aki"), None));
        let collection = EntityCollection::new();
        let id = collection.insert(event).await;

        let err = coordinator.submit(&collection, &id, &context()).await.unwrap_err();

        assert!(matches!(err, SyncError::ReconciliationIntegrity { ref missing } if missing.len() == 1));
        assert_eq!(collection.get(&id).await.unwrap().meta.intent, Intent::Edit);
        assert_eq!(alerts.drain()[0].level, AlertLevel::Error);
    }
}
