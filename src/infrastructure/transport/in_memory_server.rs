use crate::application::ports::SyncTransport;
use crate::domain::sync::{
    CreatedIdentity, SubmissionRequest, SubmissionResponse, TransportError, WireRecord,
};
use crate::domain::value_objects::{EntityKind, Intent, OperationTag, RemoteId, SessionContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct ServerState {
    records: HashMap<EntityKind, Vec<WireRecord>>,
    next_id: u64,
    failures: VecDeque<TransportError>,
    requests: Vec<SubmissionRequest>,
}

impl ServerState {
    fn issue_id(&mut self, kind: EntityKind) -> Result<RemoteId, TransportError> {
        self.next_id += 1;
        RemoteId::new(format!("{}-{}", kind.as_str(), self.next_id))
            .map_err(TransportError::MalformedResponse)
    }

    fn position(&self, kind: EntityKind, id: &RemoteId) -> Option<usize> {
        self.records
            .get(&kind)
            .and_then(|records| records.iter().position(|r| r.id.as_ref() == Some(id)))
    }

    /// 保存形に整える。子の作成分には ID を払い出し、削除分は落とす
    fn normalize(
        &mut self,
        record: &mut WireRecord,
        user: &SessionContext,
        now: DateTime<Utc>,
        created: &mut Vec<CreatedIdentity>,
    ) -> Result<(), TransportError> {
        record.children.retain(|child| !child.intent.is_delete());
        for child in &mut record.children {
            if child.intent == Intent::Add {
                let Some(temporary_id) = child.temporary_id.clone() else {
                    return Err(TransportError::Server {
                        status: 422,
                        message: format!("new {} has no temporary id", child.kind),
                    });
                };
                let remote_id = self.issue_id(child.kind)?;
                created.push(CreatedIdentity {
                    temporary_id,
                    remote_id: remote_id.clone(),
                });
                child.id = Some(remote_id);
                child.created_at.get_or_insert(now);
                child.entered_by.get_or_insert_with(|| user.user_id.clone());
            }
            child.updated_at = Some(now);
            self.normalize(child, user, now, created)?;
        }
        record.intent = Intent::Edit;
        record.temporary_id = None;
        record.local_id = None;
        Ok(())
    }
}

/// プロセス内で完結するサーバー実装。オフライン検証や結合テストで使う
#[derive(Default)]
pub struct InMemoryServer {
    state: Mutex<ServerState>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 次のリクエストを指定のエラーで失敗させる。複数回呼ぶと順に消費される
    pub fn fail_next(&self, error: TransportError) {
        self.state().failures.push_back(error);
    }

    /// 他の端末から登録されたレコードとして直接書き込む
    pub fn seed(&self, mut record: WireRecord) -> Result<RemoteId, TransportError> {
        let mut state = self.state();
        let now = Utc::now();
        let id = match record.id.clone() {
            Some(id) => id,
            None => state.issue_id(record.kind)?,
        };
        record.id = Some(id.clone());
        record.created_at.get_or_insert(now);
        record.updated_at = Some(now);
        record.intent = Intent::Edit;
        record.temporary_id = None;
        record.local_id = None;

        match state.position(record.kind, &id) {
            Some(index) => {
                if let Some(records) = state.records.get_mut(&record.kind) {
                    records[index] = record;
                }
            }
            None => state.records.entry(record.kind).or_default().push(record),
        }
        Ok(id)
    }

    /// 他の端末で削除されたことにする
    pub fn remove(&self, kind: EntityKind, id: &RemoteId) -> bool {
        let mut state = self.state();
        match state.position(kind, id) {
            Some(index) => {
                if let Some(records) = state.records.get_mut(&kind) {
                    records.remove(index);
                }
                true
            }
            None => false,
        }
    }

    pub fn stored(&self, kind: EntityKind) -> Vec<WireRecord> {
        self.state().records.get(&kind).cloned().unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<SubmissionRequest> {
        self.state().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }
}

#[async_trait]
impl SyncTransport for InMemoryServer {
    async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionResponse, TransportError> {
        let mut state = self.state();
        state.requests.push(request.clone());
        if let Some(error) = state.failures.pop_front() {
            tracing::debug!(error = %error, "Injected submission failure");
            return Err(error);
        }

        let SubmissionRequest {
            operation,
            context,
            mut record,
        } = request;
        let kind = record.kind;
        let now = Utc::now();

        match operation {
            OperationTag::Create => {
                if record.id.is_some() {
                    return Err(TransportError::Server {
                        status: 409,
                        message: format!("{kind} already has an id"),
                    });
                }
                let remote_id = state.issue_id(kind)?;
                let mut created = Vec::new();
                state.normalize(&mut record, &context, now, &mut created)?;
                record.id = Some(remote_id.clone());
                record.created_at.get_or_insert(now);
                record.entered_by.get_or_insert_with(|| context.user_id.clone());
                record.updated_at = Some(now);
                state.records.entry(kind).or_default().push(record);
                tracing::debug!(kind = %kind, remote_id = %remote_id, created = created.len(), "Record created");

                Ok(SubmissionResponse {
                    remote_id,
                    updated_at: Some(now),
                    created,
                })
            }
            OperationTag::Update => {
                let Some(remote_id) = record.id.clone() else {
                    return Err(TransportError::Server {
                        status: 422,
                        message: format!("{kind} update has no id"),
                    });
                };
                let Some(index) = state.position(kind, &remote_id) else {
                    return Err(TransportError::Server {
                        status: 404,
                        message: format!("{kind} {remote_id} not found"),
                    });
                };
                let mut created = Vec::new();
                state.normalize(&mut record, &context, now, &mut created)?;
                record.updated_at = Some(now);
                if let Some(records) = state.records.get_mut(&kind) {
                    records[index] = record;
                }
                tracing::debug!(kind = %kind, remote_id = %remote_id, created = created.len(), "Record updated");

                Ok(SubmissionResponse {
                    remote_id,
                    updated_at: Some(now),
                    created,
                })
            }
            OperationTag::Delete => {
                let Some(remote_id) = record.id.clone() else {
                    return Err(TransportError::Server {
                        status: 422,
                        message: format!("{kind} delete has no id"),
                    });
                };
                let Some(index) = state.position(kind, &remote_id) else {
                    return Err(TransportError::Server {
                        status: 404,
                        message: format!("{kind} {remote_id} not found"),
                    });
                };
                if let Some(records) = state.records.get_mut(&kind) {
                    records.remove(index);
                }
                tracing::debug!(kind = %kind, remote_id = %remote_id, "Record deleted");

                Ok(SubmissionResponse {
                    remote_id,
                    updated_at: Some(now),
                    created: Vec::new(),
                })
            }
        }
    }

    async fn fetch(
        &self,
        kind: EntityKind,
        _context: &SessionContext,
    ) -> Result<Vec<WireRecord>, TransportError> {
        let mut state = self.state();
        if let Some(error) = state.failures.pop_front() {
            tracing::debug!(error = %error, "Injected fetch failure");
            return Err(error);
        }
        Ok(state.records.get(&kind).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Event, EventFields, Item, ItemFields};
    use crate::domain::sync::Syncable;
    use crate::domain::value_objects::{Amount, UserId};

    fn context() -> SessionContext {
        SessionContext::new(UserId::new("user-1".into()).unwrap(), "acc-1", "device-1")
    }

    fn event_with_item() -> Event {
        let mut event = Event::draft(EventFields::titled("Trip"), None);
        event
            .items
            .push(Item::draft(ItemFields::priced("Hotel", Amount::from_minor(12_000)), None));
        event
    }

    #[tokio::test]
    async fn test_create_assigns_ids_to_new_children() {
        let server = InMemoryServer::new();
        let event = event_with_item();
        let item_temp = event.items[0].meta.temporary_id.clone().unwrap();

        let response = server
            .submit(SubmissionRequest::for_node(&event, &context()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.created.len(), 1);
        assert_eq!(response.created[0].temporary_id, item_temp);
        let stored = server.stored(EntityKind::Event);
        assert_eq!(stored[0].id.as_ref(), Some(&response.remote_id));
        assert_eq!(stored[0].children[0].intent, Intent::Edit);
        assert!(stored[0].children[0].temporary_id.is_none());
        assert_eq!(stored[0].entered_by.as_ref().map(|u| u.as_str()), Some("user-1"));
    }

    #[tokio::test]
    async fn test_update_of_unknown_record_is_not_found() {
        let server = InMemoryServer::new();
        let mut record = WireRecord::from_node(&event_with_item()).unwrap();
        record.id = Some(RemoteId::new("event-99".into()).unwrap());
        let request = SubmissionRequest {
            operation: OperationTag::Update,
            context: context(),
            record,
        };

        let err = server.submit(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Server { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let server = InMemoryServer::new();
        server.fail_next(TransportError::Unreachable("offline".into()));
        server.fail_next(TransportError::Cancelled);

        assert!(matches!(
            server.fetch(EntityKind::Event, &context()).await,
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(
            server.fetch(EntityKind::Event, &context()).await,
            Err(TransportError::Cancelled)
        ));
        assert!(server.fetch(EntityKind::Event, &context()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_and_remove_simulate_other_devices() {
        let server = InMemoryServer::new();
        let id = server
            .seed(WireRecord::from_node(&event_with_item()).unwrap())
            .unwrap();
        assert_eq!(server.fetch(EntityKind::Event, &context()).await.unwrap().len(), 1);

        assert!(server.remove(EntityKind::Event, &id));
        assert!(!server.remove(EntityKind::Event, &id));
        assert_eq!(server.request_count(), 0);
    }
}
