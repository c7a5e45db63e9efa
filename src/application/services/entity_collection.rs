use crate::domain::sync::Syncable;
use crate::domain::value_objects::{LocalId, RemoteId};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 画面が参照する同期対象の一覧。書き込みはこの型を通してだけ行う
pub struct EntityCollection<E: Syncable> {
    entities: Arc<RwLock<Vec<E>>>,
}

impl<E: Syncable> Clone for EntityCollection<E> {
    fn clone(&self) -> Self {
        Self {
            entities: Arc::clone(&self.entities),
        }
    }
}

impl<E: Syncable> Default for EntityCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Syncable> EntityCollection<E> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(entities: Vec<E>) -> Self {
        Self {
            entities: Arc::new(RwLock::new(entities)),
        }
    }

    pub async fn insert(&self, entity: E) -> LocalId {
        let local_id = entity.local_id().clone();
        self.entities.write().await.push(entity);
        local_id
    }

    /// 同じローカル ID が既にあれば何もしない。追加したら true
    pub async fn insert_if_absent(&self, entity: E) -> bool {
        let mut entities = self.entities.write().await;
        if entities.iter().any(|e| e.local_id() == entity.local_id()) {
            return false;
        }
        entities.push(entity);
        true
    }

    pub async fn any(&self, predicate: impl Fn(&E) -> bool) -> bool {
        self.entities.read().await.iter().any(predicate)
    }

    pub async fn get(&self, local_id: &LocalId) -> Option<E> {
        let entities = self.entities.read().await;
        entities
            .iter()
            .find(|entity| entity.local_id() == local_id)
            .cloned()
    }

    pub async fn find_by_remote_id(&self, remote_id: &RemoteId) -> Option<E> {
        let entities = self.entities.read().await;
        entities
            .iter()
            .find(|entity| entity.meta().remote_id.as_ref() == Some(remote_id))
            .cloned()
    }

    pub async fn contains(&self, local_id: &LocalId) -> bool {
        let entities = self.entities.read().await;
        entities.iter().any(|entity| entity.local_id() == local_id)
    }

    /// 対象が無ければ `None`
    pub async fn update<R>(&self, local_id: &LocalId, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        let mut entities = self.entities.write().await;
        entities
            .iter_mut()
            .find(|entity| entity.local_id() == local_id)
            .map(f)
    }

    pub async fn remove(&self, local_id: &LocalId) -> Option<E> {
        let mut entities = self.entities.write().await;
        let index = entities
            .iter()
            .position(|entity| entity.local_id() == local_id)?;
        Some(entities.remove(index))
    }

    pub async fn with_all_mut<R>(&self, f: impl FnOnce(&mut Vec<E>) -> R) -> R {
        let mut entities = self.entities.write().await;
        f(&mut entities)
    }

    pub async fn snapshot_all(&self) -> Vec<E> {
        self.entities.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}
