use crate::application::ports::{CacheQuery, EntityCache, cache_key};
use crate::domain::sync::WireRecord;
use crate::domain::value_objects::EntityKind;
use crate::shared::error::AppError;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::RwLock;

type CacheSlot = (EntityKind, String);

/// プロセス内だけで完結するキャッシュ。容量を超えると古いものから落ちる
pub struct MemoryEntityCache {
    entries: RwLock<LruCache<CacheSlot, WireRecord>>,
}

impl MemoryEntityCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn slot(record: &WireRecord) -> Result<CacheSlot, AppError> {
        Ok((record.kind, cache_key(record)?))
    }

    fn conflicts(existing: &WireRecord, incoming: &WireRecord) -> bool {
        let same_remote = incoming.id.is_some() && existing.id == incoming.id;
        let same_temporary =
            incoming.temporary_id.is_some() && existing.temporary_id == incoming.temporary_id;
        existing.kind == incoming.kind && (same_remote || same_temporary)
    }
}

#[async_trait]
impl EntityCache for MemoryEntityCache {
    async fn get_one(
        &self,
        kind: EntityKind,
        query: &CacheQuery,
    ) -> Result<Option<WireRecord>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|((slot_kind, _), record)| *slot_kind == kind && query.matches(record))
            .map(|(_, record)| record.clone()))
    }

    async fn create_if_not_found(&self, record: WireRecord) -> Result<bool, AppError> {
        let slot = Self::slot(&record)?;
        let mut entries = self.entries.write().await;
        let exists = entries.contains(&slot)
            || entries
                .iter()
                .any(|(_, existing)| Self::conflicts(existing, &record));
        if exists {
            return Ok(false);
        }
        entries.put(slot, record);
        Ok(true)
    }

    async fn save(&self, record: WireRecord) -> Result<(), AppError> {
        let slot = Self::slot(&record)?;
        let mut entries = self.entries.write().await;
        let stale: Vec<CacheSlot> = entries
            .iter()
            .filter(|(key, existing)| **key != slot && Self::conflicts(existing, &record))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
        entries.put(slot, record);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, query: &CacheQuery) -> Result<bool, AppError> {
        let mut entries = self.entries.write().await;
        let matched: Vec<CacheSlot> = entries
            .iter()
            .filter(|((slot_kind, _), record)| *slot_kind == kind && query.matches(record))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matched {
            entries.pop(key);
        }
        Ok(!matched.is_empty())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<WireRecord>, AppError> {
        let entries = self.entries.read().await;
        // 古い順に返す
        Ok(entries
            .iter()
            .rev()
            .filter(|((slot_kind, _), _)| *slot_kind == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
