use crate::domain::sync::{SyncMeta, WireRecord};
use crate::domain::value_objects::{EntityKind, RemoteId, TemporaryId};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// キャッシュ検索の述語
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheQuery {
    RemoteId(RemoteId),
    TemporaryId(TemporaryId),
}

impl CacheQuery {
    /// 永続 ID があればそれを、無ければ一時 ID を使う
    pub fn for_meta(meta: &SyncMeta) -> Option<Self> {
        match (&meta.remote_id, &meta.temporary_id) {
            (Some(remote_id), _) => Some(CacheQuery::RemoteId(remote_id.clone())),
            (None, Some(temporary_id)) => Some(CacheQuery::TemporaryId(temporary_id.clone())),
            (None, None) => None,
        }
    }

    pub fn matches(&self, record: &WireRecord) -> bool {
        match self {
            CacheQuery::RemoteId(id) => record.id.as_ref() == Some(id),
            CacheQuery::TemporaryId(id) => record.temporary_id.as_ref() == Some(id),
        }
    }
}

/// レコードをキャッシュに置くときのキー。ID の書き換え後も変わらないローカル ID を優先する
pub fn cache_key(record: &WireRecord) -> Result<String, AppError> {
    record
        .local_id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .or_else(|| record.temporary_id.as_ref().map(|id| id.as_str().to_string()))
        .or_else(|| record.id.as_ref().map(|id| id.as_str().to_string()))
        .ok_or_else(|| AppError::InvalidInput(format!("{} record has no identity", record.kind)))
}

/// オフライン用のミラー。保存形式は実装側が決める
#[async_trait]
pub trait EntityCache: Send + Sync {
    async fn get_one(
        &self,
        kind: EntityKind,
        query: &CacheQuery,
    ) -> Result<Option<WireRecord>, AppError>;

    /// 既に同じ ID のレコードがあれば何もしない。作成した場合は true
    async fn create_if_not_found(&self, record: WireRecord) -> Result<bool, AppError>;

    /// upsert。同じ永続 ID・一時 ID を持つ古いエントリは置き換える
    async fn save(&self, record: WireRecord) -> Result<(), AppError>;

    async fn delete(&self, kind: EntityKind, query: &CacheQuery) -> Result<bool, AppError>;

    async fn list(&self, kind: EntityKind) -> Result<Vec<WireRecord>, AppError>;
}
