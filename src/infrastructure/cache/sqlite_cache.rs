use crate::application::ports::{CacheQuery, EntityCache, cache_key};
use crate::domain::sync::WireRecord;
use crate::domain::value_objects::EntityKind;
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct CacheRow {
    payload: String,
}

impl CacheRow {
    fn into_record(self) -> Result<WireRecord, AppError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// `entity_cache` テーブルに JSON でレコードを保存する
pub struct SqliteEntityCache {
    pool: ConnectionPool,
}

impl SqliteEntityCache {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn query_column(query: &CacheQuery) -> (&'static str, &str) {
        match query {
            CacheQuery::RemoteId(id) => ("remote_id", id.as_str()),
            CacheQuery::TemporaryId(id) => ("temporary_id", id.as_str()),
        }
    }
}

#[async_trait]
impl EntityCache for SqliteEntityCache {
    async fn get_one(
        &self,
        kind: EntityKind,
        query: &CacheQuery,
    ) -> Result<Option<WireRecord>, AppError> {
        let (column, value) = Self::query_column(query);
        let sql = format!("SELECT payload FROM entity_cache WHERE kind = ? AND {column} = ? LIMIT 1");
        let row = sqlx::query_as::<_, CacheRow>(&sql)
            .bind(kind.as_str())
            .bind(value)
            .fetch_optional(self.pool.get_pool())
            .await?;

        row.map(CacheRow::into_record).transpose()
    }

    async fn create_if_not_found(&self, record: WireRecord) -> Result<bool, AppError> {
        let key = cache_key(&record)?;
        let payload = serde_json::to_string(&record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO entity_cache (kind, cache_key, remote_id, temporary_id, payload, updated_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE NOT EXISTS (
                SELECT 1 FROM entity_cache
                WHERE kind = ?1
                  AND (cache_key = ?2
                       OR (?3 IS NOT NULL AND remote_id = ?3)
                       OR (?4 IS NOT NULL AND temporary_id = ?4))
            )
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&key)
        .bind(record.id.as_ref().map(|id| id.as_str()))
        .bind(record.temporary_id.as_ref().map(|id| id.as_str()))
        .bind(&payload)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save(&self, record: WireRecord) -> Result<(), AppError> {
        let key = cache_key(&record)?;
        let payload = serde_json::to_string(&record)?;
        let remote_id = record.id.as_ref().map(|id| id.as_str());
        let temporary_id = record.temporary_id.as_ref().map(|id| id.as_str());

        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(
            r#"
            DELETE FROM entity_cache
            WHERE kind = ?1
              AND cache_key != ?2
              AND ((?3 IS NOT NULL AND remote_id = ?3) OR (?4 IS NOT NULL AND temporary_id = ?4))
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&key)
        .bind(remote_id)
        .bind(temporary_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO entity_cache (kind, cache_key, remote_id, temporary_id, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, cache_key) DO UPDATE SET
                remote_id = excluded.remote_id,
                temporary_id = excluded.temporary_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&key)
        .bind(remote_id)
        .bind(temporary_id)
        .bind(&payload)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, query: &CacheQuery) -> Result<bool, AppError> {
        let (column, value) = Self::query_column(query);
        let sql = format!("DELETE FROM entity_cache WHERE kind = ? AND {column} = ?");
        let result = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(value)
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<WireRecord>, AppError> {
        let rows = sqlx::query_as::<_, CacheRow>(
            "SELECT payload FROM entity_cache WHERE kind = ? ORDER BY rowid",
        )
        .bind(kind.as_str())
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(CacheRow::into_record).collect()
    }
}
