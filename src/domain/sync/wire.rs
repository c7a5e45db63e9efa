use super::error::SyncError;
use super::node::{SyncMeta, SyncNode, Syncable};
use crate::domain::value_objects::{
    EntityKind, Intent, LocalId, OperationTag, RemoteId, SessionContext, TemporaryId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// レコードの出どころ。サーバー由来のものは永続 ID と更新日時が必須
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Server,
    Cache,
}

/// サーバー送受信とローカルキャッシュで共通のレコード形式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_id: Option<TemporaryId>,
    /// キャッシュ復元時にローカル ID を維持するためのもの。サーバーは無視する
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<LocalId>,
    pub intent: Intent,
    #[serde(default)]
    pub entered_by: Option<UserId>,
    #[serde(default)]
    pub updated_by: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub fields: Value,
    #[serde(default)]
    pub children: Vec<WireRecord>,
}

impl WireRecord {
    pub fn from_node(node: &dyn SyncNode) -> Result<Self, SyncError> {
        let meta = node.meta();
        let children = node
            .children()
            .into_iter()
            .map(WireRecord::from_node)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind: node.kind(),
            id: meta.remote_id.clone(),
            temporary_id: meta.temporary_id.clone(),
            local_id: Some(meta.local_id.clone()),
            intent: meta.intent,
            entered_by: meta.entered_by.clone(),
            updated_by: meta.updated_by.clone(),
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            fields: node.fields_value()?,
            children,
        })
    }

    /// このレコード以下で作成扱いになっている子孫の一時 ID
    pub fn created_temporary_ids(&self) -> Vec<TemporaryId> {
        let mut ids = Vec::new();
        for child in &self.children {
            if child.intent == Intent::Add
                && let Some(temporary_id) = &child.temporary_id
            {
                ids.push(temporary_id.clone());
            }
            ids.extend(child.created_temporary_ids());
        }
        ids
    }

    pub fn id_str(&self) -> Option<&str> {
        self.id.as_ref().map(|id| id.as_str())
    }
}

/// レコードから型付きのエンティティを組み立てる。子レコードが 1 件でも不正なら親ごと弾く
pub fn decode_record<E: Syncable>(record: WireRecord, origin: Origin) -> Result<E, SyncError> {
    if record.kind != E::KIND {
        return Err(SyncError::rejected(
            record.id_str(),
            format!("expected {} but got {}", E::KIND, record.kind),
        ));
    }

    let fields: E::Fields = serde_json::from_value(record.fields)
        .map_err(|e| SyncError::rejected(record.id.as_ref().map(|id| id.as_str()), e.to_string()))?;

    let meta = match origin {
        Origin::Server => {
            let Some(remote_id) = record.id else {
                return Err(SyncError::rejected(None, "server record has no id"));
            };
            let Some(updated_at) = record.updated_at else {
                return Err(SyncError::rejected(
                    Some(remote_id.as_str()),
                    "server record has no updated_at",
                ));
            };
            let mut meta = SyncMeta::synced(remote_id, record.created_at, updated_at);
            meta.entered_by = record.entered_by;
            meta.updated_by = record.updated_by;
            meta
        }
        Origin::Cache => {
            let local_id = record
                .local_id
                .or_else(|| record.temporary_id.as_ref().map(LocalId::from))
                .or_else(|| record.id.as_ref().map(LocalId::from));
            let Some(local_id) = local_id else {
                return Err(SyncError::rejected(None, "cached record has no identity"));
            };
            SyncMeta {
                local_id,
                remote_id: record.id,
                temporary_id: record.temporary_id,
                intent: record.intent,
                entered_by: record.entered_by,
                updated_by: record.updated_by,
                created_at: record.created_at,
                updated_at: record.updated_at,
            }
        }
    };

    let mut entity = E::from_parts(meta, fields);
    entity.adopt_children(record.children, origin)?;
    Ok(entity)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub operation: OperationTag,
    pub context: SessionContext,
    pub record: WireRecord,
}

impl SubmissionRequest {
    pub fn for_node(node: &dyn SyncNode, context: &SessionContext) -> Result<Self, SyncError> {
        Ok(Self {
            operation: node.meta().intent.operation(),
            context: context.clone(),
            record: WireRecord::from_node(node)?,
        })
    }
}

/// サーバーが作成した子レコードの一時 ID と永続 ID の対応
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIdentity {
    pub temporary_id: TemporaryId,
    pub remote_id: RemoteId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub remote_id: RemoteId,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created: Vec<CreatedIdentity>,
}
