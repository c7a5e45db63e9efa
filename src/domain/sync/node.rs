use super::error::SyncError;
use super::identity;
use super::snapshot::Snapshot;
use super::wire::{Origin, WireRecord};
use crate::domain::value_objects::{EntityKind, Intent, LocalId, RemoteId, TemporaryId, UserId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 同期対象エンティティ共通の識別子・ライフサイクル情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub temporary_id: Option<TemporaryId>,
    pub intent: Intent,
    pub entered_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncMeta {
    /// オフラインで新規作成したエンティティ。一時 ID がそのままローカル ID になる
    pub fn draft(temporary_id: TemporaryId, entered_by: Option<UserId>) -> Self {
        Self {
            local_id: LocalId::from(&temporary_id),
            remote_id: None,
            temporary_id: Some(temporary_id),
            intent: Intent::Add,
            updated_by: entered_by.clone(),
            entered_by,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    /// サーバーデータから復元したエンティティ
    pub fn synced(
        remote_id: RemoteId,
        created_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: LocalId::from(&remote_id),
            remote_id: Some(remote_id),
            temporary_id: None,
            intent: Intent::Edit,
            entered_by: None,
            updated_by: None,
            created_at,
            updated_at: Some(updated_at),
        }
    }

    pub fn is_new(&self) -> bool {
        self.intent == Intent::Add
    }

    pub fn stamp_update(&mut self, user_id: &UserId, at: DateTime<Utc>) {
        self.updated_by = Some(user_id.clone());
        self.updated_at = Some(at);
    }
}

/// 同一性判定・スナップショット・サーバー値の反映はすべてこの構造体単位で行う。
/// フィールドを足すときは構造体に足すだけでよい。
pub trait TrackedFields:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn title(&self) -> &str;
    fn set_title(&mut self, title: String);

    /// タイトル以外の入力チェック
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 編集開始時点のノードを値としてコピーしたもの
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub kind: EntityKind,
    pub meta: SyncMeta,
    pub title: String,
    pub fields: Value,
    pub children: Vec<NodeState>,
}

impl NodeState {
    pub fn capture(node: &dyn SyncNode) -> Result<Self, SyncError> {
        let children = node
            .children()
            .into_iter()
            .map(NodeState::capture)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind: node.kind(),
            meta: node.meta().clone(),
            title: node.title().to_string(),
            fields: node.fields_value()?,
            children,
        })
    }

    pub fn find(&self, kind: EntityKind, local_id: &LocalId) -> Option<&NodeState> {
        if self.kind == kind && &self.meta.local_id == local_id {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find(kind, local_id))
    }
}

/// 型を問わずエンティティの木を辿るためのオブジェクト安全なビュー
pub trait SyncNode: Send + Sync {
    fn kind(&self) -> EntityKind;
    fn meta(&self) -> &SyncMeta;
    fn meta_mut(&mut self) -> &mut SyncMeta;
    fn title(&self) -> &str;
    fn set_title(&mut self, title: String);
    fn fields_value(&self) -> Result<Value, SyncError>;
    fn apply_fields_value(&mut self, value: Value) -> Result<(), SyncError>;
    fn children(&self) -> Vec<&dyn SyncNode>;
    fn children_mut(&mut self) -> Vec<&mut dyn SyncNode>;
    fn retain_children(&mut self, keep: &mut dyn FnMut(&dyn SyncNode) -> bool);
    fn restore_children(&mut self, states: &[NodeState]) -> Result<(), SyncError>;
    fn adopt_children(&mut self, records: Vec<WireRecord>, origin: Origin) -> Result<(), SyncError>;
}

pub trait Syncable: SyncNode + Clone + fmt::Debug + Sized + 'static {
    type Fields: TrackedFields;
    const KIND: EntityKind;

    fn from_parts(meta: SyncMeta, fields: Self::Fields) -> Self;
    fn fields(&self) -> &Self::Fields;
    fn fields_mut(&mut self) -> &mut Self::Fields;
    fn shadow(&self) -> Option<&Snapshot>;
    fn shadow_mut(&mut self) -> &mut Option<Snapshot>;

    /// 子コレクションをサーバー側のコレクションとマージする
    fn hydrate_children(&mut self, server: Self) -> Result<(), SyncError>;

    fn draft(fields: Self::Fields, entered_by: Option<UserId>) -> Self {
        Self::from_parts(
            SyncMeta::draft(identity::new_temporary_id(), entered_by),
            fields,
        )
    }

    fn local_id(&self) -> &LocalId {
        &self.meta().local_id
    }
}

pub fn for_each_descendant(node: &dyn SyncNode, visit: &mut dyn FnMut(&dyn SyncNode)) {
    for child in node.children() {
        visit(child);
        for_each_descendant(child, visit);
    }
}

pub fn for_each_descendant_mut(node: &mut dyn SyncNode, visit: &mut dyn FnMut(&mut dyn SyncNode)) {
    for child in node.children_mut() {
        visit(&mut *child);
        for_each_descendant_mut(child, visit);
    }
}

/// エンティティ構造体（`meta` / `fields` / 子 `Vec` / `shadow`）から
/// `Syncable` と `SyncNode` を生成する。
macro_rules! syncable {
    (
        $entity:ident {
            kind: $kind:expr,
            fields: $fields:ty,
            children: { $($child:ident: $child_ty:ty),* $(,)? } $(,)?
        }
    ) => {
        impl $crate::domain::sync::Syncable for $entity {
            type Fields = $fields;
            const KIND: $crate::domain::value_objects::EntityKind = $kind;

            fn from_parts(meta: $crate::domain::sync::SyncMeta, fields: $fields) -> Self {
                Self {
                    meta,
                    fields,
                    $($child: Vec::new(),)*
                    shadow: None,
                }
            }

            fn fields(&self) -> &$fields {
                &self.fields
            }

            fn fields_mut(&mut self) -> &mut $fields {
                &mut self.fields
            }

            fn shadow(&self) -> Option<&$crate::domain::sync::Snapshot> {
                self.shadow.as_ref()
            }

            fn shadow_mut(&mut self) -> &mut Option<$crate::domain::sync::Snapshot> {
                &mut self.shadow
            }

            #[allow(unused_variables)]
            fn hydrate_children(
                &mut self,
                server: Self,
            ) -> Result<(), $crate::domain::sync::SyncError> {
                $( $crate::domain::sync::reconcile::merge_collection(&mut self.$child, server.$child)?; )*
                Ok(())
            }
        }

        impl $crate::domain::sync::SyncNode for $entity {
            fn kind(&self) -> $crate::domain::value_objects::EntityKind {
                <$entity as $crate::domain::sync::Syncable>::KIND
            }

            fn meta(&self) -> &$crate::domain::sync::SyncMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::domain::sync::SyncMeta {
                &mut self.meta
            }

            fn title(&self) -> &str {
                $crate::domain::sync::TrackedFields::title(&self.fields)
            }

            fn set_title(&mut self, title: String) {
                $crate::domain::sync::TrackedFields::set_title(&mut self.fields, title)
            }

            fn fields_value(&self) -> Result<serde_json::Value, $crate::domain::sync::SyncError> {
                Ok(serde_json::to_value(&self.fields)?)
            }

            fn apply_fields_value(
                &mut self,
                value: serde_json::Value,
            ) -> Result<(), $crate::domain::sync::SyncError> {
                self.fields = serde_json::from_value(value)?;
                Ok(())
            }

            #[allow(unused_mut)]
            fn children(&self) -> Vec<&dyn $crate::domain::sync::SyncNode> {
                let mut nodes: Vec<&dyn $crate::domain::sync::SyncNode> = Vec::new();
                $( nodes.extend(self.$child.iter().map(|c| c as &dyn $crate::domain::sync::SyncNode)); )*
                nodes
            }

            #[allow(unused_mut)]
            fn children_mut(&mut self) -> Vec<&mut dyn $crate::domain::sync::SyncNode> {
                let mut nodes: Vec<&mut dyn $crate::domain::sync::SyncNode> = Vec::new();
                $( nodes.extend(self.$child.iter_mut().map(|c| c as &mut dyn $crate::domain::sync::SyncNode)); )*
                nodes
            }

            #[allow(unused_variables)]
            fn retain_children(
                &mut self,
                keep: &mut dyn FnMut(&dyn $crate::domain::sync::SyncNode) -> bool,
            ) {
                $( self.$child.retain(|c| keep(c as &dyn $crate::domain::sync::SyncNode)); )*
            }

            #[allow(unused_variables)]
            fn restore_children(
                &mut self,
                states: &[$crate::domain::sync::NodeState],
            ) -> Result<(), $crate::domain::sync::SyncError> {
                $( $crate::domain::sync::snapshot::restore_collection(&mut self.$child, states)?; )*
                Ok(())
            }

            #[allow(clippy::never_loop, unused_variables)]
            fn adopt_children(
                &mut self,
                records: Vec<$crate::domain::sync::WireRecord>,
                origin: $crate::domain::sync::Origin,
            ) -> Result<(), $crate::domain::sync::SyncError> {
                for record in records {
                    $(
                        if record.kind == <$child_ty as $crate::domain::sync::Syncable>::KIND {
                            self.$child.push($crate::domain::sync::wire::decode_record::<$child_ty>(record, origin)?);
                            continue;
                        }
                    )*
                    return Err($crate::domain::sync::SyncError::rejected(
                        record.id.as_ref().map(|id| id.as_str()),
                        format!("unexpected child kind {} under {}", record.kind, <$entity as $crate::domain::sync::Syncable>::KIND),
                    ));
                }
                Ok(())
            }
        }
    };
}

pub(crate) use syncable;
