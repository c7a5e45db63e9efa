use super::error::SyncError;
use super::node::{NodeState, SyncNode, Syncable};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 編集開始時点のシャドウコピー。ライブのエンティティとは値を一切共有しない
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    state: NodeState,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(node: &dyn SyncNode) -> Result<Self, SyncError> {
        Ok(Self {
            state: NodeState::capture(node)?,
            taken_at: Utc::now(),
        })
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn title(&self) -> &str {
        &self.state.title
    }
}

/// シャドウを取り直す。既存のシャドウは破棄される
pub fn begin_snapshot<E: Syncable>(entity: &mut E) -> Result<(), SyncError> {
    let snapshot = Snapshot::capture(entity)?;
    *entity.shadow_mut() = Some(snapshot);
    Ok(())
}

pub fn clear_snapshot<E: Syncable>(entity: &mut E) {
    *entity.shadow_mut() = None;
}

/// シャドウが無い場合は比較基準が無いので変更ありとみなす
pub fn has_changes<E: Syncable>(entity: &E) -> bool {
    match entity.shadow() {
        Some(snapshot) => differs(&snapshot.state, entity),
        None => true,
    }
}

/// シャドウのフィールドと子コレクションをライブのエンティティへ書き戻す。
/// ルートの識別子と intent には触れない。
pub fn restore<E: Syncable>(entity: &mut E) -> Result<(), SyncError> {
    let state = match entity.shadow() {
        Some(snapshot) => snapshot.state.clone(),
        None => return Err(SyncError::NoSnapshot(entity.meta().local_id.clone())),
    };

    entity.apply_fields_value(state.fields)?;
    entity.restore_children(&state.children)?;
    Ok(())
}

/// タイトルだけをシャドウの値に戻す
pub fn restore_title<E: Syncable>(entity: &mut E) -> Result<(), SyncError> {
    let title = match entity.shadow() {
        Some(snapshot) => snapshot.title().to_string(),
        None => return Err(SyncError::NoSnapshot(entity.meta().local_id.clone())),
    };
    entity.set_title(title);
    Ok(())
}

/// 子コレクションをスナップショットから組み立て直す。途中で失敗した場合は元のまま
pub fn restore_collection<C: Syncable>(
    collection: &mut Vec<C>,
    states: &[NodeState],
) -> Result<(), SyncError> {
    let rebuilt = states
        .iter()
        .filter(|state| state.kind == C::KIND)
        .map(from_state::<C>)
        .collect::<Result<Vec<_>, _>>()?;
    *collection = rebuilt;
    Ok(())
}

fn from_state<C: Syncable>(state: &NodeState) -> Result<C, SyncError> {
    let fields = serde_json::from_value(state.fields.clone())?;
    let mut entity = C::from_parts(state.meta.clone(), fields);
    entity.restore_children(&state.children)?;
    Ok(entity)
}

fn differs(state: &NodeState, node: &dyn SyncNode) -> bool {
    match node.fields_value() {
        Ok(fields) if fields == state.fields => {}
        _ => return true,
    }

    let live = node.children();
    if live.len() != state.children.len() {
        return true;
    }

    let shadowed: HashMap<_, _> = state
        .children
        .iter()
        .map(|child| ((child.kind, &child.meta.local_id), child))
        .collect();

    live.into_iter().any(|child| {
        match shadowed.get(&(child.kind(), &child.meta().local_id)) {
            Some(previous) => {
                previous.meta.intent.is_delete() != child.meta().intent.is_delete()
                    || differs(previous, child)
            }
            None => true,
        }
    })
}
