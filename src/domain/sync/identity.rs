use super::error::SyncError;
use super::node::{SyncNode, for_each_descendant, for_each_descendant_mut};
use super::wire::SubmissionResponse;
use crate::domain::value_objects::{Intent, LocalId, RemoteId, TemporaryId};
use std::collections::{HashMap, HashSet};

pub fn new_temporary_id() -> TemporaryId {
    TemporaryId::generate()
}

/// サーバー発行の ID を割り当てる。ローカル ID はそのまま維持する
pub fn rewrite(node: &mut dyn SyncNode, remote_id: RemoteId) {
    let meta = node.meta_mut();
    meta.temporary_id = None;
    meta.remote_id = Some(remote_id);
    meta.intent = Intent::Edit;
}

/// 送信したグラフ全体の一時 ID を応答の対応表で置き換える。
///
/// ルートは `response.remote_id` で、子孫は Add のものだけを一時 ID で突き合わせる。
/// 対応が見つからない子孫が残った場合はサーバー側で作成が落ちているので
/// `ReconciliationIntegrity` を返す（対応できた分は書き換え済み）。
pub fn rewrite_graph(root: &mut dyn SyncNode, response: &SubmissionResponse) -> Result<(), SyncError> {
    rewrite(root, response.remote_id.clone());
    if let Some(updated_at) = response.updated_at {
        root.meta_mut().updated_at = Some(updated_at);
    }

    let mut assigned: HashMap<&TemporaryId, &RemoteId> = response
        .created
        .iter()
        .map(|pair| (&pair.temporary_id, &pair.remote_id))
        .collect();
    let mut missing: Vec<LocalId> = Vec::new();

    for_each_descendant_mut(root, &mut |child| {
        if child.meta().intent != Intent::Add {
            return;
        }
        let matched = child
            .meta()
            .temporary_id
            .as_ref()
            .and_then(|temporary_id| assigned.remove(temporary_id));
        match matched {
            Some(remote_id) => rewrite(child, remote_id.clone()),
            None => missing.push(child.meta().local_id.clone()),
        }
    });

    if !assigned.is_empty() {
        tracing::warn!(
            unmatched = assigned.len(),
            "Server reported created records that were not in the submission"
        );
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::ReconciliationIntegrity { missing })
    }
}

/// 1 つの送信グラフ内で同じ一時 ID を持つレコードが複数あってはならない
pub fn ensure_unique_temporary_ids(root: &dyn SyncNode) -> Result<(), SyncError> {
    let mut seen: HashSet<TemporaryId> = HashSet::new();
    let mut duplicate: Option<TemporaryId> = None;

    let mut check = |node: &dyn SyncNode| {
        if duplicate.is_some() {
            return;
        }
        if let Some(temporary_id) = &node.meta().temporary_id
            && !seen.insert(temporary_id.clone())
        {
            duplicate = Some(temporary_id.clone());
        }
    };
    check(root);
    for_each_descendant(root, &mut check);

    match duplicate {
        Some(temporary_id) => Err(SyncError::DuplicateTemporaryId(temporary_id)),
        None => Ok(()),
    }
}
