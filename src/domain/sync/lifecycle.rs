use super::node::{NodeState, SyncNode, Syncable, for_each_descendant, for_each_descendant_mut};
use crate::domain::value_objects::{Intent, LocalId};

pub fn is_blank(title: &str) -> bool {
    title.trim().is_empty()
}

/// 削除は子へ同期的に伝播させる（送信前に全ての子が Delete になっている必要がある）
pub fn mark_for_deletion(node: &mut dyn SyncNode) {
    node.meta_mut().intent = Intent::Delete;
    for_each_descendant_mut(node, &mut |child| child.meta_mut().intent = Intent::Delete);
}

/// 送信失敗時に intent を送信前の形へ戻す。
///
/// ルートの Add は `preserve_add` が真なら Add のまま（次回も作成として再送）、
/// 偽なら Edit へ落とす。Delete はルート・子とも取り消し、サーバー ID を持たない子は Add に戻す。
pub fn revert_after_failure(node: &mut dyn SyncNode, preserve_add: bool) {
    let meta = node.meta_mut();
    meta.intent = match meta.intent {
        Intent::Add if preserve_add => Intent::Add,
        _ => Intent::Edit,
    };

    for_each_descendant_mut(node, &mut |child| {
        let meta = child.meta_mut();
        if meta.intent == Intent::Delete {
            meta.intent = if meta.remote_id.is_some() {
                Intent::Edit
            } else {
                Intent::Add
            };
        }
    });
}

/// タイトル未入力のまま作成途中の子を取り除く。取り除いた件数を返す
pub fn prune_cancelled_children(node: &mut dyn SyncNode) -> usize {
    let mut pruned = 0;
    node.retain_children(&mut |child| {
        let cancelled = child.meta().intent == Intent::Add && is_blank(child.title());
        if cancelled {
            pruned += 1;
        }
        !cancelled
    });
    for child in node.children_mut() {
        pruned += prune_cancelled_children(child);
    }
    pruned
}

/// サーバーに存在する子のうちタイトルが空になっているもの
pub fn blank_existing_children(node: &dyn SyncNode) -> Vec<LocalId> {
    let mut blanks = Vec::new();
    for_each_descendant(node, &mut |child| {
        if child.meta().intent == Intent::Edit && is_blank(child.title()) {
            blanks.push(child.meta().local_id.clone());
        }
    });
    blanks
}

/// 空タイトルの子をスナップショット時点のタイトルへ戻す
pub fn restore_blank_children(node: &mut dyn SyncNode, shadow: &NodeState) -> usize {
    let mut restored = 0;
    for_each_descendant_mut(node, &mut |child| {
        if child.meta().intent != Intent::Edit || !is_blank(child.title()) {
            return;
        }
        if let Some(previous) = shadow.find(child.kind(), &child.meta().local_id) {
            child.set_title(previous.title.clone());
            restored += 1;
        }
    });
    restored
}

/// 送信が完了した Delete の子をグラフから外す
pub fn remove_deleted_children(node: &mut dyn SyncNode) {
    node.retain_children(&mut |child| !child.meta().intent.is_delete());
    for child in node.children_mut() {
        remove_deleted_children(child);
    }
}

/// 子コレクションからの削除。未送信の子はその場で捨て、既存の子は Delete にする
pub fn remove_from<C: Syncable>(collection: &mut Vec<C>, local_id: &LocalId) -> bool {
    let Some(index) = collection
        .iter()
        .position(|entity| &entity.meta().local_id == local_id)
    else {
        return false;
    };

    if collection[index].meta().intent == Intent::Add {
        collection.remove(index);
    } else {
        mark_for_deletion(&mut collection[index]);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        Event, EventFields, Item, ItemFields, Participant, ParticipantFields, Transaction,
        TransactionFields,
    };
    use crate::domain::sync::{SyncMeta, snapshot};
    use crate::domain::value_objects::{Amount, RemoteId};
    use chrono::Utc;

    fn synced<E: Syncable>(id: &str, fields: E::Fields) -> E {
        E::from_parts(
            SyncMeta::synced(RemoteId::new(id.into()).unwrap(), None, Utc::now()),
            fields,
        )
    }

    fn event_with_children() -> Event {
        let mut event: Event = synced("ev-1", EventFields::titled("Trip"));
        event
            .participants
            .push(synced("pa-1", ParticipantFields::titled("Aki")));
        let mut item: Item = synced("it-1", ItemFields::priced("Fuel", Amount::from_minor(100)));
        item.transactions
            .push(synced("tx-1", TransactionFields::titled("Fuel share")));
        item.transactions
            .push(Transaction::draft(TransactionFields::titled("Tolls"), None));
        event.items.push(item);
        event
    }

    #[test]
    fn test_deletion_cascades_to_every_descendant() {
        let mut event = event_with_children();
        mark_for_deletion(&mut event);

        assert_eq!(event.meta.intent, Intent::Delete);
        for_each_descendant(&event, &mut |child| {
            assert_eq!(child.meta().intent, Intent::Delete);
        });
    }

    #[test]
    fn test_failed_delete_reverts_children_by_identity() {
        let mut event = event_with_children();
        mark_for_deletion(&mut event);

        revert_after_failure(&mut event, true);

        assert_eq!(event.meta.intent, Intent::Edit);
        assert_eq!(event.items[0].transactions[0].meta.intent, Intent::Edit);
        assert_eq!(event.items[0].transactions[1].meta.intent, Intent::Add);
    }

    #[test]
    fn test_failed_create_respects_preserve_flag() {
        let mut event = Event::draft(EventFields::titled("Trip"), None);
        revert_after_failure(&mut event, true);
        assert_eq!(event.meta.intent, Intent::Add);

        revert_after_failure(&mut event, false);
        assert_eq!(event.meta.intent, Intent::Edit);
    }

    #[test]
    fn test_blank_new_children_are_pruned_at_every_level() {
        let mut event = event_with_children();
        event
            .participants
            .push(Participant::draft(ParticipantFields::titled("  "), None));
        event.items[0]
            .transactions
            .push(Transaction::draft(TransactionFields::titled(""), None));

        assert_eq!(prune_cancelled_children(&mut event), 2);
        assert_eq!(event.participants.len(), 1);
        assert_eq!(event.items[0].transactions.len(), 2);
    }

    #[test]
    fn test_blank_existing_children_are_restored_from_shadow() {
        let mut event = event_with_children();
        snapshot::begin_snapshot(&mut event).unwrap();
        event.participants[0].fields.title.clear();

        assert_eq!(
            blank_existing_children(&event),
            vec![event.participants[0].meta.local_id.clone()]
        );

        let shadow = event.shadow().unwrap().state().clone();
        assert_eq!(restore_blank_children(&mut event, &shadow), 1);
        assert_eq!(event.participants[0].fields.title, "Aki");
        assert!(blank_existing_children(&event).is_empty());
    }

    #[test]
    fn test_remove_from_discards_new_and_marks_existing() {
        let mut event = event_with_children();
        let draft = Participant::draft(ParticipantFields::titled("Ren"), None);
        let draft_id = draft.meta.local_id.clone();
        event.participants.push(draft);

        assert!(remove_from(&mut event.participants, &draft_id));
        assert_eq!(event.participants.len(), 1);

        let existing = event.participants[0].meta.local_id.clone();
        assert!(remove_from(&mut event.participants, &existing));
        assert_eq!(event.participants[0].meta.intent, Intent::Delete);

        remove_deleted_children(&mut event);
        assert!(event.participants.is_empty());
        assert!(!remove_from(&mut event.participants, &existing));
    }
}
