use super::error::SyncError;
use super::node::Syncable;
use super::snapshot;
use crate::domain::value_objects::{Intent, RemoteId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// 取り込めなかったサーバーレコードの分だけ削除判定を緩める
#[derive(Debug, Clone, Default)]
pub struct MergeGuard {
    /// 不正レコードとして弾いたが、サーバーには存在している ID
    pub keep: HashSet<RemoteId>,
    /// ID すら読めないレコードがあった場合は削除パスそのものを行わない
    pub skip_tombstones: bool,
}

pub fn merge_collection<E: Syncable>(
    local: &mut Vec<E>,
    server: Vec<E>,
) -> Result<MergeReport, SyncError> {
    merge_collection_guarded(local, server, &MergeGuard::default())
}

/// サーバーの一覧をローカルへ取り込む。
///
/// 先に全件の upsert を終えてから、サーバーに無くなったものを取り除く。
/// Add のエンティティはサーバーから見えないので削除対象にしない。
pub fn merge_collection_guarded<E: Syncable>(
    local: &mut Vec<E>,
    server: Vec<E>,
    guard: &MergeGuard,
) -> Result<MergeReport, SyncError> {
    let mut report = MergeReport::default();
    let mut server_ids: HashSet<RemoteId> = guard.keep.clone();

    for incoming in server {
        let Some(remote_id) = incoming.meta().remote_id.clone() else {
            tracing::warn!(kind = %E::KIND, "Skipping server entity without a permanent id");
            continue;
        };

        let existing = local
            .iter_mut()
            .find(|entity| entity.meta().remote_id.as_ref() == Some(&remote_id));
        match existing {
            Some(entity) => {
                hydrate_from(entity, incoming)?;
                report.updated += 1;
            }
            None => {
                local.push(incoming);
                report.added += 1;
            }
        }
        server_ids.insert(remote_id);
    }

    if !guard.skip_tombstones {
        let before = local.len();
        local.retain(|entity| {
            let meta = entity.meta();
            meta.intent == Intent::Add
                || meta
                    .remote_id
                    .as_ref()
                    .is_none_or(|id| server_ids.contains(id))
        });
        report.removed = before - local.len();
    }

    Ok(report)
}

/// ローカルのオブジェクトを保ったままサーバーの値で上書きする
pub fn hydrate_from<E: Syncable>(local: &mut E, server: E) -> Result<(), SyncError> {
    *local.fields_mut() = server.fields().clone();

    let incoming = server.meta().clone();
    let meta = local.meta_mut();
    meta.remote_id = incoming.remote_id;
    meta.temporary_id = None;
    meta.intent = Intent::Edit;
    meta.entered_by = incoming.entered_by.or(meta.entered_by.take());
    meta.updated_by = incoming.updated_by.or(meta.updated_by.take());
    meta.created_at = incoming.created_at.or(meta.created_at);
    meta.updated_at = incoming.updated_at;

    local.hydrate_children(server)?;

    if local.shadow().is_some() {
        snapshot::begin_snapshot(local)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        Event, EventFields, Item, ItemFields, Participant, ParticipantFields,
    };
    use crate::domain::sync::SyncMeta;
    use crate::domain::value_objects::{Amount, LocalId};
    use chrono::Utc;

    fn remote(id: &str) -> RemoteId {
        RemoteId::new(id.to_string()).unwrap()
    }

    fn synced<E: Syncable>(id: &str, fields: E::Fields) -> E {
        E::from_parts(SyncMeta::synced(remote(id), None, Utc::now()), fields)
    }

    fn ids(events: &[Event]) -> Vec<String> {
        let mut ids: Vec<String> = events
            .iter()
            .filter_map(|e| e.meta.remote_id.as_ref().map(|id| id.as_str().to_string()))
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_upsert_then_tombstone() {
        let mut local: Vec<Event> = vec![
            synced("1", EventFields::titled("one")),
            synced("2", EventFields::titled("two")),
            synced("3", EventFields::titled("three")),
        ];
        let local_id_2 = local[1].meta.local_id.clone();
        let server: Vec<Event> = vec![
            synced("2", EventFields::titled("two (server)")),
            synced("3", EventFields::titled("three")),
            synced("4", EventFields::titled("four")),
        ];

        let report = merge_collection(&mut local, server.clone()).unwrap();

        assert_eq!(report, MergeReport { added: 1, updated: 2, removed: 1 });
        assert_eq!(ids(&local), vec!["2", "3", "4"]);
        let two = local.iter().find(|e| e.meta.local_id == local_id_2).unwrap();
        assert_eq!(two.fields, server[0].fields);
        let four = local.iter().find(|e| e.meta.remote_id == Some(remote("4"))).unwrap();
        assert_eq!(four.fields, server[2].fields);
    }

    #[test]
    fn test_new_entities_are_never_tombstoned() {
        let mut local: Vec<Event> = vec![Event::draft(EventFields::titled("draft"), None)];
        let report = merge_collection(&mut local, vec![]).unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_children_are_merged_recursively() {
        let mut local: Event = synced("ev", EventFields::titled("Trip"));
        local
            .participants
            .push(synced("pa-1", ParticipantFields::titled("Aki")));
        local
            .participants
            .push(Participant::draft(ParticipantFields::titled("Ren"), None));
        let kept_local_id = local.participants[0].meta.local_id.clone();

        let mut server: Event = synced("ev", EventFields::titled("Trip"));
        server
            .participants
            .push(synced("pa-1", ParticipantFields::titled("Aki M.")));
        server
            .items
            .push(synced::<Item>("it-1", ItemFields::priced("Fuel", Amount::from_minor(10))));

        let mut collection = vec![local];
        merge_collection(&mut collection, vec![server]).unwrap();

        let event = &collection[0];
        assert_eq!(event.participants.len(), 2);
        assert_eq!(event.participants[0].meta.local_id, kept_local_id);
        assert_eq!(event.participants[0].fields.title, "Aki M.");
        assert_eq!(event.participants[1].meta.intent, Intent::Add);
        assert_eq!(event.items.len(), 1);
    }

    #[test]
    fn test_open_edit_session_gets_a_fresh_shadow() {
        let mut event: Event = synced("ev", EventFields::titled("Trip"));
        snapshot::begin_snapshot(&mut event).unwrap();
        let mut collection = vec![event];

        merge_collection(&mut collection, vec![synced("ev", EventFields::titled("Trip 2"))])
            .unwrap();

        assert!(!snapshot::has_changes(&collection[0]));
        assert_eq!(collection[0].shadow().unwrap().title(), "Trip 2");
    }

    #[test]
    fn test_guard_protects_rejected_records() {
        let mut local: Vec<Event> = vec![
            synced("1", EventFields::titled("one")),
            synced("2", EventFields::titled("two")),
        ];
        let guard = MergeGuard {
            keep: [remote("1")].into_iter().collect(),
            skip_tombstones: false,
        };
        let report = merge_collection_guarded(&mut local, vec![], &guard).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(ids(&local), vec!["1"]);

        let guard = MergeGuard {
            keep: HashSet::new(),
            skip_tombstones: true,
        };
        let report = merge_collection_guarded(&mut local, vec![], &guard).unwrap();
        assert!(report.is_empty());
        assert_eq!(local[0].meta.local_id, LocalId::new("1".into()).unwrap());
    }
}
