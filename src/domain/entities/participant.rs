use crate::domain::sync::{Snapshot, SyncMeta, TrackedFields, syncable};
use crate::domain::value_objects::{EntityKind, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFields {
    pub title: String,
    /// アプリのユーザーと紐づく場合のみ。名前だけの参加者もいる
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// 割り勘の重み
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl ParticipantFields {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            user_id: None,
            weight: default_weight(),
        }
    }

    pub fn for_user(title: impl Into<String>, user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::titled(title)
        }
    }
}

impl TrackedFields for ParticipantFields {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub meta: SyncMeta,
    pub fields: ParticipantFields,
    shadow: Option<Snapshot>,
}

syncable! {
    Participant {
        kind: EntityKind::Participant,
        fields: ParticipantFields,
        children: {},
    }
}
