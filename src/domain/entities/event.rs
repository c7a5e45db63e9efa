use super::item::Item;
use super::participant::Participant;
use super::transaction::{Transaction, TransactionFields};
use crate::domain::sync::{Snapshot, SyncMeta, Syncable, TrackedFields, syncable};
use crate::domain::value_objects::{Amount, EntityKind, Intent, SessionContext};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    pub title: String,
    /// ISO 4217 通貨コード
    pub currency: String,
    #[serde(default)]
    pub starts_on: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

impl EventFields {
    pub fn new(title: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            currency: currency.into(),
            starts_on: None,
            note: None,
        }
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self::new(title, "JPY")
    }
}

impl TrackedFields for EventFields {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }
}

/// 割り勘イベント。参加者と明細を所有する
#[derive(Debug, Clone)]
pub struct Event {
    pub meta: SyncMeta,
    pub fields: EventFields,
    pub participants: Vec<Participant>,
    pub items: Vec<Item>,
    shadow: Option<Snapshot>,
}

syncable! {
    Event {
        kind: EntityKind::Event,
        fields: EventFields,
        children: {
            participants: Participant,
            items: Item,
        },
    }
}

impl Event {
    pub fn total(&self) -> Amount {
        self.items
            .iter()
            .filter(|item| !item.meta.intent.is_delete())
            .map(|item| item.fields.amount)
            .sum()
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(|p| !p.meta.intent.is_delete())
    }

    /// 個人の支払い手段で立て替えた新規明細から、個人の家計簿に載せるトランザクションを作る。
    /// イベント自体の送信が終わってから別途送信される。
    pub fn ledger_entries(&self, context: &SessionContext) -> Vec<Transaction> {
        self.items
            .iter()
            .filter(|item| item.meta.intent == Intent::Add)
            .filter_map(|item| {
                let payment_method = item.fields.payment_method.clone()?;
                let occurred_on = item
                    .fields
                    .spent_on
                    .or(self.fields.starts_on)
                    .unwrap_or_else(|| Utc::now().date_naive());

                let mut fields =
                    TransactionFields::new(item.fields.title.clone(), item.fields.amount, occurred_on);
                fields.payment_method = Some(payment_method);
                fields.note = Some(self.fields.title.clone());
                fields.source_item = Some(item.meta.local_id.clone());
                Some(Transaction::draft(fields, Some(context.user_id.clone())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ItemFields;
    use crate::domain::value_objects::{RemoteId, UserId};

    fn context() -> SessionContext {
        SessionContext::new(UserId::new("user-1".into()).unwrap(), "acc-1", "device-1")
    }

    #[test]
    fn test_ledger_entries_only_for_new_card_items() {
        let mut event = Event::draft(EventFields::titled("Kyoto"), None);
        event.fields.starts_on = NaiveDate::from_ymd_opt(2024, 4, 1);
        let card = RemoteId::new("pm-1".into()).unwrap();

        event.items.push(Item::draft(
            ItemFields::priced("Ryokan", Amount::from_minor(42_000)).paid_with(card.clone()),
            None,
        ));
        event
            .items
            .push(Item::draft(ItemFields::priced("Snacks", Amount::from_minor(800)), None));
        let mut existing = Item::draft(
            ItemFields::priced("Train", Amount::from_minor(13_000)).paid_with(card.clone()),
            None,
        );
        existing.meta.intent = Intent::Edit;
        event.items.push(existing);

        let entries = event.ledger_entries(&context());

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.fields.title, "Ryokan");
        assert_eq!(entry.fields.payment_method, Some(card));
        assert_eq!(entry.bucket_key(), "2024-04");
        assert_eq!(entry.meta.intent, Intent::Add);
        assert_eq!(entry.meta.entered_by, Some(context().user_id));
        assert_eq!(entry.fields.source_item.as_ref(), Some(&event.items[0].meta.local_id));
    }

    #[test]
    fn test_total_skips_deleted_items() {
        let mut event = Event::draft(EventFields::titled("Kyoto"), None);
        event
            .items
            .push(Item::draft(ItemFields::priced("A", Amount::from_minor(500)), None));
        event
            .items
            .push(Item::draft(ItemFields::priced("B", Amount::from_minor(700)), None));
        event.items[1].meta.intent = Intent::Delete;
        assert_eq!(event.total(), Amount::from_minor(500));
    }
}
