use super::transaction::Transaction;
use crate::domain::sync::{Snapshot, SyncMeta, TrackedFields, syncable};
use crate::domain::value_objects::{Amount, EntityKind, RemoteId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// イベント内の明細行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub title: String,
    pub amount: Amount,
    #[serde(default)]
    pub spent_on: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    /// 個人の支払い手段で立て替えた場合、その手段の永続 ID
    #[serde(default)]
    pub payment_method: Option<RemoteId>,
}

impl ItemFields {
    pub fn priced(title: impl Into<String>, amount: Amount) -> Self {
        Self {
            title: title.into(),
            amount,
            spent_on: None,
            category: None,
            payment_method: None,
        }
    }

    pub fn paid_with(mut self, payment_method: RemoteId) -> Self {
        self.payment_method = Some(payment_method);
        self
    }
}

impl TrackedFields for ItemFields {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub meta: SyncMeta,
    pub fields: ItemFields,
    /// 明細に紐づく精算トランザクション
    pub transactions: Vec<Transaction>,
    shadow: Option<Snapshot>,
}

syncable! {
    Item {
        kind: EntityKind::Item,
        fields: ItemFields,
        children: { transactions: Transaction },
    }
}

impl Item {
    pub fn settled_amount(&self) -> Amount {
        self.transactions
            .iter()
            .filter(|tx| !tx.meta.intent.is_delete())
            .map(|tx| tx.fields.amount)
            .sum()
    }

    pub fn outstanding(&self) -> Amount {
        self.fields.amount - self.settled_amount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::TransactionFields;
    use crate::domain::sync::Syncable;
    use crate::domain::sync::lifecycle::mark_for_deletion;

    #[test]
    fn test_outstanding_ignores_deleted_transactions() {
        let mut item = Item::draft(ItemFields::priced("Hotel", Amount::from_minor(30_000)), None);
        let mut first = TransactionFields::titled("Aki");
        first.amount = Amount::from_minor(10_000);
        let mut second = TransactionFields::titled("Ren");
        second.amount = Amount::from_minor(10_000);
        item.transactions.push(Transaction::draft(first, None));
        item.transactions.push(Transaction::draft(second, None));

        assert_eq!(item.outstanding(), Amount::from_minor(10_000));

        mark_for_deletion(&mut item.transactions[1]);
        assert_eq!(item.outstanding(), Amount::from_minor(20_000));
    }
}
