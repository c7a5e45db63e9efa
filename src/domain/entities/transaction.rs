use crate::domain::sync::{Snapshot, SyncMeta, TrackedFields, syncable};
use crate::domain::value_objects::{Amount, EntityKind, LocalId, RemoteId};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFields {
    pub title: String,
    pub amount: Amount,
    pub occurred_on: NaiveDate,
    #[serde(default)]
    pub payment_method: Option<RemoteId>,
    #[serde(default)]
    pub note: Option<String>,
    /// イベント明細から作られた場合、その明細のローカル ID。同じ明細から二重に作らないために使う
    #[serde(default)]
    pub source_item: Option<LocalId>,
}

impl TransactionFields {
    pub fn new(title: impl Into<String>, amount: Amount, occurred_on: NaiveDate) -> Self {
        Self {
            title: title.into(),
            amount,
            occurred_on,
            payment_method: None,
            note: None,
            source_item: None,
        }
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self::new(title, Amount::ZERO, Utc::now().date_naive())
    }
}

impl TrackedFields for TransactionFields {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub meta: SyncMeta,
    pub fields: TransactionFields,
    shadow: Option<Snapshot>,
}

syncable! {
    Transaction {
        kind: EntityKind::Transaction,
        fields: TransactionFields,
        children: {},
    }
}

impl Transaction {
    /// 月別バケットのキー（`YYYY-MM`）
    pub fn bucket_key(&self) -> String {
        bucket_key_for(self.fields.occurred_on)
    }
}

pub fn bucket_key_for(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
