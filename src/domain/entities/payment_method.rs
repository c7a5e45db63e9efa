use crate::domain::sync::{Snapshot, SyncMeta, TrackedFields, syncable};
use crate::domain::value_objects::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    #[default]
    Cash,
    CreditCard,
    DebitCard,
    BankTransfer,
    EMoney,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Cash => "cash",
            PaymentMethodKind::CreditCard => "credit_card",
            PaymentMethodKind::DebitCard => "debit_card",
            PaymentMethodKind::BankTransfer => "bank_transfer",
            PaymentMethodKind::EMoney => "e_money",
        }
    }

    /// 締め日を持つのはクレジットカードだけ
    pub fn has_billing_cycle(&self) -> bool {
        matches!(self, PaymentMethodKind::CreditCard)
    }
}

impl fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodFields {
    pub title: String,
    #[serde(default)]
    pub kind: PaymentMethodKind,
    /// カード番号の末尾 4 桁
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub closing_day: Option<u8>,
}

impl PaymentMethodFields {
    pub fn new(title: impl Into<String>, kind: PaymentMethodKind) -> Self {
        Self {
            title: title.into(),
            kind,
            last4: None,
            closing_day: None,
        }
    }
}

impl TrackedFields for PaymentMethodFields {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(last4) = &self.last4
            && (last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()))
        {
            return Err("last4 must be exactly 4 digits".to_string());
        }
        if let Some(day) = self.closing_day {
            if !self.kind.has_billing_cycle() {
                return Err(format!("{} has no closing day", self.kind));
            }
            if !(1..=31).contains(&day) {
                return Err("closing_day must be between 1 and 31".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentMethod {
    pub meta: SyncMeta,
    pub fields: PaymentMethodFields,
    shadow: Option<Snapshot>,
}

syncable! {
    PaymentMethod {
        kind: EntityKind::PaymentMethod,
        fields: PaymentMethodFields,
        children: {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_details_are_validated() {
        let mut fields = PaymentMethodFields::new("Visa", PaymentMethodKind::CreditCard);
        fields.last4 = Some("1234".into());
        fields.closing_day = Some(25);
        assert!(fields.validate().is_ok());

        fields.last4 = Some("12a4".into());
        assert!(fields.validate().is_err());

        let mut cash = PaymentMethodFields::new("Wallet", PaymentMethodKind::Cash);
        cash.closing_day = Some(10);
        assert!(cash.validate().is_err());
    }
}
