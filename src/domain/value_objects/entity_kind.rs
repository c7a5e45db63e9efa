use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Event,
    Participant,
    Item,
    Transaction,
    PaymentMethod,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Event,
        EntityKind::Participant,
        EntityKind::Item,
        EntityKind::Transaction,
        EntityKind::PaymentMethod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Event => "event",
            EntityKind::Participant => "participant",
            EntityKind::Item => "item",
            EntityKind::Transaction => "transaction",
            EntityKind::PaymentMethod => "payment_method",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EntityKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("Unknown entity kind: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::try_from(kind.as_str()), Ok(kind));
        }
        assert!(EntityKind::try_from("budget").is_err());
    }
}
