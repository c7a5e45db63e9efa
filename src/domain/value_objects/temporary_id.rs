use serde::{Deserialize, Serialize};
use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemporaryId(String);

impl TemporaryId {
    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Temporary ID cannot be empty".to_string());
        }
        Ok(())
    }
}

impl TemporaryId {
    /// クライアント側で衝突しない一時 ID を発行する
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TemporaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TemporaryId> for String {
    fn from(value: TemporaryId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<TemporaryId> = (0..10_000).map(|_| TemporaryId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[tokio::test]
    async fn test_generated_ids_are_distinct_across_tasks() {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                tokio::spawn(async {
                    (0..500)
                        .map(|_| TemporaryId::generate())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in futures::future::join_all(handles).await {
            for id in handle.expect("task") {
                assert!(ids.insert(id), "duplicate temporary id");
            }
        }
        assert_eq!(ids.len(), 16 * 500);
    }

    #[test]
    fn test_blank_id_is_rejected() {
        assert!(TemporaryId::new("  ".into()).is_err());
        assert_eq!(TemporaryId::new("tmp-1".into()).unwrap().as_str(), "tmp-1");
    }
}
