use crate::domain::value_objects::{EntityKind, LocalId, TemporaryId};
use crate::shared::error::AppError;
use thiserror::Error;

/// ユーザーに見せる入力エラー。ネットワークには到達しない
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{kind} title must not be empty")]
    BlankTitle { kind: EntityKind, local_id: LocalId },

    #[error("{count} nested record(s) have an empty title")]
    BlankChildTitle { count: usize, local_ids: Vec<LocalId> },

    #[error("{kind} {local_id}: {reason}")]
    InvalidField {
        kind: EntityKind,
        local_id: LocalId,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// 画面遷移などで呼び出し側が中断した。ユーザーには通知しない
    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    /// 作成したはずの子レコードがサーバー応答に含まれていない
    #[error("Server response is missing {} created record(s)", .missing.len())]
    ReconciliationIntegrity { missing: Vec<LocalId> },

    #[error("Record {} rejected: {reason}", .id.as_deref().unwrap_or("<no id>"))]
    RecordRejected { id: Option<String>, reason: String },

    #[error("A submission for {kind} {local_id} is already in flight")]
    AlreadyInFlight { kind: EntityKind, local_id: LocalId },

    #[error("Temporary id {0} is claimed by more than one record")]
    DuplicateTemporaryId(TemporaryId),

    #[error("{kind} {local_id} not found")]
    NotFound { kind: EntityKind, local_id: LocalId },

    #[error("No edit snapshot for {0}")]
    NoSnapshot(LocalId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl SyncError {
    pub fn rejected(id: Option<&str>, reason: impl Into<String>) -> Self {
        SyncError::RecordRejected {
            id: id.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// ユーザーへ通知すべきエラーかどうか。中断は想定内なので通知しない
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            SyncError::Transport(TransportError::Cancelled) | SyncError::AlreadyInFlight { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<AppError> for SyncError {
    fn from(err: AppError) -> Self {
        SyncError::Cache(err.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::Validation(inner) => AppError::ValidationError(inner.to_string()),
            SyncError::Transport(inner) => AppError::Network(inner.to_string()),
            SyncError::NotFound { .. } => AppError::NotFound(message),
            SyncError::Serialization(msg) => AppError::SerializationError(msg),
            SyncError::Cache(msg) => AppError::Storage(msg),
            _ => AppError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_user_visible() {
        assert!(!SyncError::Transport(TransportError::Cancelled).is_user_visible());
        assert!(SyncError::Transport(TransportError::Unreachable("offline".into())).is_user_visible());
        assert!(SyncError::ReconciliationIntegrity { missing: vec![] }.is_user_visible());
    }

    #[test]
    fn test_conversion_to_app_error_keeps_category() {
        let err: AppError = SyncError::Transport(TransportError::Cancelled).into();
        assert!(matches!(err, AppError::Network(_)));

        let err: AppError = SyncError::Validation(ValidationError::BlankTitle {
            kind: EntityKind::Event,
            local_id: LocalId::new("e1".into()).unwrap(),
        })
        .into();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
