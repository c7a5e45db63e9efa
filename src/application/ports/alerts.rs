use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// 画面に表示する通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAlert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

impl UserAlert {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(AlertLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(AlertLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(AlertLevel::Error, title, message)
    }

    fn with_level(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// 通知の送り先。戻り値は使わない
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: UserAlert);
}

/// 複数の送り先へ同じ通知を配る
impl AlertSink for Vec<Arc<dyn AlertSink>> {
    fn notify(&self, alert: UserAlert) {
        for sink in self {
            sink.notify(alert.clone());
        }
    }
}
