use crate::application::ports::{AlertLevel, AlertSink, UserAlert};

/// 画面を持たない環境向け。通知をログに流すだけ
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, alert: UserAlert) {
        match alert.level {
            AlertLevel::Info => tracing::info!(title = %alert.title, "{}", alert.message),
            AlertLevel::Warning => tracing::warn!(title = %alert.title, "{}", alert.message),
            AlertLevel::Error => tracing::error!(title = %alert.title, "{}", alert.message),
        }
    }
}
