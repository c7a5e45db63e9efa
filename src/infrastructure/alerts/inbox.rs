use crate::application::ports::{AlertSink, UserAlert};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 通知を溜めておき、UI 側がまとめて取り出す
#[derive(Debug, Default)]
pub struct AlertInbox {
    alerts: Mutex<Vec<UserAlert>>,
}

impl AlertInbox {
    fn alerts(&self) -> MutexGuard<'_, Vec<UserAlert>> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn drain(&self) -> Vec<UserAlert> {
        std::mem::take(&mut *self.alerts())
    }

    pub fn len(&self) -> usize {
        self.alerts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts().is_empty()
    }
}

impl AlertSink for AlertInbox {
    fn notify(&self, alert: UserAlert) {
        tracing::debug!(level = ?alert.level, title = %alert.title, "Alert queued");
        self.alerts().push(alert);
    }
}
