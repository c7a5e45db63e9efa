use super::UserId;
use serde::{Deserialize, Serialize};

/// 送信ペイロードに刻むユーザー・アカウント・端末の識別子
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: UserId,
    pub account_id: String,
    pub device_id: String,
}

impl SessionContext {
    pub fn new(user_id: UserId, account_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id,
            account_id: account_id.into(),
            device_id: device_id.into(),
        }
    }
}
