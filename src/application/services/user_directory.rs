use crate::domain::entities::User;
use crate::domain::sync::SyncNode;
use crate::domain::value_objects::UserId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// エンティティが ID で参照するユーザーの実体を持つ
#[derive(Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn remove(&self, user_id: &UserId) -> Option<User> {
        self.users.write().await.remove(user_id)
    }

    pub async fn get(&self, user_id: &UserId) -> Option<User> {
        self.users.read().await.get(user_id).cloned()
    }

    /// 表示名。未登録のユーザーは ID をそのまま返す
    pub async fn label_for(&self, user_id: &UserId) -> String {
        match self.users.read().await.get(user_id) {
            Some(user) => user.label().to_string(),
            None => user_id.as_str().to_string(),
        }
    }

    pub async fn entered_by(&self, node: &dyn SyncNode) -> Option<User> {
        let user_id = node.meta().entered_by.as_ref()?;
        self.get(user_id).await
    }

    pub async fn updated_by(&self, node: &dyn SyncNode) -> Option<User> {
        let user_id = node.meta().updated_by.as_ref()?;
        self.get(user_id).await
    }
}
