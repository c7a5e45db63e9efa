use crate::application::ports::SessionProvider;
use crate::domain::value_objects::SessionContext;
use crate::shared::error::AppError;
use std::sync::{PoisonError, RwLock};

/// ログイン状態をメモリに保持するだけの実装
#[derive(Debug, Default)]
pub struct StaticSessionProvider {
    session: RwLock<Option<SessionContext>>,
}

impl StaticSessionProvider {
    pub fn signed_in(context: SessionContext) -> Self {
        Self {
            session: RwLock::new(Some(context)),
        }
    }

    pub fn sign_in(&self, context: SessionContext) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(context);
    }

    pub fn sign_out(&self) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl SessionProvider for StaticSessionProvider {
    fn current_session(&self) -> Result<SessionContext, AppError> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AppError::InvalidInput("No active session".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::UserId;

    #[test]
    fn test_sign_in_and_out() {
        let provider = StaticSessionProvider::default();
        assert!(provider.current_session().is_err());

        let context = SessionContext::new(UserId::new("user-1".into()).unwrap(), "acc-1", "device-1");
        provider.sign_in(context.clone());
        assert_eq!(provider.current_session().unwrap(), context);

        provider.sign_out();
        assert!(provider.current_session().is_err());
    }
}
