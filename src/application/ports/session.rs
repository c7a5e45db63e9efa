use crate::domain::value_objects::SessionContext;
use crate::shared::error::AppError;

pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Result<SessionContext, AppError>;
}
