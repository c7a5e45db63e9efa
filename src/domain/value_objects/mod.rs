pub mod amount;
pub mod entity_kind;
pub mod intent;
pub mod local_id;
pub mod remote_id;
pub mod session_context;
pub mod temporary_id;
pub mod user_id;

pub use amount::Amount;
pub use entity_kind::EntityKind;
pub use intent::{Intent, OperationTag};
pub use local_id::LocalId;
pub use remote_id::RemoteId;
pub use session_context::SessionContext;
pub use temporary_id::TemporaryId;
pub use user_id::UserId;
