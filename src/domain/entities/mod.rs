pub mod event;
pub mod item;
pub mod participant;
pub mod payment_method;
pub mod transaction;
pub mod user;

pub use event::{Event, EventFields};
pub use item::{Item, ItemFields};
pub use participant::{Participant, ParticipantFields};
pub use payment_method::{PaymentMethod, PaymentMethodFields, PaymentMethodKind};
pub use transaction::{Transaction, TransactionFields, bucket_key_for};
pub use user::User;
