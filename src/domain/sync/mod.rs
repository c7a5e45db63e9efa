pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod node;
pub mod reconcile;
pub mod snapshot;
pub mod wire;

pub use error::{SyncError, TransportError, ValidationError};
pub(crate) use node::syncable;
pub use node::{NodeState, SyncMeta, SyncNode, Syncable, TrackedFields};
pub use reconcile::{MergeGuard, MergeReport};
pub use snapshot::Snapshot;
pub use wire::{
    CreatedIdentity, Origin, SubmissionRequest, SubmissionResponse, WireRecord, decode_record,
};
