pub mod entity_collection;
pub mod mutation_controller;
pub mod pending_queue;
pub mod reconciliation_service;
pub mod submission_coordinator;
pub mod transaction_ledger;
pub mod user_directory;

pub use entity_collection::EntityCollection;
pub use mutation_controller::{CloseOutcome, MutationController};
pub use pending_queue::{DrainReport, PendingSubmissionQueue};
pub use reconciliation_service::{MergeSummary, ReconciliationService};
pub use submission_coordinator::{SubmissionCoordinator, SubmissionOutcome};
pub use transaction_ledger::TransactionLedger;
pub use user_directory::UserDirectory;
