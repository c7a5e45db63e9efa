pub mod ports;
pub mod services;

pub use services::{
    EntityCollection,
    MutationController,
    ReconciliationService,
    SubmissionCoordinator,
    TransactionLedger,
    UserDirectory,
};
