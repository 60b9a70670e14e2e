//! Orchestration layer: retryable units of work, the settlement
//! coordinator, and the deadline sweeper.

pub mod coordinator;
pub mod sweeper;
pub mod txn;

pub use coordinator::{
    CheckoutReceipt, RejectionReceipt, SelectionRequest, SettlementCoordinator, SettlementOutcome,
    VerificationReport,
};
pub use sweeper::DeadlineSweeper;
pub use txn::run_unit_of_work;
