//! Settlement engine components.
//!
//! Leaf logic invoked by the coordinator inside its units of work:
//! - `funding` - checkout composition across wallet/refund/gateway legs
//! - `refunds` - FIFO refund-credit allocation
//! - `rejection` - rejection window policy
//! - `ledger` - wallet balance movements with immutable ledger entries
//! - `lifecycle` - per-payment state transitions

pub mod funding;
pub mod ledger;
pub mod lifecycle;
pub mod refunds;
pub mod rejection;

pub use funding::{plan_checkout, FundingPlan, FundingSplit};
pub use refunds::{allocate, available, Allocation, Draw, RefundSource};
pub use rejection::RejectionPolicy;
