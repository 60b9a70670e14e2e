//! Domain types for the placement settlement engine.
//!
//! This module provides:
//! - Lossless monetary handling via the Money wrapper
//! - Domain primitives: TimeMs, id newtypes, OwnerType
//! - Payment, Placement, Wallet, and Category records with their status
//!   state machines and invariant helpers

pub mod category;
pub mod money;
pub mod payment;
pub mod placement;
pub mod primitives;
pub mod wallet;

pub use category::{Ad, Category};
pub use money::Money;
pub use payment::{Payment, PaymentStatus};
pub use placement::{Placement, PlacementStatus};
pub use primitives::{
    AdId, CategoryId, OwnerType, PaymentId, PlacementId, Reference, TimeMs, TxnId, UserId,
    WalletId, WebsiteId,
};
pub use wallet::{TxnKind, Wallet, WalletTransaction};
