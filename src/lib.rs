pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Ad, AdId, Category, CategoryId, Money, OwnerType, Payment, PaymentId, PaymentStatus, Placement,
    PlacementId, PlacementStatus, Reference, TimeMs, TxnKind, UserId, Wallet, WalletId,
    WalletTransaction, WebsiteId,
};
pub use error::SettlementError;
pub use gateway::{GatewayError, MockGateway, PaymentGateway, PaystackGateway};
pub use orchestration::{
    CheckoutReceipt, DeadlineSweeper, RejectionReceipt, SelectionRequest, SettlementCoordinator,
    SettlementOutcome, VerificationReport,
};
