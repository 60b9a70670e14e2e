//! Wallets and their append-only transaction ledger.

use crate::domain::{AdId, Money, OwnerType, PaymentId, TimeMs, TxnId, UserId, WalletId};
use serde::{Deserialize, Serialize};

/// Per-owner running balance with lifetime totals.
///
/// Exactly one wallet exists per `(owner_id, owner_type)` pair; `balance`
/// equals the signed sum of the wallet's transactions and never goes
/// negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: UserId,
    pub owner_type: OwnerType,
    pub balance: Money,
    pub total_earned: Money,
    pub total_spent: Money,
    pub total_refunded: Money,
}

impl Wallet {
    /// A fresh zero-balance wallet.
    pub fn new(owner_id: UserId, owner_type: OwnerType) -> Self {
        Wallet {
            id: WalletId::generate(),
            owner_id,
            owner_type,
            balance: Money::zero(),
            total_earned: Money::zero(),
            total_spent: Money::zero(),
            total_refunded: Money::zero(),
        }
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnKind {
    /// Earnings credited to a publisher on settlement.
    Credit,
    /// Wallet balance spent by an advertiser at checkout.
    Debit,
    /// Rejection transfer leg landing on the advertiser's wallet.
    RefundCredit,
    /// Rejection transfer leg leaving the publisher's wallet.
    RefundDebit,
}

impl TxnKind {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnKind::Credit => "credit",
            TxnKind::Debit => "debit",
            TxnKind::RefundCredit => "refund_credit",
            TxnKind::RefundDebit => "refund_debit",
        }
    }

    /// True for the kinds that increase a balance.
    pub fn is_credit(&self) -> bool {
        matches!(self, TxnKind::Credit | TxnKind::RefundCredit)
    }
}

impl std::str::FromStr for TxnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TxnKind::Credit),
            "debit" => Ok(TxnKind::Debit),
            "refund_credit" => Ok(TxnKind::RefundCredit),
            "refund_debit" => Ok(TxnKind::RefundDebit),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

impl std::fmt::Display for TxnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable ledger entry. Written once, never mutated or deleted;
/// corrections are new paired entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TxnId,
    pub wallet_id: WalletId,
    pub payment_id: Option<PaymentId>,
    pub ad_id: Option<AdId>,
    /// Signed: positive for credits, negative for debits.
    pub amount: Money,
    pub kind: TxnKind,
    /// Links a refund debit on one wallet to the paired credit on the other.
    pub related_transaction_id: Option<TxnId>,
    pub created_at: TimeMs,
}
