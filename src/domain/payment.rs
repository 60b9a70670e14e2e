//! Payment record and its lifecycle states.

use crate::domain::{AdId, Money, PaymentId, PlacementId, Reference, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a payment.
///
/// `Pending` is the only non-terminal state; a `Successful` payment may later
/// move to `Refunded` or `InternallyRefunded` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created at checkout, awaiting gateway verification.
    Pending,
    /// Gateway (or wallet/refund cover) confirmed; money settled.
    Successful,
    /// Gateway reported failure or an amount mismatch.
    Failed,
    /// Rejected placement, amount returned to the advertiser's wallet.
    Refunded,
    /// Self-rejection; amount held as refund credit, no wallet movement.
    InternallyRefunded,
}

impl PaymentStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::InternallyRefunded => "internally_refunded",
        }
    }

    /// True for states a payment can never leave (refund bookkeeping aside).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// True for the two refund states that can hold spendable credit.
    pub fn is_refund(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Refunded | PaymentStatus::InternallyRefunded
        )
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "successful" => Ok(PaymentStatus::Successful),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "internally_refunded" => Ok(PaymentStatus::InternallyRefunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payment for one placement.
///
/// Sibling payments created in the same checkout share `base_reference` and
/// settle together; per-placement rejection and refund bookkeeping stays
/// independent because each placement has its own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Unique per-payment reference.
    pub reference: Reference,
    /// Shared across sibling payments from one checkout.
    pub base_reference: Reference,
    pub advertiser_id: UserId,
    pub ad_id: AdId,
    pub placement_id: PlacementId,
    /// Full category price.
    pub amount: Money,
    /// Portion covered from the advertiser's wallet balance.
    pub wallet_applied: Money,
    /// Portion covered from refund credit. Always zero for reassignments.
    pub refund_applied: Money,
    /// Portion sent to the external gateway.
    pub amount_paid: Money,
    pub status: PaymentStatus,
    pub is_reassignment: bool,
    /// True once this payment's refund credit is fully drained.
    pub refund_used: bool,
    /// Cumulative credit drawn from this payment when used as a refund source.
    pub refund_consumed: Money,
    /// Last payment that consumed credit from this one.
    pub refund_used_for_payment: Option<PaymentId>,
    pub created_at: TimeMs,
    pub paid_at: Option<TimeMs>,
    pub refunded_at: Option<TimeMs>,
}

impl Payment {
    /// Composition invariant: the full price is exactly covered by the three
    /// funding legs.
    pub fn composition_ok(&self) -> bool {
        self.amount == self.wallet_applied + self.refund_applied + self.amount_paid
    }

    /// Credit still spendable when this payment is a refund source.
    pub fn refund_remaining(&self) -> Money {
        if self.status.is_refund() && !self.refund_used {
            self.amount - self.refund_consumed
        } else {
            Money::zero()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn m(s: &str) -> Money {
        Money::from_str_canonical(s).unwrap()
    }

    fn payment(amount: &str, wallet: &str, refund: &str, paid: &str) -> Payment {
        Payment {
            id: PaymentId::generate(),
            reference: Reference::generate(),
            base_reference: Reference::generate(),
            advertiser_id: UserId::generate(),
            ad_id: AdId::generate(),
            placement_id: PlacementId::generate(),
            amount: m(amount),
            wallet_applied: m(wallet),
            refund_applied: m(refund),
            amount_paid: m(paid),
            status: PaymentStatus::Pending,
            is_reassignment: false,
            refund_used: false,
            refund_consumed: Money::zero(),
            refund_used_for_payment: None,
            created_at: TimeMs::new(0),
            paid_at: None,
            refunded_at: None,
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Successful,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::InternallyRefunded,
        ] {
            assert_eq!(PaymentStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Successful.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Refunded.is_refund());
        assert!(PaymentStatus::InternallyRefunded.is_refund());
        assert!(!PaymentStatus::Successful.is_refund());
    }

    #[test]
    fn test_composition_invariant() {
        assert!(payment("15", "5", "5", "5").composition_ok());
        assert!(!payment("15", "5", "5", "6").composition_ok());
    }

    #[test]
    fn test_refund_remaining() {
        let mut p = payment("20", "0", "0", "20");
        assert_eq!(p.refund_remaining(), Money::zero());

        p.status = PaymentStatus::InternallyRefunded;
        assert_eq!(p.refund_remaining(), m("20"));

        p.refund_consumed = m("15");
        assert_eq!(p.refund_remaining(), m("5"));

        p.refund_used = true;
        assert_eq!(p.refund_remaining(), Money::zero());
    }
}
