//! Refund-credit allocation.
//!
//! Unused credit on refunded payments is spent oldest-first against new
//! non-reassignment charges. Partial consumption keeps the remainder
//! spendable; a source is flagged used only when fully drained.

use crate::domain::{Money, Payment, PaymentId};

/// One refund source: a refunded payment with credit left to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundSource {
    pub payment_id: PaymentId,
    /// Original refunded amount.
    pub amount: Money,
    /// Credit already drawn from this source.
    pub consumed: Money,
}

impl RefundSource {
    /// Build a source from a refunded payment row.
    ///
    /// Returns None for payments that hold no spendable credit.
    pub fn from_payment(payment: &Payment) -> Option<Self> {
        let remaining = payment.refund_remaining();
        if remaining.is_positive() {
            Some(RefundSource {
                payment_id: payment.id,
                amount: payment.amount,
                consumed: payment.refund_consumed,
            })
        } else {
            None
        }
    }

    /// Credit still spendable from this source.
    pub fn remaining(&self) -> Money {
        self.amount - self.consumed
    }
}

/// One draw against a refund source, ready to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub source_payment_id: PaymentId,
    /// Amount taken from the source in this allocation.
    pub amount: Money,
    /// The source's cumulative consumption after this draw.
    pub consumed_total: Money,
    /// True when this draw leaves the source empty.
    pub exhausts_source: bool,
}

/// Result of allocating refund credit against a required amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Credit actually applied.
    pub applied: Money,
    /// Portion of the request the sources could not cover.
    pub remaining: Money,
    pub draws: Vec<Draw>,
}

/// Total spendable credit across sources.
pub fn available(sources: &[RefundSource]) -> Money {
    sources
        .iter()
        .fold(Money::zero(), |acc, s| acc + s.remaining())
}

/// Allocate `required` credit FIFO across `sources`.
///
/// Sources must arrive ordered by `refunded_at` ascending (the repository
/// query guarantees this). Returns an empty allocation immediately for
/// reassignments; refund credit is categorically excluded there by business
/// rule, not as an optimization.
pub fn allocate(sources: &[RefundSource], required: Money, is_reassignment: bool) -> Allocation {
    if is_reassignment || !required.is_positive() {
        return Allocation {
            applied: Money::zero(),
            remaining: required,
            draws: Vec::new(),
        };
    }

    let mut remaining = required;
    let mut applied = Money::zero();
    let mut draws = Vec::new();

    for source in sources {
        if !remaining.is_positive() {
            break;
        }
        let take = remaining.min(source.remaining());
        if !take.is_positive() {
            continue;
        }

        let consumed_total = source.consumed + take;
        draws.push(Draw {
            source_payment_id: source.payment_id,
            amount: take,
            consumed_total,
            exhausts_source: consumed_total == source.amount,
        });

        applied = applied + take;
        remaining = remaining - take;
    }

    Allocation {
        applied,
        remaining,
        draws,
    }
}
