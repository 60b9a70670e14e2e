//! Payment lifecycle transitions.
//!
//! Owns the per-payment state machine: pending on initiation, successful or
//! failed on verification, refunded or internally refunded on rejection.
//! Every function here runs on the caller's transaction; the coordinator
//! owns the unit-of-work boundary and retry.

use crate::db::Repository;
use crate::domain::{
    AdId, Money, OwnerType, Payment, PaymentId, PaymentStatus, PlacementId, PlacementStatus,
    Reference, TimeMs, TxnKind, UserId,
};
use crate::engine::funding::FundingSplit;
use crate::engine::ledger::{self, EntryMeta};
use crate::engine::refunds::{self, RefundSource};
use crate::engine::rejection::RejectionPolicy;
use crate::error::SettlementError;
use sqlx::sqlite::SqliteConnection;
use tracing::info;

/// Build a pending payment from one funding split.
pub fn build_pending_payment(
    split: &FundingSplit,
    advertiser_id: UserId,
    ad_id: AdId,
    placement_id: PlacementId,
    base_reference: &Reference,
    is_reassignment: bool,
    now: TimeMs,
) -> Payment {
    Payment {
        id: PaymentId::generate(),
        reference: Reference::generate(),
        base_reference: base_reference.clone(),
        advertiser_id,
        ad_id,
        placement_id,
        amount: split.price,
        wallet_applied: split.wallet_applied,
        refund_applied: split.refund_applied,
        amount_paid: split.amount_paid,
        status: PaymentStatus::Pending,
        is_reassignment,
        refund_used: false,
        refund_consumed: Money::zero(),
        refund_used_for_payment: None,
        created_at: now,
        paid_at: None,
        refunded_at: None,
    }
}

/// Settle one pending payment inside the caller's transaction.
///
/// Order matters: the payment's terminal status is written before any wallet
/// movement it causes, so a committed transaction never shows moved money
/// without the payment reflecting it. Steps: mark successful, debit the
/// advertiser's wallet leg, consume refund credit, credit the publisher the
/// full price, activate the placement, refresh the ad's flags.
pub async fn settle_payment(
    repo: &Repository,
    conn: &mut SqliteConnection,
    policy: &RejectionPolicy,
    payment: &Payment,
    now: TimeMs,
) -> Result<Payment, SettlementError> {
    if payment.status != PaymentStatus::Pending {
        return Err(SettlementError::StateConflict(format!(
            "payment {} is {}, cannot settle",
            payment.id, payment.status
        )));
    }

    repo.mark_payment_verified(conn, payment.id, PaymentStatus::Successful, Some(now))
        .await?;

    let meta = EntryMeta {
        payment_id: Some(payment.id),
        ad_id: Some(payment.ad_id),
        at: now,
    };

    if payment.wallet_applied.is_positive() {
        let wallet = repo
            .get_or_create_wallet(conn, payment.advertiser_id, OwnerType::Advertiser)
            .await?;
        ledger::debit(repo, conn, wallet, payment.wallet_applied, TxnKind::Debit, meta).await?;
    }

    if payment.refund_applied.is_positive() {
        consume_refund_credit(repo, conn, payment, now).await?;
    }

    let placement = repo
        .get_placement(conn, payment.placement_id)
        .await?
        .ok_or_else(|| {
            SettlementError::Internal(format!(
                "payment {} references missing placement {}",
                payment.id, payment.placement_id
            ))
        })?;

    let category = repo
        .get_category(conn, placement.category_id)
        .await?
        .ok_or_else(|| {
            SettlementError::Internal(format!(
                "placement {} references missing category {}",
                placement.id, placement.category_id
            ))
        })?;

    let publisher_wallet = repo
        .get_or_create_wallet(conn, category.owner_id, OwnerType::WebOwner)
        .await?;
    ledger::credit(
        repo,
        conn,
        publisher_wallet,
        payment.amount,
        TxnKind::Credit,
        meta,
    )
    .await?;

    activate_placement(repo, conn, policy, placement, payment, category.capacity, now).await?;
    refresh_ad_flags(repo, conn, payment.ad_id, true).await?;

    let settled = repo.get_payment(conn, payment.id).await?.ok_or_else(|| {
        SettlementError::Internal(format!("payment {} vanished during settlement", payment.id))
    })?;

    info!(
        payment = %settled.id,
        amount = %settled.amount,
        wallet_applied = %settled.wallet_applied,
        refund_applied = %settled.refund_applied,
        amount_paid = %settled.amount_paid,
        "payment settled"
    );
    Ok(settled)
}

/// Mark one pending payment failed after a gateway failure or amount
/// mismatch. No wallet is touched.
pub async fn fail_payment(
    repo: &Repository,
    conn: &mut SqliteConnection,
    payment: &Payment,
) -> Result<(), SettlementError> {
    if payment.status != PaymentStatus::Pending {
        return Err(SettlementError::StateConflict(format!(
            "payment {} is {}, cannot fail",
            payment.id, payment.status
        )));
    }
    repo.mark_payment_verified(conn, payment.id, PaymentStatus::Failed, None)
        .await?;
    Ok(())
}

/// Refund side-effect of a placement rejection.
///
/// Self-rejection (the rejecting publisher is the payment's advertiser)
/// moves no money: the payment becomes internally refunded and its full
/// amount turns into refund credit. A normal rejection transfers the amount
/// from the publisher's wallet to the advertiser's; the refunded payment is
/// flagged `refund_used` because its value now lives in the wallet and must
/// not also count as refund credit.
pub async fn refund_for_rejection(
    repo: &Repository,
    conn: &mut SqliteConnection,
    payment: &Payment,
    rejecting_publisher: UserId,
    now: TimeMs,
) -> Result<Payment, SettlementError> {
    if payment.status != PaymentStatus::Successful {
        return Err(SettlementError::StateConflict(format!(
            "payment {} is {}, only successful payments can be refunded",
            payment.id, payment.status
        )));
    }

    let self_rejection = payment.advertiser_id == rejecting_publisher;
    if self_rejection {
        repo.mark_payment_refunded(conn, payment.id, PaymentStatus::InternallyRefunded, now, false)
            .await?;
    } else {
        repo.mark_payment_refunded(conn, payment.id, PaymentStatus::Refunded, now, true)
            .await?;

        let publisher_wallet = repo
            .get_or_create_wallet(conn, rejecting_publisher, OwnerType::WebOwner)
            .await?;
        let advertiser_wallet = repo
            .get_or_create_wallet(conn, payment.advertiser_id, OwnerType::Advertiser)
            .await?;
        let meta = EntryMeta {
            payment_id: Some(payment.id),
            ad_id: Some(payment.ad_id),
            at: now,
        };
        ledger::transfer_refund(
            repo,
            conn,
            publisher_wallet,
            advertiser_wallet,
            payment.amount,
            meta,
        )
        .await?;
    }

    let refunded = repo.get_payment(conn, payment.id).await?.ok_or_else(|| {
        SettlementError::Internal(format!("payment {} vanished during refund", payment.id))
    })?;

    info!(
        payment = %refunded.id,
        amount = %refunded.amount,
        internal = self_rejection,
        "payment refunded"
    );
    Ok(refunded)
}

/// Consume refund credit for a settling payment, FIFO across sources.
///
/// Consumption is committed here, inside the same transaction that commits
/// the consuming payment, never speculatively at plan time. The plan's
/// `refund_applied` was computed at initiation; if the credit pool shrank in
/// between, settlement aborts rather than under-collect.
async fn consume_refund_credit(
    repo: &Repository,
    conn: &mut SqliteConnection,
    payment: &Payment,
    now: TimeMs,
) -> Result<(), SettlementError> {
    let source_rows = repo.refund_sources(conn, payment.advertiser_id).await?;
    let sources: Vec<RefundSource> = source_rows
        .iter()
        .filter_map(RefundSource::from_payment)
        .collect();

    let allocation = refunds::allocate(&sources, payment.refund_applied, payment.is_reassignment);
    if allocation.applied != payment.refund_applied {
        return Err(SettlementError::StateConflict(format!(
            "refund credit shrank below {} planned for payment {}",
            payment.refund_applied, payment.id
        )));
    }

    for draw in &allocation.draws {
        repo.record_refund_consumption(
            conn,
            draw.source_payment_id,
            draw.consumed_total,
            draw.exhausts_source,
            payment.id,
        )
        .await?;
        repo.insert_refund_allocation(conn, payment.id, draw.source_payment_id, draw.amount, now)
            .await?;
    }
    Ok(())
}

async fn activate_placement(
    repo: &Repository,
    conn: &mut SqliteConnection,
    policy: &RejectionPolicy,
    mut placement: crate::domain::Placement,
    payment: &Payment,
    capacity: i64,
    now: TimeMs,
) -> Result<(), SettlementError> {
    if placement.status != PlacementStatus::Pending {
        return Err(SettlementError::StateConflict(format!(
            "placement {} is {}, cannot activate",
            placement.id, placement.status
        )));
    }

    let occupied = repo.slot_count(conn, placement.category_id).await?;
    if occupied >= capacity {
        return Err(SettlementError::StateConflict(format!(
            "category {} is at capacity ({})",
            placement.category_id, capacity
        )));
    }

    placement.status = PlacementStatus::Active;
    placement.approved = true;
    placement.is_rejectable = true;
    placement.rejection_deadline = Some(policy.deadline_for(now));
    placement.payment_id = Some(payment.id);

    repo.occupy_slot(conn, placement.category_id, placement.ad_id)
        .await?;
    repo.update_placement(conn, &placement).await?;
    Ok(())
}

/// Recompute an ad's confirmation and reassignment flags.
pub async fn refresh_ad_flags(
    repo: &Repository,
    conn: &mut SqliteConnection,
    ad_id: AdId,
    just_activated: bool,
) -> Result<(), SettlementError> {
    let mut ad = repo.get_ad(conn, ad_id).await?.ok_or_else(|| {
        SettlementError::Internal(format!("ad {} missing during settlement", ad_id))
    })?;

    let pending = repo
        .count_placements_in_status(conn, ad_id, PlacementStatus::Pending, None)
        .await?;
    ad.confirmed = pending == 0;
    if just_activated {
        ad.available_for_reassignment = false;
    }

    repo.update_ad_flags(conn, &ad).await?;
    Ok(())
}
