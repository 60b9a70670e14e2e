//! Settlement coordinator.
//!
//! Entry point for the three business events: checkout initiation, payment
//! verification, and placement rejection. Each event runs as one retryable
//! unit of work; the gateway is only ever called outside the transaction so
//! a slow or flaky gateway never holds a database lock.
//!
//! Unit-of-work closures clone their context per attempt: a retried attempt
//! must never observe state mutated by a previous one.

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{
    AdId, CategoryId, Money, OwnerType, Payment, PaymentStatus, Placement, PlacementId,
    PlacementStatus, Reference, TimeMs, UserId, WebsiteId,
};
use crate::engine::refunds::{self, RefundSource};
use crate::engine::rejection::RejectionPolicy;
use crate::engine::{funding, lifecycle};
use crate::error::SettlementError;
use crate::gateway::{self, ChargeStatus, PaymentGateway};
use crate::orchestration::txn::run_unit_of_work;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// One `(website, category)` slot requested in a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRequest {
    pub website_id: WebsiteId,
    pub category_id: CategoryId,
}

/// How a verification call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The group was already settled; nothing changed.
    AlreadyProcessed,
    /// Pending payments settled in this call.
    Processed,
    /// The gateway reported failure (or an amount mismatch); the group was
    /// marked failed.
    Failed,
}

/// Result of verifying a checkout group.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub outcome: SettlementOutcome,
    pub payments: Vec<Payment>,
}

/// Result of initiating a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub base_reference: Reference,
    pub payments: Vec<Payment>,
    /// Gateway redirect URL; None when the checkout needed no external leg.
    pub redirect_url: Option<String>,
    /// Set when a zero-external checkout settled immediately.
    pub settlement: Option<VerificationReport>,
}

/// Result of rejecting a placement.
#[derive(Debug, Clone)]
pub struct RejectionReceipt {
    pub placement: Placement,
    pub payment: Payment,
    /// True for a self-rejection (internally refunded, no wallet movement).
    pub internal: bool,
}

pub struct SettlementCoordinator {
    repo: Arc<Repository>,
    gateway: Arc<dyn PaymentGateway>,
    policy: RejectionPolicy,
    webhook_secret: String,
    txn_budget_ms: i64,
}

impl SettlementCoordinator {
    pub fn new(repo: Arc<Repository>, gateway: Arc<dyn PaymentGateway>, config: &Config) -> Self {
        Self {
            repo,
            gateway,
            policy: RejectionPolicy::from_config(config),
            webhook_secret: config.gateway_secret.clone(),
            txn_budget_ms: config.txn_retry_budget_ms,
        }
    }

    pub fn policy(&self) -> &RejectionPolicy {
        &self.policy
    }

    /// Initiate a checkout: one pending payment and placement per selection,
    /// funded wallet-first, then refund credit, then the gateway.
    ///
    /// Balances are only read here; nothing moves until verification. When
    /// the whole group is covered internally the checkout settles immediately
    /// through the same verification path an external charge would take.
    pub async fn initiate_checkout(
        &self,
        advertiser_id: UserId,
        ad_id: AdId,
        selections: &[SelectionRequest],
        is_reassignment: bool,
    ) -> Result<CheckoutReceipt, SettlementError> {
        if selections.is_empty() {
            return Err(SettlementError::Validation(
                "checkout requires at least one selection".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for sel in selections {
            if !seen.insert((sel.website_id, sel.category_id)) {
                return Err(SettlementError::Validation(format!(
                    "duplicate selection for category {}",
                    sel.category_id
                )));
            }
        }

        let base_reference = Reference::generate();
        let now = TimeMs::now();
        let repo = self.repo.clone();
        let selections = selections.to_vec();
        let base_ref = base_reference.clone();

        let (payments, external_total) = run_unit_of_work(
            self.repo.pool(),
            self.txn_budget_ms,
            "initiate_checkout",
            move |conn| {
                let repo = repo.clone();
                let selections = selections.clone();
                let base_ref = base_ref.clone();
                Box::pin(async move {
                    let ad = repo.get_ad(conn, ad_id).await?.ok_or_else(|| {
                        SettlementError::Validation(format!("unknown ad {}", ad_id))
                    })?;
                    if ad.advertiser_id != advertiser_id {
                        return Err(SettlementError::Authorization(format!(
                            "ad {} does not belong to the caller",
                            ad_id
                        )));
                    }
                    if is_reassignment && !ad.available_for_reassignment {
                        return Err(SettlementError::StateConflict(format!(
                            "ad {} is not available for reassignment",
                            ad_id
                        )));
                    }

                    let mut prices = Vec::with_capacity(selections.len());
                    for sel in &selections {
                        let category = repo
                            .get_category(conn, sel.category_id)
                            .await?
                            .ok_or_else(|| {
                                SettlementError::Validation(format!(
                                    "unknown category {}",
                                    sel.category_id
                                ))
                            })?;
                        if category.website_id != sel.website_id {
                            return Err(SettlementError::Validation(format!(
                                "category {} does not belong to website {}",
                                sel.category_id, sel.website_id
                            )));
                        }
                        if repo
                            .placement_by_selection(conn, ad_id, sel.website_id, sel.category_id)
                            .await?
                            .is_some()
                        {
                            return Err(SettlementError::StateConflict(format!(
                                "ad {} already has a placement in category {}",
                                ad_id, sel.category_id
                            )));
                        }
                        let occupied = repo.slot_count(conn, sel.category_id).await?;
                        if occupied >= category.capacity {
                            return Err(SettlementError::StateConflict(format!(
                                "category {} is at capacity ({})",
                                sel.category_id, category.capacity
                            )));
                        }
                        prices.push(category.price);
                    }

                    let wallet = repo
                        .get_or_create_wallet(conn, advertiser_id, OwnerType::Advertiser)
                        .await?;
                    let sources: Vec<RefundSource> = repo
                        .refund_sources(conn, advertiser_id)
                        .await?
                        .iter()
                        .filter_map(RefundSource::from_payment)
                        .collect();
                    let refund_available = refunds::available(&sources);

                    let plan = funding::plan_checkout(
                        &prices,
                        wallet.balance,
                        refund_available,
                        is_reassignment,
                    );

                    let mut payments = Vec::with_capacity(selections.len());
                    for (sel, split) in selections.iter().zip(&plan.splits) {
                        let mut placement =
                            Placement::pending(ad_id, sel.website_id, sel.category_id);
                        let payment = lifecycle::build_pending_payment(
                            split,
                            advertiser_id,
                            ad_id,
                            placement.id,
                            &base_ref,
                            is_reassignment,
                            now,
                        );
                        placement.payment_id = Some(payment.id);
                        repo.insert_placement(conn, &placement).await?;
                        repo.insert_payment(conn, &payment).await?;
                        payments.push(payment);
                    }

                    Ok((payments, plan.external_total))
                })
            },
        )
        .await?;

        let mut receipt = CheckoutReceipt {
            base_reference: base_reference.clone(),
            payments,
            redirect_url: None,
            settlement: None,
        };

        if external_total.is_positive() {
            let metadata = serde_json::json!({
                "ad_id": ad_id.to_string(),
                "placements": receipt.payments.len(),
            });
            match self
                .gateway
                .initiate_charge(external_total, &base_reference, metadata)
                .await
            {
                Ok(redirect_url) => {
                    info!(
                        base_reference = %base_reference,
                        amount = %external_total,
                        "external charge initiated"
                    );
                    receipt.redirect_url = Some(redirect_url);
                }
                Err(err) => {
                    // The charge was never created gateway-side, so this
                    // group can never verify; fail it immediately so the
                    // selections are free for a fresh checkout.
                    warn!(
                        base_reference = %base_reference,
                        error = %err,
                        "charge initiation failed, failing group"
                    );
                    self.fail_group(&base_reference).await?;
                    return Err(err.into());
                }
            }
        } else {
            // Fully covered by wallet and refund credit: no gateway call,
            // settle now through the regular verification path.
            let report = self.verify_payment(&base_reference).await?;
            receipt.payments = report.payments.clone();
            receipt.settlement = Some(report);
        }

        Ok(receipt)
    }

    /// Verify a checkout group by its base reference and settle it.
    ///
    /// Idempotent: an already-settled group returns `AlreadyProcessed`
    /// without touching any balance. A gateway error leaves every record
    /// untouched so the caller can retry later.
    pub async fn verify_payment(
        &self,
        base_reference: &Reference,
    ) -> Result<VerificationReport, SettlementError> {
        let group = {
            let mut conn = self.repo.pool().acquire().await?;
            self.repo
                .payments_by_base_reference(&mut conn, base_reference)
                .await?
        };

        if group.is_empty() {
            return Err(SettlementError::Validation(format!(
                "unknown payment reference {}",
                base_reference
            )));
        }
        if group
            .iter()
            .all(|p| p.status == PaymentStatus::Successful || p.status.is_refund())
        {
            return Ok(VerificationReport {
                outcome: SettlementOutcome::AlreadyProcessed,
                payments: group,
            });
        }
        if group.iter().any(|p| p.status == PaymentStatus::Failed) {
            return Err(SettlementError::StateConflict(format!(
                "payment group {} already failed, cannot verify",
                base_reference
            )));
        }

        let external_total = group
            .iter()
            .fold(Money::zero(), |acc, p| acc + p.amount_paid);

        if external_total.is_positive() {
            let outcome = self.gateway.verify(base_reference).await?;
            let failed = match outcome.status {
                ChargeStatus::Failed => {
                    warn!(base_reference = %base_reference, "gateway reported charge failure");
                    true
                }
                ChargeStatus::Successful
                    if !gateway::amounts_match(external_total, outcome.amount) =>
                {
                    warn!(
                        base_reference = %base_reference,
                        expected = %external_total,
                        reported = %outcome.amount,
                        "gateway amount outside rounding tolerance"
                    );
                    true
                }
                ChargeStatus::Successful => false,
            };
            if failed {
                let payments = self.fail_group(base_reference).await?;
                return Ok(VerificationReport {
                    outcome: SettlementOutcome::Failed,
                    payments,
                });
            }
        }

        let now = TimeMs::now();
        let repo = self.repo.clone();
        let policy = self.policy;
        let base_ref = base_reference.clone();
        let (payments, any_settled) = run_unit_of_work(
            self.repo.pool(),
            self.txn_budget_ms,
            "settle_checkout",
            move |conn| {
                let repo = repo.clone();
                let base_ref = base_ref.clone();
                Box::pin(async move {
                    let group = repo.payments_by_base_reference(conn, &base_ref).await?;
                    let mut settled = Vec::with_capacity(group.len());
                    let mut any_settled = false;
                    for payment in &group {
                        match payment.status {
                            PaymentStatus::Pending => {
                                settled.push(
                                    lifecycle::settle_payment(&repo, conn, &policy, payment, now)
                                        .await?,
                                );
                                any_settled = true;
                            }
                            PaymentStatus::Successful => settled.push(payment.clone()),
                            _ => {
                                return Err(SettlementError::StateConflict(format!(
                                    "payment {} is {}, group cannot settle",
                                    payment.id, payment.status
                                )))
                            }
                        }
                    }
                    Ok((settled, any_settled))
                })
            },
        )
        .await?;

        let outcome = if any_settled {
            SettlementOutcome::Processed
        } else {
            // Lost a race with a concurrent verification; the group was
            // settled between the pre-read and this transaction.
            SettlementOutcome::AlreadyProcessed
        };
        Ok(VerificationReport { outcome, payments })
    }

    /// Handle a gateway webhook: authenticate, extract the reference, and
    /// run the same idempotent verification as the redirect path.
    pub async fn handle_webhook(
        &self,
        signature: &str,
        body: &[u8],
    ) -> Result<VerificationReport, SettlementError> {
        if !gateway::verify_webhook_signature(&self.webhook_secret, body, signature) {
            return Err(SettlementError::Authorization(
                "invalid webhook signature".to_string(),
            ));
        }
        let reference = gateway::webhook_reference(body).ok_or_else(|| {
            SettlementError::Validation("webhook body carries no charge reference".to_string())
        })?;
        self.verify_payment(&reference).await
    }

    /// Reject an active placement within its window.
    ///
    /// Only the owning publisher may reject; the authorization check runs
    /// before the window check so a foreign caller learns nothing about the
    /// placement's window state. All effects (refund, placement flip, slot
    /// release, ad flags) commit atomically or not at all.
    pub async fn reject_placement(
        &self,
        caller: UserId,
        placement_id: PlacementId,
        reason: &str,
    ) -> Result<RejectionReceipt, SettlementError> {
        let now = TimeMs::now();
        let repo = self.repo.clone();
        let policy = self.policy;
        let reason = reason.to_string();

        run_unit_of_work(
            self.repo.pool(),
            self.txn_budget_ms,
            "reject_placement",
            move |conn| {
                let repo = repo.clone();
                let reason = reason.clone();
                Box::pin(async move {
                    let mut placement =
                        repo.get_placement(conn, placement_id).await?.ok_or_else(|| {
                            SettlementError::Validation(format!(
                                "unknown placement {}",
                                placement_id
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
                    if category.owner_id != caller {
                        return Err(SettlementError::Authorization(format!(
                            "caller does not own the website for placement {}",
                            placement_id
                        )));
                    }

                    policy.check_rejectable(&placement, now)?;

                    let payment_id = placement.payment_id.ok_or_else(|| {
                        SettlementError::Internal(format!(
                            "active placement {} has no payment",
                            placement.id
                        ))
                    })?;
                    let payment = repo.get_payment(conn, payment_id).await?.ok_or_else(|| {
                        SettlementError::Internal(format!(
                            "placement {} references missing payment {}",
                            placement.id, payment_id
                        ))
                    })?;

                    let refunded =
                        lifecycle::refund_for_rejection(&repo, conn, &payment, caller, now).await?;

                    placement.status = PlacementStatus::Rejected;
                    placement.approved = false;
                    placement.is_rejected = true;
                    placement.is_rejectable = false;
                    placement.rejected_by = Some(caller);
                    placement.rejected_at = Some(now);
                    placement.rejection_reason = Some(reason);
                    repo.update_placement(conn, &placement).await?;
                    repo.release_slot(conn, placement.category_id, placement.ad_id)
                        .await?;

                    let mut ad = repo.get_ad(conn, placement.ad_id).await?.ok_or_else(|| {
                        SettlementError::Internal(format!(
                            "placement {} references missing ad {}",
                            placement.id, placement.ad_id
                        ))
                    })?;
                    let active_elsewhere = repo
                        .count_placements_in_status(
                            conn,
                            placement.ad_id,
                            PlacementStatus::Active,
                            Some(placement.id),
                        )
                        .await?;
                    let pending = repo
                        .count_placements_in_status(
                            conn,
                            placement.ad_id,
                            PlacementStatus::Pending,
                            None,
                        )
                        .await?;
                    ad.available_for_reassignment = active_elsewhere == 0;
                    ad.confirmed = pending == 0;
                    repo.update_ad_flags(conn, &ad).await?;

                    let internal = refunded.status == PaymentStatus::InternallyRefunded;
                    info!(
                        placement = %placement.id,
                        payment = %refunded.id,
                        internal,
                        "placement rejected"
                    );
                    Ok(RejectionReceipt {
                        placement,
                        payment: refunded,
                        internal,
                    })
                })
            },
        )
        .await
    }

    async fn fail_group(
        &self,
        base_reference: &Reference,
    ) -> Result<Vec<Payment>, SettlementError> {
        let repo = self.repo.clone();
        let base_ref = base_reference.clone();
        run_unit_of_work(
            self.repo.pool(),
            self.txn_budget_ms,
            "fail_checkout",
            move |conn| {
                let repo = repo.clone();
                let base_ref = base_ref.clone();
                Box::pin(async move {
                    let group = repo.payments_by_base_reference(conn, &base_ref).await?;
                    let mut failed = Vec::with_capacity(group.len());
                    for payment in &group {
                        if payment.status == PaymentStatus::Pending {
                            lifecycle::fail_payment(&repo, conn, payment).await?;
                        }
                        let fresh = repo.get_payment(conn, payment.id).await?.ok_or_else(|| {
                            SettlementError::Internal(format!(
                                "payment {} vanished while failing group",
                                payment.id
                            ))
                        })?;
                        failed.push(fresh);
                    }
                    Ok(failed)
                })
            },
        )
        .await
    }
}

impl std::fmt::Debug for SettlementCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementCoordinator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
