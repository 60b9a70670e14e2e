//! Rejection window policy.
//!
//! Decides when a placement may still be rejected: within the configured
//! window after payment, extended by a bounded grace period, and only once.

use crate::config::Config;
use crate::domain::{Placement, PlacementStatus, TimeMs};
use crate::error::SettlementError;

/// Window and grace durations applied to every placement.
#[derive(Debug, Clone, Copy)]
pub struct RejectionPolicy {
    window_ms: i64,
    grace_ms: i64,
}

impl RejectionPolicy {
    pub fn new(window_ms: i64, grace_ms: i64) -> Self {
        Self {
            window_ms,
            grace_ms,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rejection_window_ms, config.grace_period_ms)
    }

    /// Grace period in milliseconds.
    pub fn grace_ms(&self) -> i64 {
        self.grace_ms
    }

    /// Deadline for a placement paid at `paid_at`.
    pub fn deadline_for(&self, paid_at: TimeMs) -> TimeMs {
        paid_at.plus_ms(self.window_ms)
    }

    /// True once `deadline` plus grace has passed and rejection is gone for
    /// good. The sweeper uses the same cutoff, so a placement is never made
    /// permanent while a rejection would still be accepted.
    pub fn hard_expired(&self, deadline: TimeMs, now: TimeMs) -> bool {
        now > deadline.plus_ms(self.grace_ms)
    }

    /// Check that `placement` can be rejected at `now`.
    pub fn check_rejectable(
        &self,
        placement: &Placement,
        now: TimeMs,
    ) -> Result<(), SettlementError> {
        if placement.is_rejected || placement.status == PlacementStatus::Rejected {
            return Err(SettlementError::StateConflict(format!(
                "placement {} is already rejected",
                placement.id
            )));
        }
        if placement.status != PlacementStatus::Active {
            return Err(SettlementError::StateConflict(format!(
                "placement {} is {}, only active placements can be rejected",
                placement.id, placement.status
            )));
        }
        if !placement.is_rejectable {
            return Err(SettlementError::StateConflict(format!(
                "placement {} is no longer rejectable",
                placement.id
            )));
        }
        let deadline = placement.rejection_deadline.ok_or_else(|| {
            SettlementError::Internal(format!(
                "active placement {} has no rejection deadline",
                placement.id
            ))
        })?;
        if self.hard_expired(deadline, now) {
            return Err(SettlementError::StateConflict(format!(
                "rejection window for placement {} expired",
                placement.id
            )));
        }
        Ok(())
    }
}
