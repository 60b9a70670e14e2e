//! Placement: one ad occupying one category slot.
//!
//! The source system embedded these as array elements inside the ad record;
//! here each placement is a first-class row so concurrent settlements of
//! different placements of the same ad do not contend on one document.

use crate::domain::{AdId, CategoryId, PaymentId, PlacementId, TimeMs, UserId, WebsiteId};
use serde::{Deserialize, Serialize};

/// Placement lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    /// Awaiting payment settlement.
    Pending,
    /// Payment settled; ad live in the slot.
    Active,
    /// Publisher rejected within the window. Terminal.
    Rejected,
}

impl PlacementStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementStatus::Pending => "pending",
            PlacementStatus::Active => "active",
            PlacementStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for PlacementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PlacementStatus::Pending),
            "active" => Ok(PlacementStatus::Active),
            "rejected" => Ok(PlacementStatus::Rejected),
            other => Err(format!("unknown placement status: {}", other)),
        }
    }
}

impl std::fmt::Display for PlacementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ad-into-category placement, identified by `(website_id, category_id)`
/// within its parent ad.
///
/// Invariants: `Active` implies `approved && !is_rejected`; `Rejected`
/// implies `is_rejected`; rejection happens at most once and only while the
/// deadline (plus grace) has not passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub id: PlacementId,
    pub ad_id: AdId,
    pub website_id: WebsiteId,
    pub category_id: CategoryId,
    pub status: PlacementStatus,
    pub approved: bool,
    pub is_rejected: bool,
    /// Set on activation: `paid_at + rejection_window`.
    pub rejection_deadline: Option<TimeMs>,
    /// Cleared by the deadline sweeper once the window (plus grace) lapses.
    pub is_rejectable: bool,
    pub payment_id: Option<PaymentId>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<TimeMs>,
    pub rejection_reason: Option<String>,
}

impl Placement {
    /// A fresh pending placement awaiting payment.
    pub fn pending(ad_id: AdId, website_id: WebsiteId, category_id: CategoryId) -> Self {
        Placement {
            id: PlacementId::generate(),
            ad_id,
            website_id,
            category_id,
            status: PlacementStatus::Pending,
            approved: false,
            is_rejected: false,
            rejection_deadline: None,
            is_rejectable: false,
            payment_id: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
        }
    }

    /// State-consistency invariant across the status flags.
    pub fn flags_consistent(&self) -> bool {
        match self.status {
            PlacementStatus::Pending => !self.approved && !self.is_rejected,
            PlacementStatus::Active => self.approved && !self.is_rejected,
            PlacementStatus::Rejected => self.is_rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PlacementStatus::Pending,
            PlacementStatus::Active,
            PlacementStatus::Rejected,
        ] {
            assert_eq!(PlacementStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(PlacementStatus::from_str("expired").is_err());
    }

    #[test]
    fn test_pending_placement_consistent() {
        let p = Placement::pending(
            AdId::generate(),
            WebsiteId::generate(),
            CategoryId::generate(),
        );
        assert_eq!(p.status, PlacementStatus::Pending);
        assert!(p.flags_consistent());
        assert!(!p.is_rejectable);
    }

    #[test]
    fn test_flags_consistency_catches_drift() {
        let mut p = Placement::pending(
            AdId::generate(),
            WebsiteId::generate(),
            CategoryId::generate(),
        );
        p.status = PlacementStatus::Active;
        assert!(!p.flags_consistent());
        p.approved = true;
        assert!(p.flags_consistent());
    }
}
