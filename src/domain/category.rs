//! Ads and the category reference data the settlement paths read.

use crate::domain::{AdId, CategoryId, Money, UserId, WebsiteId};
use serde::{Deserialize, Serialize};

/// An advertiser's ad. Placements reference it by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub advertiser_id: UserId,
    /// True once no placement of this ad is still pending.
    pub confirmed: bool,
    /// Set when a rejection leaves the ad with no active placement.
    pub available_for_reassignment: bool,
}

impl Ad {
    /// A fresh unconfirmed ad.
    pub fn new(advertiser_id: UserId) -> Self {
        Ad {
            id: AdId::generate(),
            advertiser_id,
            confirmed: false,
            available_for_reassignment: false,
        }
    }
}

/// Priced ad category on a publisher website.
///
/// Maintained by the external CRUD layer; the settlement core treats it as
/// read-mostly reference data and re-reads it inside its own transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub website_id: WebsiteId,
    /// Publisher who owns the website this category belongs to.
    pub owner_id: UserId,
    pub price: Money,
    /// Maximum number of ads the slot holds concurrently.
    pub capacity: i64,
}
