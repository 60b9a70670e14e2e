//! Domain primitives: TimeMs, id newtypes, OwnerType.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// This time shifted forward by `ms` milliseconds.
    pub fn plus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_add(ms))
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                $name(Uuid::new_v4())
            }

            /// Parse an id from its string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map($name)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// An account (advertiser or publisher user).
    UserId
);
uuid_id!(
    /// An advertiser's ad.
    AdId
);
uuid_id!(
    /// One ad occupying (or bidding for) one category slot.
    PlacementId
);
uuid_id!(
    /// A payment record.
    PaymentId
);
uuid_id!(
    /// A wallet.
    WalletId
);
uuid_id!(
    /// A publisher website.
    WebsiteId
);
uuid_id!(
    /// A priced ad category on a website.
    CategoryId
);
uuid_id!(
    /// A wallet ledger entry.
    TxnId
);

/// Opaque payment reference handed to the gateway.
///
/// Sibling payments from one checkout share a base reference; each payment
/// also carries its own unique reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference(pub String);

impl Reference {
    /// Generate a fresh reference (hex uuid, no dashes).
    pub fn generate() -> Self {
        Reference(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing reference string.
    pub fn new(s: String) -> Self {
        Reference(s)
    }

    /// The reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the marketplace a wallet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    /// An advertiser buying placements.
    Advertiser,
    /// A publisher selling category slots.
    WebOwner,
}

impl OwnerType {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Advertiser => "advertiser",
            OwnerType::WebOwner => "web_owner",
        }
    }
}

impl std::str::FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advertiser" => Ok(OwnerType::Advertiser),
            "web_owner" => Ok(OwnerType::WebOwner),
            other => Err(format!("unknown owner type: {}", other)),
        }
    }
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
