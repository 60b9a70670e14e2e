//! Payment gateway abstraction.
//!
//! The settlement core never talks HTTP directly; it consumes this trait.
//! Implementations must handle retry/backoff and rate limiting.

use crate::domain::{Money, Reference};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt;

pub mod mock;
pub mod paystack;

pub use mock::MockGateway;
pub use paystack::PaystackGateway;

/// Terminal status the gateway reports for a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Successful,
    Failed,
}

/// Result of verifying a charge with the gateway.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: ChargeStatus,
    /// Amount the gateway actually captured.
    pub amount: Money,
    pub currency: String,
    /// Raw gateway response, kept for audit logging.
    pub raw: serde_json::Value,
}

/// Payment gateway contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Initiate an external charge for `amount` under `reference`.
    ///
    /// # Returns
    /// The checkout redirect URL for the paying client.
    async fn initiate_charge(
        &self,
        amount: Money,
        reference: &Reference,
        metadata: serde_json::Value,
    ) -> Result<String, GatewayError>;

    /// Verify the terminal status of a charge by reference.
    async fn verify(&self, reference: &Reference) -> Result<VerifyOutcome, GatewayError>;
}

/// Error type for gateway operations.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// Charge reference unknown to the gateway
    UnknownReference(String),
    /// Amount not representable in the gateway's wire format
    InvalidAmount(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            GatewayError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            GatewayError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            GatewayError::RateLimited => write!(f, "Rate limited"),
            GatewayError::UnknownReference(r) => write!(f, "Unknown reference: {}", r),
            GatewayError::InvalidAmount(a) => write!(f, "Invalid amount: {}", a),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Largest gateway-vs-local amount difference attributable to rounding.
pub const ROUNDING_TOLERANCE: &str = "0.01";

/// Whether the gateway-confirmed amount matches the locally computed one,
/// allowing for rounding drift only. Any larger mismatch fails verification.
pub fn amounts_match(expected: Money, reported: Money) -> bool {
    let tolerance = Money::from_str_canonical(ROUNDING_TOLERANCE)
        .unwrap_or_else(|_| Money::zero());
    (expected - reported).abs() <= tolerance
}

/// Compute the webhook signature for a raw body: hex SHA-256 over
/// `secret || body`. The webhook layer compares this against the
/// shared-secret signature header before routing to verification.
pub fn webhook_signature(secret: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Validate a webhook signature header against the shared secret.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = webhook_signature(secret, body);
    // Compare without early exit on length match to avoid trivial timing leaks.
    expected.len() == signature.len()
        && expected
            .bytes()
            .zip(signature.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Extract the charge reference from a webhook event body.
pub fn webhook_reference(body: &[u8]) -> Option<Reference> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("data")
        .and_then(|d| d.get("reference"))
        .and_then(|r| r.as_str())
        .map(|s| Reference::new(s.to_string()))
}
