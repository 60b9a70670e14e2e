//! Paystack gateway client.

use super::{ChargeStatus, GatewayError, PaymentGateway, VerifyOutcome};
use crate::domain::{Money, Reference};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, warn};

/// Paystack REST client. Amounts cross the wire in minor units (kobo).
#[derive(Debug, Clone)]
pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    /// Create a new Paystack client.
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            secret_key,
        }
    }

    async fn request_json(
        &self,
        build: impl Fn(&Client) -> reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, GatewayError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = build(&self.client)
                .bearer_auth(&self.secret_key)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(GatewayError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(GatewayError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(GatewayError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if status == 404 {
                return Err(backoff::Error::permanent(GatewayError::UnknownReference(
                    "reference not found".to_string(),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(GatewayError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(GatewayError::ParseError(e.to_string())))
        })
        .await
    }
}

/// Convert a major-unit amount to gateway minor units. An amount that does
/// not fit the wire format is an error, never a truncated charge.
fn to_minor_units(amount: Money) -> Result<i64, GatewayError> {
    use rust_decimal::prelude::ToPrimitive;
    amount
        .inner()
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|minor| minor.round())
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| GatewayError::InvalidAmount(amount.to_string()))
}

/// Convert gateway minor units back to a major-unit amount.
fn from_minor_units(minor: i64) -> Money {
    Money::new(Decimal::new(minor, 2))
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initiate_charge(
        &self,
        amount: Money,
        reference: &Reference,
        metadata: serde_json::Value,
    ) -> Result<String, GatewayError> {
        debug!(
            "Initiating charge: amount={}, reference={}",
            amount, reference
        );

        let url = format!("{}/transaction/initialize", self.base_url);
        let payload = serde_json::json!({
            "amount": to_minor_units(amount)?,
            "reference": reference.as_str(),
            "metadata": metadata,
        });

        let body = self
            .request_json(move |client| client.post(&url).json(&payload))
            .await?;

        body.get("data")
            .and_then(|d| d.get("authorization_url"))
            .and_then(|u| u.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GatewayError::ParseError("missing data.authorization_url".to_string())
            })
    }

    async fn verify(&self, reference: &Reference) -> Result<VerifyOutcome, GatewayError> {
        debug!("Verifying charge: reference={}", reference);

        let url = format!("{}/transaction/verify/{}", self.base_url, reference.as_str());
        let body = self.request_json(move |client| client.get(&url)).await?;

        let data = body
            .get("data")
            .ok_or_else(|| GatewayError::ParseError("missing data".to_string()))?;

        let status = match data.get("status").and_then(|s| s.as_str()) {
            Some("success") => ChargeStatus::Successful,
            Some(other) => {
                warn!("Gateway reported non-success status: {}", other);
                ChargeStatus::Failed
            }
            None => return Err(GatewayError::ParseError("missing data.status".to_string())),
        };

        let amount_minor = data
            .get("amount")
            .and_then(|a| a.as_i64())
            .ok_or_else(|| GatewayError::ParseError("missing data.amount".to_string()))?;

        let currency = data
            .get("currency")
            .and_then(|c| c.as_str())
            .unwrap_or("NGN")
            .to_string();

        Ok(VerifyOutcome {
            status,
            amount: from_minor_units(amount_minor),
            currency,
            raw: body,
        })
    }
}
