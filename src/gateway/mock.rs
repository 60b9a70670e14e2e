//! Mock gateway for testing without network calls.

use super::{ChargeStatus, GatewayError, PaymentGateway, VerifyOutcome};
use crate::domain::{Money, Reference};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Recorded call to `initiate_charge`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCharge {
    pub amount: Money,
    pub reference: Reference,
}

/// Mock gateway with scripted verification outcomes.
///
/// By default, `verify` confirms success for exactly the amount that was
/// charged through this mock. Individual references can be scripted to fail
/// or to report a different captured amount.
#[derive(Debug, Default)]
pub struct MockGateway {
    inner: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    charges: Vec<RecordedCharge>,
    failed_refs: Vec<String>,
    amount_overrides: HashMap<String, Money>,
    verify_calls: u32,
    unreachable: bool,
}

impl MockGateway {
    /// Create a mock with no scripted behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `verify` to report failure for this reference.
    pub fn fail_reference(&self, reference: &Reference) {
        self.inner
            .lock()
            .unwrap()
            .failed_refs
            .push(reference.as_str().to_string());
    }

    /// Script `verify` to report a captured amount different from the charge.
    pub fn override_amount(&self, reference: &Reference, amount: Money) {
        self.inner
            .lock()
            .unwrap()
            .amount_overrides
            .insert(reference.as_str().to_string(), amount);
    }

    /// Make all gateway calls fail with a network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unwrap().unreachable = unreachable;
    }

    /// Charges recorded so far.
    pub fn charges(&self) -> Vec<RecordedCharge> {
        self.inner.lock().unwrap().charges.clone()
    }

    /// Number of `verify` calls observed.
    pub fn verify_calls(&self) -> u32 {
        self.inner.lock().unwrap().verify_calls
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate_charge(
        &self,
        amount: Money,
        reference: &Reference,
        _metadata: serde_json::Value,
    ) -> Result<String, GatewayError> {
        let mut state = self.inner.lock().unwrap();
        if state.unreachable {
            return Err(GatewayError::NetworkError("mock unreachable".to_string()));
        }
        state.charges.push(RecordedCharge {
            amount,
            reference: reference.clone(),
        });
        Ok(format!("https://checkout.invalid/{}", reference.as_str()))
    }

    async fn verify(&self, reference: &Reference) -> Result<VerifyOutcome, GatewayError> {
        let mut state = self.inner.lock().unwrap();
        if state.unreachable {
            return Err(GatewayError::NetworkError("mock unreachable".to_string()));
        }
        state.verify_calls += 1;

        let charged = state
            .charges
            .iter()
            .find(|c| c.reference == *reference)
            .map(|c| c.amount)
            .ok_or_else(|| GatewayError::UnknownReference(reference.as_str().to_string()))?;

        let status = if state.failed_refs.contains(&reference.as_str().to_string()) {
            ChargeStatus::Failed
        } else {
            ChargeStatus::Successful
        };

        let amount = state
            .amount_overrides
            .get(reference.as_str())
            .copied()
            .unwrap_or(charged);

        Ok(VerifyOutcome {
            status,
            amount,
            currency: "NGN".to_string(),
            raw: serde_json::json!({ "mock": true, "reference": reference.as_str() }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        Money::from_str_canonical(s).unwrap()
    }

    #[tokio::test]
    async fn test_mock_charge_then_verify() {
        let gateway = MockGateway::new();
        let reference = Reference::generate();

        let url = gateway
            .initiate_charge(m("15"), &reference, serde_json::json!({}))
            .await
            .unwrap();
        assert!(url.contains(reference.as_str()));

        let outcome = gateway.verify(&reference).await.unwrap();
        assert_eq!(outcome.status, ChargeStatus::Successful);
        assert_eq!(outcome.amount, m("15"));
        assert_eq!(gateway.verify_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let gateway = MockGateway::new();
        let reference = Reference::generate();
        gateway
            .initiate_charge(m("15"), &reference, serde_json::json!({}))
            .await
            .unwrap();
        gateway.fail_reference(&reference);

        let outcome = gateway.verify(&reference).await.unwrap();
        assert_eq!(outcome.status, ChargeStatus::Failed);
    }

    #[tokio::test]
    async fn test_mock_unknown_reference() {
        let gateway = MockGateway::new();
        let err = gateway.verify(&Reference::generate()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownReference(_)));
    }
}
