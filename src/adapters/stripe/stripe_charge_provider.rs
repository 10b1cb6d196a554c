//! Stripe charge provider.
//!
//! Collects renewal, proration and dunning charges with off-session
//! PaymentIntents against the customer's default payment method.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeChargeConfig::new(api_key);
//! let provider = StripeChargeProvider::new(config);
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{ChargeOutcome, ChargeProvider, ChargeRequest};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeChargeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeChargeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

pub struct StripeChargeProvider {
    config: StripeChargeConfig,
    http_client: reqwest::Client,
}

impl StripeChargeProvider {
    pub fn new(config: StripeChargeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn form_params(request: &ChargeRequest) -> Vec<(&'static str, String)> {
        vec![
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("customer", request.customer_id.as_str().to_string()),
            ("confirm", "true".to_string()),
            ("off_session", "true".to_string()),
            ("metadata[subscription_id]", request.subscription_id.to_string()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

fn provider_error(message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::PaymentProviderError, message)
}

/// Maps a PaymentIntent response to a charge outcome.
///
/// Card errors are declines, not transport failures: they become
/// `ChargeOutcome::Failed` carrying the most specific code Stripe gave.
pub(crate) fn interpret_response(status: u16, body: &str) -> Result<ChargeOutcome, DomainError> {
    if (200..300).contains(&status) {
        let intent: PaymentIntentResponse = serde_json::from_str(body)
            .map_err(|e| provider_error(format!("Failed to parse Stripe response: {}", e)))?;
        return Ok(if intent.status == "succeeded" {
            ChargeOutcome::Succeeded {
                provider_reference: intent.id,
            }
        } else {
            ChargeOutcome::failed(intent.status)
        });
    }

    if let Ok(parsed) = serde_json::from_str::<StripeErrorBody>(body) {
        let detail = parsed.error;
        if detail.kind.as_deref() == Some("card_error") {
            let reason = detail
                .decline_code
                .or(detail.code)
                .unwrap_or_else(|| "card_declined".to_string());
            return Ok(ChargeOutcome::failed(reason));
        }
        return Err(provider_error(format!(
            "Stripe API error ({}): {}",
            status,
            detail.message.unwrap_or_default()
        )));
    }

    Err(provider_error(format!("Stripe API error ({}): {}", status, body)))
}

#[async_trait]
impl ChargeProvider for StripeChargeProvider {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome, DomainError> {
        let url = format!("{}/v1/payment_intents", self.config.api_base_url);
        let params = Self::form_params(&request);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, subscription_id = %request.subscription_id, "Stripe charge request failed");
                provider_error(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| provider_error(e.to_string()))?;

        let outcome = interpret_response(status, &body);
        match &outcome {
            Ok(ChargeOutcome::Failed { reason_code }) => tracing::warn!(
                subscription_id = %request.subscription_id,
                reason_code = %reason_code,
                "Stripe declined charge"
            ),
            Err(e) => tracing::error!(error = %e, "Stripe charge failed"),
            Ok(ChargeOutcome::Succeeded { .. }) => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CustomerId, SubscriptionId};

    #[test]
    fn succeeded_intent_carries_reference() {
        let outcome = interpret_response(200, r#"{"id":"pi_123","status":"succeeded"}"#).unwrap();
        assert_eq!(
            outcome,
            ChargeOutcome::Succeeded {
                provider_reference: "pi_123".to_string()
            }
        );
    }

    #[test]
    fn unfinished_intent_is_a_failure() {
        let outcome =
            interpret_response(200, r#"{"id":"pi_1","status":"requires_action"}"#).unwrap();
        assert_eq!(outcome, ChargeOutcome::failed("requires_action"));
    }

    #[test]
    fn card_error_prefers_decline_code() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"Your card has insufficient funds."}}"#;
        assert_eq!(
            interpret_response(402, body).unwrap(),
            ChargeOutcome::failed("insufficient_funds")
        );

        let body = r#"{"error":{"type":"card_error","code":"expired_card"}}"#;
        assert_eq!(interpret_response(402, body).unwrap(), ChargeOutcome::failed("expired_card"));
    }

    #[test]
    fn api_errors_are_provider_errors() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"No such customer"}}"#;
        let err = interpret_response(400, body).unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentProviderError);
        assert!(err.message.contains("No such customer"));

        assert!(interpret_response(502, "Bad Gateway").is_err());
    }

    #[test]
    fn form_lowercases_currency() {
        let request = ChargeRequest {
            subscription_id: SubscriptionId::new(),
            customer_id: CustomerId::new("cus_9").unwrap(),
            amount_cents: 3_333,
            currency: "USD".to_string(),
            idempotency_key: "k".to_string(),
        };
        let params = StripeChargeProvider::form_params(&request);
        assert!(params.contains(&("currency", "usd".to_string())));
        assert!(params.contains(&("amount", "3333".to_string())));
        assert!(params.contains(&("customer", "cus_9".to_string())));
    }
}
