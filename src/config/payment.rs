//! Payment provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret key (`sk_test_...` or `sk_live_...`)
    #[serde(default)]
    pub stripe_api_key: Option<SecretString>,

    #[serde(default = "default_base_url")]
    pub stripe_api_base_url: String,

    /// Upper bound on one charge call
    #[serde(default = "default_charge_timeout")]
    pub charge_timeout_secs: u64,

    /// Billing period length for new subscriptions
    #[serde(default = "default_period_days")]
    pub default_period_days: u32,
}

impl PaymentConfig {
    pub fn charge_timeout(&self) -> Duration {
        Duration::from_secs(self.charge_timeout_secs)
    }

    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key
            .as_ref()
            .map_or(false, |key| key.expose_secret().starts_with("sk_test_"))
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let key = self
            .stripe_api_key
            .as_ref()
            .ok_or(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"))?;
        if !key.expose_secret().starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if production && !self.stripe_api_base_url.starts_with("https://") {
            return Err(ValidationError::StripeUrlMustBeHttps);
        }
        if self.charge_timeout_secs == 0 || self.charge_timeout_secs > 120 {
            return Err(ValidationError::invalid(
                "payment.charge_timeout_secs",
                "must be between 1 and 120",
            ));
        }
        if self.default_period_days == 0 {
            return Err(ValidationError::invalid(
                "payment.default_period_days",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: None,
            stripe_api_base_url: default_base_url(),
            charge_timeout_secs: default_charge_timeout(),
            default_period_days: default_period_days(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_charge_timeout() -> u64 {
    30
}

fn default_period_days() -> u32 {
    30
}
