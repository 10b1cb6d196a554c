//! Stripe payment adapters.
//!
//! - `StripeChargeProvider` - production charge provider
//! - `MockChargeProvider` - scripted provider for tests

mod mock_charge_provider;
mod stripe_charge_provider;

pub use mock_charge_provider::MockChargeProvider;
pub use stripe_charge_provider::{StripeChargeConfig, StripeChargeProvider};
