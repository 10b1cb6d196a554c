//! Worker configuration
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `BILLING_ENGINE` prefix
//! and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use billing_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Sweeping every {:?}", config.scheduler.interval());
//! ```

mod database;
mod dunning;
mod error;
mod observability;
mod payment;
mod scheduler;

pub use database::DatabaseConfig;
pub use dunning::DunningConfig;
pub use error::{ConfigError, ValidationError};
pub use observability::{Environment, ObservabilityConfig};
pub use payment::PaymentConfig;
pub use scheduler::SchedulerConfig;

use serde::Deserialize;

/// Root configuration for the billing worker.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub dunning: DunningConfig,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Loads `.env` if present, then reads `BILLING_ENGINE__*` variables.
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_ENGINE__DATABASE__URL=...` -> `database.url`
    /// - `BILLING_ENGINE__SCHEDULER__INTERVAL_SECS=30` -> `scheduler.interval_secs`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// cannot be parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.scheduler.validate()?;
        self.dunning.validate()?;
        self.payment.validate(self.is_production())?;
        self.observability.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.observability.is_production()
    }
}
