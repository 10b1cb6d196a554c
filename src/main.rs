//! billing-worker - runs the billing scheduler against PostgreSQL and Stripe.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use billing_engine::adapters::postgres::{
    PostgresAdvisoryLocks, PostgresDunningRepository, PostgresHistoryStore,
    PostgresReconciliationLog, PostgresScheduledChangeLedger, PostgresSubscriptionRepository,
};
use billing_engine::adapters::{
    StripeChargeConfig, StripeChargeProvider, SystemClock, TracingNotificationSender,
};
use billing_engine::application::{BillingEngine, BillingPorts, BillingScheduler, BillingSettings};
use billing_engine::config::{AppConfig, ObservabilityConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);
    config.validate().context("Invalid configuration")?;

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Database migrations completed");
    }

    let api_key = config
        .payment
        .stripe_api_key
        .clone()
        .context("Stripe API key missing")?;
    let charges = StripeChargeProvider::new(
        StripeChargeConfig::new(api_key).with_base_url(config.payment.stripe_api_base_url.clone()),
    );

    let ports = BillingPorts {
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        ledger: Arc::new(PostgresScheduledChangeLedger::new(pool.clone())),
        dunning: Arc::new(PostgresDunningRepository::new(pool.clone())),
        reconciliation: Arc::new(PostgresReconciliationLog::new(pool.clone())),
        events: Arc::new(PostgresHistoryStore::new(pool.clone())),
        locks: Arc::new(PostgresAdvisoryLocks::new(pool.clone())),
        charges: Arc::new(charges),
        notifications: Arc::new(TracingNotificationSender::new()),
        clock: Arc::new(SystemClock),
    };
    let settings = BillingSettings::new(config.dunning.to_policy()?)
        .with_charge_timeout(config.payment.charge_timeout())
        .with_claim_lease(config.scheduler.claim_lease());

    let scheduler = BillingScheduler::with_config(
        BillingEngine::new(ports, settings),
        config.scheduler.sweep_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested; finishing current sweep"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    pool.close().await;
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
