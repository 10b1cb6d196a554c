//! Billing Engine - subscription state machine, proration and dunning recovery.
//!
//! The crate is laid out hexagonally:
//!
//! - `domain` - subscription aggregate, proration calculator, scheduled
//!   changes and dunning campaigns
//! - `ports` - storage, lock, payment, notification and clock interfaces
//! - `adapters` - in-memory, PostgreSQL, Stripe and notification implementations
//! - `application` - command handlers and the background scheduler
//! - `config` - environment-driven worker configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
