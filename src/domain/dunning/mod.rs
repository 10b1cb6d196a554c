//! Dunning domain module.
//!
//! - `policy` - retry offsets, per-attempt actions and the final action
//! - `campaign` - DunningCampaign entity and its status machine
//! - `attempt` - append-only attempt records

mod attempt;
mod campaign;
mod policy;

pub use attempt::{AttemptOutcome, DunningAttemptRecord};
pub use campaign::{AttemptProgress, CampaignStatus, DunningCampaign, FailureContext};
pub use policy::{DunningAction, DunningPolicy, DunningStep, FinalAction};
