//! Dunning handlers.

mod cancel_dunning_campaign;
mod process_dunning_attempt;
mod record_payment_failure;

pub use cancel_dunning_campaign::{
    CancelDunningCampaignCommand, CancelDunningCampaignHandler, CancelDunningCampaignResult,
};
pub use process_dunning_attempt::{
    AttemptResolution, ProcessDunningAttemptCommand, ProcessDunningAttemptHandler,
    ProcessDunningAttemptResult,
};
pub use record_payment_failure::{
    RecordPaymentFailureCommand, RecordPaymentFailureHandler, RecordPaymentFailureResult,
};
