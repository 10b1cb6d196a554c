//! Notification sender adapters.

mod recording_sender;
mod tracing_sender;

pub use recording_sender::{RecordingNotificationSender, SentNotification};
pub use tracing_sender::TracingNotificationSender;
