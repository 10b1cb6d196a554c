//! Notification sender that records every message for assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{DeliveryStatus, NotificationChannel, NotificationSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub template_id: String,
    pub variables: HashMap<String, String>,
}

#[derive(Default)]
struct RecordingState {
    sent: Vec<SentNotification>,
    failing: bool,
}

/// Captures notifications; can be switched to fail every send.
#[derive(Clone, Default)]
pub struct RecordingNotificationSender {
    inner: Arc<Mutex<RecordingState>>,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.state().sent.clone()
    }

    pub fn sent_on(&self, channel: NotificationChannel) -> Vec<SentNotification> {
        self.sent().into_iter().filter(|n| n.channel == channel).collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        template_id: &str,
        variables: HashMap<String, String>,
    ) -> Result<DeliveryStatus, DomainError> {
        let mut state = self.state();
        if state.failing {
            return Err(DomainError::new(
                ErrorCode::NotificationError,
                format!("{} delivery unavailable", channel.as_str()),
            ));
        }
        state.sent.push(SentNotification {
            channel,
            recipient: recipient.to_string(),
            template_id: template_id.to_string(),
            variables,
        });
        Ok(DeliveryStatus::Delivered)
    }
}
