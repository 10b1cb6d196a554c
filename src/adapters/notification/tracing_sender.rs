//! Notification sender that logs instead of delivering.
//!
//! Used by the worker when no delivery channel is configured.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::foundation::DomainError;
use crate::ports::{DeliveryStatus, NotificationChannel, NotificationSender};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSender;

impl TracingNotificationSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for TracingNotificationSender {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        template_id: &str,
        variables: HashMap<String, String>,
    ) -> Result<DeliveryStatus, DomainError> {
        tracing::info!(
            channel = channel.as_str(),
            recipient = %recipient,
            template_id = %template_id,
            variable_count = variables.len(),
            "Notification queued"
        );
        Ok(DeliveryStatus::Queued)
    }
}
