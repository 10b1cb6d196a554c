//! In-memory state history store.
//!
//! Captures every published envelope in order for assertions and for
//! single-process deployments that do not persist history.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope, SubscriptionId};
use crate::ports::EventPublisher;

/// In-memory event history.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// bus.publish(envelope).await?;
///
/// assert_eq!(bus.event_count(), 1);
/// assert!(bus.has_event("subscription.paused.v1"));
/// ```
#[derive(Default)]
pub struct InMemoryEventBus {
    published: RwLock<Vec<EventEnvelope>>,
    failing: AtomicBool,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Makes every publish fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "event history store unavailable",
            ));
        }
        Ok(())
    }

    /// Returns all published events in publication order.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Returns the state history of one subscription.
    pub fn history_for(&self, subscription_id: &SubscriptionId) -> Vec<EventEnvelope> {
        let aggregate_id = subscription_id.to_string();
        self.published_events()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|e| e.event_type == event_type)
    }

    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.check_available()?;
        tracing::debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Recorded state history event"
        );
        self.published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        self.check_available()?;
        self.published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{EventId, Timestamp};

    fn envelope(event_type: &str, aggregate_id: &str) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            schema_version: 1,
            aggregate_id: aggregate_id.to_string(),
            aggregate_type: "Subscription".to_string(),
            occurred_at: Timestamp::from_unix_secs(1_704_067_200).unwrap(),
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn captures_events_in_order() {
        let bus = InMemoryEventBus::new();
        bus.publish(envelope("subscription.paused.v1", "a")).await.unwrap();
        bus.publish(envelope("subscription.resumed.v1", "a")).await.unwrap();

        let types: Vec<String> = bus.published_events().into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["subscription.paused.v1", "subscription.resumed.v1"]);
    }

    #[tokio::test]
    async fn filters_by_type_and_aggregate() {
        let bus = InMemoryEventBus::new();
        let sub = SubscriptionId::new();
        bus.publish_all(vec![
            envelope("subscription.renewed.v1", &sub.to_string()),
            envelope("subscription.renewed.v1", "other"),
            envelope("subscription.cancelled.v1", &sub.to_string()),
        ])
        .await
        .unwrap();

        assert_eq!(bus.events_of_type("subscription.renewed.v1").len(), 2);
        assert_eq!(bus.history_for(&sub).len(), 2);
        assert!(bus.has_event("subscription.cancelled.v1"));
        assert!(!bus.has_event("subscription.paused.v1"));

        bus.clear();
        assert_eq!(bus.event_count(), 0);
    }

    #[tokio::test]
    async fn failing_bus_rejects_and_records_nothing() {
        let bus = InMemoryEventBus::new();
        bus.set_failing(true);

        assert!(bus.publish(envelope("subscription.renewed.v1", "a")).await.is_err());
        assert!(bus.publish_all(vec![envelope("subscription.renewed.v1", "a")]).await.is_err());
        assert_eq!(bus.event_count(), 0);

        bus.set_failing(false);
        bus.publish(envelope("subscription.renewed.v1", "a")).await.unwrap();
        assert_eq!(bus.event_count(), 1);
    }
}
