//! Subscription history events.
//!
//! One event per applied mutation; the event publisher persists them as the
//! subscription's state history.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainEvent, EventId, SubscriptionId, Timestamp};

use super::SubscriptionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Upgraded,
    LineItemsReplaced,
    CancellationScheduled,
    Reactivated,
    Cancelled,
    Paused,
    Resumed,
    Renewed,
    MarkedPastDue,
    Recovered,
}

impl SubscriptionEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEventKind::Upgraded => "subscription.upgraded.v1",
            SubscriptionEventKind::LineItemsReplaced => "subscription.line_items_replaced.v1",
            SubscriptionEventKind::CancellationScheduled => "subscription.cancellation_scheduled.v1",
            SubscriptionEventKind::Reactivated => "subscription.reactivated.v1",
            SubscriptionEventKind::Cancelled => "subscription.cancelled.v1",
            SubscriptionEventKind::Paused => "subscription.paused.v1",
            SubscriptionEventKind::Resumed => "subscription.resumed.v1",
            SubscriptionEventKind::Renewed => "subscription.renewed.v1",
            SubscriptionEventKind::MarkedPastDue => "subscription.past_due.v1",
            SubscriptionEventKind::Recovered => "subscription.recovered.v1",
        }
    }
}

/// A single entry in a subscription's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub kind: SubscriptionEventKind,
    pub from_status: SubscriptionStatus,
    pub to_status: SubscriptionStatus,
    pub total_amount_cents: i64,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub occurred_at: Timestamp,
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscription"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SerializableDomainEvent;

    #[test]
    fn envelope_carries_kind_specific_type() {
        let event = SubscriptionEvent {
            event_id: EventId::new(),
            subscription_id: SubscriptionId::new(),
            kind: SubscriptionEventKind::Paused,
            from_status: SubscriptionStatus::Active,
            to_status: SubscriptionStatus::Paused,
            total_amount_cents: 2_000,
            version: 4,
            reason: None,
            occurred_at: Timestamp::from_unix_secs(1_704_067_200).unwrap(),
        };

        let envelope = event.to_envelope().unwrap();
        assert_eq!(envelope.event_type, "subscription.paused.v1");
        assert_eq!(envelope.aggregate_type, "Subscription");
        assert_eq!(envelope.payload["to_status"], "paused");
    }
}
